//! Non-fatal diagnostics. Parsers report recoverable oddities (a malformed
//! extended-XYZ header, an out-of-range PDB serial) here instead of failing;
//! callers may install their own sink.

use std::sync::RwLock;

type WarningCallback = Box<dyn Fn(&str) + Send + Sync>;

static CALLBACK: RwLock<Option<WarningCallback>> = RwLock::new(None);

/// Set the global callback receiving all warnings emitted by this crate.
///
/// The default behavior, restored by `reset_warning_callback`, writes
/// `[mol_files] <message>` to stderr.
pub fn set_warning_callback<F>(callback: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let mut guard = CALLBACK.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(Box::new(callback));
}

/// Restore the default warning behavior (print to stderr).
pub fn reset_warning_callback() {
    let mut guard = CALLBACK.write().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

pub(crate) fn send_warning(message: &str) {
    let guard = CALLBACK.read().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(callback) => callback(message),
        None => eprintln!("[mol_files] {message}"),
    }
}

macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::warnings::send_warning(&format!($($arg)*))
    };
}

pub(crate) use warning;
