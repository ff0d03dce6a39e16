//! In-memory transport: a byte buffer shared between a writing format and
//! the trajectory that owns it.

use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

/// The accumulated bytes of a memory-backed writer. The trajectory keeps
/// one handle, the file stack the other.
pub(crate) type SharedBuffer = Arc<Mutex<Vec<u8>>>;

pub(crate) fn new_shared_buffer() -> SharedBuffer {
    Arc::new(Mutex::new(Vec::new()))
}

/// `Write` adapter appending into a [`SharedBuffer`].
pub(crate) struct MemoryWriter {
    buffer: SharedBuffer,
}

impl MemoryWriter {
    pub fn new(buffer: SharedBuffer) -> MemoryWriter {
        MemoryWriter { buffer }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("memory buffer lock poisoned"))?;
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
