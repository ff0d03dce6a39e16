//! Process-wide configuration. A configuration file is a JSON document
//! defining atom-type renames applied when reading files:
//!
//! ```json
//! { "types": { "OW": "O", "HT": "H" } }
//! ```
//!
//! Multiple files may be added; later files win on conflicting keys.

use std::{collections::HashMap, fs, path::Path, sync::RwLock};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    types: HashMap<String, String>,
}

static RENAMES: RwLock<Option<HashMap<String, String>>> = RwLock::new(None);

/// Read the configuration file at `path` and merge it into the global
/// configuration.
pub fn add_configuration(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "can not read configuration file at '{}': {e}",
            path.display()
        ))
    })?;

    let parsed: ConfigFile = serde_json::from_str(&content).map_err(|e| {
        Error::Configuration(format!(
            "invalid configuration file at '{}': {e}",
            path.display()
        ))
    })?;

    let mut guard = RENAMES.write().unwrap_or_else(|e| e.into_inner());
    guard.get_or_insert_with(HashMap::new).extend(parsed.types);

    Ok(())
}

/// The configured replacement for an atom type, if any.
pub(crate) fn rename_type(type_: &str) -> Option<String> {
    let guard = RENAMES.read().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().and_then(|map| map.get(type_).cloned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn rename_table() {
        let path = std::env::temp_dir().join("mol_files_config_test.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{ "types": {{ "Ow": "O" }} }}"#).unwrap();

        add_configuration(&path).unwrap();
        assert_eq!(rename_type("Ow").as_deref(), Some("O"));
        assert_eq!(rename_type("N"), None);

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_file() {
        let path = std::env::temp_dir().join("mol_files_config_bad.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "not json at all").unwrap();

        let err = add_configuration(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file() {
        let err = add_configuration("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
