use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file {0} is read-only")]
    ReadOnly(PathBuf),

    #[error("No save location available for this configuration")]
    NoSaveLocation,

    #[error("File name is required: call .file_name() or .app_name() on the builder")]
    FileNameRequired,

    #[error("Key not found: [{group}] {key}")]
    KeyNotFound { group: String, key: String },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to flatten value: {0}")]
    Flatten(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = ConfigError::Io {
            path: "/home/user/.config/myapprc".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("myapprc"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn key_not_found_names_group_and_key() {
        let err = ConfigError::KeyNotFound {
            group: "General".into(),
            key: "Name".into(),
        };
        assert_eq!(err.to_string(), "Key not found: [General] Name");
    }

    #[test]
    fn file_name_required_formats() {
        let err = ConfigError::FileNameRequired;
        assert!(err.to_string().contains("file_name"));
    }
}
