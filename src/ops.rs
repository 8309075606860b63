use std::fmt;

use crate::config::Config;
use crate::error::ConfigError;
use crate::group::WriteFlags;
use crate::types::ConfigAction;

/// Result of a config operation. Returned to the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResult {
    /// Groups with at least one visible key.
    Groups(Vec<String>),
    /// Every visible key of one group.
    Listing {
        group: String,
        entries: Vec<(String, String)>,
    },
    /// A key's effective value.
    KeyValue {
        group: String,
        key: String,
        value: String,
        immutable: bool,
    },
    ValueSet {
        group: String,
        key: String,
        value: String,
    },
    ValueDeleted { group: String, key: String },
    /// The key now shows its inherited value, if any.
    ValueReverted {
        group: String,
        key: String,
        value: Option<String>,
    },
    /// The key is kiosk-locked; nothing changed.
    Locked { group: String, key: String },
}

impl fmt::Display for ConfigResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigResult::Groups(groups) => {
                for (i, group) in groups.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{group}")?;
                }
                Ok(())
            }
            ConfigResult::Listing { group, entries } => {
                write!(f, "[{group}]")?;
                for (key, value) in entries {
                    write!(f, "\n{key}={value}")?;
                }
                Ok(())
            }
            ConfigResult::KeyValue {
                key,
                value,
                immutable,
                ..
            } => {
                write!(f, "{key}={value}")?;
                if *immutable {
                    write!(f, " (locked)")?;
                }
                Ok(())
            }
            ConfigResult::ValueSet { group, key, value } => write!(f, "Set [{group}] {key}={value}"),
            ConfigResult::ValueDeleted { group, key } => write!(f, "Deleted [{group}] {key}"),
            ConfigResult::ValueReverted { group, key, value } => match value {
                Some(v) => write!(f, "Reverted [{group}] {key} to {v}"),
                None => write!(f, "Reverted [{group}] {key} (no default)"),
            },
            ConfigResult::Locked { group, key } => write!(f, "[{group}] {key} is locked"),
        }
    }
}

/// Keys end at the first `[` and may not hold `=` or a line break.
fn check_key(key: &str) -> Result<(), ConfigError> {
    if key.is_empty() || key.contains(['=', '[', '\n', '\r']) {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            reason: "keys must be non-empty and free of '=', '[' and line breaks".into(),
        });
    }
    Ok(())
}

/// Refuse writes the configuration can never save.
fn check_writable(config: &Config) -> Result<(), ConfigError> {
    let target = config.write_target().ok_or(ConfigError::NoSaveLocation)?;
    if config.is_immutable() {
        return Err(ConfigError::ReadOnly(target));
    }
    Ok(())
}

/// Sync and fail when the change did not reach disk.
fn save(config: &mut Config) -> Result<(), ConfigError> {
    let outcome = config.sync();
    if outcome.entries_left {
        let target = config.write_target().ok_or(ConfigError::NoSaveLocation)?;
        return Err(ConfigError::ReadOnly(target));
    }
    Ok(())
}

/// Run `action` against `config`, saving any change.
pub fn handle(config: &mut Config, action: &ConfigAction) -> Result<ConfigResult, ConfigError> {
    match action {
        ConfigAction::Groups => Ok(ConfigResult::Groups(config.group_list())),
        ConfigAction::List { group } => Ok(ConfigResult::Listing {
            group: group.clone(),
            entries: config.entry_map(group).into_iter().collect(),
        }),
        ConfigAction::Get { group, key } => {
            let handle = config.group(group);
            let value = handle
                .read_string(key)
                .ok_or_else(|| ConfigError::KeyNotFound {
                    group: group.clone(),
                    key: key.clone(),
                })?;
            Ok(ConfigResult::KeyValue {
                group: group.clone(),
                key: key.clone(),
                value,
                immutable: handle.is_entry_immutable(key),
            })
        }
        ConfigAction::Set { group, key, value } => {
            check_key(key)?;
            check_writable(config)?;
            if !config.group(group).write_string(key, value, WriteFlags::default()) {
                return Ok(locked(group, key));
            }
            save(config)?;
            Ok(ConfigResult::ValueSet {
                group: group.clone(),
                key: key.clone(),
                value: value.clone(),
            })
        }
        ConfigAction::Delete { group, key } => {
            check_writable(config)?;
            let mut handle = config.group(group);
            if !handle.has_key(key) {
                return Err(ConfigError::KeyNotFound {
                    group: group.clone(),
                    key: key.clone(),
                });
            }
            if !handle.delete_entry(key, WriteFlags::default()) {
                return Ok(locked(group, key));
            }
            save(config)?;
            Ok(ConfigResult::ValueDeleted {
                group: group.clone(),
                key: key.clone(),
            })
        }
        ConfigAction::Revert { group, key } => {
            check_writable(config)?;
            let mut handle = config.group(group);
            if !handle.revert_to_default(key) {
                return Ok(locked(group, key));
            }
            let value = handle.read_string(key);
            save(config)?;
            Ok(ConfigResult::ValueReverted {
                group: group.clone(),
                key: key.clone(),
                value,
            })
        }
    }
}

fn locked(group: &str, key: &str) -> ConfigResult {
    tracing::info!(group, key, "entry is locked, nothing changed");
    ConfigResult::Locked {
        group: group.into(),
        key: key.into(),
    }
}
