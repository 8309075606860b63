use std::path::PathBuf;

/// Where to look for configuration files.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPath {
    /// The user's config directory (`$XDG_CONFIG_HOME`, `~/.config` on Linux).
    Platform,
    /// System config directories from `$XDG_CONFIG_DIRS` (default `/etc/xdg`).
    /// Expands to one directory per entry.
    System,
    /// A subdirectory under the user's home directory, e.g. `Home(".kde/share/config")`.
    Home(&'static str),
    /// An explicit directory.
    Path(PathBuf),
}

/// A config operation, independent of any CLI framework.
/// The CLI layer converts parsed clap args into this.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Groups with at least one visible key.
    Groups,
    /// Every visible key of one group.
    List { group: String },
    Get { group: String, key: String },
    Set {
        group: String,
        key: String,
        value: String,
    },
    Delete { group: String, key: String },
    Revert { group: String, key: String },
}
