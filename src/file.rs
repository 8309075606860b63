//! File discovery and loading for config layers.
//!
//! # Discovery
//!
//! Each [`SearchPath`] resolves to one or more directories. A
//! [`SearchPathResolver`] holds them in **priority-ascending** order (last =
//! highest) and answers the [`CascadeResolver`] questions: which copies of
//! `name` exist, and where new writes go.
//!
//! # Loading
//!
//! [`read_layer`] reads one file. A missing file is `Ok(None)`, an empty
//! layer. Only real I/O errors (permissions, etc.) come back as errors, and
//! the fold turns those into a logged skip.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::cascade::CascadeResolver;
use crate::error::ConfigError;
use crate::types::SearchPath;

const DEFAULT_SYSTEM_DIRS: &str = "/etc/xdg";

/// Resolve a [`SearchPath`] to concrete directories, lowest priority first.
///
/// `System` reads `XDG_CONFIG_DIRS`, whose entries are listed most important
/// first, so they come back reversed.
pub fn resolve_search_path(sp: &SearchPath) -> Vec<PathBuf> {
    match sp {
        SearchPath::Platform => directories::BaseDirs::new()
            .map(|base| base.config_dir().to_path_buf())
            .into_iter()
            .collect(),
        SearchPath::System => {
            let raw = std::env::var("XDG_CONFIG_DIRS").unwrap_or_default();
            system_dirs(&raw)
        }
        SearchPath::Home(subdir) => directories::UserDirs::new()
            .map(|user| user.home_dir().join(subdir))
            .into_iter()
            .collect(),
        SearchPath::Path(p) => vec![p.clone()],
    }
}

/// Parse an `XDG_CONFIG_DIRS` value into priority-ascending directories.
pub fn system_dirs(raw: &str) -> Vec<PathBuf> {
    let raw = if raw.trim().is_empty() {
        DEFAULT_SYSTEM_DIRS
    } else {
        raw
    };
    raw.split(':')
        .filter(|part| !part.is_empty())
        .rev()
        .map(PathBuf::from)
        .collect()
}

/// Read one layer. `Ok(None)` when the file does not exist.
pub fn read_layer(path: &Path) -> Result<Option<Vec<u8>>, ConfigError> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// A [`CascadeResolver`] over [`SearchPath`]s.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    search_paths: Vec<SearchPath>,
    save_path: Option<SearchPath>,
    restricted: BTreeSet<String>,
    executable_dirs: Vec<PathBuf>,
}

impl Default for SearchPathResolver {
    /// System directories, then the user's config directory. Writes go to the
    /// user's config directory.
    fn default() -> Self {
        Self::new(vec![SearchPath::System, SearchPath::Platform])
    }
}

impl SearchPathResolver {
    /// `search_paths` in priority-ascending order. Writes default to the
    /// last one.
    pub fn new(search_paths: Vec<SearchPath>) -> Self {
        Self {
            search_paths,
            save_path: None,
            restricted: BTreeSet::new(),
            executable_dirs: Vec::new(),
        }
    }

    /// Write new files here instead of the highest-priority search path.
    pub fn save_to(mut self, path: SearchPath) -> Self {
        self.save_path = Some(path);
        self
    }

    /// Treat `name` as administratively locked.
    pub fn restrict(mut self, name: &str) -> Self {
        self.restricted.insert(name.to_string());
        self
    }

    pub fn executable_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.executable_dirs.push(dir.into());
        self
    }

    /// All directories, priority-ascending.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.search_paths.iter().flat_map(resolve_search_path).collect()
    }
}

impl CascadeResolver for SearchPathResolver {
    fn find_all(&self, name: &str) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = Vec::new();
        for dir in self.dirs().into_iter().rev() {
            let path = dir.join(name);
            if path.is_file() && !found.contains(&path) {
                found.push(path);
            }
        }
        found
    }

    fn save_path(&self, name: &str) -> Option<PathBuf> {
        let dir = match &self.save_path {
            Some(sp) => resolve_search_path(sp).pop(),
            None => self.dirs().pop(),
        }?;
        Some(dir.join(name))
    }

    fn is_restricted(&self, name: &str) -> bool {
        self.restricted.contains(name)
    }

    fn executable_dirs(&self) -> Vec<PathBuf> {
        self.executable_dirs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolve_explicit_path() {
        let p = PathBuf::from("/tmp/myapp");
        assert_eq!(resolve_search_path(&SearchPath::Path(p.clone())), vec![p]);
    }

    #[test]
    fn system_dirs_are_priority_ascending() {
        assert_eq!(
            system_dirs("/etc/xdg/kde:/etc/xdg"),
            vec![PathBuf::from("/etc/xdg"), PathBuf::from("/etc/xdg/kde")]
        );
        assert_eq!(system_dirs(""), vec![PathBuf::from("/etc/xdg")]);
        assert_eq!(system_dirs("::/opt/cfg:"), vec![PathBuf::from("/opt/cfg")]);
    }

    #[test]
    fn read_missing_layer_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_layer(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn read_existing_layer_returns_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apprc");
        fs::write(&path, "[G]\nk=v\n").unwrap();
        assert_eq!(read_layer(&path).unwrap().unwrap(), b"[G]\nk=v\n");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_layer_returns_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apprc");
        fs::write(&path, "k=v\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits
        if fs::read(&path).is_err() {
            assert!(matches!(read_layer(&path), Err(ConfigError::Io { .. })));
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn find_all_lists_most_relevant_first() {
        let low = TempDir::new().unwrap();
        let mid = TempDir::new().unwrap();
        let high = TempDir::new().unwrap();
        fs::write(low.path().join("apprc"), "").unwrap();
        fs::write(high.path().join("apprc"), "").unwrap();

        let resolver = SearchPathResolver::new(vec![
            SearchPath::Path(low.path().to_path_buf()),
            SearchPath::Path(mid.path().to_path_buf()),
            SearchPath::Path(high.path().to_path_buf()),
        ]);
        assert_eq!(
            resolver.find_all("apprc"),
            vec![high.path().join("apprc"), low.path().join("apprc")]
        );
    }

    #[test]
    fn save_path_defaults_to_highest_priority() {
        let low = TempDir::new().unwrap();
        let high = TempDir::new().unwrap();
        let resolver = SearchPathResolver::new(vec![
            SearchPath::Path(low.path().to_path_buf()),
            SearchPath::Path(high.path().to_path_buf()),
        ]);
        assert_eq!(resolver.save_path("apprc"), Some(high.path().join("apprc")));

        let resolver = resolver.save_to(SearchPath::Path(low.path().to_path_buf()));
        assert_eq!(resolver.save_path("apprc"), Some(low.path().join("apprc")));
    }

    #[test]
    fn restricted_names_and_exe_dirs() {
        let resolver = SearchPathResolver::new(vec![])
            .restrict("lockedrc")
            .executable_dir("/opt/tools/bin");
        assert!(resolver.is_restricted("lockedrc"));
        assert!(!resolver.is_restricted("apprc"));
        assert_eq!(resolver.executable_dirs(), vec![PathBuf::from("/opt/tools/bin")]);
        assert_eq!(resolver.save_path("apprc"), None);
    }
}
