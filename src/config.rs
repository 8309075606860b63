//! The configuration object: one folded cascade plus the backend it came
//! from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::backend::{AccessState, ConfigBackend, SyncOutcome};
use crate::builder::ConfigBuilder;
use crate::error::ConfigError;
use crate::group::ConfigGroup;
use crate::locale::LocaleContext;
use crate::ops::{self, ConfigResult};
use crate::store::EntryStore;
use crate::types::ConfigAction;

/// A loaded configuration.
///
/// Changes stay in memory until [`sync()`](Self::sync). Nothing is written
/// on drop.
pub struct Config {
    pub(crate) store: EntryStore,
    backend: Box<dyn ConfigBackend>,
    pub(crate) locale: LocaleContext,
    pub(crate) always_expand: bool,
    pub(crate) shell_expansion: bool,
    loaded: Vec<PathBuf>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Wrap `backend` and fold its layers.
    pub fn with_backend(backend: Box<dyn ConfigBackend>, always_expand: bool, shell_expansion: bool) -> Self {
        let mut config = Self {
            store: EntryStore::new(),
            backend,
            locale: LocaleContext::default(),
            always_expand,
            shell_expansion,
            loaded: Vec::new(),
        };
        config.load();
        config
    }

    fn load(&mut self) {
        let report = self.backend.parse(&mut self.store);
        self.locale = report.locale;
        self.loaded = report.loaded;
    }

    /// Borrow one group for reading and writing.
    pub fn group(&mut self, name: &str) -> ConfigGroup<'_> {
        ConfigGroup::new(self, name)
    }

    /// Groups with at least one visible key.
    pub fn group_list(&self) -> Vec<String> {
        self.store
            .group_list()
            .into_iter()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .collect()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.store.has_group(name.as_bytes())
    }

    /// Visible keys of `group` with their raw, unexpanded values.
    pub fn entry_map(&self, group: &str) -> BTreeMap<String, String> {
        self.store
            .entry_map(group.as_bytes())
            .into_iter()
            .map(|(k, v)| {
                (
                    String::from_utf8_lossy(&k).into_owned(),
                    String::from_utf8_lossy(&v).into_owned(),
                )
            })
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    /// The whole configuration is kiosk-locked.
    pub fn is_immutable(&self) -> bool {
        self.store.is_file_immutable()
    }

    pub fn locale(&self) -> &LocaleContext {
        &self.locale
    }

    /// Files folded on the last load, in fold order.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded
    }

    pub fn write_target(&self) -> Option<PathBuf> {
        self.backend.write_target()
    }

    pub fn executable_dirs(&self) -> Vec<PathBuf> {
        self.backend.executable_dirs()
    }

    /// Whether changes can reach disk. A locked configuration is read-only
    /// even when its file is writable.
    pub fn access_state(&self) -> AccessState {
        match self.backend.access_state() {
            AccessState::ReadWrite if self.is_immutable() => AccessState::ReadOnly,
            state => state,
        }
    }

    /// Write pending changes, merging with whatever changed on disk since
    /// the last load.
    pub fn sync(&mut self) -> SyncOutcome {
        let outcome = self.backend.sync(&mut self.store, &self.locale, true);
        if outcome.entries_left {
            tracing::warn!(path = ?self.backend.write_target(), "some config changes were not saved");
        }
        outcome
    }

    /// Save pending changes, then fold every layer again.
    pub fn reparse(&mut self) {
        if self.store.is_dirty() {
            self.sync();
        }
        self.store.clear();
        self.load();
    }

    /// Forget pending changes. Values already in memory stay until the next
    /// [`reparse()`](Self::reparse).
    pub fn rollback(&mut self) {
        self.store.clear_dirty(None);
        self.store.set_dirty(false);
    }

    /// Replace the merge stack and reload. The last file receives writes.
    pub fn set_extra_config_files(&mut self, files: Vec<PathBuf>) {
        if self.store.is_dirty() {
            self.sync();
        }
        self.backend.set_extra_config_files(files);
        self.store.clear();
        self.load();
    }

    /// A copy of this configuration that saves every entry to `path`.
    pub fn copy_to(&self, path: &Path) -> Config {
        let mut store = self.store.clone();
        store.mark_all_dirty();
        Config {
            store,
            backend: self.backend.retarget(path),
            locale: self.locale.clone(),
            always_expand: self.always_expand,
            shell_expansion: self.shell_expansion,
            loaded: Vec::new(),
        }
    }

    /// Run a CLI-level action against this configuration.
    pub fn handle(&mut self, action: &ConfigAction) -> Result<ConfigResult, ConfigError> {
        ops::handle(self, action)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("write_target", &self.backend.write_target())
            .field("locale", &self.locale)
            .field("loaded", &self.loaded)
            .field("dirty", &self.store.is_dirty())
            .finish()
    }
}
