//! Storage backends: where a configuration's layers come from and where its
//! changes go.
//!
//! [`IniBackend`] is the file-based implementation. It folds, in order:
//!
//! 1. the shared globals file (`kdeglobals`) cascade, when requested,
//! 2. the configuration's own cascade,
//! 3. the merge stack of extra files, highest priority last.
//!
//! Writes go to the top of the merge stack, else to the local file. Entries
//! marked global go to the user's globals file in a second pass.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::cascade::{self, CascadeFile, CascadeResolver, FoldContext, FoldOutcome};
use crate::locale::{LocaleContext, LocaleProvider};
use crate::persist::{self, WriteOptions};
use crate::store::EntryStore;

pub const DEFAULT_GLOBALS_NAME: &str = "kdeglobals";

/// What loading produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// The locale the layers were parsed with.
    pub locale: LocaleContext,
    /// The configuration is kiosk-locked as a whole.
    pub file_immutable: bool,
    /// Files read, in fold order.
    pub loaded: Vec<PathBuf>,
}

/// What a sync achieved. Never an error: failures are logged and leave the
/// affected entries dirty for the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Some dirty entries could not be written anywhere.
    pub entries_left: bool,
    /// At least one file was rewritten.
    pub written: bool,
}

/// Whether the write target may be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    NoAccess,
    ReadOnly,
    ReadWrite,
}

/// A source and sink for entries.
pub trait ConfigBackend {
    /// Fold every layer into `store`.
    fn parse(&mut self, store: &mut EntryStore) -> LoadReport;

    /// Write the dirty entries of `store` back. `merge` re-reads each target
    /// and overlays the dirty entries; without it the in-memory state is
    /// written wholesale.
    fn sync(&mut self, store: &mut EntryStore, locale: &LocaleContext, merge: bool) -> SyncOutcome;

    fn access_state(&self) -> AccessState;

    /// Where changes go.
    fn write_target(&self) -> Option<PathBuf>;

    /// Directories prepended to `PATH` while running `$(cmd)`.
    fn executable_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Replace the merge stack.
    fn set_extra_config_files(&mut self, files: Vec<PathBuf>);

    /// A backend writing to `path` instead, with no cascade of its own.
    fn retarget(&self, path: &Path) -> Box<dyn ConfigBackend>;
}

/// The INI file backend.
pub struct IniBackend {
    pub(crate) resolver: Rc<dyn CascadeResolver>,
    pub(crate) provider: Rc<dyn LocaleProvider>,
    pub(crate) file_name: String,
    pub(crate) local_path: Option<PathBuf>,
    pub(crate) globals_name: String,
    pub(crate) include_globals: bool,
    pub(crate) read_defaults: bool,
    pub(crate) merge_stack: Vec<PathBuf>,
    pub(crate) honor_kiosk: bool,
    pub(crate) file_mode: Option<u32>,
}

impl IniBackend {
    pub fn new(
        resolver: Rc<dyn CascadeResolver>,
        provider: Rc<dyn LocaleProvider>,
        file_name: &str,
    ) -> Self {
        let local_path = if Path::new(file_name).is_absolute() {
            Some(PathBuf::from(file_name))
        } else {
            resolver.save_path(file_name)
        };
        Self {
            resolver,
            provider,
            file_name: file_name.to_string(),
            local_path,
            globals_name: DEFAULT_GLOBALS_NAME.to_string(),
            include_globals: false,
            read_defaults: true,
            merge_stack: Vec::new(),
            honor_kiosk: true,
            file_mode: None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn globals_path(&self) -> Option<PathBuf> {
        self.resolver.save_path(&self.globals_name)
    }

    fn fold_all(&self, store: &mut EntryStore, locale: &LocaleContext) -> FoldOutcome {
        let ctx = FoldContext {
            locale,
            honor_kiosk: self.honor_kiosk,
        };
        let target = self.write_target();
        let mut outcome = FoldOutcome::default();

        if self.include_globals {
            let globals_target = self.globals_path();
            let files = cascade::plan(
                self.resolver.as_ref(),
                &self.globals_name,
                true,
                globals_target.as_deref(),
            );
            let globals = cascade::fold(store, &files, &ctx);
            outcome.locale_changed |= globals.locale_changed;
            outcome.loaded.extend(globals.loaded);
        }

        let files = if self.read_defaults {
            cascade::plan(
                self.resolver.as_ref(),
                &self.file_name,
                false,
                target.as_deref(),
            )
        } else {
            self.local_path
                .iter()
                .map(|path| CascadeFile {
                    path: path.clone(),
                    global: false,
                    most_specific: target.as_deref() == Some(path.as_path()),
                })
                .collect()
        };
        let local = cascade::fold(store, &files, &ctx);
        outcome.locale_changed |= local.locale_changed;
        outcome.loaded.extend(local.loaded);
        let mut file_immutable = local.file_immutable;

        if !file_immutable && !self.merge_stack.is_empty() {
            let files: Vec<CascadeFile> = self
                .merge_stack
                .iter()
                .map(|path| CascadeFile {
                    path: path.clone(),
                    global: false,
                    most_specific: target.as_deref() == Some(path.as_path()),
                })
                .collect();
            let stack = cascade::fold(store, &files, &ctx);
            outcome.locale_changed |= stack.locale_changed;
            outcome.loaded.extend(stack.loaded);
            file_immutable |= stack.file_immutable;
        }

        if self.resolver.is_restricted(&self.file_name) {
            tracing::debug!(file = %self.file_name, "configuration restricted by resolver");
            file_immutable = true;
        }
        outcome.file_immutable = file_immutable;
        outcome
    }

    fn write_pass(
        &self,
        path: &Path,
        store: &EntryStore,
        opts: &WriteOptions<'_>,
    ) -> Option<persist::WriteReport> {
        match persist::write_config_file(path, store, opts) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!("config changes not saved: {err}");
                None
            }
        }
    }
}

impl ConfigBackend for IniBackend {
    fn parse(&mut self, store: &mut EntryStore) -> LoadReport {
        let mut locale = self.provider.locale(store);
        let mut outcome = self.fold_all(store, &locale);

        if outcome.locale_changed {
            let configured = self.provider.locale(store);
            if configured != locale {
                tracing::debug!(
                    from = %String::from_utf8_lossy(locale.tag()),
                    to = %String::from_utf8_lossy(configured.tag()),
                    "locale changed by configuration, folding again"
                );
                locale = configured;
                store.clear();
                outcome = self.fold_all(store, &locale);
            }
        }

        let file_immutable = outcome.file_immutable;
        store.set_file_immutable(file_immutable);
        tracing::debug!(
            file = %self.file_name,
            layers = outcome.loaded.len(),
            file_immutable,
            "configuration loaded"
        );
        LoadReport {
            locale,
            file_immutable,
            loaded: outcome.loaded,
        }
    }

    fn sync(&mut self, store: &mut EntryStore, locale: &LocaleContext, merge: bool) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        if !store.is_dirty() {
            return outcome;
        }

        let mut entries_left = true;
        match self.write_target() {
            Some(target) => {
                let opts = WriteOptions {
                    global: false,
                    merge,
                    locale,
                    honor_kiosk: self.honor_kiosk,
                    file_mode: self.file_mode,
                };
                if let Some(report) = self.write_pass(&target, store, &opts) {
                    entries_left = report.entries_left;
                    if report.written {
                        outcome.written = true;
                        store.clear_dirty(Some(false));
                    }
                }
            }
            None => tracing::warn!(file = %self.file_name, "no save location, changes kept in memory"),
        }

        if entries_left && self.include_globals {
            match self.globals_path() {
                Some(globals) => {
                    let opts = WriteOptions {
                        global: true,
                        merge: true,
                        locale,
                        honor_kiosk: self.honor_kiosk,
                        file_mode: None,
                    };
                    if let Some(report) = self.write_pass(&globals, store, &opts)
                        && report.written
                    {
                        outcome.written = true;
                        store.clear_dirty(Some(true));
                    }
                }
                None => tracing::warn!("no save location for shared globals"),
            }
        }

        outcome.entries_left = store.has_dirty_entries();
        if !outcome.entries_left {
            store.set_dirty(false);
        }
        outcome
    }

    fn access_state(&self) -> AccessState {
        let Some(target) = self.write_target() else {
            return AccessState::NoAccess;
        };
        match fs::metadata(&target) {
            Ok(meta) if meta.permissions().readonly() => AccessState::ReadOnly,
            Ok(_) => AccessState::ReadWrite,
            Err(_) => {
                let parent = target.parent().filter(|p| !p.as_os_str().is_empty());
                match parent.map(fs::metadata) {
                    Some(Ok(meta)) if meta.permissions().readonly() => AccessState::ReadOnly,
                    _ => AccessState::ReadWrite,
                }
            }
        }
    }

    fn write_target(&self) -> Option<PathBuf> {
        self.merge_stack
            .last()
            .cloned()
            .or_else(|| self.local_path.clone())
    }

    fn executable_dirs(&self) -> Vec<PathBuf> {
        self.resolver.executable_dirs()
    }

    fn set_extra_config_files(&mut self, files: Vec<PathBuf>) {
        self.merge_stack = files;
    }

    fn retarget(&self, path: &Path) -> Box<dyn ConfigBackend> {
        let mut backend = IniBackend::new(
            Rc::clone(&self.resolver),
            Rc::clone(&self.provider),
            &path.to_string_lossy(),
        );
        backend.local_path = Some(path.to_path_buf());
        backend.globals_name = self.globals_name.clone();
        backend.include_globals = self.include_globals;
        backend.read_defaults = false;
        backend.honor_kiosk = self.honor_kiosk;
        backend.file_mode = self.file_mode;
        Box::new(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, EntryKey};
    use crate::fixtures::test::{DirResolver, read_file, write_file};
    use crate::locale::{EnvLocale, FixedLocale};
    use tempfile::TempDir;

    fn backend(dirs: &[&Path], name: &str) -> IniBackend {
        IniBackend::new(
            Rc::new(DirResolver::new(dirs)),
            Rc::new(FixedLocale::default()),
            name,
        )
    }

    fn value(store: &EntryStore, group: &str, key: &str) -> Option<String> {
        store
            .lookup(&EntryKey::new(group, key))
            .map(|e| e.value_str().into_owned())
    }

    fn write(store: &mut EntryStore, group: &str, key: &str, value: &str, global: bool) {
        store.set_dirty(true);
        store.put(
            &EntryKey::new(group, key),
            Entry {
                dirty: true,
                global,
                ..Entry::new(value)
            },
            true,
        );
    }

    #[test]
    fn globals_fold_below_local_file() {
        let sys = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_file(sys.path(), "kdeglobals", "[G]\nk=global\nshared=1\n");
        write_file(user.path(), "apprc", "[G]\nk=local\n");
        let mut backend = backend(&[user.path(), sys.path()], "apprc");
        backend.include_globals = true;

        let mut store = EntryStore::new();
        let report = backend.parse(&mut store);
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(value(&store, "G", "k").as_deref(), Some("local"));
        assert!(store.lookup(&EntryKey::new("G", "shared")).unwrap().global);
    }

    #[test]
    fn merge_stack_overrides_and_receives_writes() {
        let user = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        write_file(user.path(), "apprc", "[G]\nk=local\n");
        let overlay = write_file(extra.path(), "overlayrc", "[G]\nk=overlay\n");
        let mut backend = backend(&[user.path()], "apprc");
        backend.set_extra_config_files(vec![overlay.clone()]);
        assert_eq!(backend.write_target(), Some(overlay.clone()));

        let mut store = EntryStore::new();
        backend.parse(&mut store);
        assert_eq!(value(&store, "G", "k").as_deref(), Some("overlay"));

        write(&mut store, "G", "n", "1", false);
        let outcome = backend.sync(&mut store, &LocaleContext::default(), true);
        assert!(outcome.written);
        assert!(read_file(&overlay).contains("n=1"));
        assert_eq!(read_file(&user.path().join("apprc")), "[G]\nk=local\n");
    }

    #[test]
    fn local_lock_stops_merge_stack() {
        let user = TempDir::new().unwrap();
        write_file(user.path(), "apprc", "[$i]\n[G]\nk=admin\n");
        let overlay = write_file(user.path(), "overlayrc", "[G]\nk=overlay\n");
        let mut backend = backend(&[user.path()], "apprc");
        backend.set_extra_config_files(vec![overlay]);

        let mut store = EntryStore::new();
        let report = backend.parse(&mut store);
        assert!(report.file_immutable);
        assert!(store.is_file_immutable());
        assert_eq!(value(&store, "G", "k").as_deref(), Some("admin"));
    }

    #[test]
    fn restricted_name_locks_configuration() {
        let user = TempDir::new().unwrap();
        let mut resolver = DirResolver::new(&[user.path()]);
        resolver.restricted.push("apprc".into());
        let mut backend = IniBackend::new(
            Rc::new(resolver),
            Rc::new(FixedLocale::default()),
            "apprc",
        );
        let mut store = EntryStore::new();
        assert!(backend.parse(&mut store).file_immutable);
    }

    #[test]
    fn language_setting_triggers_second_fold() {
        let sys = TempDir::new().unwrap();
        write_file(sys.path(), "kdeglobals", "[Locale]\nLanguage=de\n");
        write_file(sys.path(), "apprc", "[G]\nName=Hello\nName[de]=Hallo\n");
        let user = TempDir::new().unwrap();
        let mut backend = IniBackend::new(
            Rc::new(DirResolver::new(&[user.path(), sys.path()])),
            Rc::new(EnvLocale),
            "apprc",
        );
        backend.include_globals = true;

        let mut store = EntryStore::new();
        let report = backend.parse(&mut store);
        assert_eq!(report.locale, LocaleContext::new("de"));
        let localized = EntryKey::new("G", "Name").localized(true);
        assert_eq!(store.lookup(&localized).unwrap().value, b"Hallo");
    }

    #[test]
    fn global_entries_go_to_globals_file() {
        let user = TempDir::new().unwrap();
        let mut backend = backend(&[user.path()], "apprc");
        backend.include_globals = true;
        let mut store = EntryStore::new();
        backend.parse(&mut store);

        write(&mut store, "G", "mine", "1", false);
        write(&mut store, "G", "shared", "2", true);
        let outcome = backend.sync(&mut store, &LocaleContext::default(), true);
        assert!(outcome.written);
        assert!(!outcome.entries_left);
        assert!(!store.is_dirty());
        assert_eq!(read_file(&user.path().join("apprc")), "[G]\nmine=1\n");
        assert_eq!(read_file(&user.path().join("kdeglobals")), "[G]\nshared=2\n");
    }

    #[test]
    fn global_entries_stay_dirty_without_globals() {
        let user = TempDir::new().unwrap();
        let mut backend = backend(&[user.path()], "apprc");
        let mut store = EntryStore::new();
        backend.parse(&mut store);

        write(&mut store, "G", "shared", "2", true);
        let outcome = backend.sync(&mut store, &LocaleContext::default(), true);
        assert!(outcome.entries_left);
        assert!(store.is_dirty());
    }

    #[test]
    fn clean_store_writes_nothing() {
        let user = TempDir::new().unwrap();
        let mut backend = backend(&[user.path()], "apprc");
        let mut store = EntryStore::new();
        backend.parse(&mut store);
        let outcome = backend.sync(&mut store, &LocaleContext::default(), true);
        assert_eq!(outcome, SyncOutcome::default());
        assert!(!user.path().join("apprc").exists());
    }

    #[test]
    fn merging_sync_keeps_other_locales() {
        let user = TempDir::new().unwrap();
        let path = write_file(user.path(), "apprc", "[G]\nName=Hi\nName[fr]=Salut\n");
        let mut backend = IniBackend::new(
            Rc::new(DirResolver::new(&[user.path()])),
            Rc::new(FixedLocale::new("de")),
            "apprc",
        );
        let mut store = EntryStore::new();
        let report = backend.parse(&mut store);

        write(&mut store, "G", "Other", "1", false);
        backend.sync(&mut store, &report.locale, true);
        let text = read_file(&path);
        assert!(text.contains("Name=Hi\n"));
        assert!(text.contains("Name[fr]=Salut\n"));
        assert!(text.contains("Other=1\n"));
    }

    #[test]
    fn retarget_writes_elsewhere() {
        let user = TempDir::new().unwrap();
        let backend = backend(&[user.path()], "apprc");
        let copy = user.path().join("copyrc");
        let target = backend.retarget(&copy);
        assert_eq!(target.write_target(), Some(copy));
    }

    #[test]
    fn access_state_follows_write_target() {
        let none = backend(&[], "apprc");
        assert_eq!(none.access_state(), AccessState::NoAccess);

        let user = TempDir::new().unwrap();
        let writable = backend(&[user.path()], "apprc");
        assert_eq!(writable.access_state(), AccessState::ReadWrite);
    }
}
