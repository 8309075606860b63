//! Typed view of one group.
//!
//! Reads resolve the localized variant for the active locale first, then the
//! plain key, then the caller's default. Writes to locked keys or groups are
//! silently dropped, so code written for an unlocked setup runs unchanged
//! under kiosk restrictions.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Config;
use crate::entry::{Entry, EntryKey};
use crate::error::ConfigError;
use crate::expand::{self, ExpandOptions};
use crate::flatten;
use crate::kiosk;
use crate::value::EntryValue;

/// How a write is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFlags {
    /// Written back by the next sync. Off keeps the change in memory only.
    pub persistent: bool,
    /// Belongs in the shared globals file.
    pub global: bool,
    /// Stored for the active locale only.
    pub localized: bool,
}

impl Default for WriteFlags {
    fn default() -> Self {
        Self {
            persistent: true,
            global: false,
            localized: false,
        }
    }
}

impl WriteFlags {
    /// In memory only.
    pub fn transient() -> Self {
        Self {
            persistent: false,
            ..Self::default()
        }
    }

    pub fn with_global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn with_localized(mut self) -> Self {
        self.localized = true;
        self
    }
}

/// A group of a [`Config`], borrowed for reading and writing.
pub struct ConfigGroup<'a> {
    config: &'a mut Config,
    name: Vec<u8>,
}

impl<'a> ConfigGroup<'a> {
    pub(crate) fn new(config: &'a mut Config, name: &str) -> Self {
        Self {
            config,
            name: name.as_bytes().to_vec(),
        }
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    fn key(&self, key: &str) -> EntryKey {
        EntryKey::new(self.name.clone(), key)
    }

    /// The effective entry for `key`: the live localized variant first,
    /// then the plain key. A deleted localized variant falls through.
    fn resolve(&self, key: &str) -> Option<&Entry> {
        let store = &self.config.store;
        let plain = self.key(key);
        if !self.config.locale.is_empty()
            && let Some(entry) = store.lookup(&plain.clone().localized(true))
        {
            return Some(entry);
        }
        store.lookup(&plain)
    }

    fn expand_value(&self, raw: &str) -> String {
        let dirs = self.config.executable_dirs();
        let opts = ExpandOptions {
            shell: self.config.shell_expansion,
            executable_dirs: &dirs,
        };
        expand::expand(raw, &opts, expand::process_env)
    }

    fn read_raw(&self, key: &str, force_expand: bool) -> Option<String> {
        let entry = self.resolve(key)?;
        let raw = entry.value_str();
        let expand = force_expand || entry.expand || self.config.always_expand;
        if expand && raw.contains('$') {
            Some(self.expand_value(&raw))
        } else {
            Some(raw.into_owned())
        }
    }

    /// The stored string, expanded when the entry asks for it.
    pub fn read_string(&self, key: &str) -> Option<String> {
        self.read_raw(key, false)
    }

    /// Read and decode `key`, falling back to `default` when the key is
    /// absent or does not decode.
    pub fn read_entry<T: EntryValue>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.read_raw(key, false) else {
            return default;
        };
        match T::decode(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(group = %self.name(), key, "unreadable value, using default: {err}");
                default
            }
        }
    }

    /// Read a path. The value is always dollar-expanded.
    pub fn read_path_entry(&self, key: &str, default: &str) -> String {
        self.read_raw(key, true)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    /// Whether a less specific file supplies a value to revert to, checking
    /// the localized variant before the plain one.
    pub fn has_default(&self, key: &str) -> bool {
        let store = &self.config.store;
        let default = self.key(key).default_layer(true);
        if !self.config.locale.is_empty()
            && store.lookup(&default.clone().localized(true)).is_some()
        {
            return true;
        }
        store.lookup(&default).is_some()
    }

    pub fn is_entry_immutable(&self, key: &str) -> bool {
        kiosk::entry_is_immutable(&self.config.store, &self.name, key.as_bytes())
    }

    pub fn is_immutable(&self) -> bool {
        kiosk::group_is_immutable(&self.config.store, &self.name)
    }

    /// Visible keys and their raw values.
    pub fn entry_map(&self) -> BTreeMap<String, String> {
        self.config.entry_map(&self.name())
    }

    pub fn key_list(&self) -> Vec<String> {
        self.entry_map().into_keys().collect()
    }

    fn put(&mut self, key: &str, mut entry: Entry, flags: WriteFlags) -> bool {
        entry.dirty = flags.persistent;
        entry.global = flags.global;
        entry.localized = flags.localized;
        let entry_key = self.key(key).localized(flags.localized);
        let store = &mut self.config.store;
        let landed = store.put(&entry_key, entry, true);
        if !landed {
            tracing::debug!(group = %String::from_utf8_lossy(&self.name), key, "write to locked key ignored");
        } else if flags.persistent {
            store.set_dirty(true);
        }
        landed
    }

    /// Store `value` under `key`. Returns whether the write landed.
    pub fn write_entry<T: EntryValue>(&mut self, key: &str, value: &T, flags: WriteFlags) -> bool {
        self.put(key, Entry::new(value.encode()), flags)
    }

    pub fn write_string(&mut self, key: &str, value: &str, flags: WriteFlags) -> bool {
        self.put(key, Entry::new(value), flags)
    }

    /// Store a path so it reads back the same on expansion: `$` is escaped
    /// and the home directory becomes `$HOME`.
    pub fn write_path_entry(&mut self, key: &str, path: &str, flags: WriteFlags) -> bool {
        let stored = expand::translate_path(path, expand::home_dir().as_deref());
        let entry = Entry {
            expand: true,
            ..Entry::new(stored)
        };
        self.put(key, entry, flags)
    }

    /// Tombstone `key`, hiding any value inherited from less specific files.
    pub fn delete_entry(&mut self, key: &str, flags: WriteFlags) -> bool {
        self.put(key, Entry::tombstone(), flags)
    }

    /// Bring back the value inherited from less specific files, or remove
    /// the key when there is none. The localized variant for the active
    /// locale is reverted first, then the plain key. Locked keys are left
    /// alone.
    pub fn revert_to_default(&mut self, key: &str) -> bool {
        if self.is_entry_immutable(key) {
            return false;
        }
        let plain = self.key(key);
        let mut variants = Vec::with_capacity(2);
        if !self.config.locale.is_empty() {
            let localized = plain.clone().localized(true);
            let store = &self.config.store;
            if store.get(&localized).is_some() || store.get(&localized.clone().default_layer(true)).is_some() {
                variants.push(localized);
            }
        }
        variants.push(plain);

        let store = &mut self.config.store;
        let mut landed = true;
        for variant in variants {
            let mut entry = store
                .get(&variant.clone().default_layer(true))
                .cloned()
                .unwrap_or_else(Entry::tombstone);
            entry.dirty = true;
            entry.localized = variant.localized;
            landed &= store.put(&variant, entry, true);
        }
        if landed {
            store.set_dirty(true);
        }
        landed
    }

    /// Tombstone every visible key of the group.
    pub fn delete_group(&mut self, flags: WriteFlags) {
        let keys: Vec<EntryKey> = self
            .config
            .store
            .iter_group(&self.name)
            .filter(|(key, entry)| !key.default && !entry.deleted)
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            let name = String::from_utf8_lossy(key.key.as_deref().unwrap_or_default()).into_owned();
            let flags = WriteFlags {
                localized: key.localized,
                ..flags
            };
            self.delete_entry(&name, flags);
        }
    }

    /// Write every field of `value` as a dotted key. `None` fields delete
    /// their key.
    pub fn write_serialized<S: Serialize + ?Sized>(&mut self, value: &S, flags: WriteFlags) -> Result<(), ConfigError> {
        let pairs = flatten::flatten(value).map_err(|e| ConfigError::Flatten(e.to_string()))?;
        for (key, value) in pairs {
            match value {
                Some(v) => self.write_string(&key, &v, flags),
                None => self.delete_entry(&key, flags),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{DirResolver, write_file};
    use crate::locale::FixedLocale;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn open(dir: &TempDir, locale: &str) -> Config {
        Config::builder()
            .file_name("apprc")
            .resolver(Rc::new(DirResolver::new(&[dir.path()])))
            .locale(Rc::new(FixedLocale::new(locale)))
            .open()
            .unwrap()
    }

    #[test]
    fn write_flags_builders() {
        assert!(WriteFlags::default().persistent);
        assert!(!WriteFlags::transient().persistent);
        let flags = WriteFlags::default().with_global().with_localized();
        assert!(flags.global && flags.localized && flags.persistent);
    }

    fn open_layers(user: &TempDir, sys: &TempDir, locale: &str) -> Config {
        Config::builder()
            .file_name("apprc")
            .resolver(Rc::new(DirResolver::new(&[user.path(), sys.path()])))
            .locale(Rc::new(FixedLocale::new(locale)))
            .open()
            .unwrap()
    }

    #[test]
    fn deleted_localized_variant_falls_back_to_plain() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "apprc", "[G]\nName=Plain\nName[de][$d]\n");
        let mut config = open(&dir, "de");
        let group = config.group("G");
        assert!(group.has_key("Name"));
        assert_eq!(group.read_string("Name").as_deref(), Some("Plain"));

        let mut fr = open(&dir, "fr");
        assert_eq!(fr.group("G").read_string("Name").as_deref(), Some("Plain"));
    }

    #[test]
    fn localized_default_counts_as_default() {
        let sys = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_file(sys.path(), "apprc", "[G]\nName[de]=Sys\n");

        let mut config = open_layers(&user, &sys, "de");
        let group = config.group("G");
        assert_eq!(group.read_string("Name").as_deref(), Some("Sys"));
        assert!(group.has_default("Name"));

        let mut plain = open_layers(&user, &sys, "");
        assert!(!plain.group("G").has_default("Name"));
    }

    #[test]
    fn revert_restores_localized_default() {
        let sys = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_file(sys.path(), "apprc", "[G]\nName=Plain\nName[de]=SysDe\n");
        write_file(user.path(), "apprc", "[G]\nName[de]=UserDe\n");

        let mut config = open_layers(&user, &sys, "de");
        let mut group = config.group("G");
        assert_eq!(group.read_string("Name").as_deref(), Some("UserDe"));
        assert!(group.revert_to_default("Name"));
        assert_eq!(group.read_string("Name").as_deref(), Some("SysDe"));
    }

    #[test]
    fn revert_without_localized_default_falls_back_to_plain() {
        let sys = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_file(sys.path(), "apprc", "[G]\nName=Plain\n");
        write_file(user.path(), "apprc", "[G]\nName[de]=UserDe\n");

        let mut config = open_layers(&user, &sys, "de");
        let mut group = config.group("G");
        assert!(group.revert_to_default("Name"));
        assert_eq!(group.read_string("Name").as_deref(), Some("Plain"));
    }

    #[test]
    fn global_writes_are_flagged() {
        let dir = TempDir::new().unwrap();
        let mut config = open(&dir, "");
        config.group("G").write_string("k", "v", WriteFlags::default().with_global());
        let entry = config.store.get(&EntryKey::new("G", "k")).unwrap();
        assert!(entry.global && entry.dirty);
    }
}
