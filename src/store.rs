//! Two-level entry store: an ordered map of groups, each holding its marker
//! flags and an ordered map of key variants.
//!
//! Within a group the variants of one key sit next to each other (localized
//! live, localized default, plain live, plain default), so "find the default
//! for this live entry" is a point lookup instead of an iterator walk.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::entry::{Entry, EntryKey, VERSION_GROUP};

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeySlot {
    key: Vec<u8>,
    localized: bool,
    default: bool,
}

impl KeySlot {
    fn of(key: &EntryKey) -> Option<Self> {
        key.key.as_ref().map(|k| Self {
            key: k.clone(),
            localized: key.localized,
            default: key.default,
        })
    }

    fn to_key(&self, group: &[u8]) -> EntryKey {
        EntryKey {
            group: group.to_vec(),
            key: Some(self.key.clone()),
            localized: self.localized,
            default: self.default,
        }
    }
}

impl Ord for KeySlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.localized.cmp(&self.localized))
            .then_with(|| self.default.cmp(&other.default))
    }
}

impl PartialOrd for KeySlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One group: its marker entry (group-level flags) and its key variants.
#[derive(Debug, Clone, Default)]
pub struct GroupRecord {
    marker: Entry,
    entries: BTreeMap<KeySlot, Entry>,
}

impl GroupRecord {
    pub fn marker(&self) -> &Entry {
        &self.marker
    }

    pub fn is_immutable(&self) -> bool {
        self.marker.immutable
    }

    /// True when at least one live, non-deleted key exists.
    pub fn has_live_entries(&self) -> bool {
        self.entries
            .iter()
            .any(|(slot, entry)| !slot.default && !entry.deleted)
    }
}

/// All entries known to one configuration object.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    groups: BTreeMap<Vec<u8>, GroupRecord>,
    file_immutable: bool,
    force_global: bool,
    dirty: bool,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`, honouring kiosk flags.
    ///
    /// Non-default writes are dropped when the whole store is file-immutable,
    /// when `check_group` is set and the group is immutable, or when the slot
    /// already holds an immutable entry. A default write also stores the same
    /// data as the live variant. Returns whether the write landed.
    pub fn put(&mut self, key: &EntryKey, data: Entry, check_group: bool) -> bool {
        if self.file_immutable && !key.default {
            return false;
        }
        let record = self.groups.entry(key.group.clone()).or_default();
        if check_group && record.marker.immutable && !key.default {
            return false;
        }

        let Some(slot) = KeySlot::of(key) else {
            let immutable = record.marker.immutable;
            record.marker = data;
            record.marker.immutable |= immutable;
            return true;
        };

        let force_global = self.force_global;
        let entry = record.entries.entry(slot.clone()).or_default();
        let immutable = entry.immutable;
        if immutable && !key.default {
            return false;
        }
        *entry = data.clone();
        entry.immutable |= immutable;
        entry.global |= force_global;

        if slot.default {
            let live = KeySlot {
                default: false,
                ..slot
            };
            let live_entry = record.entries.entry(live).or_default();
            let live_immutable = live_entry.immutable;
            *live_entry = data;
            live_entry.immutable |= live_immutable;
        }
        true
    }

    /// Store `data` under `key` verbatim, bypassing every kiosk check.
    pub fn insert(&mut self, key: &EntryKey, data: Entry) {
        let record = self.groups.entry(key.group.clone()).or_default();
        match KeySlot::of(key) {
            Some(slot) => {
                record.entries.insert(slot, data);
            }
            None => record.marker = data,
        }
    }

    /// The raw entry under `key`, tombstones included.
    pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
        let record = self.groups.get(&key.group)?;
        match KeySlot::of(key) {
            Some(slot) => record.entries.get(&slot),
            None => Some(&record.marker),
        }
    }

    pub fn get_mut(&mut self, key: &EntryKey) -> Option<&mut Entry> {
        let record = self.groups.get_mut(&key.group)?;
        match KeySlot::of(key) {
            Some(slot) => record.entries.get_mut(&slot),
            None => Some(&mut record.marker),
        }
    }

    /// The entry under `key` unless it is missing or a tombstone.
    pub fn lookup(&self, key: &EntryKey) -> Option<&Entry> {
        self.get(key).filter(|entry| !entry.deleted)
    }

    pub fn remove(&mut self, key: &EntryKey) -> Option<Entry> {
        let record = self.groups.get_mut(&key.group)?;
        record.entries.remove(&KeySlot::of(key)?)
    }

    pub fn group(&self, group: &[u8]) -> Option<&GroupRecord> {
        self.groups.get(group)
    }

    /// The group marker entry, or an empty one when the group is unknown.
    pub fn group_marker(&self, group: &[u8]) -> Entry {
        self.groups
            .get(group)
            .map(|record| record.marker.clone())
            .unwrap_or_default()
    }

    pub fn group_is_immutable(&self, group: &[u8]) -> bool {
        self.groups.get(group).is_some_and(GroupRecord::is_immutable)
    }

    /// Every entry in key order, group markers included.
    pub fn iter(&self) -> impl Iterator<Item = (EntryKey, &Entry)> {
        self.groups.iter().flat_map(|(group, record)| {
            std::iter::once((EntryKey::group_marker(group.clone()), &record.marker)).chain(
                record
                    .entries
                    .iter()
                    .map(move |(slot, entry)| (slot.to_key(group), entry)),
            )
        })
    }

    /// Key entries of one group in key order, marker excluded.
    pub fn iter_group<'a>(&'a self, group: &'a [u8]) -> impl Iterator<Item = (EntryKey, &'a Entry)> {
        self.groups.get(group).into_iter().flat_map(move |record| {
            record
                .entries
                .iter()
                .map(move |(slot, entry)| (slot.to_key(group), entry))
        })
    }

    pub fn group_names(&self) -> impl Iterator<Item = &[u8]> {
        self.groups.keys().map(Vec::as_slice)
    }

    /// Groups holding at least one live, non-deleted key, in order.
    pub fn group_list(&self) -> Vec<Vec<u8>> {
        self.groups
            .iter()
            .filter(|(name, record)| name.as_slice() != VERSION_GROUP && record.has_live_entries())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn has_group(&self, group: &[u8]) -> bool {
        self.groups
            .get(group)
            .is_some_and(GroupRecord::has_live_entries)
    }

    /// Live, non-deleted values of one group by key name. A localized
    /// variant wins over the plain one.
    pub fn entry_map(&self, group: &[u8]) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut map = BTreeMap::new();
        let Some(record) = self.groups.get(group) else {
            return map;
        };
        for (slot, entry) in &record.entries {
            if slot.default || entry.deleted {
                continue;
            }
            if slot.localized || !map.contains_key(&slot.key) {
                map.insert(slot.key.clone(), entry.value.clone());
            }
        }
        map
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.file_immutable = false;
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(|record| record.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|record| record.entries.is_empty())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn is_file_immutable(&self) -> bool {
        self.file_immutable
    }

    pub fn set_file_immutable(&mut self, immutable: bool) {
        self.file_immutable = immutable;
    }

    pub fn set_force_global(&mut self, force: bool) {
        self.force_global = force;
    }

    pub fn has_dirty_entries(&self) -> bool {
        self.groups
            .values()
            .any(|record| record.entries.values().any(|entry| entry.dirty))
    }

    /// Drop default variants, mark every live entry for writing and lift
    /// the file lock, so the next sync writes the whole store to a fresh
    /// target that has no cascade below it.
    pub fn mark_all_dirty(&mut self) {
        for record in self.groups.values_mut() {
            record.entries.retain(|slot, _| !slot.default);
            for entry in record.entries.values_mut() {
                entry.dirty = true;
            }
        }
        self.file_immutable = false;
        self.dirty = true;
    }

    /// Clear entry dirty flags; `global` limits it to entries of that scope.
    /// The store's dirty bit drops once no dirty entry remains.
    pub fn clear_dirty(&mut self, global: Option<bool>) {
        for record in self.groups.values_mut() {
            for entry in record.entries.values_mut() {
                if global.is_none_or(|g| entry.global == g) {
                    entry.dirty = false;
                }
            }
        }
        if !self.has_dirty_entries() {
            self.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(value: &str) -> Entry {
        Entry {
            immutable: true,
            ..Entry::new(value)
        }
    }

    #[test]
    fn default_write_also_stores_live_copy() {
        let mut store = EntryStore::new();
        let key = EntryKey::new("General", "Name").default_layer(true);
        assert!(store.put(&key, Entry::new("v"), false));

        let live = EntryKey::new("General", "Name");
        assert_eq!(store.lookup(&live).unwrap().value, b"v");
        assert_eq!(store.lookup(&key).unwrap().value, b"v");
    }

    #[test]
    fn immutable_entry_drops_live_writes() {
        let mut store = EntryStore::new();
        let key = EntryKey::new("General", "Name");
        store.put(&key.clone().default_layer(true), locked("Locked"), false);
        assert!(!store.put(&key, Entry::new("X"), true));
        assert_eq!(store.lookup(&key).unwrap().value, b"Locked");
    }

    #[test]
    fn immutability_is_sticky_across_default_writes() {
        let mut store = EntryStore::new();
        let default = EntryKey::new("G", "K").default_layer(true);
        store.put(&default, locked("first"), false);
        store.put(&default, Entry::new("second"), false);

        let live = EntryKey::new("G", "K");
        let entry = store.lookup(&live).unwrap();
        assert_eq!(entry.value, b"second");
        assert!(entry.immutable);
        assert!(store.lookup(&default).unwrap().immutable);
    }

    #[test]
    fn immutable_group_drops_checked_writes() {
        let mut store = EntryStore::new();
        store.put(&EntryKey::group_marker("G"), locked(""), false);
        let key = EntryKey::new("G", "K");
        assert!(!store.put(&key, Entry::new("v"), true));
        assert!(store.lookup(&key).is_none());
        // unchecked writes are the parser's business
        assert!(store.put(&key, Entry::new("v"), false));
    }

    #[test]
    fn file_immutable_drops_everything_but_defaults() {
        let mut store = EntryStore::new();
        store.set_file_immutable(true);
        assert!(!store.put(&EntryKey::new("G", "K"), Entry::new("v"), true));
        assert!(store.put(
            &EntryKey::new("G", "K").default_layer(true),
            Entry::new("d"),
            true
        ));
    }

    #[test]
    fn force_global_marks_entries() {
        let mut store = EntryStore::new();
        store.set_force_global(true);
        let key = EntryKey::new("G", "K");
        store.put(&key, Entry::new("v"), true);
        assert!(store.lookup(&key).unwrap().global);
    }

    #[test]
    fn lookup_hides_tombstones() {
        let mut store = EntryStore::new();
        let key = EntryKey::new("G", "K");
        store.put(&key, Entry::tombstone(), true);
        assert!(store.lookup(&key).is_none());
        assert!(store.get(&key).unwrap().deleted);
    }

    #[test]
    fn iteration_follows_key_order() {
        let mut store = EntryStore::new();
        store.insert(&EntryKey::new("B", "x"), Entry::new("1"));
        store.insert(&EntryKey::new("A", "y").default_layer(true), Entry::new("2"));
        store.insert(&EntryKey::new("A", "y").localized(true), Entry::new("3"));
        store.insert(&EntryKey::new("A", "y"), Entry::new("4"));

        let keys: Vec<EntryKey> = store.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys[0].is_group_marker());
        assert_eq!(keys[0].group, b"A");
    }

    #[test]
    fn group_list_skips_empty_and_version_groups() {
        let mut store = EntryStore::new();
        store.insert(&EntryKey::new("Live", "k"), Entry::new("v"));
        store.insert(&EntryKey::new("Gone", "k"), Entry::tombstone());
        store.insert(&EntryKey::new("DefaultsOnly", "k").default_layer(true), Entry::new("v"));
        store.insert(&EntryKey::new("$Version", "update_info"), Entry::new("x"));
        store.insert(&EntryKey::group_marker("Empty"), Entry::default());

        assert_eq!(store.group_list(), vec![b"Live".to_vec()]);
        assert!(store.has_group(b"Live"));
        assert!(!store.has_group(b"Gone"));
        assert!(store.has_group(b"$Version"));
    }

    #[test]
    fn entry_map_prefers_localized() {
        let mut store = EntryStore::new();
        store.insert(&EntryKey::new("G", "Name"), Entry::new("plain"));
        store.insert(&EntryKey::new("G", "Name").localized(true), Entry::new("local"));
        store.insert(&EntryKey::new("G", "Other"), Entry::new("o"));
        store.insert(&EntryKey::new("G", "Dead"), Entry::tombstone());

        let map = store.entry_map(b"G");
        assert_eq!(map.len(), 2);
        assert_eq!(map[b"Name".as_slice()], b"local");
        assert_eq!(map[b"Other".as_slice()], b"o");
    }

    #[test]
    fn clear_dirty_by_scope() {
        let mut store = EntryStore::new();
        store.insert(
            &EntryKey::new("G", "local"),
            Entry {
                dirty: true,
                ..Entry::new("a")
            },
        );
        store.insert(
            &EntryKey::new("G", "shared"),
            Entry {
                dirty: true,
                global: true,
                ..Entry::new("b")
            },
        );
        store.set_dirty(true);

        store.clear_dirty(Some(false));
        assert!(!store.get(&EntryKey::new("G", "local")).unwrap().dirty);
        assert!(store.get(&EntryKey::new("G", "shared")).unwrap().dirty);
        assert!(store.is_dirty());

        store.clear_dirty(None);
        assert!(!store.is_dirty());
    }

    #[test]
    fn mark_all_dirty_drops_defaults_and_unlocks() {
        let mut store = EntryStore::new();
        let key = EntryKey::new("G", "k");
        store.put(&key.clone().default_layer(true), Entry::new("v"), false);
        store.set_file_immutable(true);

        store.mark_all_dirty();
        assert!(store.is_dirty());
        assert!(!store.is_file_immutable());
        assert!(store.get(&key).unwrap().dirty);
        assert!(store.get(&key.default_layer(true)).is_none());
    }
}
