//! Overlaying in-memory changes onto a freshly re-read target file.

use crate::codec::ParseTarget;
use crate::entry::{Entry, EntryKey};
use crate::store::EntryStore;

/// Parse target for write-back: entries land in `scratch`, group locks are
/// read from the live store.
pub struct ScratchTarget<'a> {
    pub scratch: &'a mut EntryStore,
    pub live: &'a EntryStore,
}

impl ParseTarget for ScratchTarget<'_> {
    fn group_marker(&self, group: &[u8]) -> Entry {
        self.live.group_marker(group)
    }

    fn put_group_marker(&mut self, group: &[u8], marker: Entry) {
        self.scratch.insert(&EntryKey::group_marker(group), marker);
    }

    fn put_entry(&mut self, key: EntryKey, entry: Entry) {
        self.scratch.insert(&key, entry);
    }
}

/// Overlay `live` onto `scratch`, the re-read on-disk file.
///
/// Default variants are always copied so serialization can compact against
/// them. With `only_dirty`, only entries written since the last sync go in;
/// otherwise every live entry does. Entries whose globality differs from the
/// target file are held back, and an immutable on-disk entry is never
/// replaced. Returns whether a dirty entry was held back for another file.
pub fn merge_entries(
    scratch: &mut EntryStore,
    live: &EntryStore,
    global: bool,
    only_dirty: bool,
) -> bool {
    let mut entries_left = false;
    for (key, entry) in live.iter() {
        if key.is_group_marker() {
            continue;
        }
        if key.default {
            scratch.insert(&key, entry.clone());
            continue;
        }
        if only_dirty && !entry.dirty {
            continue;
        }
        if entry.global != global {
            entries_left |= entry.dirty;
            continue;
        }
        if scratch.get(&key).is_some_and(|on_disk| on_disk.immutable) {
            continue;
        }
        scratch.insert(&key, entry.clone());
    }
    entries_left
}
