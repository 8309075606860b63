//! Kiosk restrictions: `[$i]` markers lock a whole file, a group, or a key.
//!
//! Restrictions only ever escalate. [`KioskTracker`] follows the markers
//! while one file is parsed; the query functions answer "may this be
//! written?" against a folded [`EntryStore`].

use crate::entry::EntryKey;
use crate::store::EntryStore;

/// How locked the current parse position is.
///
/// Strictly ordered: a file-level lock implies a group-level lock, which
/// implies every entry created under it is immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Restriction {
    #[default]
    Mutable,
    GroupImmutable,
    FileImmutable,
}

impl Restriction {
    /// Move to `other` if it is stricter. Never relaxes.
    pub fn escalate(self, other: Restriction) -> Restriction {
        self.max(other)
    }

    pub fn locks_entries(self) -> bool {
        self != Restriction::Mutable
    }
}

/// Per-file restriction state driven by `[$i]` markers.
#[derive(Debug, Clone)]
pub struct KioskTracker {
    honor_markers: bool,
    file: Restriction,
    group: Restriction,
}

impl KioskTracker {
    /// With `honor_markers` off every `$i` marker is ignored.
    pub fn new(honor_markers: bool) -> Self {
        Self {
            honor_markers,
            file: Restriction::Mutable,
            group: Restriction::Mutable,
        }
    }

    /// A `[$i]` line on its own.
    pub fn mark_file(&mut self) {
        if self.honor_markers {
            self.file = Restriction::FileImmutable;
            self.group = self.group.escalate(self.file);
        }
    }

    /// A new group header; `marked` is a trailing `[$i]`.
    pub fn enter_group(&mut self, marked: bool) {
        let own = if marked && self.honor_markers {
            Restriction::GroupImmutable
        } else {
            Restriction::Mutable
        };
        self.group = self.file.escalate(own);
    }

    pub fn file_immutable(&self) -> bool {
        self.file == Restriction::FileImmutable
    }

    pub fn group_immutable(&self) -> bool {
        self.group.locks_entries()
    }

    /// Immutability of an entry parsed now; `marked` is a `$i` option.
    pub fn entry_immutable(&self, marked: bool) -> bool {
        self.group_immutable() || (marked && self.honor_markers)
    }
}

/// The group is locked, by its own marker or by a locked file.
pub fn group_is_immutable(store: &EntryStore, group: &[u8]) -> bool {
    store.is_file_immutable() || store.group_is_immutable(group)
}

/// The key is locked in either its plain or localized variant, or through
/// its group.
pub fn entry_is_immutable(store: &EntryStore, group: &[u8], key: &[u8]) -> bool {
    if group_is_immutable(store, group) {
        return true;
    }
    let plain = EntryKey::new(group, key);
    let localized = plain.clone().localized(true);
    [plain, localized]
        .iter()
        .any(|k| store.lookup(k).is_some_and(|entry| entry.immutable))
}
