//! The unit of storage: a composite [`EntryKey`] and its [`Entry`] record.
//!
//! Keys and values are raw bytes. Files are UTF-8 in practice, but the codec
//! never rejects a line for its encoding, so nothing here assumes it.

use std::borrow::Cow;
use std::cmp::Ordering;

/// Internal name of the unnamed group holding keys that precede any header.
pub const DEFAULT_GROUP: &[u8] = b"<default>";

/// Internal bookkeeping group, never reported by group listings.
pub const VERSION_GROUP: &[u8] = b"$Version";

/// Composite key of one stored variant.
///
/// `key = None` is a group marker: it records that a group exists, and
/// carries the group-level immutability flag.
///
/// Ordering: group, then key (marker first), then localized before plain,
/// then live before default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub group: Vec<u8>,
    pub key: Option<Vec<u8>>,
    pub localized: bool,
    pub default: bool,
}

impl EntryKey {
    /// A live, non-localized key.
    pub fn new(group: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            group: group.into(),
            key: Some(key.into()),
            localized: false,
            default: false,
        }
    }

    pub fn group_marker(group: impl Into<Vec<u8>>) -> Self {
        Self {
            group: group.into(),
            key: None,
            localized: false,
            default: false,
        }
    }

    pub fn localized(mut self, localized: bool) -> Self {
        self.localized = localized;
        self
    }

    pub fn default_layer(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    pub fn is_group_marker(&self) -> bool {
        self.key.is_none()
    }
}

impl Ord for EntryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then_with(|| self.key.cmp(&other.key))
            .then_with(|| other.localized.cmp(&self.localized))
            .then_with(|| self.default.cmp(&other.default))
    }
}

impl PartialOrd for EntryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A stored value plus its flags.
///
/// Equality ignores `dirty`: two entries that differ only in whether they
/// still need writing hold the same configuration.
#[derive(Debug, Clone, Default, Eq)]
pub struct Entry {
    pub value: Vec<u8>,
    pub dirty: bool,
    pub deleted: bool,
    pub immutable: bool,
    pub global: bool,
    pub expand: bool,
    pub localized: bool,
}

impl Entry {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// A deletion tombstone.
    pub fn tombstone() -> Self {
        Self {
            deleted: true,
            ..Self::default()
        }
    }

    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.deleted == other.deleted
            && self.immutable == other.immutable
            && self.global == other.global
            && self.expand == other.expand
            && self.localized == other.localized
    }
}
