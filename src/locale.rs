//! Locale context: which `key[locale]=` lines apply.
//!
//! There is no process-wide locale here. Each configuration object asks its
//! [`LocaleProvider`] for a [`LocaleContext`] during the cascade fold and
//! passes that context into every parse and read.

use crate::entry::EntryKey;
use crate::store::EntryStore;

/// The active locale tag, e.g. `de_DE`. Empty means no localized lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleContext {
    tag: Vec<u8>,
}

impl LocaleContext {
    pub fn new(tag: impl Into<Vec<u8>>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_empty()
    }

    /// Whether a `[locale]` suffix found in a file selects this locale.
    /// `C` is accepted for `en_US`.
    pub fn matches(&self, file_locale: &[u8]) -> bool {
        file_locale == self.tag.as_slice() || (file_locale == b"C" && self.tag == b"en_US")
    }
}

/// Supplies the active locale.
///
/// The store passed in holds whatever has been folded so far, so a provider
/// may honour a `Language` setting from a shared file.
pub trait LocaleProvider {
    fn locale(&self, store: &EntryStore) -> LocaleContext;
}

/// Always the same locale.
#[derive(Debug, Clone, Default)]
pub struct FixedLocale(pub LocaleContext);

impl FixedLocale {
    pub fn new(tag: impl Into<Vec<u8>>) -> Self {
        Self(LocaleContext::new(tag))
    }
}

impl LocaleProvider for FixedLocale {
    fn locale(&self, _store: &EntryStore) -> LocaleContext {
        self.0.clone()
    }
}

/// `[Locale] Language` from the folded files, else the POSIX environment
/// (`LC_ALL`, `LC_MESSAGES`, `LANG`), else `C`.
#[derive(Debug, Clone, Default)]
pub struct EnvLocale;

impl LocaleProvider for EnvLocale {
    fn locale(&self, store: &EntryStore) -> LocaleContext {
        if let Some(tag) = configured_language(store) {
            return LocaleContext::new(tag);
        }
        let tag = tag_from_env(|name| std::env::var(name).ok()).unwrap_or_else(|| b"C".to_vec());
        LocaleContext::new(tag)
    }
}

/// First entry of a colon-separated `[Locale] Language` list.
pub fn configured_language(store: &EntryStore) -> Option<Vec<u8>> {
    let entry = store.lookup(&EntryKey::new("Locale", "Language"))?;
    let first = entry.value.split(|&b| b == b':').next()?;
    let first = first.trim_ascii();
    (!first.is_empty()).then(|| first.to_vec())
}

/// Locale tag from POSIX variables, with `.codeset` and `@modifier` removed.
///
/// Takes a lookup function so tests can pass synthetic variables instead of
/// the process environment.
pub fn tag_from_env<F>(lookup: F) -> Option<Vec<u8>>
where
    F: Fn(&str) -> Option<String>,
{
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.is_empty())
        .map(|value| {
            let end = value.find(['.', '@']).unwrap_or(value.len());
            match &value[..end] {
                "POSIX" => b"C".to_vec(),
                tag => tag.as_bytes().to_vec(),
            }
        })
}
