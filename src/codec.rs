//! INI codec: parse one file into a [`ParseTarget`], serialize a store back.
//!
//! # Grammar
//!
//! ```text
//! # comment
//! [$i]                      whole file immutable
//! [Group]                   group header, `[[` / `]]` for literal brackets
//! [Group][$i]               immutable group
//! key=value
//! key[de_DE]=Wert           localized, kept only when the locale matches
//! key[$ie]=$HOME/x          options: i immutable, e expand, d deleted
//! key[$d]                   tombstone, no `=` needed
//! ```
//!
//! Malformed lines are logged and skipped; a file never fails to parse as a
//! whole. Values are stripped of surrounding spaces, tabs and carriage
//! returns, then unescaped (`\s \t \n \r \\`).

use std::path::Path;

use crate::entry::{DEFAULT_GROUP, Entry, EntryKey};
use crate::kiosk::KioskTracker;
use crate::locale::LocaleContext;
use crate::store::EntryStore;

/// Context for parsing one file.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions<'a> {
    /// The file is a shared globals file; entries get `global = true`.
    pub global: bool,
    /// Entries are stored as defaults (plus their live copy).
    pub default_layer: bool,
    pub locale: &'a LocaleContext,
    /// Honour `$i` markers. Off mirrors a kiosk exception.
    pub honor_kiosk: bool,
    /// Keep lines for other locales, with the locale folded into the key
    /// text, so a rewrite does not lose them.
    pub capture_foreign_locales: bool,
}

/// What a parse found besides entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// The file carried a `[$i]` line.
    pub file_immutable: bool,
    /// The file set `[Locale] Language`, so the active locale may change.
    pub locale_changed: bool,
    /// Lines skipped as malformed.
    pub errors: usize,
}

/// Receiver of parsed entries: the live store during the fold, a scratch
/// map during write-back.
pub trait ParseTarget {
    fn group_marker(&self, group: &[u8]) -> Entry;
    fn put_group_marker(&mut self, group: &[u8], marker: Entry);
    fn put_entry(&mut self, key: EntryKey, entry: Entry);
}

impl ParseTarget for EntryStore {
    fn group_marker(&self, group: &[u8]) -> Entry {
        EntryStore::group_marker(self, group)
    }

    fn put_group_marker(&mut self, group: &[u8], marker: Entry) {
        self.put(&EntryKey::group_marker(group), marker, false);
    }

    fn put_entry(&mut self, key: EntryKey, entry: Entry) {
        self.put(&key, entry, false);
    }
}

/// Parse `data` line by line into `target`. `source` only labels diagnostics.
pub fn parse<T: ParseTarget + ?Sized>(
    data: &[u8],
    source: &Path,
    opts: &ParseOptions<'_>,
    target: &mut T,
) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut kiosk = KioskTracker::new(opts.honor_kiosk);
    let mut group: Vec<u8> = DEFAULT_GROUP.to_vec();
    let mut group_skip = false;

    for (index, raw) in data.split(|&b| b == b'\n').enumerate() {
        let line_no = index + 1;
        let line = trim_start(raw);
        if line.is_empty() || line[0] == b'#' {
            continue;
        }

        if line[0] == b'[' {
            let Some(close) = group_header_end(line) else {
                report(&mut outcome, source, line_no, "invalid group header");
                continue;
            };
            let body = &line[1..close];
            if body == b"$i" {
                kiosk.mark_file();
                continue;
            }
            group = decode_group(body);
            let rest = &line[close + 1..];
            kiosk.enter_group(rest.starts_with(b"[$") && rest.get(2) == Some(&b'i'));

            let mut marker = target.group_marker(&group);
            group_skip = marker.immutable;
            if group_skip && !opts.default_layer {
                continue;
            }
            marker.immutable |= kiosk.group_immutable();
            target.put_group_marker(&group, marker);
            continue;
        }

        if group_skip && !opts.default_layer {
            continue;
        }

        let parsed = match parse_key_line(line) {
            Ok(parsed) => parsed,
            Err(message) => {
                report(&mut outcome, source, line_no, message);
                continue;
            }
        };

        let mut key = parsed.key;
        let mut localized = false;
        if let Some(locale) = parsed.locale {
            if opts.locale.matches(locale) {
                localized = true;
            } else if opts.capture_foreign_locales {
                key = parsed.key_with_locale;
            } else {
                continue;
            }
        }

        if group == b"Locale" && key == b"Language" {
            outcome.locale_changed = true;
        }

        let entry = Entry {
            value: if parsed.deleted {
                Vec::new()
            } else {
                unescape_value(parsed.value)
            },
            dirty: false,
            deleted: parsed.deleted,
            immutable: kiosk.entry_immutable(parsed.immutable),
            global: opts.global,
            expand: parsed.expand,
            localized,
        };
        let entry_key = EntryKey::new(group.clone(), key)
            .localized(localized)
            .default_layer(opts.default_layer);
        target.put_entry(entry_key, entry);
    }

    outcome.file_immutable = kiosk.file_immutable();
    outcome
}

fn report(outcome: &mut ParseOutcome, source: &Path, line: usize, message: &str) {
    outcome.errors += 1;
    tracing::warn!(path = %source.display(), line, "{message}");
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | 0x0b | 0x0c)
}

fn trim_start(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|&b| !is_space(b)).unwrap_or(line.len());
    &line[start..]
}

/// Index of the `]` closing a group header, skipping doubled `]]`.
fn group_header_end(line: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < line.len() {
        if line[i] == b']' {
            if line.get(i + 1) == Some(&b']') {
                i += 1;
            } else {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

struct KeyLine<'a> {
    key: &'a [u8],
    key_with_locale: &'a [u8],
    locale: Option<&'a [u8]>,
    value: &'a [u8],
    immutable: bool,
    expand: bool,
    deleted: bool,
}

fn parse_key_line(line: &[u8]) -> Result<KeyLine<'_>, &'static str> {
    let mut end_of_key: Option<usize> = None;
    let mut locale: Option<(usize, usize)> = None;
    let (mut immutable, mut expand, mut deleted) = (false, false, false);

    let mut i = 0;
    let value_start = 'scan: loop {
        let Some(&b) = line.get(i) else {
            return Err("invalid entry (missing '=')");
        };
        match b {
            b'=' => {
                end_of_key.get_or_insert(i);
                break 'scan i + 1;
            }
            b'[' => {
                end_of_key.get_or_insert(i);
                let start = i + 1;
                let close = line[start..]
                    .iter()
                    .position(|&c| c == b']' || c == b'=')
                    .map(|p| start + p)
                    .filter(|&p| line[p] == b']')
                    .ok_or("invalid entry (missing ']')")?;
                if line.get(start) == Some(&b'$') {
                    for &option in &line[start + 1..close] {
                        match option {
                            b'i' => immutable = true,
                            b'e' => expand = true,
                            b'd' => {
                                deleted = true;
                                break 'scan line.len();
                            }
                            _ => {}
                        }
                    }
                } else if locale.is_some() {
                    return Err("invalid entry (second locale)");
                } else {
                    locale = Some((start, close));
                }
                i = close;
            }
            _ => {}
        }
        i += 1;
    };

    let end_of_key = end_of_key.unwrap_or(0);
    let key_end = line[..end_of_key]
        .iter()
        .rposition(|&b| !is_space(b))
        .map(|p| p + 1)
        .ok_or("invalid entry (empty key)")?;

    Ok(KeyLine {
        key: &line[..key_end],
        key_with_locale: match locale {
            Some((_, close)) => &line[..close + 1],
            None => &line[..key_end],
        },
        locale: locale.map(|(start, close)| &line[start..close]),
        value: line.get(value_start..).unwrap_or_default(),
        immutable,
        expand,
        deleted,
    })
}

/// Decode a raw value: strip surrounding whitespace, then resolve escapes.
/// Unknown escapes keep their backslash; a lone trailing backslash is kept.
pub fn unescape_value(raw: &[u8]) -> Vec<u8> {
    let is_trim = |b: &u8| matches!(b, b' ' | b'\t' | b'\r');
    let start = raw.iter().position(|b| !is_trim(b)).unwrap_or(raw.len());
    let end = raw.iter().rposition(|b| !is_trim(b)).map_or(start, |p| p + 1);
    let raw = &raw[start..end];

    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().copied();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            None => out.push(b'\\'),
            Some(b's') => out.push(b' '),
            Some(b't') => out.push(b'\t'),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'\\') => out.push(b'\\'),
            Some(other) => out.extend_from_slice(&[b'\\', other]),
        }
    }
    out
}

/// Encode a value for the right-hand side of `key=`.
pub fn escape_value(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() * 2);
    let mut rest = value;
    if let Some((b' ', tail)) = rest.split_first() {
        out.extend_from_slice(b"\\s");
        rest = tail;
    }
    if rest.is_empty() {
        return out;
    }
    for &b in rest {
        match b {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    if out.last() == Some(&b' ') {
        out.pop();
        out.extend_from_slice(b"\\s");
    }
    out
}

pub fn decode_group(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if (b == b'[' || b == b']') && body.get(i + 1) == Some(&b) {
            i += 1;
        }
        out.push(b);
        i += 1;
    }
    out
}

pub fn encode_group(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 2);
    for &b in name {
        if b == b'[' || b == b']' {
            out.push(b);
        }
        out.push(b);
    }
    out
}

/// Serialize every live entry of `store` in file form.
///
/// The default group comes first without a header. An entry equal to its
/// default (value and deleted state) is omitted, as is a tombstone with no
/// default to suppress. Group markers and default variants are never
/// written.
pub fn serialize(store: &EntryStore, locale: &LocaleContext) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first_entry = true;
    write_group(&mut out, store, DEFAULT_GROUP, false, &mut first_entry, locale);
    for group in store.group_names() {
        if group != DEFAULT_GROUP {
            write_group(&mut out, store, group, true, &mut first_entry, locale);
        }
    }
    out
}

fn write_group(
    out: &mut Vec<u8>,
    store: &EntryStore,
    group: &[u8],
    with_header: bool,
    first_entry: &mut bool,
    locale: &LocaleContext,
) {
    let mut header_written = false;
    for (key, entry) in store.iter_group(group) {
        if key.default {
            continue;
        }
        let default = store.get(&key.clone().default_layer(true));
        match default {
            Some(d) if d.value == entry.value && d.deleted == entry.deleted => continue,
            None if entry.deleted => continue,
            _ => {}
        }

        if with_header && !header_written {
            if !*first_entry {
                out.push(b'\n');
            }
            out.push(b'[');
            out.extend_from_slice(&encode_group(group));
            out.extend_from_slice(b"]\n");
            header_written = true;
        }
        *first_entry = false;

        out.extend_from_slice(key.key.as_deref().unwrap_or_default());
        if entry.localized {
            out.push(b'[');
            out.extend_from_slice(locale.tag());
            out.push(b']');
        }
        if entry.deleted {
            out.extend_from_slice(b"[$d]\n");
            continue;
        }
        if entry.immutable || entry.expand {
            out.extend_from_slice(b"[$");
            if entry.immutable {
                out.push(b'i');
            }
            if entry.expand {
                out.push(b'e');
            }
            out.push(b']');
        }
        out.push(b'=');
        out.extend_from_slice(&escape_value(&entry.value));
        out.push(b'\n');
    }
}
