//! Write-back of one target file.
//!
//! Under a best-effort lock: re-read the file as it is on disk now into a
//! scratch map, overlay the in-memory changes, serialize, and atomically
//! replace the file through a temporary sibling. Another process's edits to
//! unrelated keys survive; for a key both changed, this write wins unless
//! the on-disk copy is immutable.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::codec::{self, ParseOptions};
use crate::error::ConfigError;
use crate::file;
use crate::lock::FileLock;
use crate::locale::LocaleContext;
use crate::merge::{self, ScratchTarget};
use crate::store::EntryStore;

/// How to write one target.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions<'a> {
    /// The target is the shared globals file.
    pub global: bool,
    /// Re-read the on-disk file and overlay only dirty entries. Without it the
    /// full in-memory state of matching globality is written.
    pub merge: bool,
    pub locale: &'a LocaleContext,
    pub honor_kiosk: bool,
    /// Mode for a newly created file. Existing files keep theirs.
    pub file_mode: Option<u32>,
}

/// Result of writing one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Dirty entries of the other globality were held back.
    pub entries_left: bool,
    /// The target now reflects the in-memory changes.
    pub written: bool,
}

/// Merge `live` into the file at `path` and replace it atomically.
pub fn write_config_file(
    path: &Path,
    live: &EntryStore,
    opts: &WriteOptions<'_>,
) -> Result<WriteReport, ConfigError> {
    let _lock = FileLock::try_acquire(path);

    let mut scratch = EntryStore::new();
    if opts.merge
        && let Some(data) = file::read_layer(path)?
    {
        let parse_opts = ParseOptions {
            global: opts.global,
            default_layer: false,
            locale: opts.locale,
            honor_kiosk: opts.honor_kiosk,
            capture_foreign_locales: true,
        };
        let mut target = ScratchTarget {
            scratch: &mut scratch,
            live,
        };
        let parsed = codec::parse(&data, path, &parse_opts, &mut target);
        if parsed.file_immutable {
            tracing::warn!(path = %path.display(), "target became immutable on disk, not writing");
            return Ok(WriteReport {
                entries_left: true,
                written: false,
            });
        }
    }

    let entries_left = merge::merge_entries(&mut scratch, live, opts.global, opts.merge);
    let content = codec::serialize(&scratch, opts.locale);
    let requested_mode = if opts.global { None } else { opts.file_mode };
    replace_file(path, &content, requested_mode)?;

    tracing::debug!(
        path = %path.display(),
        bytes = content.len(),
        global = opts.global,
        merged = opts.merge,
        "wrote config file"
    );
    Ok(WriteReport {
        entries_left,
        written: true,
    })
}

/// Atomically replace `path` with `content`.
///
/// An existing file keeps its permission bits; a new one gets
/// `requested_mode`, else owner read/write. Empty content deletes the file
/// instead, unless it carries permissions other than `0600`.
pub fn replace_file(path: &Path, content: &[u8], requested_mode: Option<u32>) -> Result<(), ConfigError> {
    let existing_mode = current_mode(path);
    let mode = existing_mode.or(requested_mode);

    if content.is_empty() && mode.is_none_or(|m| m & 0o777 == 0o600) {
        return match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed empty config file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        };
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let persist_err = |source| ConfigError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    temp.write_all(content).map_err(persist_err)?;
    if let Some(mode) = mode {
        set_mode(temp.as_file(), mode).map_err(persist_err)?;
    }
    temp.as_file().sync_all().map_err(persist_err)?;
    temp.persist(path).map_err(|err| persist_err(err.error))?;
    Ok(())
}

#[cfg(unix)]
fn current_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn current_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, EntryKey};
    use crate::fixtures::test::{read_file, write_file};
    use tempfile::TempDir;

    fn opts(locale: &LocaleContext, merge: bool) -> WriteOptions<'_> {
        WriteOptions {
            global: false,
            merge,
            locale,
            honor_kiosk: true,
            file_mode: None,
        }
    }

    fn dirty(value: &str) -> Entry {
        Entry {
            dirty: true,
            ..Entry::new(value)
        }
    }

    #[test]
    fn merge_keeps_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "apprc", "[G]\nY=theirs\nX=old\n");
        let mut live = EntryStore::new();
        live.insert(&EntryKey::new("G", "X"), dirty("mine"));

        let locale = LocaleContext::default();
        let report = write_config_file(&path, &live, &opts(&locale, true)).unwrap();
        assert!(report.written);
        assert!(!report.entries_left);
        assert_eq!(read_file(&path), "[G]\nX=mine\nY=theirs\n");
    }

    #[test]
    fn merge_preserves_foreign_locale_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "apprc", "[G]\nName=Hi\nName[fr]=Salut\n");
        let mut live = EntryStore::new();
        live.insert(&EntryKey::new("G", "Other"), dirty("1"));

        let locale = LocaleContext::new("de");
        write_config_file(&path, &live, &opts(&locale, true)).unwrap();
        let text = read_file(&path);
        assert!(text.contains("Name[fr]=Salut\n"));
        assert!(text.contains("Name=Hi\n"));
        assert!(text.contains("Other=1\n"));
    }

    #[test]
    fn on_disk_file_lock_blocks_write() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "apprc", "[$i]\n[G]\nk=admin\n");
        let mut live = EntryStore::new();
        live.insert(&EntryKey::new("G", "k"), dirty("mine"));

        let locale = LocaleContext::default();
        let report = write_config_file(&path, &live, &opts(&locale, true)).unwrap();
        assert!(!report.written);
        assert_eq!(read_file(&path), "[$i]\n[G]\nk=admin\n");
    }

    #[test]
    fn empty_result_deletes_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "apprc", "[G]\nk=v\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        }
        let mut live = EntryStore::new();
        live.insert(&EntryKey::new("G", "k"), Entry { deleted: true, ..dirty("") });

        let locale = LocaleContext::default();
        write_config_file(&path, &live, &opts(&locale, true)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/apprc");
        let mut live = EntryStore::new();
        live.insert(&EntryKey::new("G", "k"), dirty("v"));

        let locale = LocaleContext::default();
        write_config_file(&path, &live, &opts(&locale, true)).unwrap();
        assert_eq!(read_file(&path), "[G]\nk=v\n");
        assert!(!crate::lock::lock_path_for(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn mode_is_preserved_or_requested() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let existing = write_file(dir.path(), "oldrc", "k=v\n");
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o640)).unwrap();
        replace_file(&existing, b"k=w\n", Some(0o600)).unwrap();
        let mode = fs::metadata(&existing).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);

        let fresh = dir.path().join("newrc");
        replace_file(&fresh, b"k=v\n", Some(0o644)).unwrap();
        let mode = fs::metadata(&fresh).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn empty_file_with_special_mode_is_kept() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "sharedrc", "k=v\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        replace_file(&path, b"", None).unwrap();
        assert!(path.exists());
        assert_eq!(read_file(&path), "");
    }

    #[test]
    fn empty_new_file_is_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("apprc");
        replace_file(&path, b"", None).unwrap();
        assert!(!path.exists());
    }
}
