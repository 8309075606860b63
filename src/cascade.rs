//! The cascade: which files make up one configuration, and how they fold
//! into an [`EntryStore`].
//!
//! A [`CascadeResolver`] lists candidate files most relevant first. The fold
//! walks them the other way round, least specific first, so later files
//! override earlier ones. Every file except the write target is parsed as a
//! default layer, which leaves a shadow default next to each value for
//! revert-to-default and for write-back compaction.
//!
//! A file carrying a `[$i]` line stops the walk: nothing more specific in
//! the same layer is merged.

use std::path::{Path, PathBuf};

use crate::codec::{self, ParseOptions};
use crate::file;
use crate::locale::LocaleContext;
use crate::store::EntryStore;

/// Supplies candidate paths for a logical configuration name.
pub trait CascadeResolver {
    /// Existing candidate files for `name`, most relevant first.
    fn find_all(&self, name: &str) -> Vec<PathBuf>;

    /// The single writable path for `name`.
    fn save_path(&self, name: &str) -> Option<PathBuf>;

    /// Whether `name` is administratively locked regardless of content.
    fn is_restricted(&self, _name: &str) -> bool {
        false
    }

    /// Extra directories prepended to `PATH` while running `$(cmd)`.
    fn executable_dirs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// One file of the fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFile {
    pub path: PathBuf,
    /// Part of the shared globals layer.
    pub global: bool,
    /// The write target: parsed as the live layer, not as defaults.
    pub most_specific: bool,
}

/// Fold order for `name`: the resolver's list reversed, or the name itself
/// when it is an absolute path.
pub fn plan(
    resolver: &dyn CascadeResolver,
    name: &str,
    global: bool,
    write_target: Option<&Path>,
) -> Vec<CascadeFile> {
    let candidates = if Path::new(name).is_absolute() {
        vec![PathBuf::from(name)]
    } else {
        resolver.find_all(name)
    };
    candidates
        .into_iter()
        .rev()
        .map(|path| CascadeFile {
            most_specific: write_target == Some(path.as_path()),
            path,
            global,
        })
        .collect()
}

/// Settings shared by every file of one fold.
#[derive(Debug, Clone, Copy)]
pub struct FoldContext<'a> {
    pub locale: &'a LocaleContext,
    pub honor_kiosk: bool,
}

/// What a fold over one layer produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldOutcome {
    /// A file in the layer carried `[$i]`; the walk stopped there.
    pub file_immutable: bool,
    /// Some file set `[Locale] Language`.
    pub locale_changed: bool,
    /// Files actually read, in fold order.
    pub loaded: Vec<PathBuf>,
}

/// Fold `files` (already in least-specific-first order) into `store`.
///
/// Missing files are empty layers. Unreadable files are logged and skipped.
pub fn fold(store: &mut EntryStore, files: &[CascadeFile], ctx: &FoldContext<'_>) -> FoldOutcome {
    let mut outcome = FoldOutcome::default();
    for file in files {
        let data = match file::read_layer(&file.path) {
            Ok(Some(data)) => data,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!("skipping config layer: {err}");
                continue;
            }
        };
        let opts = ParseOptions {
            global: file.global,
            default_layer: !file.most_specific,
            locale: ctx.locale,
            honor_kiosk: ctx.honor_kiosk,
            capture_foreign_locales: false,
        };
        let parsed = codec::parse(&data, &file.path, &opts, store);
        tracing::debug!(
            path = %file.path.display(),
            global = file.global,
            default_layer = opts.default_layer,
            errors = parsed.errors,
            "folded config layer"
        );
        outcome.loaded.push(file.path.clone());
        outcome.locale_changed |= parsed.locale_changed;
        if parsed.file_immutable {
            tracing::debug!(path = %file.path.display(), "layer locked by [$i]");
            outcome.file_immutable = true;
            break;
        }
    }
    outcome
}
