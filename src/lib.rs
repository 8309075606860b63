//! Cascading INI configuration for Rust applications. Name your file, open
//! it, read and write typed values.
//!
//! inicascade folds every copy of a configuration file found along a search
//! path into one view, lets administrators lock keys, groups or whole files,
//! and writes user changes back to the most specific file without losing
//! what other processes wrote in the meantime.
//!
//! ```ignore
//! let mut config = Config::builder()
//!     .app_name("myapp")
//!     .open()?;
//!
//! let mut view = config.group("View");
//! let zoom: i32 = view.read_entry("Zoom", 100);
//! view.write_entry("Zoom", &(zoom + 25), WriteFlags::default());
//! config.sync();
//! ```
//!
//! That call reads `myapprc` from `$XDG_CONFIG_DIRS` and then from the user's
//! config directory. The user's file wins and receives writes.
//!
//! # File format
//!
//! ```text
//! top=1                     entries before any header go to <default>
//! [General]
//! Name=Plain
//! Name[de]=Deutsch          localized variant, used when the locale is de
//! Path[$e]=$HOME/data       expanded on read
//! Fixed[$i]=admin           later files and writes cannot change it
//! Gone[$d]                  hides the value from less specific files
//! [Locked][$i]              the whole group is locked
//! ```
//!
//! A line holding only `[$i]` locks the whole file.
//!
//! # Layer precedence
//!
//! ```text
//! Shared globals file    kdeglobals cascade, with .include_globals(true)
//!        ↑ overridden by
//! System files           less specific directories first
//!        ↑ overridden by
//! User file              the write target
//!        ↑ overridden by
//! Extra files            .extra_config_files(), last one is the write target
//! ```
//!
//! Values from every layer but the write target are kept as defaults, so
//! [`ConfigGroup::revert_to_default()`] can bring them back and writes equal
//! to a default are not stored twice.
//!
//! # Kiosk
//!
//! An immutable marker is sticky: once a file locks a key, no later file and
//! no write changes it. Locked writes are dropped silently and report
//! `false`. [`Config::access_state()`] tells a UI whether to offer editing at
//! all.
//!
//! # Write-back
//!
//! [`Config::sync()`] locks the target, re-reads it when it changed on disk,
//! overlays the entries written since the last sync and atomically replaces
//! the file. Entries marked global go to the user's globals file in a second
//! pass. Sync never fails: problems are logged through `tracing` and the
//! entries stay dirty for the next attempt.
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` feature, on by default) offers
//! [`ConfigArgs`], a derive struct giving your users
//! `config groups|list|get|set|delete|revert` with a `--group` flag. It
//! produces a [`ConfigAction`] that [`Config::handle()`] runs, so apps using
//! another parser build the action themselves.
//!
//! # Error handling
//!
//! Opening only fails without a file name. Missing or unreadable files are
//! skipped. [`ConfigError`] is returned by the CLI-level operations and the
//! lower-level file helpers.

pub mod backend;
pub mod cascade;
pub mod codec;
pub mod entry;
pub mod error;
pub mod expand;
pub mod kiosk;
pub mod locale;
pub mod store;
pub mod types;
pub mod value;

mod builder;
#[cfg(feature = "clap")]
mod cli;
mod config;
mod file;
mod flatten;
mod group;
mod lock;
mod merge;
mod ops;
mod persist;

#[cfg(test)]
mod fixtures;

pub use backend::{AccessState, ConfigBackend, IniBackend, SyncOutcome};
pub use builder::ConfigBuilder;
#[cfg(feature = "clap")]
pub use cli::{ConfigArgs, ConfigSubcommand};
pub use config::Config;
pub use error::ConfigError;
pub use file::SearchPathResolver;
pub use group::{ConfigGroup, WriteFlags};
pub use locale::{EnvLocale, FixedLocale, LocaleContext, LocaleProvider};
pub use ops::ConfigResult;
pub use types::{ConfigAction, SearchPath};
pub use value::{Color, DecodeError, EntryValue, Point, Rect, Size};
