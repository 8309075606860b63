//! Clap adapter for inicascade.
//!
//! Compiled only when the `clap` Cargo feature is enabled (on by default).
//! [`ConfigArgs`] embeds into an application's own clap derive and turns
//! `config groups|list|get|set|delete|revert` into a
//! [`ConfigAction`](crate::ConfigAction), which
//! [`Config::handle()`](crate::Config::handle) runs.

use clap::{Args, Subcommand};

use crate::types::ConfigAction;

/// Group used when `--group` is not given.
pub const DEFAULT_GROUP_ARG: &str = "General";

/// Clap-derived args for the `config` subcommand group.
///
/// ```ignore
/// #[derive(Parser)]
/// struct Cli {
///     #[command(subcommand)]
///     command: Commands,
/// }
///
/// #[derive(Subcommand)]
/// enum Commands {
///     Config(ConfigArgs),
/// }
/// ```
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Group to operate on.
    #[arg(long, short, global = true, default_value = DEFAULT_GROUP_ARG)]
    pub group: String,

    #[command(subcommand)]
    pub action: Option<ConfigSubcommand>,
}

/// Available config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// List the groups that hold at least one key.
    Groups,
    /// Show every key of the group.
    List,
    /// Show the effective value of a key.
    Get { key: String },
    /// Write a value and save it.
    Set { key: String, value: String },
    /// Hide a key, including any value inherited from system files.
    Delete { key: String },
    /// Go back to the value inherited from system files.
    Revert { key: String },
}

impl ConfigArgs {
    /// Convert clap-parsed args into a framework-agnostic `ConfigAction`.
    ///
    /// Bare `config` maps to `ConfigAction::Groups`.
    pub fn into_action(self) -> ConfigAction {
        let group = self.group;
        match self.action {
            None | Some(ConfigSubcommand::Groups) => ConfigAction::Groups,
            Some(ConfigSubcommand::List) => ConfigAction::List { group },
            Some(ConfigSubcommand::Get { key }) => ConfigAction::Get { group, key },
            Some(ConfigSubcommand::Set { key, value }) => ConfigAction::Set { group, key, value },
            Some(ConfigSubcommand::Delete { key }) => ConfigAction::Delete { group, key },
            Some(ConfigSubcommand::Revert { key }) => ConfigAction::Revert { group, key },
        }
    }
}
