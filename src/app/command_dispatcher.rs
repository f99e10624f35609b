//! CLI command routing: runs Rules, Archive, Index and Config subcommands.
//!
//! If the user invoked a top-level command (e.g. `mediadl rules list`), this
//! module runs the corresponding handler and returns the exit outcome.
//! Otherwise returns `None` so the caller continues with the download flow.

use anyhow::Result;

use crate::app::config_manager::ResolvedConfig;
use crate::cli::{ArchiveCommand, Cli, Command, ConfigCommand, IndexCommand, RulesCommand};
use crate::{ProcessExit, commands};

/// If `cli` has a top-level command, run it and return `Some(exit)`; otherwise return `None`.
pub(crate) async fn try_dispatch(
    cli: &Cli,
    resolved: &ResolvedConfig,
) -> Result<Option<ProcessExit>> {
    let Some(command) = &cli.command else {
        return Ok(None);
    };
    let config = &resolved.config;

    let exit = match command {
        Command::Rules { command } => match command {
            RulesCommand::List => commands::run_rules_list(config)?,
            RulesCommand::Add(args) => commands::run_rules_add(config, args)?,
            RulesCommand::Remove { id } => commands::run_rules_remove(config, id)?,
            RulesCommand::Move { id, direction } => {
                commands::run_rules_move(config, id, *direction)?
            }
        },
        Command::Archive { command } => match command {
            ArchiveCommand::Check { url } => commands::run_archive_check(config, url).await?,
            ArchiveCommand::Prune { days } => commands::run_archive_prune(config, *days).await?,
            ArchiveCommand::Remove { url } => commands::run_archive_remove(config, url).await?,
        },
        Command::Index { command } => match command {
            IndexCommand::Rebuild => commands::run_index_rebuild(config).await?,
        },
        Command::Config { command } => match command {
            ConfigCommand::Show => commands::run_config_show_command(resolved),
        },
    };

    Ok(Some(exit))
}
