//! CLI command handlers.

mod archive;
mod config;
mod index;
mod rules;

pub(crate) use archive::{open_archive, run_archive_check, run_archive_prune, run_archive_remove};
pub(crate) use config::run_config_show_command;
pub(crate) use index::run_index_rebuild;
pub(crate) use rules::{run_rules_add, run_rules_list, run_rules_move, run_rules_remove};
