//! Configuration lifecycle: load the config file, then apply command-line overrides.

use std::path::PathBuf;

use anyhow::{Context, Result};
use mediadl_core::AppConfig;
use mediadl_core::config::resolve_default_config_path;
use tracing::debug;

use crate::cli::DownloadArgs;

/// Config plus where it came from, for `config show`.
pub(crate) struct ResolvedConfig {
    pub(crate) config: AppConfig,
    pub(crate) path: Option<PathBuf>,
    pub(crate) loaded_from_file: bool,
}

/// Loads the default config file (missing file = defaults) and merges CLI flags.
pub(crate) fn resolve_config(args: &DownloadArgs) -> Result<ResolvedConfig> {
    let path = resolve_default_config_path();
    let (config, loaded_from_file) = match &path {
        Some(path) => {
            let exists = path.exists();
            let config = AppConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            (config, exists)
        }
        None => (AppConfig::default(), false),
    };
    let config = apply_cli_overrides(config, args);
    debug!(?path, loaded_from_file, "configuration resolved");
    Ok(ResolvedConfig {
        config,
        path,
        loaded_from_file,
    })
}

/// Only flags actually given on the command line replace file values.
pub(crate) fn apply_cli_overrides(mut config: AppConfig, args: &DownloadArgs) -> AppConfig {
    if let Some(concurrency) = args.concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(output_dir) = &args.output_dir {
        config.completed_dir.clone_from(output_dir);
    }
    if let Some(scratch_dir) = &args.scratch_dir {
        config.scratch_dir = Some(scratch_dir.clone());
    }
    config
}
