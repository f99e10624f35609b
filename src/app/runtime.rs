use std::fs;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use mediadl_core::relocate::FfprobeTagProbe;
use mediadl_core::{
    DownloadOptions, FileRelocator, QueueScheduler, RuleStore, TokioLauncher,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::{
    command_dispatcher, config_manager, exit_handler, input_processor, progress_manager, terminal,
};
use crate::cli::{Cli, DownloadArgs};
use crate::{ProcessExit, commands, output};

pub(crate) async fn run_mediadl() -> Result<ProcessExit> {
    let cli = Cli::parse();
    let args = &cli.download;

    let no_color = terminal::is_no_color_requested(args);
    terminal::init_tracing(
        terminal::default_log_level(args),
        terminal::should_force_cli_level(args),
        no_color,
    );
    debug!(?cli, "CLI arguments parsed");

    let resolved = config_manager::resolve_config(args)?;

    if let Some(exit) = command_dispatcher::try_dispatch(&cli, &resolved).await? {
        return Ok(exit);
    }

    let input = input_processor::collect_input(args)?;
    if input.urls.is_empty() {
        output::print_quick_start_guidance(input.read_stdin);
        return Ok(ProcessExit::Success);
    }

    let config = resolved.config;
    info!(urls = input.urls.len(), "mediadl starting");

    fs::create_dir_all(&config.completed_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.completed_dir.display()
        )
    })?;
    let archive = commands::open_archive(&config).await?;
    let rules = Arc::new(RuleStore::new(config.rules_path()));
    let relocator = FileRelocator::new(rules)
        .with_probe(Arc::new(FfprobeTagProbe::new(config.ffprobe_path.clone())));

    let scheduler = QueueScheduler::new(
        config,
        Arc::new(TokioLauncher::new()),
        Arc::new(archive),
        Arc::new(relocator),
    );
    if scheduler.spawn_index_refresh_if_stale() {
        debug!("supported-sites index is stale; rebuilding in the background");
    }

    let use_bars = terminal::should_use_progress_bars(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let (stop_tx, stop_rx) = watch::channel(false);
    let reporter = progress_manager::spawn_event_reporter(scheduler.subscribe(), use_bars, stop_rx);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                warn!("Interrupted; cancelling downloads");
                scheduler.cancel_all();
            }
        });
    }

    let options = download_options(args);
    for url in &input.urls {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let outcomes = scheduler.submit_expanded(url, options.clone()).await;
        debug!(url = %url, ?outcomes, "submitted");
    }

    scheduler.wait_idle().await;
    let _ = stop_tx.send(true);
    let shown = reporter.await.context("progress reporter stopped unexpectedly")?;
    debug!(events = shown, "progress reporter finished");
    let summary = scheduler.summary();

    info!(
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        rejected = summary.rejected,
        duplicates = summary.duplicates,
        "Run complete"
    );
    output::print_completion_summary(&summary);

    Ok(exit_handler::determine_exit_outcome(
        &summary,
        interrupted.load(Ordering::SeqCst),
    ))
}

/// Request options from download flags. Unset values defer to the config file.
pub(crate) fn download_options(args: &DownloadArgs) -> DownloadOptions {
    DownloadOptions {
        audio_only: args.audio_only,
        metadata_only: args.metadata_only,
        use_gallery_tool: args.gallery.then_some(true),
        video_quality: args.quality.clone(),
        playlist_mode: args.playlist.into(),
        rate_limit: args.rate_limit.clone(),
        output_template: args.output_template.clone(),
        cookies_from_browser: args.cookies_from_browser.clone(),
        keep_subtitle_files: args.keep_subtitles,
        redownload: args.force,
        ..DownloadOptions::default()
    }
}
