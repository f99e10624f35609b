//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use mediadl_core::PlaylistMode;

/// Queue, run and file media downloads.
///
/// URLs come from the positional arguments or, when none are given, from
/// text piped on stdin. Each URL is checked, downloaded by the external tool
/// and moved to the folder chosen by your sorting rules.
#[derive(Parser, Debug)]
#[command(name = "mediadl")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage sorting rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Inspect or maintain the download archive
    Archive {
        #[command(subcommand)]
        command: ArchiveCommand,
    },
    /// Maintain the supported-sites index
    Index {
        #[command(subcommand)]
        command: IndexCommand,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum RulesCommand {
    /// List rules in evaluation order
    List,
    /// Append a rule
    Add(RuleAddArgs),
    /// Delete a rule by id
    Remove { id: String },
    /// Move a rule one place up or down
    Move {
        id: String,
        #[arg(value_enum)]
        direction: MoveArg,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RuleAddArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Destination folder for matching downloads
    #[arg(long)]
    pub target: PathBuf,

    /// Subfolder template, e.g. "{uploader}/{upload_year}"
    #[arg(long)]
    pub subfolder: Option<String>,

    /// Download type the rule applies to (all, video, audio, gallery, video-playlist, audio-playlist)
    #[arg(long = "type", default_value = "all")]
    pub scope: String,

    /// Condition as FIELD:OPERATOR:VALUE[,VALUE...]; repeat for more (all must match)
    #[arg(long = "when", value_name = "CONDITION")]
    pub conditions: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveArg {
    Up,
    Down,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ArchiveCommand {
    /// Report whether a URL was downloaded before
    Check { url: String },
    /// Forget entries older than N days
    Prune {
        #[arg(long)]
        days: u64,
    },
    /// Forget one URL so it can be downloaded again
    Remove { url: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommand {
    /// Rebuild the index from the downloader's extractor list
    Rebuild,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

/// Playlist handling on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaylistArg {
    #[default]
    Ask,
    Single,
    All,
}

impl From<PlaylistArg> for PlaylistMode {
    fn from(value: PlaylistArg) -> Self {
        match value {
            PlaylistArg::Ask => Self::Ask,
            PlaylistArg::Single => Self::Single,
            PlaylistArg::All => Self::All,
        }
    }
}

/// Flags for the default download flow. Options left unset fall back to the
/// config file.
#[allow(clippy::struct_excessive_bools)]
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// URLs to download (reads stdin when empty)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Maximum concurrent downloads (1-8)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub concurrency: Option<u8>,

    /// Extract audio only
    #[arg(long, conflicts_with = "metadata_only")]
    pub audio_only: bool,

    /// Write metadata only, skip the media
    #[arg(long)]
    pub metadata_only: bool,

    /// Force the gallery tool
    #[arg(long)]
    pub gallery: bool,

    /// Video quality: best or a height like 720p
    #[arg(long)]
    pub quality: Option<String>,

    /// Playlist handling: ask queues each entry separately
    #[arg(long, value_enum, default_value_t = PlaylistArg::Ask)]
    pub playlist: PlaylistArg,

    /// Download rate limit, e.g. 500K or 2M
    #[arg(long)]
    pub rate_limit: Option<String>,

    /// Output file name template (must contain %(ext)s)
    #[arg(long)]
    pub output_template: Option<String>,

    /// Keep subtitle files next to the media
    #[arg(long)]
    pub keep_subtitles: bool,

    /// Download even when the URL is already in the archive
    #[arg(long)]
    pub force: bool,

    /// Browser to read cookies from
    #[arg(long)]
    pub cookies_from_browser: Option<String>,

    /// Destination for files no rule claims
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Directory the tool writes into before files are moved
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}
