//! seekr - album downloader
//!
//! Thin command layer over the `seekr_dl` library:
//! - `seekr download --album <album.json>...` queues albums and drains the queue
//! - `seekr config show|init` inspects or creates the TOML configuration
//! - `seekr check` verifies committed albums against their sidecars
//!
//! Ctrl+C abandons the source attempt in flight (or stops the run when none
//! is running). SIGQUIT stops the run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seekr_common::config::{load_toml_config, resolve_config_path, write_toml_config, TomlConfig};
use seekr_common::events::{DownloadEvent, EventBus};
use seekr_common::models::read_album_file;
use seekr_common::naming::normalize_extension;
use seekr_dl::network::LocalPeerClient;
use seekr_dl::queue::RetryableQueue;
use seekr_dl::services::{
    check_library, AlbumDownloader, CoverArtArchiveClient, CoverArtProvider, NoCoverArt,
    SourceCancelHandle,
};
use seekr_dl::worker::DownloadWorker;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Command-line arguments for seekr
#[derive(Parser, Debug)]
#[command(name = "seekr")]
#[command(about = "Download albums from a peer-to-peer network into a music library")]
#[command(version)]
struct Args {
    /// Configuration file (default: $SEEKR_CONFIG, then ~/.config/seekr/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose diagnostics (per-peer rejections, transfer progress)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download albums described by JSON files
    Download {
        /// Album JSON file (repeatable)
        #[arg(long = "album", required = true)]
        albums: Vec<PathBuf>,

        /// Replace albums already in the library
        #[arg(long)]
        replace: bool,

        /// Accepted file extensions, overriding the configuration
        #[arg(long, value_delimiter = ',')]
        file_types: Vec<String>,

        /// Directory served as peers (`<dir>/<username>/...`)
        #[arg(long)]
        peers: Option<PathBuf>,

        /// Pause between 64 KiB chunks served by `--peers`, to simulate slow peers
        #[arg(long, value_name = "MS")]
        peer_chunk_delay_ms: Option<u64>,

        /// Skip the Cover Art Archive lookup
        #[arg(long)]
        no_cover_art: bool,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Verify library albums against their sidecar records
    Check,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the resolved configuration (password masked)
    Show,

    /// Write an example configuration
    Init {
        /// Library directory albums are committed to
        #[arg(long)]
        library: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("seekr={level},seekr_dl={level},seekr_common={level}"))
}

/// Install the subscriber; returns a handle when the filter may follow the config
fn init_tracing(verbose: bool) -> Option<FilterHandle> {
    let (filter, handle, follows_config) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let (filter, handle) = reload::Layer::new(filter);
            (filter, handle, false)
        }
        Err(_) => {
            let level = if verbose { "debug" } else { "info" };
            let (filter, handle) = reload::Layer::new(level_filter(level));
            (filter, handle, !verbose)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    follows_config.then_some(handle)
}

fn load_config(args: &Args, filter: Option<&FilterHandle>) -> Result<TomlConfig> {
    let path = resolve_config_path(args.config.as_deref())?;
    let config = load_toml_config(&path)?;

    if let Some(handle) = filter {
        let level = config.logging.level.clone();
        if let Err(e) = handle.modify(|f| *f = level_filter(&level)) {
            warn!(error = %e, "Failed to apply configured log level");
        }
    }
    debug!(config = %path.display(), "Loaded configuration");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let filter = init_tracing(args.verbose);

    match &args.command {
        Command::Download {
            albums,
            replace,
            file_types,
            peers,
            peer_chunk_delay_ms,
            no_cover_art,
        } => {
            let mut config = load_config(&args, filter.as_ref())?;
            if !file_types.is_empty() {
                config.search.file_types =
                    file_types.iter().map(|t| normalize_extension(t)).collect();
            }
            let client = match peers {
                Some(dir) => {
                    let client = LocalPeerClient::new(dir);
                    match peer_chunk_delay_ms {
                        Some(ms) => client.with_chunk_delay(Duration::from_millis(*ms)),
                        None => client,
                    }
                }
                None => bail!(
                    "no network client is available; pass --peers <dir> to download from a peer directory"
                ),
            };
            download(config, albums, *replace, client, *no_cover_art).await
        }
        Command::Config { action } => match action {
            ConfigCommand::Show => {
                let mut config = load_config(&args, filter.as_ref())?;
                if !config.network.password.is_empty() {
                    config.network.password = "********".to_string();
                }
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCommand::Init { library, force } => {
                let path = resolve_config_path(args.config.as_deref())?;
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                write_toml_config(&TomlConfig::example(library.clone()), &path)?;
                println!("Wrote {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
        },
        Command::Check => {
            let config = load_config(&args, filter.as_ref())?;
            let reports = check_library(&config.layout());
            let mut failed = 0;
            for report in &reports {
                for problem in &report.problems {
                    println!("{}: {}", report.directory.display(), problem);
                }
                if !report.is_ok() {
                    failed += 1;
                }
            }
            println!("{} albums checked, {} with problems", reports.len(), failed);
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn download(
    config: TomlConfig,
    album_files: &[PathBuf],
    replace: bool,
    client: LocalPeerClient,
    no_cover_art: bool,
) -> Result<ExitCode> {
    let mut albums = Vec::with_capacity(album_files.len());
    for path in album_files {
        let album = read_album_file(path)
            .with_context(|| format!("Failed to read album {}", path.display()))?;
        albums.push(album);
    }

    let events = Arc::new(EventBus::new(1000));
    let cover_art: Arc<dyn CoverArtProvider> = if no_cover_art {
        Arc::new(NoCoverArt)
    } else {
        match CoverArtArchiveClient::new() {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "Cover art lookup disabled");
                Arc::new(NoCoverArt)
            }
        }
    };

    let downloader = Arc::new(
        AlbumDownloader::from_config(
            &config,
            Arc::new(client),
            events.clone(),
        )
        .with_cover_art(cover_art),
    );

    let global = CancellationToken::new();
    let signals = spawn_signal_handlers(downloader.cancel_handle(), global.clone());
    let progress = spawn_progress_logger(&events);

    let mut queue = RetryableQueue::new(config.queue.retry_wait());
    queue.enqueue_many(albums);
    info!(albums = queue.len(), library = %config.library_path.display(), "Starting downloads");

    let summary = DownloadWorker::new(downloader, global.clone())
        .with_replace(replace)
        .with_max_attempts(config.queue.max_attempts)
        .run(&mut queue)
        .await;

    signals.abort();
    progress.abort();

    for album in &summary.abandoned {
        warn!(album = %album, "Album could not be downloaded");
    }
    info!(
        downloaded = summary.downloaded,
        already_present = summary.already_present,
        failed_attempts = summary.failed_attempts,
        "Done"
    );

    Ok(if summary.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Ctrl+C cancels the current source, or everything when none is running
fn spawn_signal_handlers(handle: SourceCancelHandle, global: CancellationToken) -> JoinHandle<()> {
    #[cfg(unix)]
    {
        let global = global.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::quit()) {
                Ok(mut quit) => {
                    if quit.recv().await.is_some() {
                        warn!("SIGQUIT received, stopping");
                        global.cancel();
                    }
                }
                Err(e) => warn!(error = %e, "Failed to install SIGQUIT handler"),
            }
        });
    }

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = global.cancelled() => break,
                result = signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to listen for Ctrl+C");
                        break;
                    }
                    if handle.cancel_current() {
                        warn!("Interrupt received, abandoning current source (press again to stop)");
                    } else {
                        warn!("Interrupt received, stopping");
                        global.cancel();
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_progress_logger(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DownloadEvent) {
    match event {
        DownloadEvent::SourceAttemptStarted {
            username,
            rank,
            total,
            ..
        } => info!("[{}/{}] Downloading from {}", rank, total, username),
        DownloadEvent::TransferProgress {
            filename,
            state,
            percent,
            average_speed,
            ..
        } => {
            debug!(
                "{}: {} {:.1}% ({:.0} KiB/s)",
                filename,
                state,
                percent,
                average_speed / 1024.0
            );
        }
        DownloadEvent::TransferFinished {
            filename,
            state,
            succeeded,
            ..
        } => {
            if *succeeded {
                info!("{}: {}", filename, state);
            } else {
                warn!("{}: {}", filename, state);
            }
        }
        other => debug!(event = other.event_type(), "Download event"),
    }
}
