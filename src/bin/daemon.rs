//! mediadex daemon for background index maintenance.
//!
//! Every pass it:
//! - incrementally rescans each configured root
//! - backfills metadata for files a scan left pending
//! - purges persisted thumbnails that have not been used recently
//!
//! Other processes see the results through the shared SQLite store.
//!
//! ## Usage
//!
//! ```bash
//! mediadex-daemon              # Run in foreground
//! mediadex-daemon --once       # Run a single pass and exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use mediadex::decoder::DecoderAdapter;
use mediadex::{logging, CancelToken, Config, Database, ScanRequest, Scanner, ThumbnailService};

/// Pending rows backfilled per project per pass.
const BACKFILL_BATCH: usize = 500;

/// Daemon command line options
struct DaemonArgs {
    /// Overrides `[daemon] poll_interval_secs`
    poll_interval: Option<u64>,
    /// Run once and exit
    once: bool,
    /// Config path override
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args();

    logging::init(Some(Config::config_dir().join("logs")))?;
    info!("mediadex daemon starting...");

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Config loaded");

    let db = Database::open(config.db_path())
        .with_context(|| format!("Failed to open store at {:?}", config.db_path()))?;
    db.initialize()?;
    let db = Arc::new(db);
    info!("Database opened at {:?}", config.db_path());

    let scanner = Scanner::with_exif(config.scanner.clone())?;
    let thumbnails = ThumbnailService::new(
        config.thumbnails.clone(),
        Arc::new(DecoderAdapter::new()),
        Some(Arc::clone(&db)),
    )?;

    if args.once {
        info!("Running in single-shot mode");
        run_pass(&config, &db, &scanner, &thumbnails);
    } else {
        let interval = args.poll_interval.unwrap_or(config.daemon.poll_interval_secs);
        info!("Running in daemon mode, polling every {} seconds", interval);
        loop {
            run_pass(&config, &db, &scanner, &thumbnails);
            thread::sleep(Duration::from_secs(interval));
        }
    }

    info!("mediadex daemon stopped");
    Ok(())
}

fn parse_args() -> DaemonArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = DaemonArgs {
        poll_interval: None,
        once: false,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" | "-1" => {
                parsed.once = true;
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    if let Ok(interval) = args[i + 1].parse() {
                        parsed.poll_interval = Some(interval);
                    }
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"mediadex-daemon - Background index maintenance for mediadex

USAGE:
    mediadex-daemon [OPTIONS]

OPTIONS:
    --once, -1          Run a single maintenance pass and exit
    --interval, -i N    Poll interval in seconds (default from config)
    --config, -c PATH   Path to config file
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIADEX_CONFIG     Path to config file (overrides default location)
    MEDIADEX_LOG        Log filter (trace, debug, info, warn, error)

Each pass rescans the roots listed under [daemon] roots, backfills
metadata for pending files and purges old cached thumbnails."#
    );
}

/// One maintenance pass. Failures are logged and the pass moves on.
fn run_pass(config: &Config, db: &Database, scanner: &Scanner, thumbnails: &ThumbnailService) {
    let cancel = CancelToken::new();

    if config.daemon.roots.is_empty() {
        warn!("No roots configured under [daemon] roots, nothing to scan");
    }

    for root in &config.daemon.roots {
        let request = ScanRequest::new(root);
        let mut progress = |percent: u8, message: &str| {
            tracing::debug!("{:?}: {}% {}", root, percent, message);
        };
        match scanner.scan(db, &request, &mut progress, &cancel) {
            Ok(summary) => info!(
                "Rescanned {:?}: {} indexed, {} skipped, {} failed",
                root, summary.files_indexed, summary.files_skipped, summary.files_failed
            ),
            Err(e) => error!("Scan of {:?} failed: {:#}", root, e),
        }
    }

    match db.list_projects() {
        Ok(projects) => {
            for project in projects {
                if let Err(e) = scanner.backfill_pending(db, project.id, BACKFILL_BATCH, &cancel) {
                    error!("Backfill for project {} failed: {:#}", project.id, e);
                }
            }
        }
        Err(e) => error!("Failed to list projects: {:#}", e),
    }

    match thumbnails.purge_stale(config.thumbnails.max_age_days) {
        Ok(removed) if removed > 0 => info!("Purged {} stale thumbnails", removed),
        Ok(_) => {}
        Err(e) => error!("Thumbnail purge failed: {:#}", e),
    }
}
