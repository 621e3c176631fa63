use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use mediadex::db::ProcessingStatus;
use mediadex::decoder::DecoderAdapter;
use mediadex::{logging, CancelToken, Config, Database, ScanRequest, Scanner, ThumbnailService};

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Scan {
        root: PathBuf,
        full: bool,
        ignore: Vec<String>,
        project: Option<i64>,
    },
    Backfill {
        project: Option<i64>,
        limit: usize,
    },
    Thumb {
        path: PathBuf,
        height: Option<u32>,
        out: Option<PathBuf>,
    },
    Purge {
        days: Option<u32>,
    },
    ClearCache,
    Projects,
}

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

enum Parsed {
    Run(Cli),
    Help,
    Version,
}

const DEFAULT_BACKFILL_LIMIT: usize = 1000;

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{} expects a number, got {:?}", flag, raw))
}

fn parse_args_from(args: &[String]) -> Result<Parsed, String> {
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut full = false;
    let mut ignore = Vec::new();
    let mut project = None;
    let mut limit = DEFAULT_BACKFILL_LIMIT;
    let mut height = None;
    let mut out = None;
    let mut days = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(Parsed::Help),
            "--version" | "-V" => return Ok(Parsed::Version),
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value(args, &mut i, "--config")?));
            }
            "--full" => full = true,
            "--ignore" => ignore.push(value(args, &mut i, "--ignore")?.to_string()),
            "--project" | "-p" => {
                project = Some(number(value(args, &mut i, "--project")?, "--project")?);
            }
            "--limit" => limit = number(value(args, &mut i, "--limit")?, "--limit")?,
            "--height" => height = Some(number(value(args, &mut i, "--height")?, "--height")?),
            "--out" | "-o" => out = Some(PathBuf::from(value(args, &mut i, "--out")?)),
            "--days" => days = Some(number(value(args, &mut i, "--days")?, "--days")?),
            flag if flag.starts_with('-') => return Err(format!("Unknown argument: {}", flag)),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("scan") => Command::Scan {
            root: PathBuf::from(positional.next().ok_or("scan requires a root directory")?),
            full,
            ignore,
            project,
        },
        Some("backfill") => Command::Backfill { project, limit },
        Some("thumb") => Command::Thumb {
            path: PathBuf::from(positional.next().ok_or("thumb requires a file path")?),
            height,
            out,
        },
        Some("purge") => Command::Purge { days },
        Some("clear-cache") => Command::ClearCache,
        Some("projects") => Command::Projects,
        Some(other) => return Err(format!("Unknown command: {}", other)),
        None => return Err("No command given".to_string()),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    Ok(Parsed::Run(Cli {
        config_path,
        command,
    }))
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    match parse_args_from(&args) {
        Ok(Parsed::Run(cli)) => cli,
        Ok(Parsed::Help) => {
            print_help();
            std::process::exit(0);
        }
        Ok(Parsed::Version) => {
            println!("mediadex {}", env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }
        Err(message) => {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"mediadex - media tree indexer and thumbnail cache

USAGE:
    mediadex [OPTIONS] <COMMAND>

COMMANDS:
    scan <ROOT>         Index a directory tree
        --full              Re-read every file, ignoring stored modified times
        --ignore NAME       Skip directories with this name (repeatable)
        --project, -p ID    Scan into an existing project
    backfill            Retry metadata for files a scan left pending
        --project, -p ID    Only this project (default: all)
        --limit N           Files per project (default: 1000)
    thumb <FILE>        Produce a thumbnail through the cache
        --height H          Target height (default from config)
        --out, -o FILE      Write the thumbnail as PNG
    purge               Drop cached thumbnails not used recently
        --days N            Maximum age (default from config)
    clear-cache         Drop every cached thumbnail
    projects            List indexed projects

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIADEX_CONFIG     Path to config file (overrides default location)
    MEDIADEX_LOG        Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/mediadex/config.toml

See also: mediadex-daemon --help"#
    );
}

fn open_store(config: &Config) -> Result<Arc<Database>> {
    let db = Database::open(config.db_path())
        .with_context(|| format!("Failed to open store at {:?}", config.db_path()))?;
    db.initialize()?;
    Ok(Arc::new(db))
}

fn thumbnail_service(config: &Config, db: Arc<Database>) -> Result<ThumbnailService> {
    ThumbnailService::new(
        config.thumbnails.clone(),
        Arc::new(DecoderAdapter::new()),
        Some(db),
    )
}

fn run_scan(
    config: &Config,
    db: &Database,
    root: PathBuf,
    full: bool,
    ignore: Vec<String>,
    project: Option<i64>,
) -> Result<()> {
    let scanner = Scanner::with_exif(config.scanner.clone())?;
    let mut request = ScanRequest::new(root);
    if full {
        request = request.full();
    }
    if let Some(id) = project {
        request = request.in_project(id);
    }
    for name in ignore {
        request = request.ignoring(name);
    }

    let mut progress = |percent: u8, message: &str| {
        eprint!("\r{:>3}% {:<60}", percent, message);
        let _ = std::io::stderr().flush();
    };
    let summary = scanner.scan(db, &request, &mut progress, &CancelToken::new())?;
    eprintln!();

    println!("Project:        {}", summary.project_id);
    println!("Folders found:  {}", summary.folders_found);
    println!("Files indexed:  {} ({} pending)", summary.files_indexed, summary.files_pending);
    println!("Files skipped:  {}", summary.files_skipped);
    println!("Files failed:   {}", summary.files_failed);
    if summary.files_missing > 0 {
        println!("Files vanished: {}", summary.files_missing);
    }
    Ok(())
}

fn run_backfill(config: &Config, db: &Database, project: Option<i64>, limit: usize) -> Result<()> {
    let scanner = Scanner::with_exif(config.scanner.clone())?;
    let projects = match project {
        Some(id) => vec![id],
        None => db.list_projects()?.into_iter().map(|p| p.id).collect(),
    };

    for id in projects {
        let summary = scanner.backfill_pending(db, id, limit, &CancelToken::new())?;
        println!(
            "Project {}: {} attempted, {} completed, {} failed, {} still pending",
            id, summary.attempted, summary.completed, summary.failed, summary.still_pending
        );
    }
    Ok(())
}

fn run_thumb(
    config: &Config,
    db: Arc<Database>,
    path: PathBuf,
    height: Option<u32>,
    out: Option<PathBuf>,
) -> Result<()> {
    let service = thumbnail_service(config, db)?;
    let height = height.unwrap_or(config.thumbnails.default_height);
    let bitmap = service.get(&path, height, config.thumbnails.decode_timeout());

    if bitmap.is_placeholder() {
        bail!("No thumbnail could be produced for {:?}", path);
    }
    println!("{}x{}", bitmap.width(), bitmap.height());

    if let Some(out) = out {
        bitmap
            .image()
            .save_with_format(&out, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {:?}", out))?;
    }
    Ok(())
}

fn run_projects(db: &Database) -> Result<()> {
    for project in db.list_projects()? {
        let total = db.count_media_files(project.id)?;
        let pending = db.count_media_files_with_status(project.id, ProcessingStatus::Pending)?;
        let failed = db.count_media_files_with_status(project.id, ProcessingStatus::Failed)?
            + db.count_media_files_with_status(project.id, ProcessingStatus::Exhausted)?;
        println!(
            "{:>4}  {:<24} {:>8} files  {:>6} pending  {:>6} failed  {}",
            project.id, project.name, total, pending, failed, project.root_path
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = parse_args();

    logging::init_stderr()?;

    let config = match cli.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    let db = open_store(&config)?;

    match cli.command {
        Command::Scan {
            root,
            full,
            ignore,
            project,
        } => run_scan(&config, &db, root, full, ignore, project),
        Command::Backfill { project, limit } => run_backfill(&config, &db, project, limit),
        Command::Thumb { path, height, out } => run_thumb(&config, db, path, height, out),
        Command::Purge { days } => {
            let service = thumbnail_service(&config, db)?;
            let removed = service.purge_stale(days.unwrap_or(config.thumbnails.max_age_days))?;
            println!("Purged {} cached thumbnails", removed);
            Ok(())
        }
        Command::ClearCache => {
            thumbnail_service(&config, db)?.clear_all()?;
            println!("Thumbnail cache cleared");
            Ok(())
        }
        Command::Projects => run_projects(&db),
    }
}
