use std::env;
use std::path::PathBuf;
use std::process;

use arca::config::Config;
use arca::db::Database;
use arca::index::ArchiveIndex;
use arca::ingest::{FileOutcomeKind, IngestProgress, IngestService};
use arca::profile::WorkerProfile;
use arca::store::ArchiveStore;

#[tokio::main]
async fn main() {
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    let cli = match parse_args(&args[1..]) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!("Usage: {} <source>... [--into <collection>] [--json]", args[0]);
            eprintln!("Example: {} /Volumes/NAS/photos --into family-2019", args[0]);
            process::exit(2);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

struct CliArgs {
    roots: Vec<PathBuf>,
    collection_id: String,
    /// Emit events as JSON lines instead of human-readable output
    json: bool,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut roots = Vec::new();
    let mut collection_id = "default".to_string();
    let mut json = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--into" {
            collection_id = iter
                .next()
                .ok_or_else(|| "--into requires a collection name".to_string())?
                .clone();
        } else if arg == "--json" {
            json = true;
        } else {
            roots.push(PathBuf::from(arg));
        }
    }

    if roots.is_empty() {
        return Err("No source paths given".to_string());
    }

    Ok(CliArgs {
        roots,
        collection_id,
        json,
    })
}

async fn run(cli: CliArgs) -> Result<(), String> {
    let config = Config::load();

    let store = ArchiveStore::new(&config.archive_root)
        .map_err(|e| format!("Failed to open archive at {:?}: {}", config.archive_root, e))?;

    let database = Database::new(&config.database_path.to_string_lossy())
        .await
        .map_err(|e| format!("Failed to open database: {}", e))?;
    let index = ArchiveIndex::new(database);

    let profile = WorkerProfile::for_tier(config.capability_tier);

    let handle = IngestService::start(store, index, profile, config.local_volumes.clone());

    let (_session_id, mut events) = handle.submit_with_events(cli.roots, cli.collection_id)?;

    while let Some(event) = events.recv().await {
        if cli.json {
            // One JSON object per line, consumable by an external sink
            let line = serde_json::to_string(&event)
                .map_err(|e| format!("Failed to serialize event: {}", e))?;
            println!("{}", line);
            if let IngestProgress::SessionFinished { status, .. } = &event {
                handle.shutdown();
                if status == "complete" {
                    return Ok(());
                }
                return Err(format!("Session finished with status {}", status));
            }
            continue;
        }

        match event {
            IngestProgress::SessionStarted { files_scanned, .. } => {
                println!("Scanned {} file(s)", files_scanned);
            }
            IngestProgress::FileCompleted {
                path,
                identity,
                outcome,
                error_reason,
                ..
            } => match outcome {
                FileOutcomeKind::Succeeded => {
                    let identity = identity.map(|i| i.to_string()).unwrap_or_default();
                    println!("  archived   {}  {}", identity, path.display());
                }
                FileOutcomeKind::Duplicate => {
                    let identity = identity.map(|i| i.to_string()).unwrap_or_default();
                    println!("  duplicate  {}  {}", identity, path.display());
                }
                FileOutcomeKind::Failed => {
                    println!(
                        "  failed     {}  ({})",
                        path.display(),
                        error_reason.unwrap_or_else(|| "unknown error".to_string())
                    );
                }
            },
            IngestProgress::SessionFinished { status, metrics, .. } => {
                println!(
                    "Session {}: {} archived, {} duplicate(s), {} failed, {} bytes in {} ms",
                    status,
                    metrics.succeeded,
                    metrics.duplicates,
                    metrics.failed,
                    metrics.bytes_processed,
                    metrics.elapsed_ms
                );
                handle.shutdown();
                if status == "complete" {
                    return Ok(());
                }
                return Err(format!("Session finished with status {}", status));
            }
        }
    }

    Err("Progress channel closed before the session finished".to_string())
}
