use snapvault::backup::eviction::EvictionPolicy;
use snapvault::backup::SnapshotStore;
use snapvault::config::{BackupConfig, Config};
use snapvault::utils::format_time;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: snapvault <list | show <timestamp> | delete <timestamp> | stats | prune>";

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() {
    let config = Config::global();

    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let store = SnapshotStore::new(config.backup.db_path.clone());

    if let Err(e) = run(&store, &config.backup, &args).await {
        eprintln!("[snapvault] {}", e);
        std::process::exit(1);
    }
}

async fn run(store: &SnapshotStore, config: &BackupConfig, args: &[String]) -> Result<(), String> {
    let command = args.first().map(String::as_str).ok_or(USAGE)?;

    match command {
        "list" => {
            let listing = store.list().await.map_err(|e| e.to_string())?;
            if listing.is_empty() {
                println!("No snapshots in {:?}", store.db_path());
            }
            for meta in listing {
                println!("{}  {}  {} records", meta.timestamp, format_time(meta.timestamp), meta.record_count);
            }
        }
        "show" => {
            let ts = parse_timestamp(args.get(1))?;
            let info = store.info(ts).await.map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&info.payload).map_err(|e| e.to_string())?;
            println!("Snapshot {} ({}), {} records", info.timestamp, format_time(info.timestamp), info.record_count);
            println!("{}", json);
        }
        "delete" => {
            let ts = parse_timestamp(args.get(1))?;
            let removed = store.delete(ts).await.map_err(|e| e.to_string())?;
            if removed {
                println!("Deleted snapshot {}", ts);
            } else {
                println!("Snapshot {} did not exist", ts);
            }
        }
        "stats" => {
            let stats = store.stats().await.map_err(|e| e.to_string())?;
            println!("Database:   {:?}", store.db_path());
            println!("Snapshots:  {} (retention {})", stats.snapshot_count, config.retention);
            println!("Size:       {} bytes", stats.used_bytes);
            if let (Some(newest), Some(oldest)) = (stats.newest, stats.oldest) {
                println!("Newest:     {}", format_time(newest));
                println!("Oldest:     {}", format_time(oldest));
            }
        }
        "prune" => {
            let policy = EvictionPolicy::new(config.retention, config.eviction_scan_slack);
            let removed = policy.prune_all(store).await.map_err(|e| e.to_string())?;
            println!("Pruned {} snapshot(s), keeping the newest {}", removed, policy.retention());
        }
        other => return Err(format!("unknown command '{}'\n{}", other, USAGE)),
    }

    Ok(())
}

fn parse_timestamp(arg: Option<&String>) -> Result<i64, String> {
    let raw = arg.ok_or_else(|| format!("missing timestamp\n{}", USAGE))?;
    raw.parse::<i64>()
        .map_err(|_| format!("invalid timestamp '{}'", raw))
}
