//! Run the dogemap crawler until Ctrl-C.
//!
//! The node key is read from the `KEY` environment variable (32 bytes of hex).

use clap::Parser;
use dogemap_crawler::{
    CrawlerBuilder, NodeKey, NodeRegistry, PeerAddress, RegistryConfig, DEFAULT_PORT,
    DEFAULT_RETENTION_DAYS,
};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage directory.
    #[arg(long, default_value = "./storage")]
    dir: PathBuf,

    /// SQLite database file, relative paths are inside the storage directory.
    #[arg(long, default_value = "dogemap.db")]
    db: PathBuf,

    /// Local Core node to stay connected to: <ip>, <ip>:<port> or [<ipv6>]:<port>.
    #[arg(long, value_parser = parse_core)]
    core: Option<PeerAddress>,

    /// Number of opportunistic crawlers.
    #[arg(long, default_value_t = 0)]
    crawl: usize,

    /// Days a node stays in the registry without being seen.
    #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
    retention_days: u32,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_core(arg: &str) -> Result<PeerAddress, String> {
    PeerAddress::parse_with_default_port(arg, DEFAULT_PORT)
        .map_err(|e| format!("{e} (use [<ip>]:<port> for IPv6)"))
}

/// Read the node key and scrub it from the environment.
fn key_from_env() -> Result<NodeKey, String> {
    let hex = std::env::var("KEY").map_err(|_| {
        "Missing KEY env-var: node private key (32 bytes of hex)".to_string()
    })?;
    std::env::remove_var("KEY");
    NodeKey::from_hex(&hex).map_err(|e| format!("Invalid KEY env-var: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    if let Err(e) = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()
    {
        eprintln!("Failed to install logger: {e}");
        return ExitCode::FAILURE;
    }

    if !args.dir.is_dir() {
        log::error!("--dir: not a directory: {}", args.dir.display());
        return ExitCode::FAILURE;
    }

    let node_key = match key_from_env() {
        Ok(key) => key,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(3);
        }
    };

    let db_path = args.dir.join(&args.db);
    let registry = match NodeRegistry::open(&db_path, RegistryConfig::default(), None) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("Error opening database {}: {e}", db_path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut builder = CrawlerBuilder::new(registry)
        .with_workers(args.crawl)
        .with_node_key(node_key);
    if let Some(core) = args.core {
        log::debug!("Staying connected to local node {core}");
        builder = match builder.with_pinned_peer(core) {
            Ok(builder) => builder,
            Err(e) => {
                log::error!("--core: {e}");
                return ExitCode::FAILURE;
            }
        };
    }
    builder = match builder.with_retention_days(args.retention_days) {
        Ok(builder) => builder,
        Err(e) => {
            log::error!("--retention-days: {e}");
            return ExitCode::FAILURE;
        }
    };

    let crawler = builder.build();
    log::info!("CRAWLING THE DOGECOIN NETWORK");
    let tasks = crawler.spawn();

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {e}");
    }
    log::info!("Shutting down");
    tasks.shutdown().await;

    match crawler.registry().stats().await {
        Ok(stats) => log::info!("{} nodes in registry, {} fresh", stats.total, stats.fresh),
        Err(e) => log::warn!("Registry stats unavailable: {e}"),
    }
    println!("finished.");
    ExitCode::SUCCESS
}
