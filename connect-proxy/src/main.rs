use clap::Parser;
use connect_filter::{BlacklistReloader, BlacklistStore, ReloadPolicy};
use connect_proxy::{AccessLog, ConfigLoader, ProxyServer, ProxyServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "connect-proxy")]
#[command(about = "HTTP CONNECT proxy with a live-reloaded domain blacklist")]
struct Args {
    /// Working directory holding config.toml, the blacklist and access logs
    #[arg(long, short = 'd', default_value = ".")]
    dir: PathBuf,

    /// Config file path (default: <dir>/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Listening port, overrides the config file
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Blacklist reload period in seconds, overrides the config file
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    cycle_time: Option<u64>,

    /// Blacklist file, overrides the config file
    #[arg(long, short = 'b')]
    blacklist: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = if args.verbose {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::DEBUG.into())
    } else {
        EnvFilter::from_default_env()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| ConfigLoader::default_config_path(&args.dir));
    let mut config = ConfigLoader::load_or_default(&config_path)?;

    if let Some(port) = args.port {
        config.proxy.port = port;
    }
    if let Some(cycle_time) = args.cycle_time {
        config.blacklist.cycle_time = cycle_time;
    }
    if let Some(blacklist) = args.blacklist {
        config.blacklist.path = blacklist;
    }
    let config = config.rooted_at(&args.dir);

    info!(
        "Port {}, blacklist {:?} reloaded every {:?}",
        config.proxy.port,
        config.blacklist.path,
        config.blacklist.cycle_time()
    );

    // Load the blacklist once before accepting connections, then keep it fresh
    let store = Arc::new(BlacklistStore::default());
    let policy = config.blacklist.reload_policy();
    let reloader = BlacklistReloader::new(
        config.blacklist.path.clone(),
        config.blacklist.cycle_time(),
        Arc::clone(&store),
    )
    .with_policy(policy);

    match reloader.reload().await {
        Ok(count) => info!("Loaded {} blacklist patterns", count),
        Err(e) if policy == ReloadPolicy::ExitOnError => return Err(e.into()),
        Err(e) => warn!("{}; starting with an empty blacklist", e),
    }
    let reload_task = reloader.spawn();

    let access_log = config
        .access_log
        .enabled
        .then(|| Arc::new(AccessLog::new(config.access_log.dir.clone())));

    let server = ProxyServer::new(ProxyServerConfig {
        listen_addr: config.proxy.listen_addr(),
        store,
        connect_timeout: config.proxy.connect_timeout(),
        access_log,
    });

    tokio::select! {
        result = server.start() => result?,
        result = reload_task => {
            result??;
            anyhow::bail!("Blacklist reloader stopped");
        }
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
