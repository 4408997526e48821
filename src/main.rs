//! filecast daemon entry point.
//!
//! Every file that lands in the watched directory is announced to each
//! connected client as `{"sessionId": ..., "path": ...}`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filecast::config::{Config, WatchMode};
use filecast::hub::BroadcastHub;
use filecast::server::{self, AppState};
use filecast::source::SourceAdapter;
use filecast::watcher::DirectoryWatcher;

const AURORA_BLUE: &str = "\x1b[38;5;117m";
const PULSE_CYAN: &str = "\x1b[38;5;51m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

#[derive(Parser)]
#[command(name = "filecast")]
#[command(about = "Broadcast new files in a directory to WebSocket clients")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the directory and serve the WebSocket endpoint
    Serve {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to watch (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Poll the directory instead of using native notifications
        #[arg(long)]
        poll: bool,
    },

    /// Show the current configuration
    Config {
        /// Initialize default configuration file
        #[arg(short, long)]
        init: bool,
    },

    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            dir,
            host,
            port,
            poll,
        } => {
            let mut config = load_config(config)?;
            if let Some(dir) = dir {
                config.watch_dir = dir;
            }
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if poll {
                config.watch_mode = WatchMode::Poll;
            }
            init_logging(cli.debug, cli.verbose, &config.log_level);
            run_serve(config).await?;
        }
        Commands::Config { init } => {
            manage_config(init)?;
        }
        Commands::Version => {
            println!(
                "  {}✦{} {}filecast{} {}v{}{}",
                BOLD, RESET, BOLD, RESET, AURORA_BLUE, env!("CARGO_PKG_VERSION"), RESET
            );
        }
    }

    Ok(())
}

/// Setup logging. RUST_LOG wins over the config's level; flags win over both.
fn init_logging(debug: bool, verbose: bool, config_level: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Load the config from `path`, or from the default location if present.
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {:?}", path)),
        None => {
            let default_path = Config::default_path();
            if default_path.exists() {
                Ok(Config::load(&default_path)?)
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn run_serve(config: Config) -> Result<()> {
    config
        .ensure_dirs()
        .with_context(|| format!("creating {:?}", config.watch_dir))?;

    let hub = Arc::new(BroadcastHub::new(config.overflow));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let arrivals = DirectoryWatcher::new(&config).start()?;
    let watch_dir = arrivals.dir().to_path_buf();

    let source = tokio::spawn(
        SourceAdapter::new(Arc::clone(&hub)).run(arrivals, shutdown_rx.clone()),
    );

    let state = AppState {
        hub: Arc::clone(&hub),
        watch_dir: watch_dir.clone(),
        send_queue: config.send_queue,
        shutdown: shutdown_rx.clone(),
    };
    let router = server::build_router(state, &config.ws_path);
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;

    println!("{}╭─────────────────────────────────────────────╮{}", AURORA_BLUE, RESET);
    println!("{}│{} {}✦ filecast{}", AURORA_BLUE, RESET, BOLD, RESET);
    println!("{}│{} {}📁 Watching:{} {:?}", AURORA_BLUE, RESET, DIM, RESET, watch_dir);
    println!(
        "{}│{} {}🌐 Endpoint:{} ws://{}{}",
        AURORA_BLUE, RESET, DIM, RESET, config.bind_addr(), config.ws_path
    );
    println!("{}╰─────────────────────────────────────────────╯{}", AURORA_BLUE, RESET);

    let server = tokio::spawn(server::serve(listener, router, shutdown_rx));
    info!("Daemon started successfully");

    tokio::signal::ctrl_c().await?;
    println!("  {}✦ Shutting down gracefully...{}", PULSE_CYAN, RESET);
    let _ = shutdown_tx.send(true);

    server.await??;
    let published = source.await?;
    info!(published, "Daemon stopped");

    Ok(())
}

fn manage_config(init: bool) -> Result<()> {
    let config_path = Config::default_path();

    if init {
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Config::default().save(&config_path)?;
        println!("{}✦ Configuration created at {:?}{}", PULSE_CYAN, config_path, RESET);
        return Ok(());
    }

    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        println!("{}✦ No config file found, showing defaults{}", DIM, RESET);
        Config::default()
    };
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
