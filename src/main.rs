use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackrelay::config::{Config, LoggingConfig};
use trackrelay::feed::UpdateWatcher;
use trackrelay::fetcher::RemoteFetcher;
use trackrelay::models::SiteResponse;
use trackrelay::server::RelayServer;
use trackrelay::site::SiteRegistry;

#[derive(Parser)]
#[command(
    name = "trackrelay",
    version,
    about = "Caching long-poll relay for conference tracker status",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults to TRACKRELAY_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Serve(ServeArgs),

    /// Fetch one conference's status through the cache and print it
    Fetch {
        /// Conference URL
        conference: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Listening address (overrides --port)
    #[arg(long)]
    bind: Option<String>,

    /// Directory to watch for update files
    #[arg(short = 'd', long, alias = "update-directory")]
    watch_directory: Option<PathBuf>,

    /// File to write the process id into
    #[arg(long)]
    pid_file: Option<String>,

    /// Disable per-request logging
    #[arg(long)]
    no_request_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    if let Commands::Serve(args) = &cli.command {
        apply_serve_args(&mut config, args)?;
    }

    // Initialize tracing/logging
    setup_tracing(&config, cli.verbose)?;

    match cli.command {
        Commands::Serve(_) => {
            config.validate()?;
            serve(config).await?;
        }

        Commands::Fetch { conference } => {
            config.validate()?;
            fetch(config, conference).await?;
        }
    }

    Ok(())
}

fn apply_serve_args(config: &mut Config, args: &ServeArgs) -> Result<()> {
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind
            .parse()
            .with_context(|| format!("Invalid bind address: {bind}"))?;
    } else if let Some(port) = args.port {
        config.server.bind_address.set_port(port);
    }

    if args.watch_directory.is_some() {
        config.feed.watch_directory.clone_from(&args.watch_directory);
    }
    if args.pid_file.is_some() {
        config.server.pid_file.clone_from(&args.pid_file);
    }
    if args.no_request_log {
        config.server.enable_request_logging = false;
    }

    Ok(())
}

/// Tracing filter directives for the configured level
///
/// Request spans from `TraceLayer` are emitted at debug level, so they need
/// their own directive whenever request logging is on.
fn log_filter(logging: &LoggingConfig, request_logging: bool, verbose: bool) -> String {
    if verbose {
        return String::from("trackrelay=debug,tower_http=debug,info");
    }

    let mut filter = format!("trackrelay={}", logging.level);
    if request_logging {
        filter.push_str(",tower_http=debug");
    }
    filter.push_str(",warn");
    filter
}

fn setup_tracing(config: &Config, verbose: bool) -> Result<()> {
    let filter = log_filter(
        &config.logging,
        config.server.enable_request_logging,
        verbose,
    );
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .with_context(|| format!("Invalid log level: {}", config.logging.level))?;

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

fn build_registry(config: &Config) -> Result<Arc<SiteRegistry>> {
    let fetcher = RemoteFetcher::new(config.site.fetch_timeout())
        .context("Failed to create HTTP client")?;
    Ok(Arc::new(SiteRegistry::new(
        Arc::new(fetcher),
        config.site.clone(),
    )))
}

async fn serve(config: Config) -> Result<()> {
    let registry = build_registry(&config)?;

    // Held for the server's lifetime; dropping it stops the watch
    let _watcher = match &config.feed.watch_directory {
        Some(dir) => Some(
            UpdateWatcher::start(dir, Arc::clone(&registry))
                .with_context(|| format!("Failed to watch {}", dir.display()))?,
        ),
        None => None,
    };

    let server = RelayServer::new(config.server.clone(), registry)?;
    tracing::info!("{}", server.info().display());

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn fetch(config: Config, conference: String) -> Result<()> {
    let registry = build_registry(&config)?;
    let site = registry.site(&conference, None)?;
    let status = site.status().await;

    println!("{}", serde_json::to_string_pretty(&SiteResponse::from(&status))?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
