use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};

use worthboard::{
    config::Config,
    server::{run_server, AppState, ServerConfig},
};

#[derive(Parser)]
#[command(
    name = "worthboard",
    about = "Per-address net worth scores, cached per visit and ranked on a leaderboard."
)]
struct Cli {
    /// Balance RPC URL
    #[arg(long, global = true, env = "INFURA_URL")]
    rpc_url: Option<String>,

    /// Postgres URL for user records (in-memory when unset)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis URL for the score cache (in-process when unset)
    #[arg(long, global = true, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to
        #[arg(long)]
        bind: Option<String>,

        /// Listen on 0.0.0.0:<port> (overrides --bind)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Record one visit for an address and print the result (needs a database)
    Visit {
        /// Account address (0x-prefixed)
        #[arg(long)]
        address: String,
    },

    /// Print the current leaderboard (needs a database)
    Leaderboard,
}

/// Merge CLI/env values over the config file and defaults.
fn server_config(
    cli: &Cli,
    cfg: Config,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let bind_addr = match port.or(cfg.port) {
        Some(port) => SocketAddr::from(([0, 0, 0, 0], port)),
        None => match bind.or(cfg.bind) {
            Some(bind_str) => bind_str
                .parse()
                .wrap_err_with(|| format!("Invalid bind address: {}", bind_str))?,
            None => defaults.bind_addr,
        },
    };

    Ok(ServerConfig {
        bind_addr,
        rpc_url: cli.rpc_url.clone().or(cfg.rpc_url).unwrap_or(defaults.rpc_url),
        rpc_timeout: cfg
            .rpc_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.rpc_timeout),
        database_url: cli.database_url.clone().or(cfg.database_url),
        redis_url: cli.redis_url.clone().or(cfg.redis_url),
        cache_max_entries: cfg.cache_max_entries.unwrap_or(defaults.cache_max_entries),
        max_store_attempts: cfg.max_store_attempts.unwrap_or(defaults.max_store_attempts),
        allowed_origins: cfg.allowed_origins,
    })
}

fn cmd_serve(config: ServerConfig) -> Result<()> {
    tracing::info!("starting worthboard server");
    if config.database_url.is_none() {
        tracing::info!("record store: in-memory");
    }
    if config.redis_url.is_none() {
        tracing::info!(max_entries = config.cache_max_entries, "score cache: in-process");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server(config))
}

fn cmd_visit(config: ServerConfig, address: String) -> Result<()> {
    config.require_database("visit")?;
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let state = AppState::from_config(&config).await?;
        state
            .updater
            .update(&address)
            .await
            .wrap_err_with(|| format!("Failed to update {}", address))
    })?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn cmd_leaderboard(config: ServerConfig) -> Result<()> {
    config.require_database("leaderboard")?;
    let rt = tokio::runtime::Runtime::new()?;
    let entries = rt.block_on(async {
        let state = AppState::from_config(&config).await?;
        state
            .ranker
            .rank()
            .await
            .wrap_err("Failed to read leaderboard")
    })?;

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("worthboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load();

    let result = match &cli.command {
        Commands::Serve { bind, port } => {
            server_config(&cli, cfg, bind.clone(), *port).and_then(cmd_serve)
        }
        Commands::Visit { address } => {
            server_config(&cli, cfg, None, None).and_then(|c| cmd_visit(c, address.clone()))
        }
        Commands::Leaderboard => server_config(&cli, cfg, None, None).and_then(cmd_leaderboard),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
