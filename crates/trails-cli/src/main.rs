mod migrate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trails_config::{AppConfig, ConfigLoader, LogFormat};
use trails_gateway::GatewayServer;

use crate::migrate::MigrateCommand;

#[derive(Parser)]
#[command(name = "trails", version, about = "Jackson Trails HOA backend")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ~/.trails/config.yml
    #[arg(long, global = true, env = "TRAILS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the database file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations (unless disabled) and serve the record API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply, revert or inspect database migrations
    #[command(subcommand)]
    Migrate(MigrateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let (config, config_dir) = load_config(&cli)?;
    init_tracing(&config);

    let db_path = config.database_path(&config_dir);

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            info!(
                "starting Jackson Trails v{} on {}:{}",
                env!("CARGO_PKG_VERSION"),
                config.gateway.host,
                config.gateway.port
            );
            GatewayServer::new(config)
                .with_database_path(db_path)
                .run()
                .await
                .context("gateway failed")?;
        }
        Commands::Migrate(cmd) => migrate::run(cmd, &db_path)?,
    }

    Ok(())
}

/// Load config from `--config` or the default directory, then apply
/// `--data-dir`. Returns the config and the directory paths resolve against.
fn load_config(cli: &Cli) -> Result<(AppConfig, PathBuf)> {
    let (mut config, config_dir) = match &cli.config {
        Some(path) => {
            let config = ConfigLoader::load_explicit(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (config, dir)
        }
        None => {
            let loader = ConfigLoader::new();
            let config = loader.load().context("failed to load config")?;
            (config, loader.config_dir().to_path_buf())
        }
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok((config, config_dir))
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    match config.log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
