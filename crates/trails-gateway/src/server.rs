use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use trails_common::{Error, Result};
use trails_config::{AppConfig, ConfigLoader};
use trails_db::{Migrator, SqliteStore, hoa_migrations};

use crate::router::build_router;
use crate::state::AppState;

/// The gateway server: prepares the database, then binds and serves the API.
pub struct GatewayServer {
    config: AppConfig,
    db_path: PathBuf,
}

impl GatewayServer {
    /// Database path resolved against the default config directory.
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.database_path(ConfigLoader::new().config_dir());
        Self { config, db_path }
    }

    pub fn with_database_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        // Migrate before binding.
        let store = self.open_store()?;

        let state = Arc::new(AppState::new(store));
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("Jackson Trails gateway listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        Ok(())
    }

    fn open_store(&self) -> Result<SqliteStore> {
        if let Some(dir) = self.db_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!(
                    "failed to create data directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let store = SqliteStore::open(&self.db_path)?;
        if self.config.database.automigrate {
            let applied = Migrator::new(hoa_migrations())?.apply_all(&store)?;
            info!("automigrate applied {} migration(s)", applied.len());
        } else {
            info!("automigrate disabled, serving the schema as found");
        }
        Ok(store)
    }
}
