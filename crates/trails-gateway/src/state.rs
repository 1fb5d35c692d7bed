use std::sync::Arc;

use trails_db::SqliteStore;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub store: SqliteStore,
}

impl AppState {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

pub type SharedState = Arc<AppState>;
