//! Application state shared across handlers

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::events::EventBus;
use crate::integrations::Transports;
use crate::messaging::Dispatcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub event_bus: Arc<EventBus>,
    pub dispatcher: Dispatcher,
    pub config: Arc<Config>,
}

impl AppState {
    /// State with the HTTP transports described by `config`
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let transports = Transports::from_config(&config);
        Self::with_transports(pool, config, transports)
    }

    pub fn with_transports(pool: SqlitePool, config: Config, transports: Transports) -> Self {
        let dispatcher = Dispatcher::from_config(pool.clone(), transports, &config);

        Self {
            pool,
            event_bus: Arc::new(EventBus::new()),
            dispatcher,
            config: Arc::new(config),
        }
    }
}
