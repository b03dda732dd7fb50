//! HTTP surface of the arena backend.
//!
//! [`Arena`] owns the engine and the process-wide metrics; [`Api`] turns it into
//! an axum router. Engine calls are synchronous, so every handler runs them on
//! the blocking thread pool.

use arena_execution::{Backend, Engine, Memory, Postgres, PostgresConfig};
use arena_types::Error;
use std::time::Duration;
use tracing::info;

mod api;
pub use api::Api;

mod config;
pub use config::{
    database_url_from_env, redact_database_url, BackendKind, ServerConfig,
    DEFAULT_HTTP_BODY_LIMIT_BYTES, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
};

mod metrics;
pub use metrics::{HttpMetrics, HttpMetricsSnapshot, LatencySnapshot, Operation};

mod telemetry;
pub use telemetry::{Telemetry, DEFAULT_SERVICE_NAME};

pub struct Arena {
    engine: Engine<Backend>,
    config: ServerConfig,
    http_metrics: HttpMetrics,
}

impl Arena {
    pub fn new(config: ServerConfig, engine: Engine<Backend>) -> Self {
        Self {
            engine,
            config,
            http_metrics: HttpMetrics::default(),
        }
    }

    /// Build the configured backend. Blocks while connecting to postgres.
    pub fn open(config: ServerConfig) -> Result<Self, Error> {
        let backend = match config.backend {
            BackendKind::Memory => Backend::Memory(Memory::default()),
            BackendKind::Postgres => {
                let url = config.database_url.clone().ok_or_else(|| {
                    Error::Storage("postgres backend requires a database url".to_string())
                })?;
                Backend::Postgres(Postgres::connect(&PostgresConfig {
                    url,
                    max_connections: config.max_connections,
                })?)
            }
        };
        info!(backend = backend.name(), "arena backend ready");
        Ok(Self::new(config, Engine::new(backend)))
    }

    pub fn engine(&self) -> &Engine<Backend> {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn record(&self, operation: Operation, elapsed: Duration) {
        self.http_metrics.record(operation, elapsed);
    }

    pub fn http_metrics_snapshot(&self) -> HttpMetricsSnapshot {
        self.http_metrics.snapshot()
    }
}
