//! Configuration for the coordinator: a single `CoordinatorConfig` loaded
//! from built-in defaults, then a user file, a project file, a local
//! override file, and environment variables, in that precedence order.
//!
//! 1. Built-in defaults (lowest precedence)
//! 2. `~/.config/blobcoord/config.toml` (user defaults)
//! 3. `coordinator.toml` (git-tracked, project config)
//! 4. `coordinator.local.toml` (gitignored, local overrides)
//! 5. Environment variables, `BC_` prefix (highest precedence)

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root coordinator configuration, covering both spec.md §6's recognized
/// options and the ambient additions SPEC_FULL.md §6.4 layers on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub server: ServerConfig,
    pub get: GetConfig,
    pub pool: PoolConfig,
    pub observability: ObservabilityConfig,
}

/// HTTP ingress thread and lifecycle settings (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server_port: u16,
    pub so_backlog: u32,
    pub boss_thread_count: usize,
    pub worker_thread_count: usize,
    pub idle_time_seconds: u64,
    pub startup_wait_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 1174,
            so_backlog: 1024,
            boss_thread_count: 1,
            worker_thread_count: 4,
            idle_time_seconds: 60,
            startup_wait_seconds: 5,
        }
    }
}

impl ServerConfig {
    pub fn idle_time(&self) -> Duration {
        Duration::from_secs(self.idle_time_seconds)
    }

    pub fn startup_wait(&self) -> Duration {
        Duration::from_secs(self.startup_wait_seconds)
    }
}

/// Get-operation quorum knobs (spec.md §6, defaults from §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GetConfig {
    pub get_parallelism: usize,
    pub get_success_target: usize,
    /// Not a recognized option in spec.md §6 directly, but every
    /// `Coordinator::get_*` call needs a deadline; the ingress uses this
    /// as the default when a caller doesn't override it.
    pub operation_timeout_ms: u64,
}

impl Default for GetConfig {
    fn default() -> Self {
        Self {
            get_parallelism: 2,
            get_success_target: 1,
            operation_timeout_ms: 5000,
        }
    }
}

impl GetConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// **[AMBIENT]** connection pool sizing, left to "the pool" by spec.md.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub connection_pool_size_per_replica: usize,
    pub checkout_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connection_pool_size_per_replica: 4,
            checkout_timeout_ms: 500,
        }
    }
}

impl PoolConfig {
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

/// **[AMBIENT]** logging and a secondary metrics/health listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_bind_address: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_bind_address: Some("127.0.0.1:9464".parse().expect("valid default bind address")),
        }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from the default locations.
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    /// Loads configuration rooted at a specific project directory.
    pub fn load_from_dir(project_dir: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Validates cross-field invariants the source types cannot express
    /// (`get_parallelism >= 1`, `get_success_target >= 1`,
    /// `idle_time_seconds > 0`). Invalid values are a `ConfigError`, not a
    /// panic, so a bad file or env var surfaces as a clean startup failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.get.get_parallelism < 1 {
            return Err(ConfigError::ValidationError("get.get_parallelism must be >= 1".to_string()));
        }
        if self.get.get_success_target < 1 {
            return Err(ConfigError::ValidationError("get.get_success_target must be >= 1".to_string()));
        }
        if self.server.idle_time_seconds == 0 {
            return Err(ConfigError::ValidationError("server.idle_time_seconds must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.server.server_port))
    }
}
