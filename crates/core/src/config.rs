use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub experiments: ExperimentDefaults,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which [`TestStore`](crate::TestStore) implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: "postgresql://localhost/autoani".to_string(),
            max_connections: 10,
        }
    }
}

/// Defaults applied to tests created without explicit statistical settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDefaults {
    pub confidence_level: f64,
    pub min_sample_size: u64,
    #[serde(default)]
    pub max_duration_days: Option<u32>,
}

impl Default for ExperimentDefaults {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            min_sample_size: 1000,
            max_duration_days: None,
        }
    }
}

impl ExperimentDefaults {
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_days.map(|d| Duration::days(i64::from(d)))
    }
}

/// Periodic auto-conclusion sweep over running tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Six-field cron expression (with seconds).
    pub cron_schedule: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron_schedule: "0 */5 * * * *".to_string(),
        }
    }
}
