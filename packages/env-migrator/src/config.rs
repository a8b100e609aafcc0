use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docstore_client::DocStoreClient;
use dotenvy::dotenv;
use std::env;

use crate::environment::{Environment, TableNaming, DEFAULT_STORE_TIMEOUT};
use crate::store::HttpDocumentStore;
use crate::topology::Topology;
use crate::validation::ValidationSeverity;

/// Tunables shared by every component of a run. Constructed once and passed
/// by reference; nothing reads ambient state after startup.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Field holding a record's primary identity
    pub id_field: String,
    /// Audit fields overwritten with the migration time
    pub timestamp_fields: Vec<String>,
    pub page_size: usize,
    pub preflight_sample_size: usize,
    pub integrity_sample_size: usize,
    pub dry_run_sample_size: usize,
    /// Records per second assumed by dry-run estimates
    pub throughput_per_sec: f64,
    pub validation_severity: ValidationSeverity,
    pub store_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            timestamp_fields: vec!["createdAt".to_string(), "updatedAt".to_string()],
            page_size: 100,
            preflight_sample_size: 100,
            integrity_sample_size: 100,
            dry_run_sample_size: 5,
            throughput_per_sec: 10.0,
            validation_severity: ValidationSeverity::Warn,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl EngineSettings {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_validation_severity(mut self, severity: ValidationSeverity) -> Self {
        self.validation_severity = severity;
        self
    }

    pub fn with_integrity_sample_size(mut self, size: usize) -> Self {
        self.integrity_sample_size = size;
        self
    }

    pub fn with_throughput(mut self, records_per_sec: f64) -> Self {
        self.throughput_per_sec = records_per_sec;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

/// Connection details for one side of the migration.
#[derive(Clone)]
pub struct EnvironmentConfig {
    pub name: String,
    pub store_url: String,
    pub store_token: String,
    pub naming: TableNaming,
}

impl fmt::Debug for EnvironmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentConfig")
            .field("name", &self.name)
            .field("store_url", &self.store_url)
            .field("store_token", &"<redacted>")
            .field("naming", &self.naming)
            .finish()
    }
}

impl EnvironmentConfig {
    fn from_env(side: &str) -> Result<Self> {
        let var = |key: &str| format!("{}_{}", side, key);
        Ok(Self {
            name: env::var(var("ENV")).with_context(|| format!("{} must be set", var("ENV")))?,
            store_url: env::var(var("STORE_URL"))
                .with_context(|| format!("{} must be set", var("STORE_URL")))?,
            store_token: env::var(var("STORE_TOKEN"))
                .with_context(|| format!("{} must be set", var("STORE_TOKEN")))?,
            naming: TableNaming::new(
                env::var(var("TABLE_PREFIX")).unwrap_or_default(),
                env::var(var("TABLE_SUFFIX")).unwrap_or_default(),
            ),
        })
    }

    /// Build the environment handle over the REST store.
    pub fn connect(&self, timeout: Duration) -> Environment {
        let client = DocStoreClient::new(self.store_url.clone(), self.store_token.clone());
        Environment::new(self.name.clone(), Arc::new(HttpDocumentStore::new(client)))
            .with_naming(self.naming.clone())
            .with_timeout(timeout)
    }
}

/// Migration configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source: EnvironmentConfig,
    pub target: EnvironmentConfig,
    pub artifact_dir: PathBuf,
    pub topology_file: Option<PathBuf>,
    pub settings: EngineSettings,
}

impl MigrationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = EngineSettings::default();
        let settings = EngineSettings {
            page_size: parse_var("PAGE_SIZE", defaults.page_size)?,
            preflight_sample_size: parse_var("PREFLIGHT_SAMPLE_SIZE", defaults.preflight_sample_size)?,
            integrity_sample_size: parse_var("INTEGRITY_SAMPLE_SIZE", defaults.integrity_sample_size)?,
            dry_run_sample_size: parse_var("DRY_RUN_SAMPLE_SIZE", defaults.dry_run_sample_size)?,
            throughput_per_sec: parse_var("THROUGHPUT_PER_SEC", defaults.throughput_per_sec)?,
            validation_severity: match env::var("VALIDATION_SEVERITY") {
                Ok(raw) => raw
                    .parse()
                    .map_err(anyhow::Error::msg)
                    .context("VALIDATION_SEVERITY must be 'warn' or 'fatal'")?,
                Err(_) => defaults.validation_severity,
            },
            store_timeout: Duration::from_secs(parse_var(
                "STORE_TIMEOUT_SECS",
                defaults.store_timeout.as_secs(),
            )?),
            ..defaults
        };

        let config = Self {
            source: EnvironmentConfig::from_env("SOURCE")?,
            target: EnvironmentConfig::from_env("TARGET")?,
            artifact_dir: env::var("ARTIFACT_DIR")
                .unwrap_or_else(|_| "./migration-artifacts".to_string())
                .into(),
            topology_file: env::var("TOPOLOGY_FILE").ok().map(PathBuf::from),
            settings,
        };

        if config.source.name == config.target.name && config.source.store_url == config.target.store_url {
            anyhow::bail!(
                "source and target both point at '{}' ({})",
                config.source.name,
                config.source.store_url
            );
        }
        Ok(config)
    }

    /// The configured topology file, or the standard table set.
    pub fn load_topology(&self) -> Result<Topology> {
        load_topology(self.topology_file.as_deref())
    }
}

/// Topology from `TOPOLOGY_FILE` alone; needs no environment credentials.
pub fn topology_from_env() -> Result<Topology> {
    let _ = dotenv();
    let path = env::var("TOPOLOGY_FILE").ok().map(PathBuf::from);
    load_topology(path.as_deref())
}

fn load_topology(path: Option<&Path>) -> Result<Topology> {
    match path {
        Some(path) => Topology::from_json_file(path)
            .with_context(|| format!("Failed to load topology from {}", path.display())),
        None => Ok(Topology::standard()),
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}
