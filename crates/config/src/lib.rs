//! Layered configuration for tome.
//!
//! Values are resolved from, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. a config file (`config.toml`, `config.yaml` or `config.json` in the
//!    platform config directory, or whatever path is passed explicitly),
//! 3. environment variables prefixed with `TOME_`, with `__` separating
//!    nested keys (`TOME_WORKERS__COUNT=4`).
//!
//! Options left unset here fall back to the defaults of the crate that uses
//! them.

pub mod error;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tome_media::DataSource;

use crate::error::{Error, ErrorKind, Result};

pub const ENV_PREFIX: &str = "TOME_";
const CONFIG_FILE_NAMES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub workers: WorkersConfig,
    pub retry: RetryConfig,
    pub scan: ScanConfig,
    pub organize: OrganizeConfig,
    pub metadata: MetadataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `tome.db` in the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
    pub poll_interval_ms: u64,
    /// Attempts a job gets, across retries and crashed workers, before it
    /// fails for good.
    pub max_job_attempts: u32,
    pub log_retention_days: u64,
    pub housekeeping_interval_secs: u64,
}
impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 2,
            poll_interval_ms: 5_000,
            max_job_attempts: 3,
            log_retention_days: 30,
            housekeeping_interval_secs: 3_600,
        }
    }
}
impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_days * 24 * 60 * 60)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }
}

/// Backoff for catalog writes that hit a busy database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}
impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplement_extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_component_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_collision_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Source precedence, highest first. `manual` may be left out.
    pub priority: Vec<DataSource>,
    pub write_sidecars: bool,
}
impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            priority: DataSource::ALL.to_vec(),
            write_sidecars: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tome")
}

/// Where the config file is looked for when none is given.
pub fn default_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

fn file_provider(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => figment.merge(Toml::file_exact(path)),
    }
}

impl Config {
    /// Load and validate the configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(explicit)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validated()
    }

    /// Every source merged in precedence order, not yet extracted.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match explicit {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Missing(path.to_path_buf()));
                }
                tracing::debug!(path = %path.display(), "loading config file");
                file_provider(figment, path)
            },
            None => {
                let found = default_config_dir()
                    .into_iter()
                    .flat_map(|dir| CONFIG_FILE_NAMES.map(|name| dir.join(name)))
                    .find(|candidate| candidate.is_file());
                match found {
                    Some(path) => {
                        tracing::debug!(path = %path.display(), "loading config file");
                        file_provider(figment, &path)
                    },
                    None => figment,
                }
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Reject settings no component could work with.
    pub fn validated(self) -> Result<Self> {
        let invalid = |reason: &str| Error::from(ErrorKind::Invalid(reason.to_string()));
        if self.workers.count == 0 {
            return Err(invalid("workers.count must be at least 1"));
        }
        if self.workers.max_job_attempts == 0 {
            return Err(invalid("workers.max_job_attempts must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms cannot exceed retry.max_delay_ms"));
        }
        if self.scan.parse_concurrency == Some(0) {
            return Err(invalid("scan.parse_concurrency must be at least 1"));
        }
        if self.organize.max_collision_attempts == Some(0) {
            return Err(invalid("organize.max_collision_attempts must be at least 1"));
        }
        self.validate_priority()?;
        Ok(self)
    }

    fn validate_priority(&self) -> Result<()> {
        let priority = &self.metadata.priority;
        let invalid = |reason: String| Error::from(ErrorKind::Invalid(format!("metadata.priority {reason}")));
        for (i, source) in priority.iter().enumerate() {
            if priority[..i].contains(source) {
                return Err(invalid(format!("lists {source} twice")));
            }
            if *source == DataSource::Manual && i != 0 {
                return Err(invalid("must list manual first".to_string()));
            }
        }
        match DataSource::ALL.iter().find(|s| **s != DataSource::Manual && !priority.contains(s)) {
            Some(missing) => Err(invalid(format!("is missing {missing}"))),
            None => Ok(()),
        }
    }

    /// The database file, falling back to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        let dirs = project_dirs().ok_or_else(|| Error::from(ErrorKind::NoProjectDirs))?;
        Ok(dirs.data_dir().join("tome.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn extract(jail: &Jail, file: Option<&str>) -> Result<Config> {
        let path = file.map(|name| jail.directory().join(name));
        let config: Config = Config::figment(path.as_deref())?.extract().or_raise(|| ErrorKind::Load)?;
        config.validated()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default().validated().unwrap();
        assert_eq!(config.workers.count, 2);
        assert_eq!(config.metadata.priority, DataSource::ALL.to_vec());
        assert!(config.metadata.write_sidecars);
    }

    #[rstest]
    #[case("config.toml", "[workers]\ncount = 4\n[metadata]\npriority = [\"format\", \"sidecar\", \"filepath\"]\n")]
    #[case("config.yaml", "workers:\n  count: 4\nmetadata:\n  priority: [format, sidecar, filepath]\n")]
    #[case("config.json", r#"{"workers": {"count": 4}, "metadata": {"priority": ["format", "sidecar", "filepath"]}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] content: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, content)?;
            let config = extract(jail, Some(name)).unwrap();
            assert_eq!(config.workers.count, 4);
            assert_eq!(config.workers.max_job_attempts, 3);
            assert_eq!(
                config.metadata.priority,
                vec![DataSource::Format, DataSource::Sidecar, DataSource::Filepath]
            );
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[workers]\ncount = 4\n[scan]\nparse_concurrency = 2\n")?;
            jail.set_env("TOME_WORKERS__COUNT", "8");
            jail.set_env("TOME_DATABASE__PATH", "/srv/tome/catalog.db");
            let config = extract(jail, Some("config.toml")).unwrap();
            assert_eq!(config.workers.count, 8);
            assert_eq!(config.scan.parse_concurrency, Some(2));
            assert_eq!(config.database_path().unwrap(), PathBuf::from("/srv/tome/catalog.db"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let err = extract(jail, Some("nope.toml")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Missing(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("[workers]\ncount = 0\n")]
    #[case("[retry]\nmax_attempts = 0\n")]
    #[case("[retry]\nbase_delay_ms = 500\nmax_delay_ms = 100\n")]
    #[case("[metadata]\npriority = [\"sidecar\", \"sidecar\", \"format\", \"filepath\"]\n")]
    #[case("[metadata]\npriority = [\"sidecar\", \"manual\", \"format\", \"filepath\"]\n")]
    #[case("[metadata]\npriority = [\"sidecar\", \"format\"]\n")]
    fn test_invalid(#[case] content: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", content)?;
            let err = extract(jail, Some("config.toml")).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)), "{err:?}");
            Ok(())
        });
    }
}
