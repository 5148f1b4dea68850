//! Configuration for omniwire.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (OMNIWIRE_HOME)
//! 2. Config file (.omniwire/config.yaml)
//! 3. Defaults (~/.omniwire)
//!
//! Config file discovery:
//! - Searches current directory and parents for .omniwire/config.yaml
//! - Paths in config file are relative to the project root (the parent of .omniwire/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::pipeline::ExecuteOptions;
use crate::core::retry::{Backoff, RetryFactory, SimpleRetryStrategy};
use crate::core::safety::SafetyLimits;
use crate::protocol::ReadRetry;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub read_retry: Option<RetrySettings>,
    #[serde(default)]
    pub submit_retry: Option<RetrySettings>,
    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,
    #[serde(default)]
    pub safety: Option<SafetyLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .omniwire/)
    pub home: Option<String>,
    /// Default wire config file
    pub wire: Option<String>,
    /// Default chain snapshot file
    pub snapshot: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub simulate: Option<bool>,
    pub abort_on_first_failure: Option<bool>,
}

/// Attempts and backoff of a retried operation
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(flatten)]
    pub backoff: Backoff,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl RetrySettings {
    pub fn strategy(&self) -> Result<SimpleRetryStrategy> {
        SimpleRetryStrategy::new(self.max_attempts).context("Invalid retry settings")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub simulate: bool,
    pub abort_on_first_failure: bool,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to omniwire home (run logs)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Default wire config file
    pub wire: Option<PathBuf>,
    /// Default chain snapshot file
    pub snapshot: Option<PathBuf>,
    pub read_retry: RetrySettings,
    pub submit_retry: RetrySettings,
    pub pipeline: PipelineSettings,
    pub safety: SafetyLimits,
}

impl ResolvedConfig {
    /// Read retry for the reconcilers
    pub fn read_retry(&self) -> Result<ReadRetry> {
        Ok(ReadRetry {
            strategy: self.read_retry.strategy()?,
            backoff: self.read_retry.backoff.clone(),
        })
    }

    /// Pipeline options; the confirmation timeout comes from the safety limits
    pub fn execute_options(&self) -> Result<ExecuteOptions> {
        Ok(ExecuteOptions {
            simulate: self.pipeline.simulate,
            abort_on_first_failure: self.pipeline.abort_on_first_failure,
            confirmation_timeout: self.safety.confirmation_timeout(),
            submit_retry: RetryFactory::new(self.submit_retry.strategy()?).with_backoff(self.submit_retry.backoff.clone()),
            deadline: None,
        })
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".omniwire").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a config file (if any) over the defaults
fn resolve(config_path: Option<&Path>, config: ConfigFile, default_home: PathBuf) -> ResolvedConfig {
    let omniwire_dir = config_path.and_then(Path::parent).unwrap_or(Path::new("."));
    let base_dir = omniwire_dir.parent().unwrap_or(Path::new("."));

    let home = if let Ok(env_home) = std::env::var("OMNIWIRE_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        resolve_path(omniwire_dir, home_path)
    } else {
        default_home
    };

    let pipeline = config.pipeline.unwrap_or_default();

    ResolvedConfig {
        home,
        config_file: config_path.map(Path::to_path_buf),
        wire: config.paths.wire.as_deref().map(|p| resolve_path(base_dir, p)),
        snapshot: config.paths.snapshot.as_deref().map(|p| resolve_path(base_dir, p)),
        read_retry: config.read_retry.unwrap_or_default(),
        submit_retry: config.submit_retry.unwrap_or_default(),
        pipeline: PipelineSettings {
            simulate: pipeline.simulate.unwrap_or(false),
            abort_on_first_failure: pipeline.abort_on_first_failure.unwrap_or(false),
        },
        safety: config.safety.unwrap_or_default(),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".omniwire");

    let config_file = find_config_file();
    let config = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve(config_file.as_deref(), config, default_home))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the omniwire home directory
pub fn omniwire_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the runs directory ($OMNIWIRE_HOME/runs)
pub fn runs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let omniwire_dir = temp.path().join(".omniwire");
        std::fs::create_dir_all(&omniwire_dir).unwrap();

        let config_path = omniwire_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  wire: wire.yaml
read_retry:
  max_attempts: 5
  initial_delay_ms: 10
pipeline:
  simulate: true
safety:
  max_transactions: 20
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version.as_deref(), Some("1.0"));
        assert_eq!(config.paths.wire, Some("wire.yaml".to_string()));

        let read_retry = config.read_retry.clone().unwrap();
        assert_eq!(read_retry.max_attempts, 5);
        assert_eq!(read_retry.backoff.initial_delay_ms, 10);
        assert_eq!(read_retry.backoff.max_delay_ms, 10_000);

        let safety = config.safety.clone().unwrap();
        assert_eq!(safety.max_transactions, 20);
        assert_eq!(safety.max_transactions_per_chain, 100);

        let resolved = resolve(Some(&config_path), config, PathBuf::from("/unused"));
        assert!(resolved.pipeline.simulate);
        assert!(!resolved.pipeline.abort_on_first_failure);
        assert_eq!(resolved.wire, Some(temp.path().join("wire.yaml")));
    }

    #[test]
    fn test_defaults_without_file() {
        let resolved = resolve(None, ConfigFile::default(), PathBuf::from("/home/user/.omniwire"));

        assert!(resolved.config_file.is_none());
        assert!(resolved.wire.is_none());
        assert_eq!(resolved.read_retry.max_attempts, 3);
        assert_eq!(resolved.safety.max_transactions, 200);

        let options = resolved.execute_options().unwrap();
        assert_eq!(options.confirmation_timeout.as_secs(), 300);
        assert_eq!(options.submit_retry.strategy().max_attempts(), 3);
    }

    #[test]
    fn test_zero_attempts_are_rejected() {
        let settings = RetrySettings {
            max_attempts: 0,
            backoff: Backoff::none(),
        };
        assert!(settings.strategy().is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
