//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/station.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Station identifier, attached to logs and metrics
    #[serde(default = "default_station_id")]
    pub id: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self { id: default_station_id() }
    }
}

fn default_station_id() -> String {
    "station".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the command boundary (credentials may be embedded)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { base_url: default_base_url(), timeout_ms: default_backend_timeout_ms() }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:7070".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_min_code_len")]
    pub min_code_len: usize,
    /// Delay before a validation error returns to waiting
    #[serde(default = "default_error_revert_ms")]
    pub error_revert_ms: u64,
    /// Bounded wait on the hanger sensor
    #[serde(default = "default_sensor_timeout_ms")]
    pub sensor_timeout_ms: u64,
    /// Pending commands accepted while a scan is in flight
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_code_len: default_min_code_len(),
            error_revert_ms: default_error_revert_ms(),
            sensor_timeout_ms: default_sensor_timeout_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_min_code_len() -> usize {
    4
}

fn default_error_revert_ms() -> u64 {
    1500
}

fn default_sensor_timeout_ms() -> u64 {
    2000
}

fn default_queue_depth() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeypadConfig {
    #[serde(default = "default_keypad_max_len")]
    pub max_len: usize,
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self { max_len: default_keypad_max_len() }
    }
}

fn default_keypad_max_len() -> usize {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive negative samples before the link is declared down
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_failure_threshold() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub keypad: KeypadConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    station_id: String,
    backend_url: String,
    backend_timeout_ms: u64,
    min_code_len: usize,
    error_revert_ms: u64,
    sensor_timeout_ms: u64,
    queue_depth: usize,
    keypad_max_len: usize,
    link_poll_interval_ms: u64,
    link_failure_threshold: u32,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            station_id: toml_config.station.id,
            backend_url: toml_config.backend.base_url,
            backend_timeout_ms: toml_config.backend.timeout_ms,
            // A zero minimum would let empty scans through
            min_code_len: toml_config.scan.min_code_len.max(1),
            error_revert_ms: toml_config.scan.error_revert_ms,
            sensor_timeout_ms: toml_config.scan.sensor_timeout_ms,
            queue_depth: toml_config.scan.queue_depth.max(1),
            keypad_max_len: toml_config.keypad.max_len,
            link_poll_interval_ms: toml_config.link.poll_interval_ms.max(1),
            link_failure_threshold: toml_config.link.failure_threshold.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/station.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn min_code_len(&self) -> usize {
        self.min_code_len
    }

    pub fn error_revert(&self) -> Duration {
        Duration::from_millis(self.error_revert_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    pub fn keypad_max_len(&self) -> usize {
        self.keypad_max_len
    }

    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_interval_ms)
    }

    pub fn link_failure_threshold(&self) -> u32 {
        self.link_failure_threshold
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the command queue depth
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Builder method for tests to set the link debounce
    pub fn with_link_failure_threshold(mut self, threshold: u32) -> Self {
        self.link_failure_threshold = threshold.max(1);
        self
    }

    /// Builder method pointing the station at a backend URL
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station_id(), "station");
        assert_eq!(config.min_code_len(), 4);
        assert_eq!(config.error_revert(), Duration::from_millis(1500));
        assert_eq!(config.sensor_timeout(), Duration::from_millis(2000));
        assert_eq!(config.queue_depth(), 4);
        assert_eq!(config.keypad_max_len(), 24);
        assert_eq!(config.link_poll_interval(), Duration::from_secs(3));
        assert_eq!(config.link_failure_threshold(), 2);
        assert_eq!(config.metrics_interval_secs(), 30);
        assert_eq!(config.prometheus_port(), 0);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["conveyor-station".to_string()];
        // CONFIG_FILE is not set under cargo test unless the caller exports it
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/station.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "conveyor-station".to_string(),
            "--config".to_string(),
            "config/press-line.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/press-line.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["conveyor-station".to_string(), "--config=config/front.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/front.toml");
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[scan]
error_revert_ms = 800

[link]
failure_threshold = 0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());

        assert_eq!(config.error_revert(), Duration::from_millis(800));
        assert_eq!(config.min_code_len(), 4);
        assert_eq!(config.link_failure_threshold(), 1);
        assert_eq!(config.backend_url(), "http://127.0.0.1:7070");
    }
}
