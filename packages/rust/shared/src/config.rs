//! Application configuration for lobgraph.
//!
//! User config lives at `~/.lobgraph/lobgraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LobGraphError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lobgraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lobgraph";

// ---------------------------------------------------------------------------
// Config structs (matching lobgraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Forum being scraped.
    #[serde(default)]
    pub forum: ForumConfig,

    /// HTTP fetch policy for forum pages.
    #[serde(default)]
    pub fetch: FetchPolicyConfig,

    /// People-search (enrichment) settings.
    #[serde(default)]
    pub search: SearchPolicyConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Export settings.
    #[serde(default)]
    pub export: ExportConfig,
}

/// `[forum]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumConfig {
    /// Forum origin, e.g. `https://lobste.rs`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent with every forum request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://lobste.rs".into()
}
fn default_user_agent() -> String {
    concat!(
        "lobgraph/",
        env!("CARGO_PKG_VERSION"),
        " (building user invitation graph visualization)"
    )
    .into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPolicyConfig {
    /// Fixed delay before every request.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Upper bound of the random extra delay added to `request_delay_ms`.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,

    /// Maximum attempts per URL.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff after a rate-limit response; doubles per attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay(),
            jitter_ms: default_jitter(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_request_delay() -> u64 {
    1500
}
fn default_jitter() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    5000
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPolicyConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// People-search endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Number of ranked candidates requested per query.
    #[serde(default = "default_num_results")]
    pub num_results: u32,

    /// Minimum delay between consecutive search calls.
    #[serde(default = "default_search_delay")]
    pub request_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchPolicyConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            num_results: default_num_results(),
            request_delay_ms: default_search_delay(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "EXA_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://api.exa.ai/search".into()
}
fn default_num_results() -> u32 {
    5
}
fn default_search_delay() -> u64 {
    500
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the database and saved forum pages.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Database file name inside `data_dir`.
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Directory the export artifacts are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            export_dir: default_export_dir(),
        }
    }
}

impl PathsConfig {
    /// Full path to the database file.
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.db_file)
    }

    /// Path of a file inside the data directory.
    pub fn data_file(&self, name: &str) -> PathBuf {
        Path::new(&self.data_dir).join(name)
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_db_file() -> String {
    "users.db".into()
}
fn default_export_dir() -> String {
    "site/data".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// How many inviters to list in `stats.top_inviters`.
    #[serde(default = "default_top_inviters")]
    pub top_inviters: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            top_inviters: default_top_inviters(),
        }
    }
}

fn default_top_inviters() -> usize {
    20
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig, handed to components)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration for the forum HTTP client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User-Agent header value.
    pub user_agent: String,
    /// Fixed delay before each attempt.
    pub request_delay: Duration,
    /// Maximum random jitter added on top of `request_delay`.
    pub jitter: Duration,
    /// Maximum attempts per URL.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `retry_backoff * 2^n`.
    pub retry_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.forum.user_agent.clone(),
            request_delay: Duration::from_millis(config.fetch.request_delay_ms),
            jitter: Duration::from_millis(config.fetch.jitter_ms),
            max_retries: config.fetch.max_retries,
            retry_backoff: Duration::from_millis(config.fetch.retry_backoff_ms),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
        }
    }
}

/// Runtime people-search configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Search endpoint URL.
    pub endpoint: String,
    /// Candidates requested per query.
    pub num_results: u32,
    /// Minimum delay between consecutive calls.
    pub request_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl From<&AppConfig> for SearchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.search.endpoint.clone(),
            num_results: config.search.num_results,
            request_delay: Duration::from_millis(config.search.request_delay_ms),
            timeout: Duration::from_secs(config.search.timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lobgraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LobGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lobgraph/lobgraph.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LobGraphError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LobGraphError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LobGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LobGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LobGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the people-search API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.search.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(LobGraphError::config(format!(
            "people-search API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://exa.ai"
        ))),
    }
}

/// Host part of the configured forum URL (e.g. `lobste.rs`).
pub fn forum_host(config: &AppConfig) -> Result<String> {
    let url = url::Url::parse(&config.forum.base_url).map_err(|e| {
        LobGraphError::config(format!("invalid forum base_url '{}': {e}", config.forum.base_url))
    })?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| LobGraphError::config("forum base_url has no host"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("EXA_API_KEY"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[forum]
base_url = "https://forum.example.org"

[fetch]
max_retries = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.forum.base_url, "https://forum.example.org");
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.request_delay_ms, 1500);
        assert_eq!(config.search.num_results, 5);
        assert_eq!(config.export.top_inviters, 20);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.max_retries, 3);
        assert_eq!(fetch.retry_backoff, Duration::from_secs(5));
        assert_eq!(fetch.request_delay, Duration::from_millis(1500));

        let search = SearchConfig::from(&app);
        assert_eq!(search.num_results, 5);
        assert_eq!(search.request_delay, Duration::from_millis(500));
    }

    #[test]
    fn db_path_joins_data_dir() {
        let paths = PathsConfig::default();
        assert_eq!(paths.db_path(), Path::new("data").join("users.db"));
        assert_eq!(paths.data_file("users.html"), Path::new("data").join("users.html"));
    }

    #[test]
    fn forum_host_extracted() {
        let app = AppConfig::default();
        assert_eq!(forum_host(&app).unwrap(), "lobste.rs");
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Unique env var name so other tests are not affected
        config.search.api_key_env = "LOBGRAPH_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
