//! Application configuration for SeoForge.
//!
//! User config lives at `~/.seoforge/seoforge.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: each section names the environment
//! variable that holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoforgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seoforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seoforge";

// ---------------------------------------------------------------------------
// Config structs (matching seoforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-user workspace storage.
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// SpyFu ranking-data API.
    #[serde(default)]
    pub spyfu: SpyfuConfig,

    /// Anthropic generation settings.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Blog pipeline behaviour.
    #[serde(default)]
    pub blog: BlogConfig,

    /// Markdown-to-document conversion.
    #[serde(default)]
    pub converter: ConverterConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// CORS origins. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".into()
}

/// `[workspace]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory holding one subtree per user.
    #[serde(default = "default_workspace_root")]
    pub root: String,

    /// Run ledger database path. Defaults to `<root>/ledger.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            ledger_path: None,
        }
    }
}

impl WorkspaceConfig {
    /// Resolved ledger database path.
    pub fn ledger_path(&self) -> PathBuf {
        match &self.ledger_path {
            Some(p) => PathBuf::from(p),
            None => PathBuf::from(&self.root).join("ledger.db"),
        }
    }
}

fn default_workspace_root() -> String {
    "outputs".into()
}

/// `[spyfu]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpyfuConfig {
    /// API origin.
    #[serde(default = "default_spyfu_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API id.
    #[serde(default = "default_spyfu_id_env")]
    pub api_id_env: String,

    /// Name of the env var holding the secret key.
    #[serde(default = "default_spyfu_secret_env")]
    pub secret_key_env: String,

    /// Locale for all ranking queries.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Page size for newly-ranked keyword queries.
    #[serde(default = "default_ranking_page_size")]
    pub ranking_page_size: u32,

    /// Page size for the top-competitors query.
    #[serde(default = "default_competitor_page_size")]
    pub competitor_page_size: u32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_spyfu_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpyfuConfig {
    fn default() -> Self {
        Self {
            base_url: default_spyfu_base_url(),
            api_id_env: default_spyfu_id_env(),
            secret_key_env: default_spyfu_secret_env(),
            country_code: default_country_code(),
            ranking_page_size: default_ranking_page_size(),
            competitor_page_size: default_competitor_page_size(),
            timeout_secs: default_spyfu_timeout(),
        }
    }
}

fn default_spyfu_base_url() -> String {
    "https://www.spyfu.com".into()
}
fn default_spyfu_id_env() -> String {
    "SPYFU_API_ID".into()
}
fn default_spyfu_secret_env() -> String {
    "SPYFU_SECRET_KEY".into()
}
fn default_country_code() -> String {
    "IN".into()
}
fn default_ranking_page_size() -> u32 {
    10
}
fn default_competitor_page_size() -> u32 {
    5
}
fn default_spyfu_timeout() -> u64 {
    30
}

/// `[anthropic]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,

    /// API origin.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model used for every stage.
    #[serde(default = "default_model")]
    pub model: String,

    /// Output token cap per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_anthropic_timeout")]
    pub timeout_secs: u64,

    /// Web searches allowed per research call.
    #[serde(default = "default_max_searches")]
    pub max_searches: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_anthropic_key_env(),
            base_url: default_anthropic_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_anthropic_timeout(),
            max_searches: default_max_searches(),
        }
    }
}

fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_anthropic_timeout() -> u64 {
    300
}
fn default_max_searches() -> u32 {
    5
}

/// `[blog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogConfig {
    /// Run a web-search research call before drafting the post.
    #[serde(default = "default_true")]
    pub search_augmented: bool,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            search_augmented: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[converter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Conversion executable (pandoc-compatible CLI).
    #[serde(default = "default_converter_command")]
    pub command: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            command: default_converter_command(),
        }
    }
}

fn default_converter_command() -> String {
    "pandoc".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seoforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeoforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seoforge/seoforge.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SeoforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SeoforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeoforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named environment variable. Fails if unset or empty.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(SeoforgeError::config(format!(
            "{var_name} is not set. Export it in the server environment."
        ))),
    }
}
