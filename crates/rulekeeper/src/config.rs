//! Configuration management for rulekeeper.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::privacy::FilterMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the platform config dir.
const CONFIG_DIR_NAME: &str = "rulekeeper";

/// Default data directory name under the home directory.
const DATA_DIR_NAME: &str = ".rulekeeper";

const GLOBAL_RULES_FILE_NAME: &str = "global-rules.md";
const PROJECTS_FILE_NAME: &str = "projects.json";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const POSTMORTEM_DB_FILE_NAME: &str = "postmortems.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. The bare `PORT` environment variable (server port only)
/// 2. Environment variables prefixed with `RULEKEEPER_`, sections separated
///    by `__` (e.g. `RULEKEEPER_LLM__MODEL`)
/// 3. TOML config file at `~/.config/rulekeeper/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Project scanning configuration.
    pub scan: ScanConfig,
    /// LLM configuration.
    pub llm: LlmConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory of static UI assets served for non-API paths.
    pub static_dir: Option<PathBuf>,
    /// Origins allowed by CORS. `*` allows any origin.
    pub cors_allowed_origins: Vec<String>,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding global rules, the project list, credentials and
    /// the postmortem database. Defaults to `~/.rulekeeper`.
    pub data_dir: Option<PathBuf>,
}

/// Project scanning and file listing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan paths written to `projects.json` the first time it is created.
    pub default_paths: Vec<PathBuf>,
    /// Entries whose presence marks a directory as a project.
    pub project_markers: Vec<String>,
    /// Rules directory, relative to the project root.
    pub rules_dir: PathBuf,
    /// Extensions (with leading dot) recognized as rule files.
    pub rule_extensions: Vec<String>,
    /// Maximum directory depth for the file picker.
    pub file_list_max_depth: usize,
    /// Maximum number of files returned by the file picker.
    pub file_list_limit: usize,
    /// Directory names skipped by the file picker.
    pub file_list_ignored: Vec<String>,
}

/// Chat-completion API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum tokens in a completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Environment variable consulted when no key is stored.
    pub api_key_env: String,
    /// Redact secrets from text before it leaves the machine.
    pub redact_secrets: bool,
    /// What to do with a detected secret: `redact`, `block` or `warn_only`.
    pub redaction_mode: FilterMode,
    /// Extra regexes treated as secrets on top of the built-in ones.
    pub secret_patterns: Vec<String>,
    /// Text that replaces a redacted secret.
    pub redaction_placeholder: String,
    /// How many postmortems feed a project-wide pattern analysis.
    pub postmortem_history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3847,
            static_dir: None,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_paths: default_scan_paths(),
            project_markers: vec![".cursor".to_string(), ".git".to_string()],
            rules_dir: PathBuf::from(".cursor").join("rules"),
            rule_extensions: vec![".mdc".to_string(), ".md".to_string()],
            file_list_max_depth: 5,
            file_list_limit: 200,
            file_list_ignored: default_ignored_dirs(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_tokens: 2000,
            temperature: 0.2,
            api_key_env: "OPENAI_API_KEY".to_string(),
            redact_secrets: true,
            redaction_mode: FilterMode::Redact,
            secret_patterns: Vec::new(),
            redaction_placeholder: "[REDACTED]".to_string(),
            postmortem_history_limit: 20,
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Default scan paths: `~/code`, `~/projects`, `~/dev`.
fn default_scan_paths() -> Vec<PathBuf> {
    let home = home_dir();
    vec![home.join("code"), home.join("projects"), home.join("dev")]
}

/// Directories the file picker never descends into.
fn default_ignored_dirs() -> Vec<String> {
    ["node_modules", ".git", ".next", "dist", "build", ".cursor"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("RULEKEEPER_").split("__"))
            .merge(Env::raw().only(&["port"]).map(|_| "server.port".into()));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        home_dir().join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.scan.file_list_limit == 0 {
            return Err(validation("scan.file_list_limit must be greater than 0"));
        }

        if self.scan.file_list_max_depth == 0 {
            return Err(validation(
                "scan.file_list_max_depth must be greater than 0",
            ));
        }

        if self.scan.rule_extensions.is_empty() {
            return Err(validation("scan.rule_extensions cannot be empty"));
        }

        if let Some(ext) = self
            .scan
            .rule_extensions
            .iter()
            .find(|ext| !ext.starts_with('.'))
        {
            return Err(validation(format!(
                "rule extension '{ext}' must start with a dot"
            )));
        }

        if self.scan.rules_dir.is_absolute() {
            return Err(validation("scan.rules_dir must be relative"));
        }

        if !(self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://"))
        {
            return Err(validation(format!(
                "llm.base_url must be an http(s) URL, got '{}'",
                self.llm.base_url
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(validation("llm.timeout_secs must be greater than 0"));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(validation(format!(
                "llm.temperature ({}) must be between 0.0 and 2.0",
                self.llm.temperature
            )));
        }

        if let Some((pattern, e)) = self
            .llm
            .secret_patterns
            .iter()
            .find_map(|p| regex::Regex::new(p).err().map(|e| (p, e)))
        {
            return Err(validation(format!(
                "llm.secret_patterns entry '{pattern}' is not a valid regex: {e}"
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(validation("llm.model cannot be empty"));
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Path of the global rules Markdown file.
    #[must_use]
    pub fn global_rules_path(&self) -> PathBuf {
        self.data_dir().join(GLOBAL_RULES_FILE_NAME)
    }

    /// Path of the project list / scan path JSON file.
    #[must_use]
    pub fn projects_path(&self) -> PathBuf {
        self.data_dir().join(PROJECTS_FILE_NAME)
    }

    /// Path of the encrypted credentials file.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir().join(CREDENTIALS_FILE_NAME)
    }

    /// Path of the postmortem database.
    #[must_use]
    pub fn postmortem_db_path(&self) -> PathBuf {
        self.data_dir().join(POSTMORTEM_DB_FILE_NAME)
    }

    /// Socket address the server binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip = match self.server.host.as_str() {
            "localhost" => std::net::IpAddr::from([127, 0, 0, 1]),
            host => host
                .parse()
                .map_err(|_| validation(format!("server.host '{host}' is not an IP address")))?,
        };
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Get the LLM request timeout as a Duration.
    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

fn validation(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
