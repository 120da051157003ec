//! Runtime configuration.
//!
//! Values are layered, later layers winning: built-in defaults, then an
//! optional TOML file (`tawar.toml` or `config/tawar.toml`, with `${VAR}`
//! environment interpolation), then `TAWAR_*` environment variables, then
//! programmatic overrides. The merged result is validated before anything
//! else starts.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::NegotiationTuning;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub negotiation: NegotiationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NegotiationConfig {
    pub net_discount_pct: u8,
    pub accept_threshold_pct: u8,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tawar.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
                temperature: 0.7,
                max_tokens: 150,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            negotiation: NegotiationConfig { net_discount_pct: 5, accept_threshold_pct: 80 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_file(options.config_path.as_deref()) {
            Some(path) => config.merge_file(&path)?,
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from("tawar.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let expanded = expand_env_refs(&raw)?;
        let file: FileConfig = toml::from_str(&expanded)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;

        self.database.merge_file(file.database);
        self.llm.merge_file(file.llm);
        self.server.merge_file(file.server);
        self.negotiation.merge_file(file.negotiation);
        self.logging.merge_file(file.logging);
        Ok(())
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        let db = &mut self.database;
        take(&mut db.url, env_string("TAWAR_DATABASE_URL"));
        take(&mut db.max_connections, env_parsed("TAWAR_DATABASE_MAX_CONNECTIONS")?);
        take(&mut db.timeout_secs, env_parsed("TAWAR_DATABASE_TIMEOUT_SECS")?);

        let llm = &mut self.llm;
        take(&mut llm.provider, env_parsed("TAWAR_LLM_PROVIDER")?);
        if let Some(key) = env_string("TAWAR_LLM_API_KEY") {
            llm.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = env_string("TAWAR_LLM_BASE_URL") {
            llm.base_url = Some(url);
        }
        take(&mut llm.model, env_string("TAWAR_LLM_MODEL"));
        take(&mut llm.timeout_secs, env_parsed("TAWAR_LLM_TIMEOUT_SECS")?);
        take(&mut llm.max_retries, env_parsed("TAWAR_LLM_MAX_RETRIES")?);
        take(&mut llm.temperature, env_parsed("TAWAR_LLM_TEMPERATURE")?);
        take(&mut llm.max_tokens, env_parsed("TAWAR_LLM_MAX_TOKENS")?);

        let server = &mut self.server;
        take(&mut server.bind_address, env_string("TAWAR_SERVER_BIND_ADDRESS"));
        take(&mut server.port, env_parsed("TAWAR_SERVER_PORT")?);
        take(&mut server.graceful_shutdown_secs, env_parsed("TAWAR_SERVER_GRACEFUL_SHUTDOWN_SECS")?);

        let negotiation = &mut self.negotiation;
        take(&mut negotiation.net_discount_pct, env_parsed("TAWAR_NEGOTIATION_NET_DISCOUNT_PCT")?);
        take(
            &mut negotiation.accept_threshold_pct,
            env_parsed("TAWAR_NEGOTIATION_ACCEPT_THRESHOLD_PCT")?,
        );

        // Short aliases kept for operator muscle memory.
        let logging = &mut self.logging;
        take(
            &mut logging.level,
            env_string("TAWAR_LOGGING_LEVEL").or_else(|| env_string("TAWAR_LOG_LEVEL")),
        );
        let format = match env_parsed("TAWAR_LOGGING_FORMAT")? {
            some @ Some(_) => some,
            None => env_parsed("TAWAR_LOG_FORMAT")?,
        };
        take(&mut logging.format, format);

        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        take(&mut self.database.url, overrides.database_url);
        take(&mut self.logging.level, overrides.log_level);
        take(&mut self.llm.provider, overrides.llm_provider);
        take(&mut self.llm.model, overrides.llm_model);
        if let Some(key) = overrides.llm_api_key {
            self.llm.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = overrides.llm_base_url {
            self.llm.base_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.llm.validate()?;
        self.server.validate()?;
        self.negotiation.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    fn merge_file(&mut self, file: DatabaseFile) {
        take(&mut self.url, file.url);
        take(&mut self.max_connections, file.max_connections);
        take(&mut self.timeout_secs, file.timeout_secs);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
            return Err(invalid(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
            ));
        }
        if self.max_connections == 0 {
            return Err(invalid("database.max_connections must be greater than zero"));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(invalid("database.timeout_secs must be in range 1..=300"));
        }
        Ok(())
    }
}

impl LlmConfig {
    fn merge_file(&mut self, file: LlmFile) {
        take(&mut self.provider, file.provider);
        if let Some(key) = file.api_key {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = file.base_url {
            self.base_url = Some(url);
        }
        take(&mut self.model, file.model);
        take(&mut self.timeout_secs, file.timeout_secs);
        take(&mut self.max_retries, file.max_retries);
        take(&mut self.temperature, file.temperature);
        take(&mut self.max_tokens, file.max_tokens);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(invalid("llm.timeout_secs must be in range 1..=300"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("llm.temperature must be in range 0.0..=2.0"));
        }
        if self.max_tokens == 0 || self.max_tokens > 4096 {
            return Err(invalid("llm.max_tokens must be in range 1..=4096"));
        }

        match self.provider {
            LlmProvider::OpenAi => {
                let usable = self
                    .api_key
                    .as_ref()
                    .is_some_and(|key| !key.expose_secret().trim().is_empty());
                if !usable {
                    return Err(invalid("llm.api_key is required for the openai provider"));
                }
            }
            LlmProvider::Ollama => {
                let usable = self.base_url.as_ref().is_some_and(|url| !url.trim().is_empty());
                if !usable {
                    return Err(invalid("llm.base_url is required for the ollama provider"));
                }
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    fn merge_file(&mut self, file: ServerFile) {
        take(&mut self.bind_address, file.bind_address);
        take(&mut self.port, file.port);
        take(&mut self.graceful_shutdown_secs, file.graceful_shutdown_secs);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(invalid("server.port must be greater than zero"));
        }
        if self.graceful_shutdown_secs == 0 {
            return Err(invalid("server.graceful_shutdown_secs must be greater than zero"));
        }
        Ok(())
    }
}

impl NegotiationConfig {
    pub fn tuning(&self) -> NegotiationTuning {
        NegotiationTuning {
            net_discount_pct: self.net_discount_pct,
            accept_threshold_pct: self.accept_threshold_pct,
        }
    }

    fn merge_file(&mut self, file: NegotiationFile) {
        take(&mut self.net_discount_pct, file.net_discount_pct);
        take(&mut self.accept_threshold_pct, file.accept_threshold_pct);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.net_discount_pct) {
            return Err(invalid("negotiation.net_discount_pct must be in range 1..=50"));
        }
        if !(50..=100).contains(&self.accept_threshold_pct) {
            return Err(invalid("negotiation.accept_threshold_pct must be in range 50..=100"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn merge_file(&mut self, file: LoggingFile) {
        take(&mut self.level, file.level);
        take(&mut self.format, file.format);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(invalid("logging.level must be one of trace|debug|info|warn|error")),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(invalid(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(invalid(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn take<T>(slot: &mut T, layered: Option<T>) {
    if let Some(value) = layered {
        *slot = value;
    }
}

fn locate_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    [PathBuf::from("tawar.toml"), PathBuf::from("config/tawar.toml")]
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Replaces every `${VAR}` in the raw file with the variable's value.
fn expand_env_refs(raw: &str) -> Result<String, ConfigError> {
    let mut expanded = String::with_capacity(raw.len());
    let mut remaining = raw;

    while let Some(start) = remaining.find("${") {
        expanded.push_str(&remaining[..start]);
        let reference = &remaining[start + 2..];
        let Some(end) = reference.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };
        let var = &reference[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        expanded.push_str(&value);
        remaining = &reference[end + 1..];
    }

    expanded.push_str(remaining);
    Ok(expanded)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: raw,
    })
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    database: DatabaseFile,
    #[serde(default)]
    llm: LlmFile,
    #[serde(default)]
    server: ServerFile,
    #[serde(default)]
    negotiation: NegotiationFile,
    #[serde(default)]
    logging: LoggingFile,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseFile {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmFile {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationFile {
    net_discount_pct: Option<u8>,
    accept_threshold_pct: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingFile {
    level: Option<String>,
    format: Option<LogFormat>,
}
