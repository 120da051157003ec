use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use tawar_core::config::AppConfig;

use super::{load_config, CommandResult};

/// One printable config field: its dotted key, the effective value (secrets
/// pre-redacted by the caller), and the env var that can override it.
struct Entry {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("config", failure),
    };

    let file_path = locate_config_file();
    let file_doc = file_path.as_deref().and_then(parse_config_file);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = attribute_source(&entry, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let entry = |key, value: String, env_key| Entry { key, value, env_key };

    vec![
        entry("database.url", config.database.url.clone(), "TAWAR_DATABASE_URL"),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TAWAR_DATABASE_MAX_CONNECTIONS",
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "TAWAR_DATABASE_TIMEOUT_SECS",
        ),
        entry("llm.provider", format!("{:?}", config.llm.provider), "TAWAR_LLM_PROVIDER"),
        entry("llm.model", config.llm.model.clone(), "TAWAR_LLM_MODEL"),
        entry(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "TAWAR_LLM_BASE_URL",
        ),
        entry(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
            "TAWAR_LLM_API_KEY",
        ),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), "TAWAR_LLM_TIMEOUT_SECS"),
        entry("server.bind_address", config.server.bind_address.clone(), "TAWAR_SERVER_BIND_ADDRESS"),
        entry("server.port", config.server.port.to_string(), "TAWAR_SERVER_PORT"),
        entry(
            "negotiation.net_discount_pct",
            config.negotiation.net_discount_pct.to_string(),
            "TAWAR_NEGOTIATION_NET_DISCOUNT_PCT",
        ),
        entry(
            "negotiation.accept_threshold_pct",
            config.negotiation.accept_threshold_pct.to_string(),
            "TAWAR_NEGOTIATION_ACCEPT_THRESHOLD_PCT",
        ),
        entry("logging.level", config.logging.level.clone(), "TAWAR_LOGGING_LEVEL"),
        entry("logging.format", format!("{:?}", config.logging.format), "TAWAR_LOGGING_FORMAT"),
    ]
}

fn attribute_source(entry: &Entry, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if env::var_os(entry.env_key).is_some() {
        return format!("env ({})", entry.env_key);
    }

    let in_file = file_doc.is_some_and(|doc| {
        entry.key.split('.').try_fold(doc, |node, segment| node.get(segment)).is_some()
    });
    if in_file {
        let shown = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({shown})");
    }

    "default".to_string()
}

fn locate_config_file() -> Option<PathBuf> {
    [PathBuf::from("tawar.toml"), PathBuf::from("config/tawar.toml")]
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn parse_config_file(path: &Path) -> Option<Value> {
    fs::read_to_string(path).ok()?.parse::<Value>().ok()
}
