pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;

use tawar_core::config::{AppConfig, LoadOptions};

/// What a subcommand hands back to `main`: a JSON (or human) report line
/// and the process exit code. Exit codes are stable per failure class so
/// operators can script against them.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

/// One failure on the way through a command pipeline.
pub(crate) struct Failure {
    pub class: &'static str,
    pub detail: String,
    pub exit_code: u8,
}

impl Failure {
    pub fn new(class: &'static str, detail: impl Into<String>, exit_code: u8) -> Self {
        Self { class, detail: detail.into(), exit_code }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    command: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            exit_code: 0,
            output: render(Report { command, status: "ok", error_class: None, message: &message }),
        }
    }

    pub(crate) fn from_failure(command: &str, failure: Failure) -> Self {
        Self {
            exit_code: failure.exit_code,
            output: render(Report {
                command,
                status: "error",
                error_class: Some(failure.class),
                message: &failure.detail,
            }),
        }
    }
}

fn render(report: Report<'_>) -> String {
    serde_json::to_string(&report)
        .unwrap_or_else(|error| format!("report serialization failed: {error}"))
}

/// Shared front half of every database-touching command: load and validate
/// configuration, then build a current-thread runtime to drive the async
/// store calls from the synchronous CLI.
pub(crate) fn load_config() -> Result<AppConfig, Failure> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| Failure::new("config_validation", error.to_string(), 2))
}

pub(crate) fn blocking_runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| Failure::new("runtime_init", error.to_string(), 3))
}
