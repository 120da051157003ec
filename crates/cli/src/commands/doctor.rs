use secrecy::ExposeSecret;
use serde::Serialize;

use tawar_core::config::{AppConfig, LlmProvider};
use tawar_db::connect_with_settings;

use super::{blocking_runtime, load_config, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ProbeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct Probe {
    name: &'static str,
    status: ProbeStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct Readiness {
    healthy: bool,
    probes: Vec<Probe>,
}

pub fn run(json_output: bool) -> CommandResult {
    let readiness = diagnose();
    let exit_code = if readiness.healthy { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&readiness)
            .unwrap_or_else(|error| format!("doctor report serialization failed: {error}"))
    } else {
        render_human(&readiness)
    };

    CommandResult { exit_code, output }
}

fn diagnose() -> Readiness {
    let mut probes = Vec::new();

    match load_config() {
        Ok(config) => {
            probes.push(Probe {
                name: "config_validation",
                status: ProbeStatus::Pass,
                detail: "configuration loaded and validated".to_string(),
            });
            probes.push(probe_backend(&config));
            probes.push(probe_database(&config));
        }
        Err(failure) => {
            probes.push(Probe {
                name: "config_validation",
                status: ProbeStatus::Fail,
                detail: failure.detail,
            });
            for name in ["backend_readiness", "database_connectivity"] {
                probes.push(Probe {
                    name,
                    status: ProbeStatus::Skipped,
                    detail: "skipped: configuration did not load".to_string(),
                });
            }
        }
    }

    let healthy = probes.iter().all(|probe| probe.status == ProbeStatus::Pass);
    Readiness { healthy, probes }
}

/// Static readiness only: confirms the generation backend is configured
/// well enough to try, without spending a real completion on it.
fn probe_backend(config: &AppConfig) -> Probe {
    match config.llm.provider {
        LlmProvider::OpenAi => {
            let key_usable = config
                .llm
                .api_key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().trim().is_empty());
            if key_usable {
                Probe {
                    name: "backend_readiness",
                    status: ProbeStatus::Pass,
                    detail: format!(
                        "openai provider, model `{}`, timeout {}s",
                        config.llm.model, config.llm.timeout_secs
                    ),
                }
            } else {
                Probe {
                    name: "backend_readiness",
                    status: ProbeStatus::Fail,
                    detail: "openai provider configured without an api key".to_string(),
                }
            }
        }
        LlmProvider::Ollama => Probe {
            name: "backend_readiness",
            status: ProbeStatus::Pass,
            detail: format!(
                "ollama provider at `{}`, model `{}`, timeout {}s",
                config.llm.base_url.as_deref().unwrap_or("<unset>"),
                config.llm.model,
                config.llm.timeout_secs
            ),
        },
    }
}

fn probe_database(config: &AppConfig) -> Probe {
    let runtime = match blocking_runtime() {
        Ok(runtime) => runtime,
        Err(failure) => {
            return Probe {
                name: "database_connectivity",
                status: ProbeStatus::Fail,
                detail: failure.detail,
            };
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| error.to_string())?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match outcome {
        Ok(()) => Probe {
            name: "database_connectivity",
            status: ProbeStatus::Pass,
            detail: format!("connected using `{}`", config.database.url),
        },
        Err(error) => Probe {
            name: "database_connectivity",
            status: ProbeStatus::Fail,
            detail: format!("failed to connect to database: {error}"),
        },
    }
}

fn render_human(readiness: &Readiness) -> String {
    let mut lines = vec![if readiness.healthy {
        "doctor: all readiness probes passed".to_string()
    } else {
        "doctor: one or more readiness probes failed".to_string()
    }];

    for probe in &readiness.probes {
        let marker = match probe.status {
            ProbeStatus::Pass => "ok",
            ProbeStatus::Fail => "fail",
            ProbeStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", probe.name, probe.detail));
    }

    lines.join("\n")
}
