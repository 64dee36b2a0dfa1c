use std::io::Write;

use sweep_control::command::{self, Command};
use sweep_control::config::{self, Tuning};
use sweep_control::error::WipeError;
use sweep_control::orchestrator::WipeOrchestrator;
use sweep_control::state::AppContext;
use tokio::io::{AsyncBufReadExt, BufReader};

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config::config_path(std::env::args().nth(1));
    let config = config::load(&path)?;
    let log_guard = sweep_control::logging::init(&config.log_directive())?;
    tracing::info!(config = %path.display(), version = env!("CARGO_PKG_VERSION"), "sweep-control started");
    for m in config::scope_mismatches(&config) {
        tracing::warn!(
            server_id = %m.server_id,
            pattern = %m.pattern,
            scope = %m.scope,
            "deletion pattern is outside the listed directory and will not match"
        );
    }

    let ctx = AppContext::from_config(config, Tuning::from_env())?;
    let orchestrator = WipeOrchestrator::new(ctx.clone());

    tracing::info!("verifying configured servers");
    if let Err(err) = orchestrator.verify_servers().await {
        tracing::error!(%err, "startup verification failed");
        drop(log_guard);
        std::process::exit(1);
    }

    for line in command::help_lines() {
        tracing::info!("{line}");
    }

    // Wipes run inline; only announcements go to the background.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match command::parse_command(&line) {
            Command::Empty => {}
            Command::Help => {
                for line in command::help_lines() {
                    tracing::info!("{line}");
                }
            }
            Command::Status => {
                let pending = ctx.notifications.outstanding();
                if pending.is_empty() {
                    tracing::info!("no pending wipe announcements");
                }
                for (wipe_id, server) in pending {
                    tracing::info!(wipe_id = %wipe_id.short(), %server, "announcement pending");
                }
            }
            Command::Quit => break,
            Command::Invalid(reason) => {
                tracing::error!("{reason}. {}", command::USAGE);
            }
            Command::Wipe(server_id) => match orchestrator.wipe(&server_id).await {
                Ok(report) => {
                    tracing::info!(
                        server_id = %report.server_id,
                        wipe_id = %report.wipe_id.short(),
                        warnings = report.warnings.len(),
                        "wipe handed off; announcement will be sent once the server is running"
                    );
                }
                Err(WipeError::NotFound(id)) => {
                    tracing::error!("server \"{id}\" not found in config");
                }
                Err(err) => {
                    tracing::error!(%err, "wipe aborted");
                }
            },
        }
    }

    let abandoned = ctx.notifications.shutdown();
    if abandoned > 0 {
        tracing::warn!(abandoned, "exiting with wipe announcements still pending");
    }
    tracing::info!("exiting");
    drop(log_guard);
    // A pending stdin read would otherwise hold runtime shutdown.
    std::process::exit(0);
}
