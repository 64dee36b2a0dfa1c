use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use sweep_model::ServerState;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("panel unreachable: {0}")]
    Transport(String),
    #[error("panel returned {status} for {what}")]
    Status { what: &'static str, status: u16 },
    #[error("could not decode panel response for {what}: {message}")]
    Decode { what: &'static str, message: String },
}

impl From<reqwest::Error> for PanelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapGenError {
    #[error("map generation is disabled (no api token configured)")]
    Disabled,
    #[error("map generation service unreachable: {0}")]
    Transport(String),
    #[error("map generation service returned {0}")]
    Status(u16),
    #[error("could not decode map generation response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for MapGenError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("read seed dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("seed dataset has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("seed dataset line {line} is missing the `{column}` value")]
    MalformedRow { line: usize, column: &'static str },
    #[error("seed dataset has no rows")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("timed out after {elapsed:?} waiting for `{target}` (last observed: {last})")]
    Timeout {
        target: String,
        last: String,
        elapsed: Duration,
    },
}

impl PollError {
    pub fn timeout(targets: &[ServerState], last: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            target: targets
                .iter()
                .map(ServerState::as_str)
                .collect::<Vec<_>>()
                .join("|"),
            last: last.into(),
            elapsed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WipeError {
    #[error("server `{0}` not found in config")]
    NotFound(String),
    #[error("wipe aborted while waiting for `{stage}`: {source}")]
    Wait {
        stage: &'static str,
        #[source]
        source: PollError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook unreachable: {0}")]
    Transport(String),
    #[error("webhook returned {0}")]
    Status(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Every config problem found in one pass, keyed by a dotted field path.
#[derive(Debug, thiserror::Error)]
#[error("invalid config: {}", format_field_errors(.0))]
pub struct ConfigError(pub BTreeMap<String, String>);

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Startup verification result: servers missing from their host's listing.
#[derive(Debug, thiserror::Error)]
#[error("{} configured server(s) not found on their host: {}", .0.len(), .0.join(", "))]
pub struct VerifyError(pub Vec<String>);
