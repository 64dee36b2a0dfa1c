use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use sweep_model::{Host, Server};

use crate::error::ConfigError;
use crate::files;
use crate::poller::PollConfig;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub rustmaps_api_token: Option<String>,
    #[serde(default)]
    pub rustmaps_base_url: Option<String>,
    #[serde(default = "default_seeds_dir")]
    pub seeds_dir: PathBuf,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_seeds_dir() -> PathBuf {
    PathBuf::from("seeds")
}

impl Config {
    pub fn servers(&self) -> impl Iterator<Item = (&Host, &Server)> {
        self.hosts
            .iter()
            .flat_map(|h| h.servers.iter().map(move |s| (h, s)))
    }

    /// Host/server pair owning `server_id`. Ids are unique across hosts once the
    /// config passed validation.
    pub fn find_server(&self, server_id: &str) -> Option<(&Host, &Server)> {
        self.servers().find(|(_, s)| s.id == server_id)
    }

    /// `log_level` normalized for an `EnvFilter` directive.
    pub fn log_directive(&self) -> String {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" => "error".to_string(),
            other => other.to_string(),
        }
    }
}

pub fn config_path(arg: Option<String>) -> PathBuf {
    arg.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            std::env::var("SWEEP_CONFIG")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse(&raw).with_context(|| format!("load config {}", path.display()))
}

pub fn parse(raw: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(raw).context("parse config json")?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut field_errors = BTreeMap::<String, String>::new();

    if !LOG_LEVELS.contains(&config.log_directive().as_str()) {
        field_errors.insert(
            "log_level".to_string(),
            format!("Must be one of {} (got {}).", LOG_LEVELS.join(", "), config.log_level),
        );
    }

    if config.hosts.is_empty() {
        field_errors.insert(
            "hosts".to_string(),
            "Required. Configure at least one host.".to_string(),
        );
    }

    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (hi, host) in config.hosts.iter().enumerate() {
        let url = host.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            field_errors.insert(
                format!("hosts[{hi}].url"),
                "Must be an http(s) URL.".to_string(),
            );
        }
        if host.api_token.trim().is_empty() {
            field_errors.insert(
                format!("hosts[{hi}].api_token"),
                "Required.".to_string(),
            );
        }

        for (si, server) in host.servers.iter().enumerate() {
            let key = format!("hosts[{hi}].servers[{si}]");
            if server.id.trim().is_empty() {
                field_errors.insert(format!("{key}.id"), "Required.".to_string());
            } else if let Some(other) = seen.insert(server.id.as_str(), host.name.as_str()) {
                field_errors.insert(
                    format!("{key}.id"),
                    format!("Duplicate server id `{}` (also on host `{other}`).", server.id),
                );
            }

            if crate::notify::parse_color(&server.notifications.embed.color).is_none() {
                field_errors.insert(
                    format!("{key}.discord.embed.color"),
                    "Must be a #RRGGBB hex color.".to_string(),
                );
            }

            for (pi, pattern) in server.files_to_delete.iter().enumerate() {
                if let Err(e) = files::compile_pattern(pattern) {
                    field_errors.insert(
                        format!("{key}.files_to_delete[{pi}]"),
                        format!("Invalid glob: {e}."),
                    );
                }
            }
        }
    }

    if !field_errors.is_empty() {
        return Err(ConfigError(field_errors));
    }
    Ok(())
}

/// A deletion pattern that lives outside its server's listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeMismatch {
    pub server_id: String,
    pub pattern: String,
    pub scope: String,
}

/// Patterns that can never match because only the first pattern's directory
/// is listed. Not an error; `main` logs these once logging is up.
pub fn scope_mismatches(config: &Config) -> Vec<ScopeMismatch> {
    let mut out = Vec::new();
    for (_, server) in config.servers() {
        let Some(first) = server.files_to_delete.first() else {
            continue;
        };
        let scope = files::scope_directory(first);
        for pattern in server.files_to_delete.iter().skip(1) {
            if files::scope_directory(pattern) != scope {
                out.push(ScopeMismatch {
                    server_id: server.id.clone(),
                    pattern: pattern.clone(),
                    scope: scope.clone(),
                });
            }
        }
    }
    out
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

/// Timing knobs. Read from the environment once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// Pause before every panel call.
    pub call_pause: Duration,
    pub after_save: Duration,
    pub after_stop: Duration,
    pub status_poll: PollConfig,
    /// Announcement wait for `running`; world generation makes this the longest.
    pub running_poll: PollConfig,
    pub preview_poll: PollConfig,
    pub http_timeout: Duration,
}

impl Tuning {
    pub fn from_env() -> Self {
        let call_pause_ms = env_u64("SWEEP_CALL_PAUSE_MS")
            .map(|v| v.clamp(0, 60_000))
            .unwrap_or(1000);
        let initial_ms = env_u64("SWEEP_POLL_INITIAL_MS")
            .map(|v| v.clamp(100, 60_000))
            .unwrap_or(1000);
        let max_ms = env_u64("SWEEP_POLL_MAX_MS")
            .map(|v| v.clamp(initial_ms, 10 * 60_000))
            .unwrap_or(15_000.max(initial_ms));
        let deadline_secs = env_u64("SWEEP_POLL_DEADLINE_SECS")
            .map(|v| v.clamp(10, 24 * 60 * 60))
            .unwrap_or(15 * 60);
        let running_deadline_secs = env_u64("SWEEP_RUNNING_DEADLINE_SECS")
            .map(|v| v.clamp(10, 24 * 60 * 60))
            .unwrap_or(60 * 60);
        let preview_deadline_secs = env_u64("SWEEP_PREVIEW_DEADLINE_SECS")
            .map(|v| v.clamp(10, 24 * 60 * 60))
            .unwrap_or(30 * 60);
        let http_timeout_secs = env_u64("SWEEP_HTTP_TIMEOUT_SECS")
            .map(|v| v.clamp(1, 10 * 60))
            .unwrap_or(30);

        let poll = PollConfig {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            deadline: Duration::from_secs(deadline_secs),
        };

        // Stage pauses follow the call pause so a zero pause disables both.
        let scale = |secs: u64| Duration::from_millis(call_pause_ms.saturating_mul(secs));

        Self {
            call_pause: Duration::from_millis(call_pause_ms),
            after_save: scale(2),
            after_stop: scale(3),
            status_poll: poll,
            running_poll: poll.with_deadline(Duration::from_secs(running_deadline_secs)),
            preview_poll: poll.with_deadline(Duration::from_secs(preview_deadline_secs)),
            http_timeout: Duration::from_secs(http_timeout_secs),
        }
    }

    /// No pauses and short deadlines.
    pub fn immediate() -> Self {
        let poll = PollConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
            deadline: Duration::from_secs(5),
        };
        Self {
            call_pause: Duration::ZERO,
            after_save: Duration::ZERO,
            after_stop: Duration::ZERO,
            status_poll: poll,
            running_poll: poll,
            preview_poll: poll,
            http_timeout: Duration::from_secs(5),
        }
    }
}
