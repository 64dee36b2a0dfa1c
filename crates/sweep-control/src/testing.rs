//! In-memory stand-ins for the panel, RustMaps and the webhook target.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use sweep_model::{
    EmbedTemplate, Host, NotificationSettings, PowerSignal, Seed, Server, ServerState,
};

use crate::config::{Config, Tuning};
use crate::error::{MapGenError, NotifyError, PanelError};
use crate::notify::{WebhookMessage, WebhookSink};
use crate::panel::PanelApi;
use crate::rustmaps::{self, MapGenApi};
use crate::state::AppContext;

pub fn server_fixture(id: &str) -> Server {
    Server {
        id: id.to_string(),
        name: format!("Server {id}"),
        connect_address: "play.example.com:28015".to_string(),
        notifications: NotificationSettings {
            webhook: format!("https://discord.test/hooks/{id}"),
            ping_everyone: false,
            ping_role: None,
            embed: EmbedTemplate {
                title: None,
                description: "Fresh wipe.".to_string(),
                color: "#336699".to_string(),
            },
        },
        pick_random_map: false,
        seeds_file: None,
        rustmaps_seeds_filter: None,
        custom_maps: Vec::new(),
        files_to_delete: Vec::new(),
    }
}

pub fn host_fixture(servers: Vec<Server>) -> Host {
    Host {
        name: "eu-1".to_string(),
        url: "https://panel.test".to_string(),
        api_token: "ptlc_test".to_string(),
        servers,
    }
}

pub fn config_fixture(hosts: Vec<Host>, seeds_dir: PathBuf) -> Config {
    Config {
        log_level: "debug".to_string(),
        rustmaps_api_token: Some("rm".to_string()),
        rustmaps_base_url: None,
        seeds_dir,
        hosts,
    }
}

/// Fresh directory under the system temp dir.
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sweep-control-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Simulated panel: power signals move the server through the same
/// intermediate states a real instance reports.
pub struct FakePanel {
    pub known_servers: Vec<String>,
    pub listing: Vec<String>,
    pub delete_ok: bool,
    pub variables_ok: bool,
    /// Accept `stop` but keep running.
    pub ignore_stop: bool,
    pub state: Mutex<ServerState>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePanel {
    pub fn new(known_servers: &[&str], listing: &[&str]) -> Self {
        Self {
            known_servers: known_servers.iter().map(|s| s.to_string()).collect(),
            listing: listing.iter().map(|s| s.to_string()).collect(),
            delete_ok: true,
            variables_ok: true,
            ignore_stop: false,
            state: Mutex::new(ServerState::Running),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Calls other than status polls, in order.
    pub fn actions(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() != "status")
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PanelApi for FakePanel {
    async fn list_servers(&self, _host: &Host) -> Result<Vec<String>, PanelError> {
        self.record("list_servers".to_string());
        Ok(self.known_servers.clone())
    }

    async fn get_status(&self, _host: &Host, _server: &Server) -> Result<ServerState, PanelError> {
        self.record("status".to_string());
        let mut state = self.state.lock().unwrap();
        let current = state.clone();
        *state = match &current {
            ServerState::Stopping => ServerState::Offline,
            ServerState::Starting => ServerState::Running,
            other => other.clone(),
        };
        Ok(current)
    }

    async fn send_console_command(&self, _host: &Host, _server: &Server, command: &str) -> bool {
        self.record(format!("command:{command}"));
        true
    }

    async fn set_power(&self, _host: &Host, _server: &Server, signal: PowerSignal) -> bool {
        self.record(format!("power:{}", signal.as_str()));
        let mut state = self.state.lock().unwrap();
        match signal {
            PowerSignal::Stop if self.ignore_stop => {}
            PowerSignal::Stop => *state = ServerState::Stopping,
            PowerSignal::Start => *state = ServerState::Starting,
        }
        true
    }

    async fn set_startup_variable(&self, _host: &Host, _server: &Server, key: &str, value: &str) -> bool {
        self.record(format!("var:{key}={value}"));
        self.variables_ok
    }

    async fn list_directory(
        &self,
        _host: &Host,
        _server: &Server,
        directory: &str,
    ) -> Result<Vec<String>, PanelError> {
        self.record(format!("list:{directory}"));
        Ok(self.listing.clone())
    }

    async fn delete_files(&self, _host: &Host, _server: &Server, files: &[String]) -> bool {
        self.record(format!("delete:{}", files.join(",")));
        self.delete_ok && !files.is_empty()
    }
}

/// Map service whose preview shows up after `preview_after` lookups.
pub struct FakeMaps {
    pub preview_after: usize,
    pub submits: Mutex<Vec<Seed>>,
    pub lookups: Mutex<usize>,
}

impl FakeMaps {
    pub fn new(preview_after: usize) -> Self {
        Self {
            preview_after,
            submits: Mutex::new(Vec::new()),
            lookups: Mutex::new(0),
        }
    }

    pub fn submits(&self) -> Vec<Seed> {
        self.submits.lock().unwrap().clone()
    }
}

#[async_trait]
impl MapGenApi for FakeMaps {
    async fn submit(&self, seed: &Seed) -> Result<String, MapGenError> {
        self.submits.lock().unwrap().push(seed.clone());
        Ok(rustmaps::default_map_id(seed))
    }

    async fn preview_url(&self, map_id: &str) -> Result<Option<String>, MapGenError> {
        let mut lookups = self.lookups.lock().unwrap();
        *lookups += 1;
        if *lookups > self.preview_after {
            Ok(Some(format!("https://img.test/{map_id}.png")))
        } else {
            Ok(None)
        }
    }

    async fn random_filtered(&self, _filter: &str) -> Result<Option<Seed>, MapGenError> {
        Ok(Some(Seed::new("777", "3000")))
    }
}

pub struct FakeWebhook {
    pub status: u16,
    pub sent: Mutex<Vec<(String, WebhookMessage)>>,
}

impl FakeWebhook {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(String, WebhookMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSink for FakeWebhook {
    async fn deliver(&self, url: &str, message: &WebhookMessage) -> Result<u16, NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), message.clone()));
        if (200..300).contains(&self.status) {
            Ok(self.status)
        } else {
            Err(NotifyError::Status(self.status))
        }
    }
}

pub struct Harness {
    pub ctx: AppContext,
    pub panel: Arc<FakePanel>,
    pub maps: Arc<FakeMaps>,
    pub webhook: Arc<FakeWebhook>,
}

pub fn harness(config: Config, panel: FakePanel, maps: FakeMaps, webhook: FakeWebhook) -> Harness {
    let panel = Arc::new(panel);
    let maps = Arc::new(maps);
    let webhook = Arc::new(webhook);
    let ctx = AppContext::with_services(
        config,
        Tuning::immediate(),
        panel.clone(),
        maps.clone(),
        webhook.clone(),
    );
    Harness {
        ctx,
        panel,
        maps,
        webhook,
    }
}
