//! Wipe announcements: wait for the server to come up, then post a Discord
//! webhook describing the new world.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sweep_model::{Host, Server, ServerState, WipeContent, WipeId};
use tokio::task::JoinHandle;

use crate::error::NotifyError;
use crate::panel::PanelApi;
use crate::poller::{Backoff, PollConfig, StatusPoller};
use crate::rustmaps::MapGenApi;

/// Everything the announcement needs, captured when the wipe hands off.
#[derive(Debug, Clone)]
pub struct WipeAnnouncement {
    pub wipe_id: WipeId,
    pub host: Host,
    pub server: Server,
    pub content: Option<WipeContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn new(name: &str, value: String, inline: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline,
        }
    }
}

/// `#RRGGBB` to the integer Discord expects.
pub fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw.trim().strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

pub fn mention(server: &Server) -> Option<String> {
    let settings = &server.notifications;
    if settings.ping_everyone {
        return Some("@everyone".to_string());
    }
    settings.ping_role.map(|role| format!("<@&{role}>"))
}

pub fn build_message(
    server: &Server,
    content: Option<&WipeContent>,
    preview_url: Option<&str>,
) -> WebhookMessage {
    let template = &server.notifications.embed;
    let title = template
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("**{} just wiped!**", server.name));

    let mut description = template.description.clone();
    let mut image = None;
    let mut fields = Vec::new();
    match content {
        Some(WipeContent::CustomMap(map)) => {
            description.push_str("\n\n**🗺️ Map Type**\nCustom Map");
            image = Some(map.image_url.clone());
        }
        Some(WipeContent::Procedural { seed, .. }) => {
            description.push_str(&format!(
                "\n\n**🗺️ Map Link**\nClick [here](https://rustmaps.com/map/{}_{}) to view the map",
                seed.size, seed.seed
            ));
            image = preview_url.map(str::to_string);
            fields.push(EmbedField::new("🌱 Seed", format!("```{}```", seed.seed), true));
            fields.push(EmbedField::new("📏 Size", format!("```{}```", seed.size), true));
        }
        None => {}
    }
    fields.push(EmbedField::new(
        "🖥️ Connect",
        format!("```{}```", server.connect_address),
        false,
    ));
    fields.push(EmbedField::new(
        "🔗 Direct Join",
        format!("steam://connect/{}", server.connect_address),
        false,
    ));

    WebhookMessage {
        content: mention(server),
        embeds: vec![Embed {
            title,
            description,
            color: parse_color(&template.color).unwrap_or(0),
            image: image.map(|url| EmbedImage { url }),
            fields,
        }],
    }
}

#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Posts `message`; `Ok` carries the 2xx status.
    async fn deliver(&self, url: &str, message: &WebhookMessage) -> Result<u16, NotifyError>;
}

#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sweep-control/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build webhook http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookSink for DiscordWebhook {
    async fn deliver(&self, url: &str, message: &WebhookMessage) -> Result<u16, NotifyError> {
        let resp = self.http.post(url).json(message).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Rejected(String),
    ServerNeverRan(String),
}

#[derive(Clone)]
pub struct NotificationService {
    poller: StatusPoller,
    maps: Arc<dyn MapGenApi>,
    sink: Arc<dyn WebhookSink>,
    preview_poll: PollConfig,
}

impl NotificationService {
    pub fn new(
        panel: Arc<dyn PanelApi>,
        maps: Arc<dyn MapGenApi>,
        sink: Arc<dyn WebhookSink>,
        running_poll: PollConfig,
        preview_poll: PollConfig,
    ) -> Self {
        Self {
            poller: StatusPoller::new(panel, running_poll),
            maps,
            sink,
            preview_poll,
        }
    }

    pub async fn run(&self, announcement: WipeAnnouncement) -> NotifyOutcome {
        let WipeAnnouncement {
            wipe_id,
            host,
            server,
            content,
        } = announcement;

        if let Err(err) = self
            .poller
            .wait_for(&host, &server, ServerState::Running)
            .await
        {
            tracing::warn!(server_id = %server.id, wipe_id = %wipe_id.short(), %err, "server never reached running; announcement dropped");
            return NotifyOutcome::ServerNeverRan(err.to_string());
        }
        tracing::info!(server_id = %server.id, "server {} is now running; sending webhook", server.name);

        let preview = match &content {
            Some(WipeContent::Procedural {
                map_id: Some(map_id),
                ..
            }) => self.wait_for_preview(&server, map_id).await,
            _ => None,
        };

        let message = build_message(&server, content.as_ref(), preview.as_deref());
        match self
            .sink
            .deliver(&server.notifications.webhook, &message)
            .await
        {
            Ok(_) => {
                tracing::info!(server_id = %server.id, wipe_id = %wipe_id.short(), "wipe complete for server {}", server.name);
                NotifyOutcome::Sent
            }
            Err(err) => {
                tracing::warn!(server_id = %server.id, %err, "failed to send webhook");
                NotifyOutcome::Rejected(err.to_string())
            }
        }
    }

    /// Preview image URL, or `None` when it doesn't show up before the deadline.
    async fn wait_for_preview(&self, server: &Server, map_id: &str) -> Option<String> {
        let mut backoff = Backoff::start(self.preview_poll);
        loop {
            match self.maps.preview_url(map_id).await {
                Ok(Some(url)) => {
                    tracing::debug!(server_id = %server.id, map_id, "retrieved generated map image url");
                    return Some(url);
                }
                Ok(None) => {
                    tracing::debug!(server_id = %server.id, map_id, "waiting for generated map image url");
                }
                Err(err) => {
                    tracing::debug!(server_id = %server.id, map_id, %err, "map preview lookup failed");
                }
            }
            if !backoff.wait().await {
                tracing::warn!(server_id = %server.id, map_id, elapsed = ?backoff.elapsed(), "map preview not ready; announcing without image");
                return None;
            }
        }
    }
}

struct Tracked {
    server_name: String,
    handle: JoinHandle<()>,
}

/// Announcement tasks still running, keyed by wipe.
#[derive(Clone, Default)]
pub struct NotificationRegistry {
    tasks: Arc<Mutex<HashMap<WipeId, Tracked>>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, wipe_id: WipeId, server_name: &str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, t| !t.handle.is_finished());
        tasks.insert(
            wipe_id,
            Tracked {
                server_name: server_name.to_string(),
                handle,
            },
        );
    }

    /// `(wipe id, server name)` for every announcement still in flight.
    pub fn outstanding(&self) -> Vec<(WipeId, String)> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|_, t| !t.handle.is_finished());
        let mut out: Vec<_> = tasks
            .iter()
            .map(|(id, t)| (id.clone(), t.server_name.clone()))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// Aborts what is left and returns how many were abandoned.
    pub fn shutdown(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let mut abandoned = 0;
        for (wipe_id, t) in tasks.drain() {
            if t.handle.is_finished() {
                continue;
            }
            tracing::warn!(wipe_id = %wipe_id.short(), server = %t.server_name, "abandoning pending wipe announcement");
            t.handle.abort();
            abandoned += 1;
        }
        abandoned
    }

    /// Waits for every tracked task to finish.
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain().map(|(_, t)| t.handle).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}
