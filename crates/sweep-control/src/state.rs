use std::sync::Arc;

use crate::config::{Config, Tuning};
use crate::content::ContentSelector;
use crate::notify::{DiscordWebhook, NotificationRegistry, NotificationService, WebhookSink};
use crate::panel::{PanelApi, PterodactylClient};
use crate::poller::StatusPoller;
use crate::rustmaps::{MapGenApi, RustMapsClient};

/// Built once at startup and shared by every component.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tuning: Tuning,
    pub panel: Arc<dyn PanelApi>,
    pub maps: Arc<dyn MapGenApi>,
    pub webhook: Arc<dyn WebhookSink>,
    pub notifications: NotificationRegistry,
}

impl AppContext {
    pub fn from_config(config: Config, tuning: Tuning) -> anyhow::Result<Self> {
        let panel = PterodactylClient::new(tuning.call_pause, tuning.http_timeout)?;
        let maps = RustMapsClient::new(
            config.rustmaps_base_url.clone(),
            config.rustmaps_api_token.clone(),
            tuning.http_timeout,
        )?;
        let webhook = DiscordWebhook::new(tuning.http_timeout)?;
        Ok(Self::with_services(
            config,
            tuning,
            Arc::new(panel),
            Arc::new(maps),
            Arc::new(webhook),
        ))
    }

    pub fn with_services(
        config: Config,
        tuning: Tuning,
        panel: Arc<dyn PanelApi>,
        maps: Arc<dyn MapGenApi>,
        webhook: Arc<dyn WebhookSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tuning,
            panel,
            maps,
            webhook,
            notifications: NotificationRegistry::new(),
        }
    }

    pub fn status_poller(&self) -> StatusPoller {
        StatusPoller::new(self.panel.clone(), self.tuning.status_poll)
    }

    pub fn content_selector(&self) -> ContentSelector {
        ContentSelector::new(
            self.panel.clone(),
            self.maps.clone(),
            self.config.seeds_dir.clone(),
        )
    }

    pub fn notification_service(&self) -> NotificationService {
        NotificationService::new(
            self.panel.clone(),
            self.maps.clone(),
            self.webhook.clone(),
            self.tuning.running_poll,
            self.tuning.preview_poll,
        )
    }
}
