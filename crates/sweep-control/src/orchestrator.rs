use std::fmt;

use sweep_model::{PowerSignal, ServerState, WipeContent, WipeId};
use tracing::Instrument;

use crate::error::{VerifyError, WipeError};
use crate::files;
use crate::notify::WipeAnnouncement;
use crate::state::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeStage {
    ResolveTarget,
    Saving,
    Stopping,
    WaitOffline,
    DeletingFiles,
    SelectingContent,
    Starting,
    WaitStarting,
    Handoff,
}

impl WipeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResolveTarget => "resolve_target",
            Self::Saving => "saving",
            Self::Stopping => "stopping",
            Self::WaitOffline => "wait_offline",
            Self::DeletingFiles => "deleting_files",
            Self::SelectingContent => "selecting_content",
            Self::Starting => "starting",
            Self::WaitStarting => "wait_starting",
            Self::Handoff => "handoff",
        }
    }
}

impl fmt::Display for WipeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: WipeStage,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct WipeReport {
    pub wipe_id: WipeId,
    pub server_id: String,
    pub content: Option<WipeContent>,
    pub warnings: Vec<StageWarning>,
}

impl WipeReport {
    fn warn(&mut self, stage: WipeStage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = stage.as_str(), "{message}");
        self.warnings.push(StageWarning { stage, message });
    }

    pub fn warnings_in(&self, stage: WipeStage) -> impl Iterator<Item = &StageWarning> {
        self.warnings.iter().filter(move |w| w.stage == stage)
    }
}

fn enter(stage: WipeStage) {
    tracing::info!(stage = stage.as_str(), "entering wipe stage");
}

/// Drives one wipe from save to handoff. Panel writes are best-effort; only a
/// missing server or a status wait that runs past its deadline stops a wipe.
#[derive(Clone)]
pub struct WipeOrchestrator {
    ctx: AppContext,
}

impl WipeOrchestrator {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Confirms every configured server appears in its host's live listing.
    pub async fn verify_servers(&self) -> Result<(), VerifyError> {
        let mut missing = Vec::new();
        for host in &self.ctx.config.hosts {
            let listed = match self.ctx.panel.list_servers(host).await {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::error!(host = %host.name, %err, "could not list servers on host");
                    Vec::new()
                }
            };
            for server in &host.servers {
                if listed.iter().any(|id| id == &server.id) {
                    tracing::info!(
                        server_id = %server.id,
                        host = %host.name,
                        "server \"{}\" found on host",
                        server.name
                    );
                } else {
                    tracing::error!(
                        server_id = %server.id,
                        host = %host.name,
                        "server \"{}\" not found on host; check the config file",
                        server.name
                    );
                    missing.push(format!("{}@{}", server.id, host.name));
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VerifyError(missing))
        }
    }

    pub async fn wipe(&self, server_id: &str) -> Result<WipeReport, WipeError> {
        enter(WipeStage::ResolveTarget);
        let (host, server) = self
            .ctx
            .config
            .find_server(server_id)
            .map(|(h, s)| (h.clone(), s.clone()))
            .ok_or_else(|| WipeError::NotFound(server_id.to_string()))?;

        let wipe_id = WipeId::new();
        let span = tracing::info_span!("wipe", server_id = %server.id, wipe_id = %wipe_id.short());
        let ctx = &self.ctx;

        async move {
            tracing::info!(host = %host.name, "starting wipe for server \"{}\"", server.name);
            let mut report = WipeReport {
                wipe_id: wipe_id.clone(),
                server_id: server.id.clone(),
                content: None,
                warnings: Vec::new(),
            };

            enter(WipeStage::Saving);
            if !ctx.panel.send_console_command(&host, &server, "save").await {
                report.warn(WipeStage::Saving, "failed to send \"save\" command to server");
            }
            tokio::time::sleep(ctx.tuning.after_save).await;

            enter(WipeStage::Stopping);
            if !ctx.panel.set_power(&host, &server, PowerSignal::Stop).await {
                report.warn(WipeStage::Stopping, "failed to stop server (maybe it's already stopped?)");
            }
            tokio::time::sleep(ctx.tuning.after_stop).await;

            enter(WipeStage::WaitOffline);
            let poller = ctx.status_poller();
            poller
                .wait_for(&host, &server, ServerState::Offline)
                .await
                .map_err(|source| WipeError::Wait {
                    stage: WipeStage::WaitOffline.as_str(),
                    source,
                })?;
            tracing::info!("server is offline");

            // An empty batch is still sent so the panel reports "nothing matched".
            enter(WipeStage::DeletingFiles);
            let matched = match files::resolve(ctx.panel.as_ref(), &host, &server).await {
                Ok(matched) => matched,
                Err(err) => {
                    report.warn(WipeStage::DeletingFiles, format!("failed to list server files: {err}"));
                    Vec::new()
                }
            };
            if ctx.panel.delete_files(&host, &server, &matched).await {
                tracing::info!(count = matched.len(), "deleted server files");
            } else if matched.is_empty() {
                report.warn(WipeStage::DeletingFiles, "no files matched for deletion");
            } else {
                report.warn(WipeStage::DeletingFiles, "failed to delete server files");
            }

            enter(WipeStage::SelectingContent);
            let applied = ctx.content_selector().select_and_apply(&host, &server).await;
            report
                .warnings
                .extend(applied.warnings.into_iter().map(|message| StageWarning {
                    stage: WipeStage::SelectingContent,
                    message,
                }));
            report.content = applied.content;

            enter(WipeStage::Starting);
            if !ctx.panel.set_power(&host, &server, PowerSignal::Start).await {
                report.warn(WipeStage::Starting, "server failed to start");
            }

            // A fast boot can pass through `starting` between two polls.
            enter(WipeStage::WaitStarting);
            poller
                .wait_for_any(&host, &server, &[ServerState::Starting, ServerState::Running])
                .await
                .map_err(|source| WipeError::Wait {
                    stage: WipeStage::WaitStarting.as_str(),
                    source,
                })?;
            tracing::info!("server is now starting");

            enter(WipeStage::Handoff);
            let announcement = WipeAnnouncement {
                wipe_id: wipe_id.clone(),
                host: host.clone(),
                server: server.clone(),
                content: report.content.clone(),
            };
            let service = ctx.notification_service();
            ctx.notifications.spawn(
                wipe_id.clone(),
                &server.name,
                async move {
                    service.run(announcement).await;
                }
                .instrument(tracing::Span::current()),
            );

            Ok::<_, WipeError>(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use sweep_model::{CustomMap, Seed};

    use super::*;
    use crate::testing::{
        FakeMaps, FakePanel, FakeWebhook, config_fixture, harness, host_fixture, server_fixture,
        temp_dir,
    };

    fn listing() -> Vec<&'static str> {
        vec!["proceduralmap.1000.123.sav", "server.cfg", "proceduralmap.1000.123.map"]
    }

    fn rust_patterns() -> Vec<String> {
        vec![
            "/server/rust/proceduralmap.*.sav".to_string(),
            "/server/rust/proceduralmap.*.map".to_string(),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn verify_servers_reports_missing_ids() {
        let config = config_fixture(
            vec![host_fixture(vec![server_fixture("a1"), server_fixture("b2")])],
            temp_dir("verify"),
        );
        let h = harness(config, FakePanel::new(&["a1", "zz"], &[]), FakeMaps::new(0), FakeWebhook::new(204));
        let err = WipeOrchestrator::new(h.ctx.clone())
            .verify_servers()
            .await
            .unwrap_err();
        assert_eq!(err.0, vec!["b2@eu-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_servers_passes_when_all_listed() {
        let config = config_fixture(
            vec![host_fixture(vec![server_fixture("a1")])],
            temp_dir("verify-ok"),
        );
        let h = harness(config, FakePanel::new(&["a1", "other"], &[]), FakeMaps::new(0), FakeWebhook::new(204));
        WipeOrchestrator::new(h.ctx.clone())
            .verify_servers()
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_server_is_not_found() {
        let config = config_fixture(vec![host_fixture(vec![server_fixture("a1")])], temp_dir("nf"));
        let h = harness(config, FakePanel::new(&["a1"], &[]), FakeMaps::new(0), FakeWebhook::new(204));
        let err = WipeOrchestrator::new(h.ctx.clone()).wipe("nope").await.unwrap_err();
        assert!(matches!(err, WipeError::NotFound(id) if id == "nope"));
        assert!(h.panel.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_map_wipe_runs_full_sequence() {
        let mut server = server_fixture("a1");
        server.pick_random_map = true;
        server.seeds_file = Some("never-read.csv".to_string());
        server.files_to_delete = rust_patterns();
        server.custom_maps = vec![
            CustomMap {
                map_url: "https://maps.test/one.map".to_string(),
                image_url: "https://maps.test/one.png".to_string(),
            },
            CustomMap {
                map_url: "https://maps.test/two.map".to_string(),
                image_url: "https://maps.test/two.png".to_string(),
            },
        ];
        let config = config_fixture(vec![host_fixture(vec![server.clone()])], temp_dir("custom"));
        let h = harness(config, FakePanel::new(&["a1"], &listing()), FakeMaps::new(0), FakeWebhook::new(204));

        let report = WipeOrchestrator::new(h.ctx.clone()).wipe("a1").await.unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        let chosen = report.content.as_ref().and_then(|c| c.custom_map()).cloned().unwrap();
        assert!(server.custom_maps.contains(&chosen));

        h.ctx.notifications.wait_idle().await;

        assert_eq!(
            h.panel.actions(),
            vec![
                "command:save".to_string(),
                "power:stop".to_string(),
                "list:/server/rust/".to_string(),
                "delete:/server/rust/proceduralmap.1000.123.sav,/server/rust/proceduralmap.1000.123.map".to_string(),
                format!("var:MAP_URL={}", chosen.map_url),
                "power:start".to_string(),
            ]
        );
        // stopping, offline, starting (orchestrator), running (announcement)
        let calls = h.panel.calls();
        let offline_wait = calls.iter().position(|c| c == "power:stop").unwrap();
        let listing_at = calls.iter().position(|c| c.starts_with("list:")).unwrap();
        assert_eq!(&calls[offline_wait + 1..listing_at], &["status", "status"]);
        assert!(h.maps.submits().is_empty());

        let sent = h.webhook.sent();
        assert_eq!(sent.len(), 1);
        let (url, message) = &sent[0];
        assert_eq!(url, "https://discord.test/hooks/a1");
        let embed = &message.embeds[0];
        assert!(embed.description.contains("Custom Map"));
        assert_eq!(embed.image.as_ref().unwrap().url, chosen.image_url);
        assert!(h.ctx.notifications.outstanding().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn seed_wipe_writes_size_before_seed() {
        let seeds_dir = temp_dir("seeds");
        std::fs::write(seeds_dir.join("main.csv"), "seed,size\n123,1000\n").unwrap();

        let mut server = server_fixture("b2");
        server.seeds_file = Some("main.csv".to_string());
        server.files_to_delete = rust_patterns();
        let config = config_fixture(vec![host_fixture(vec![server])], seeds_dir);
        let h = harness(config, FakePanel::new(&["b2"], &listing()), FakeMaps::new(2), FakeWebhook::new(204));

        let report = WipeOrchestrator::new(h.ctx.clone()).wipe("b2").await.unwrap();
        assert_eq!(
            report.content,
            Some(WipeContent::Procedural {
                seed: Seed::new("123", "1000"),
                map_id: Some("1000_123".to_string()),
            })
        );

        h.ctx.notifications.wait_idle().await;

        let actions = h.panel.actions();
        let size_at = actions.iter().position(|a| a == "var:WORLD_SIZE=1000").unwrap();
        let seed_at = actions.iter().position(|a| a == "var:WORLD_SEED=123").unwrap();
        let start_at = actions.iter().position(|a| a == "power:start").unwrap();
        assert!(size_at < seed_at && seed_at < start_at);
        assert_eq!(h.maps.submits(), vec![Seed::new("123", "1000")]);

        let sent = h.webhook.sent();
        assert_eq!(sent.len(), 1);
        let embed = &sent[0].1.embeds[0];
        assert_eq!(embed.fields[0].value, "```123```");
        assert_eq!(embed.fields[1].value, "```1000```");
        assert_eq!(embed.image.as_ref().unwrap().url, "https://img.test/1000_123.png");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_matches_is_warned_and_wipe_continues() {
        let seeds_dir = temp_dir("nomatch");
        std::fs::write(seeds_dir.join("main.csv"), "seed,size\n5,4000\n").unwrap();

        let mut server = server_fixture("c3");
        server.seeds_file = Some("main.csv".to_string());
        server.files_to_delete = vec!["/server/rust/*.sav".to_string()];
        let config = config_fixture(vec![host_fixture(vec![server])], seeds_dir);
        let h = harness(config, FakePanel::new(&["c3"], &["server.cfg"]), FakeMaps::new(0), FakeWebhook::new(204));

        let report = WipeOrchestrator::new(h.ctx.clone()).wipe("c3").await.unwrap();
        let deletion: Vec<_> = report.warnings_in(WipeStage::DeletingFiles).collect();
        assert_eq!(deletion.len(), 1);
        assert_eq!(deletion[0].message, "no files matched for deletion");

        let actions = h.panel.actions();
        assert!(actions.contains(&"delete:".to_string()));
        assert!(actions.contains(&"var:WORLD_SEED=5".to_string()));
        assert!(actions.contains(&"power:start".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_variable_writes_do_not_abort() {
        let mut server = server_fixture("d4");
        server.custom_maps = vec![CustomMap {
            map_url: "https://maps.test/only.map".to_string(),
            image_url: "https://maps.test/only.png".to_string(),
        }];
        let config = config_fixture(vec![host_fixture(vec![server])], temp_dir("vars"));
        let mut panel = FakePanel::new(&["d4"], &[]);
        panel.variables_ok = false;
        let h = harness(config, panel, FakeMaps::new(0), FakeWebhook::new(500));

        let report = WipeOrchestrator::new(h.ctx.clone()).wipe("d4").await.unwrap();
        assert_eq!(report.warnings_in(WipeStage::SelectingContent).count(), 1);
        assert!(h.panel.actions().contains(&"power:start".to_string()));
        // no patterns configured: nothing is listed, the empty delete is still sent
        let actions = h.panel.actions();
        assert!(!actions.iter().any(|a| a.starts_with("list:")));
        assert!(actions.contains(&"delete:".to_string()));
        let deletion: Vec<_> = report.warnings_in(WipeStage::DeletingFiles).collect();
        assert_eq!(deletion.len(), 1);
        assert_eq!(deletion[0].message, "no files matched for deletion");

        h.ctx.notifications.wait_idle().await;
        // rejected webhook is attempted exactly once
        assert_eq!(h.webhook.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn server_stuck_online_aborts_before_deleting() {
        let mut server = server_fixture("e5");
        server.files_to_delete = rust_patterns();
        let config = config_fixture(vec![host_fixture(vec![server])], temp_dir("stuck"));
        let mut panel = FakePanel::new(&["e5"], &listing());
        panel.ignore_stop = true;
        let h = harness(config, panel, FakeMaps::new(0), FakeWebhook::new(204));

        let err = WipeOrchestrator::new(h.ctx.clone()).wipe("e5").await.unwrap_err();
        assert!(matches!(err, WipeError::Wait { stage: "wait_offline", .. }));
        assert!(!h.panel.actions().iter().any(|a| a.starts_with("list:") || a.starts_with("delete:")));
    }
}
