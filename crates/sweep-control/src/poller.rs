use std::{sync::Arc, time::Duration};

use sweep_model::{Host, Server, ServerState};
use tokio::time::Instant;

use crate::error::PollError;
use crate::panel::PanelApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// First delay between attempts; doubles up to `max`.
    pub initial: Duration,
    pub max: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub deadline: Duration,
}

impl PollConfig {
    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self { deadline, ..self }
    }

    /// Delay after `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(30);
        let mult = 1u32.checked_shl(pow).unwrap_or(u32::MAX);
        self.initial.saturating_mul(mult).min(self.max)
    }
}

/// Tracks elapsed time for one wait and hands out the next sleep.
#[derive(Debug)]
pub struct Backoff {
    cfg: PollConfig,
    started: Instant,
    attempt: u32,
}

impl Backoff {
    pub fn start(cfg: PollConfig) -> Self {
        Self {
            cfg,
            started: Instant::now(),
            attempt: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Sleeps before the next attempt. `false` once the deadline has passed.
    pub async fn wait(&mut self) -> bool {
        let elapsed = self.elapsed();
        if elapsed >= self.cfg.deadline {
            return false;
        }
        self.attempt += 1;
        let delay = self
            .cfg
            .backoff(self.attempt)
            .min(self.cfg.deadline - elapsed);
        tokio::time::sleep(delay).await;
        true
    }
}

#[derive(Clone)]
pub struct StatusPoller {
    panel: Arc<dyn PanelApi>,
    cfg: PollConfig,
}

impl StatusPoller {
    pub fn new(panel: Arc<dyn PanelApi>, cfg: PollConfig) -> Self {
        Self { panel, cfg }
    }

    /// Blocks until the panel reports `target`. Transport errors count as a
    /// miss and are retried until the deadline.
    pub async fn wait_for(
        &self,
        host: &Host,
        server: &Server,
        target: ServerState,
    ) -> Result<Duration, PollError> {
        self.wait_for_any(host, server, std::slice::from_ref(&target))
            .await
    }

    pub async fn wait_for_any(
        &self,
        host: &Host,
        server: &Server,
        targets: &[ServerState],
    ) -> Result<Duration, PollError> {
        let mut backoff = Backoff::start(self.cfg);
        let mut last: String;
        loop {
            match self.panel.get_status(host, server).await {
                Ok(state) if targets.contains(&state) => {
                    tracing::debug!(server_id = %server.id, %state, "server status");
                    return Ok(backoff.elapsed());
                }
                Ok(state) => {
                    tracing::debug!(
                        server_id = %server.id,
                        %state,
                        waiting_for = ?targets,
                        attempt = backoff.attempt(),
                        "server status (waiting)"
                    );
                    last = state.to_string();
                }
                Err(err) => {
                    tracing::warn!(server_id = %server.id, %err, "status query failed; retrying");
                    last = format!("error: {err}");
                }
            }

            if !backoff.wait().await {
                return Err(PollError::timeout(targets, last, backoff.elapsed()));
            }
        }
    }
}
