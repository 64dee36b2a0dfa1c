//! Pterodactyl client API wrapper.
//!
//! Write operations report success as a plain `bool` and log the reason on
//! failure; reads propagate a [`PanelError`]. Every call waits the configured
//! pause first so a wipe never bursts the panel's own rate limiter.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use sweep_model::{Host, PowerSignal, Server, ServerState};

use crate::error::PanelError;

const PANEL_ACCEPT: &str = "Application/vnd.pterodactyl.v1+json";

pub const VAR_WORLD_SIZE: &str = "WORLD_SIZE";
pub const VAR_WORLD_SEED: &str = "WORLD_SEED";
pub const VAR_MAP_URL: &str = "MAP_URL";

#[async_trait]
pub trait PanelApi: Send + Sync {
    /// Identifiers of every server the host's token can see.
    async fn list_servers(&self, host: &Host) -> Result<Vec<String>, PanelError>;

    async fn get_status(&self, host: &Host, server: &Server) -> Result<ServerState, PanelError>;

    async fn send_console_command(&self, host: &Host, server: &Server, command: &str) -> bool;

    async fn set_power(&self, host: &Host, server: &Server, signal: PowerSignal) -> bool;

    async fn set_startup_variable(&self, host: &Host, server: &Server, key: &str, value: &str)
    -> bool;

    /// File names (not paths) directly inside `directory`, in panel order.
    async fn list_directory(
        &self,
        host: &Host,
        server: &Server,
        directory: &str,
    ) -> Result<Vec<String>, PanelError>;

    /// `false` when the panel reports that none of `files` exist.
    async fn delete_files(&self, host: &Host, server: &Server, files: &[String]) -> bool;
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Vec<Item<T>>,
}

#[derive(Debug, Deserialize)]
struct Item<T> {
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct ServerAttributes {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct FileAttributes {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResourcesAttributes {
    current_state: String,
}

fn decode<T: serde::de::DeserializeOwned>(what: &'static str, body: &str) -> Result<T, PanelError> {
    serde_json::from_str(body).map_err(|e| PanelError::Decode {
        what,
        message: e.to_string(),
    })
}

pub fn parse_server_list(body: &str) -> Result<Vec<String>, PanelError> {
    let env: ListEnvelope<ServerAttributes> = decode("server list", body)?;
    Ok(env.data.into_iter().map(|i| i.attributes.identifier).collect())
}

pub fn parse_current_state(body: &str) -> Result<ServerState, PanelError> {
    let item: Item<ResourcesAttributes> = decode("resources", body)?;
    Ok(ServerState::parse(&item.attributes.current_state))
}

pub fn parse_file_names(body: &str) -> Result<Vec<String>, PanelError> {
    let env: ListEnvelope<FileAttributes> = decode("file list", body)?;
    Ok(env.data.into_iter().map(|i| i.attributes.name).collect())
}

#[derive(Debug, Clone)]
pub struct PterodactylClient {
    http: reqwest::Client,
    call_pause: Duration,
}

impl PterodactylClient {
    pub fn new(call_pause: Duration, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sweep-control/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build panel http client")?;
        Ok(Self { http, call_pause })
    }

    fn request(&self, host: &Host, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api/client{path}", host.base_url()))
            .bearer_auth(&host.api_token)
            .header(reqwest::header::ACCEPT, PANEL_ACCEPT)
    }

    async fn pause(&self) {
        if !self.call_pause.is_zero() {
            tokio::time::sleep(self.call_pause).await;
        }
    }

    async fn get_text(&self, what: &'static str, req: RequestBuilder) -> Result<String, PanelError> {
        self.pause().await;
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PanelError::Status {
                what,
                status: status.as_u16(),
            });
        }
        Ok(resp.text().await?)
    }

    /// Sends a write and compares the status against `expected`.
    async fn write(&self, what: &'static str, req: RequestBuilder, expected: StatusCode) -> bool {
        self.pause().await;
        match req.send().await {
            Ok(resp) if resp.status() == expected => true,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(what, %status, body = %truncate(&body, 512), "panel rejected request");
                false
            }
            Err(err) => {
                tracing::warn!(what, %err, "panel request failed");
                false
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn server_path(server: &Server, rest: &str) -> String {
    format!("/servers/{}{rest}", server.id)
}

#[async_trait]
impl PanelApi for PterodactylClient {
    async fn list_servers(&self, host: &Host) -> Result<Vec<String>, PanelError> {
        let body = self
            .get_text("server list", self.request(host, Method::GET, ""))
            .await?;
        parse_server_list(&body)
    }

    async fn get_status(&self, host: &Host, server: &Server) -> Result<ServerState, PanelError> {
        let req = self.request(host, Method::GET, &server_path(server, "/resources"));
        let body = self.get_text("resources", req).await?;
        parse_current_state(&body)
    }

    async fn send_console_command(&self, host: &Host, server: &Server, command: &str) -> bool {
        tracing::debug!(server_id = %server.id, command, "sending console command");
        let req = self
            .request(host, Method::POST, &server_path(server, "/command"))
            .json(&serde_json::json!({ "command": command }));
        self.write("command", req, StatusCode::NO_CONTENT).await
    }

    async fn set_power(&self, host: &Host, server: &Server, signal: PowerSignal) -> bool {
        tracing::debug!(server_id = %server.id, signal = signal.as_str(), "sending power signal");
        let req = self
            .request(host, Method::POST, &server_path(server, "/power"))
            .json(&serde_json::json!({ "signal": signal }));
        self.write("power", req, StatusCode::NO_CONTENT).await
    }

    async fn set_startup_variable(
        &self,
        host: &Host,
        server: &Server,
        key: &str,
        value: &str,
    ) -> bool {
        tracing::debug!(server_id = %server.id, key, value, "updating startup variable");
        let req = self
            .request(host, Method::PUT, &server_path(server, "/startup/variable"))
            .json(&serde_json::json!({ "key": key, "value": value }));
        self.write("startup variable", req, StatusCode::OK).await
    }

    async fn list_directory(
        &self,
        host: &Host,
        server: &Server,
        directory: &str,
    ) -> Result<Vec<String>, PanelError> {
        tracing::debug!(server_id = %server.id, directory, "listing directory");
        let req = self
            .request(host, Method::GET, &server_path(server, "/files/list"))
            .query(&[("directory", directory)]);
        let body = self.get_text("file list", req).await?;
        parse_file_names(&body)
    }

    async fn delete_files(&self, host: &Host, server: &Server, files: &[String]) -> bool {
        tracing::debug!(server_id = %server.id, ?files, "deleting files");
        let req = self
            .request(host, Method::POST, &server_path(server, "/files/delete"))
            .json(&serde_json::json!({ "root": "/", "files": files }));

        self.pause().await;
        match req.send().await {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => true,
            Ok(resp) if resp.status() == StatusCode::UNPROCESSABLE_ENTITY => {
                tracing::warn!(server_id = %server.id, "no files matched for deletion");
                false
            }
            Ok(resp) => {
                tracing::warn!(server_id = %server.id, status = %resp.status(), "panel rejected file deletion");
                false
            }
            Err(err) => {
                tracing::warn!(server_id = %server.id, %err, "file deletion request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_list_reads_identifiers() {
        let body = r#"{
            "object": "list",
            "data": [
                {"object": "server", "attributes": {"identifier": "1a7ce997", "name": "Main"}},
                {"object": "server", "attributes": {"identifier": "5b2e01aa", "name": "Monthly"}}
            ]
        }"#;
        assert_eq!(parse_server_list(body).unwrap(), vec!["1a7ce997", "5b2e01aa"]);
    }

    #[test]
    fn parse_current_state_keeps_unknown_values() {
        let body = r#"{"object":"stats","attributes":{"current_state":"running","is_suspended":false}}"#;
        assert_eq!(parse_current_state(body).unwrap(), ServerState::Running);

        let body = r#"{"attributes":{"current_state":"installing"}}"#;
        assert_eq!(
            parse_current_state(body).unwrap(),
            ServerState::Other("installing".to_string())
        );
    }

    #[test]
    fn parse_current_state_rejects_malformed_body() {
        let err = parse_current_state(r#"{"errors":[]}"#).unwrap_err();
        assert!(matches!(err, PanelError::Decode { what: "resources", .. }));
    }

    #[test]
    fn parse_file_names_keeps_panel_order() {
        let body = r#"{"data":[
            {"attributes":{"name":"proceduralmap.3500.1.sav","is_file":true}},
            {"attributes":{"name":"cfg","is_file":false}},
            {"attributes":{"name":"player.deaths.db","is_file":true}}
        ]}"#;
        assert_eq!(
            parse_file_names(body).unwrap(),
            vec!["proceduralmap.3500.1.sav", "cfg", "player.deaths.db"]
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
