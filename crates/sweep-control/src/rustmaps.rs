//! RustMaps v2 API: map generation submit/fetch and filtered random seeds.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::Deserialize;
use sweep_model::Seed;

use crate::error::MapGenError;

const DEFAULT_BASE_URL: &str = "https://rustmaps.com";

/// Known-good seeds used when a filter yields nothing.
pub const FALLBACK_SEEDS: [(&str, &str); 12] = [
    ("1337", "3500"),
    ("8008135", "3500"),
    ("1955474290", "3500"),
    ("2074113616", "3500"),
    ("587419652", "3700"),
    ("1103727587", "3700"),
    ("12345", "4000"),
    ("964519014", "4000"),
    ("1749834553", "4000"),
    ("420691", "4250"),
    ("2118497437", "4250"),
    ("173092480", "4500"),
];

#[async_trait]
pub trait MapGenApi: Send + Sync {
    /// Requests generation for `seed`. Repeats are harmless; returns the job id.
    async fn submit(&self, seed: &Seed) -> Result<String, MapGenError>;

    /// Preview image URL once rendering has finished.
    async fn preview_url(&self, map_id: &str) -> Result<Option<String>, MapGenError>;

    /// One random seed from a saved search filter, `None` if it matched nothing.
    async fn random_filtered(&self, filter: &str) -> Result<Option<Seed>, MapGenError>;
}

pub fn fallback_seed() -> Seed {
    let mut rng = rand::thread_rng();
    let (seed, size) = FALLBACK_SEEDS
        .choose(&mut rng)
        .copied()
        .unwrap_or(FALLBACK_SEEDS[0]);
    Seed::new(seed, size)
}

/// Random seed for `filter`, falling back to [`FALLBACK_SEEDS`] when the
/// service is unavailable or the filter is empty.
pub async fn seed_for_filter(api: &dyn MapGenApi, filter: &str) -> Seed {
    match api.random_filtered(filter).await {
        Ok(Some(seed)) => seed,
        Ok(None) => {
            tracing::warn!(filter, "seed filter returned no maps; using fallback pool");
            fallback_seed()
        }
        Err(err) => {
            tracing::warn!(filter, %err, "seed filter lookup failed; using fallback pool");
            fallback_seed()
        }
    }
}

/// Job id used when the submit response carries none.
pub fn default_map_id(seed: &Seed) -> String {
    format!("{}_{}", seed.size, seed.seed)
}

fn submit_accepted(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201 | 204 | 404 | 409)
}

#[derive(Debug, Deserialize)]
struct SubmitResp {
    #[serde(rename = "mapId", default)]
    map_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MapResp {
    #[serde(rename = "imageIconUrl", default)]
    image_icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterResp {
    #[serde(default)]
    results: Vec<FilterEntry>,
}

#[derive(Debug, Deserialize)]
struct FilterEntry {
    seed: serde_json::Value,
    size: serde_json::Value,
}

fn value_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_submit(body: &str, seed: &Seed) -> String {
    serde_json::from_str::<SubmitResp>(body)
        .ok()
        .and_then(|r| r.map_id)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| default_map_id(seed))
}

pub fn parse_preview(body: &str) -> Result<Option<String>, MapGenError> {
    let resp: MapResp =
        serde_json::from_str(body).map_err(|e| MapGenError::Decode(e.to_string()))?;
    Ok(resp.image_icon_url.filter(|u| !u.trim().is_empty()))
}

pub fn parse_filter(body: &str) -> Result<Vec<Seed>, MapGenError> {
    let resp: FilterResp =
        serde_json::from_str(body).map_err(|e| MapGenError::Decode(e.to_string()))?;
    Ok(resp
        .results
        .iter()
        .filter_map(|e| Some(Seed::new(value_text(&e.seed)?, value_text(&e.size)?)))
        .collect())
}

/// Filter lookup URL; `filter` is a single percent-encoded path segment.
fn filter_url(base_url: &str, filter: &str) -> Result<reqwest::Url, MapGenError> {
    let invalid = || MapGenError::Transport(format!("invalid base url {base_url}"));
    let mut url = reqwest::Url::parse(base_url).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(["api", "v2", "maps", "filter", filter]);
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct RustMapsClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl RustMapsClient {
    pub fn new(
        base_url: Option<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sweep-control/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("build rustmaps http client")?;
        let base_url = base_url
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_token = api_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    fn token(&self) -> Result<&str, MapGenError> {
        self.api_token.as_deref().ok_or(MapGenError::Disabled)
    }
}

#[async_trait]
impl MapGenApi for RustMapsClient {
    async fn submit(&self, seed: &Seed) -> Result<String, MapGenError> {
        let token = self.token()?;
        tracing::debug!(seed = %seed.seed, size = %seed.size, "submitting map generation request");
        let resp = self
            .http
            .post(format!(
                "{}/api/v2/maps/{}/{}",
                self.base_url, seed.seed, seed.size
            ))
            .query(&[("staging", "false"), ("barren", "false")])
            .header("X-API-Key", token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !submit_accepted(status) {
            return Err(MapGenError::Status(status.as_u16()));
        }
        let body = resp.text().await.unwrap_or_default();
        Ok(parse_submit(&body, seed))
    }

    async fn preview_url(&self, map_id: &str) -> Result<Option<String>, MapGenError> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{}/api/v2/maps/{map_id}", self.base_url))
            .header("X-API-Key", token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        // Still queued or rendering.
        if matches!(status.as_u16(), 202 | 404 | 409) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(MapGenError::Status(status.as_u16()));
        }
        parse_preview(&resp.text().await?)
    }

    async fn random_filtered(&self, filter: &str) -> Result<Option<Seed>, MapGenError> {
        let token = self.token()?;
        let resp = self
            .http
            .get(filter_url(&self.base_url, filter)?)
            .header("X-API-Key", token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MapGenError::Status(e.status().map(|s| s.as_u16()).unwrap_or(0)))?;
        let seeds = parse_filter(&resp.text().await?)?;
        let mut rng = rand::thread_rng();
        Ok(seeds.choose(&mut rng).cloned())
    }
}
