use std::{path::PathBuf, sync::Arc};

use rand::{Rng, seq::SliceRandom};
use sweep_model::{CustomMap, Host, Seed, Server, WipeContent};

use crate::error::MapGenError;
use crate::panel::{PanelApi, VAR_MAP_URL, VAR_WORLD_SEED, VAR_WORLD_SIZE};
use crate::rustmaps::{self, MapGenApi};
use crate::seeds;

/// What a wipe will do to the world, decided before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPlan {
    CustomMap(CustomMap),
    Dataset(PathBuf),
    Filter(String),
    Unchanged,
}

/// Random pick when `pick_random_map` is set, otherwise always the first map.
pub fn choose_custom_map<R: Rng + ?Sized>(server: &Server, rng: &mut R) -> Option<CustomMap> {
    if server.pick_random_map {
        server.custom_maps.choose(rng).cloned()
    } else {
        server.custom_maps.first().cloned()
    }
}

pub fn plan<R: Rng + ?Sized>(server: &Server, seeds_dir: &std::path::Path, rng: &mut R) -> ContentPlan {
    if let Some(map) = choose_custom_map(server, rng) {
        return ContentPlan::CustomMap(map);
    }
    if let Some(file) = server.seeds_file.as_deref().filter(|f| !f.trim().is_empty()) {
        return ContentPlan::Dataset(seeds_dir.join(file));
    }
    seed_filter(server).map_or(ContentPlan::Unchanged, |f| ContentPlan::Filter(f.to_string()))
}

fn seed_filter(server: &Server) -> Option<&str> {
    server
        .rustmaps_seeds_filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
}

/// Outcome of the content stage. Warnings never abort the wipe.
#[derive(Debug, Default)]
pub struct Applied {
    pub content: Option<WipeContent>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ContentSelector {
    panel: Arc<dyn PanelApi>,
    maps: Arc<dyn MapGenApi>,
    seeds_dir: PathBuf,
}

impl ContentSelector {
    pub fn new(panel: Arc<dyn PanelApi>, maps: Arc<dyn MapGenApi>, seeds_dir: PathBuf) -> Self {
        Self {
            panel,
            maps,
            seeds_dir,
        }
    }

    pub async fn select_and_apply(&self, host: &Host, server: &Server) -> Applied {
        let plan = {
            let mut rng = rand::thread_rng();
            plan(server, &self.seeds_dir, &mut rng)
        };

        let mut applied = Applied::default();
        match plan {
            ContentPlan::CustomMap(map) => {
                tracing::info!(server_id = %server.id, map_url = %map.map_url, "using custom map");
                if !self
                    .panel
                    .set_startup_variable(host, server, VAR_MAP_URL, &map.map_url)
                    .await
                {
                    applied.warnings.push(format!("failed to change map url to {}", map.map_url));
                }
                applied.content = Some(WipeContent::CustomMap(map));
            }
            ContentPlan::Dataset(path) => match seeds::load_dataset(&path).await {
                Ok(rows) => {
                    let picked = {
                        let mut rng = rand::thread_rng();
                        seeds::pick(&rows, &mut rng).cloned()
                    };
                    if let Some(seed) = picked {
                        tracing::debug!(server_id = %server.id, path = %path.display(), rows = rows.len(), "picked seed from dataset");
                        applied.content = Some(self.apply_seed(host, server, seed, &mut applied.warnings).await);
                    }
                }
                Err(err) => {
                    applied
                        .warnings
                        .push(format!("seed dataset {} unusable: {err}", path.display()));
                    if let Some(filter) = seed_filter(server) {
                        applied.content = Some(self.apply_filter(host, server, filter, &mut applied.warnings).await);
                    }
                }
            },
            ContentPlan::Filter(filter) => {
                applied.content = Some(self.apply_filter(host, server, &filter, &mut applied.warnings).await);
            }
            ContentPlan::Unchanged => {
                tracing::info!(server_id = %server.id, "no custom maps or seeds configured; keeping current world settings");
            }
        }

        for warning in &applied.warnings {
            tracing::warn!(server_id = %server.id, "{warning}");
        }
        applied
    }

    async fn apply_filter(
        &self,
        host: &Host,
        server: &Server,
        filter: &str,
        warnings: &mut Vec<String>,
    ) -> WipeContent {
        let seed = rustmaps::seed_for_filter(self.maps.as_ref(), filter).await;
        tracing::debug!(server_id = %server.id, filter, "picked seed from filter");
        self.apply_seed(host, server, seed, warnings).await
    }

    /// Writes size then seed, then submits generation for the preview.
    async fn apply_seed(
        &self,
        host: &Host,
        server: &Server,
        seed: Seed,
        warnings: &mut Vec<String>,
    ) -> WipeContent {
        if !self
            .panel
            .set_startup_variable(host, server, VAR_WORLD_SIZE, &seed.size)
            .await
        {
            warnings.push(format!("failed to change world size to {}", seed.size));
        }
        if !self
            .panel
            .set_startup_variable(host, server, VAR_WORLD_SEED, &seed.seed)
            .await
        {
            warnings.push(format!("failed to change seed to {}", seed.seed));
        }
        tracing::info!(server_id = %server.id, seed = %seed.seed, size = %seed.size, "changed seed");

        let map_id = match self.maps.submit(&seed).await {
            Ok(id) => {
                tracing::info!(server_id = %server.id, map_id = %id, "submitted map generation request");
                Some(id)
            }
            Err(MapGenError::Disabled) => {
                tracing::info!(server_id = %server.id, "map generation disabled; skipping preview");
                None
            }
            Err(err) => {
                warnings.push(format!(
                    "failed to submit map generation for seed {} size {}: {err}",
                    seed.seed, seed.size
                ));
                None
            }
        };

        WipeContent::Procedural { seed, map_id }
    }
}
