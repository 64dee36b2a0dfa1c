use std::fmt;

/// Identifier of a single wipe run. Used to track the background announcement
/// that belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct WipeId(pub String);

impl WipeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for WipeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Power state reported by the panel. Strings the panel may grow later are kept
/// verbatim in `Other` so callers can log them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerState {
    Offline,
    Starting,
    Running,
    Stopping,
    Other(String),
}

impl ServerState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "offline" => Self::Offline,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for ServerState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ServerState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Power signal accepted by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Stop,
}

impl PowerSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CustomMap {
    pub map_url: String,
    pub image_url: String,
}

/// One row of a seed dataset. Values are kept as text because the panel takes
/// them as startup variable strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Seed {
    pub seed: String,
    pub size: String,
}

impl Seed {
    pub fn new(seed: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            size: size.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EmbedTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    /// `#RRGGBB`
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NotificationSettings {
    pub webhook: String,
    #[serde(default)]
    pub ping_everyone: bool,
    #[serde(default)]
    pub ping_role: Option<u64>,
    pub embed: EmbedTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub connect_address: String,
    #[serde(rename = "discord")]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub pick_random_map: bool,
    #[serde(default)]
    pub seeds_file: Option<String>,
    #[serde(default)]
    pub rustmaps_seeds_filter: Option<String>,
    #[serde(default)]
    pub custom_maps: Vec<CustomMap>,
    #[serde(default)]
    pub files_to_delete: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Host {
    pub name: String,
    pub url: String,
    pub api_token: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

impl Host {
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// World content applied during a wipe.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WipeContent {
    CustomMap(CustomMap),
    Procedural {
        seed: Seed,
        /// Map-generation job handle, present once the job was submitted.
        map_id: Option<String>,
    },
}

impl WipeContent {
    pub fn seed(&self) -> Option<&Seed> {
        match self {
            Self::Procedural { seed, .. } => Some(seed),
            Self::CustomMap(_) => None,
        }
    }

    pub fn custom_map(&self) -> Option<&CustomMap> {
        match self {
            Self::CustomMap(map) => Some(map),
            Self::Procedural { .. } => None,
        }
    }
}
