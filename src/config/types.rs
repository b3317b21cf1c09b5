use serde::Deserialize;

/// Main configuration structure for Kumo-Frontier
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub frontier: FrontierConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            frontier: FrontierConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Bind address and stream limits for the RPC surface
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener on
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrently open client streams
    #[serde(rename = "max-concurrent-streams", default = "default_max_streams")]
    pub max_concurrent_streams: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_streams: default_max_streams(),
        }
    }
}

/// Scheduling behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    /// Minimum delay between two serves from the same queue (seconds)
    #[serde(rename = "default-min-delay-seconds", default = "default_min_delay")]
    pub default_min_delay_seconds: u64,

    /// How long a served URL stays in-flight before it re-becomes eligible (seconds)
    #[serde(
        rename = "default-delay-requestable-seconds",
        default = "default_delay_requestable"
    )]
    pub default_delay_requestable_seconds: u64,

    /// Maximum outstanding store writes per ingest stream
    #[serde(rename = "ingest-outstanding-limit", default = "default_outstanding")]
    pub ingest_outstanding_limit: u32,

    /// Server-side deadline for a single fetch request (milliseconds)
    #[serde(rename = "fetch-deadline-ms", default = "default_fetch_deadline")]
    pub fetch_deadline_ms: u64,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            default_min_delay_seconds: default_min_delay(),
            default_delay_requestable_seconds: default_delay_requestable(),
            ingest_outstanding_limit: default_outstanding(),
            fetch_deadline_ms: default_fetch_deadline(),
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend identifier: "sqlite" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the database file (sqlite backend only)
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7070
}

fn default_max_streams() -> u32 {
    256
}

fn default_min_delay() -> u64 {
    1
}

fn default_delay_requestable() -> u64 {
    30
}

fn default_outstanding() -> u32 {
    10_000
}

fn default_fetch_deadline() -> u64 {
    1_000
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_store_path() -> String {
    "./frontier.db".to_string()
}
