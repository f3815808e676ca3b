use std::path::PathBuf;

/// Pipeline configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path prefix for the index artifact pair (`<prefix>.index.json`,
    /// `<prefix>.slots.json`).
    pub index_prefix: PathBuf,
    /// Embedding dimension produced by the face-embedding capability.
    pub dimension: usize,
    /// Number of random-projection trees per index build.
    pub trees: usize,
    /// Face-embedding service endpoint (POST image bytes, JSON vectors back).
    pub embedder_endpoint: String,
    /// Timeout in seconds for image downloads and embedder calls.
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `LINEUP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("lineup");

        let db_path = std::env::var("LINEUP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery.db"));

        let index_prefix = std::env::var("LINEUP_INDEX_PREFIX")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("gallery"));

        Self {
            db_path,
            index_prefix,
            dimension: env_usize("LINEUP_DIMENSION", 128),
            trees: env_usize("LINEUP_TREES", lineup_core::DEFAULT_TREES),
            embedder_endpoint: std::env::var("LINEUP_EMBEDDER_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8500/embed".to_string()),
            http_timeout_secs: env_u64("LINEUP_HTTP_TIMEOUT_SECS", 20),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
