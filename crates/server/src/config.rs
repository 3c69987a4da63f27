//! Application configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
///
/// Everything has a workable default: a server with no environment at all
/// binds locally, keeps history in memory, and stores blobs under `./data`.
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // History persistence; memory-backed when unset
    pub database_url: Option<String>,

    // Blob storage
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,

    // Member directory collaborator; fallback avatars when unset
    pub directory_url: Option<String>,

    // Delivery state machine
    pub delivered_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/attachments")),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "10485760".to_string()) // 10MB default
                .parse()
                .unwrap_or(10 * 1024 * 1024),
            directory_url: env::var("DIRECTORY_URL").ok(),
            delivered_delay: Duration::from_millis(
                env::var("DELIVERED_DELAY_MS")
                    .unwrap_or_else(|_| "150".to_string())
                    .parse()
                    .unwrap_or(150),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            database_url: None,
            data_dir: PathBuf::from("./data/attachments"),
            max_upload_bytes: 10 * 1024 * 1024,
            directory_url: None,
            delivered_delay: Duration::from_millis(150),
        }
    }
}
