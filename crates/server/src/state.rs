//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::attachment::store::BlobStore;
use crate::chat::broker::MessageBroker;
use crate::chat::history::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
use crate::config::Config;
use crate::directory::DirectoryClient;
use crate::ws::registry::RoomRegistry;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub broker: Arc<MessageBroker>,
    pub blobs: Arc<BlobStore>,
    pub directory: Arc<DirectoryClient>,

    /// Present only when history runs on Postgres; health checks probe it
    pub pool: Option<PgPool>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let registry = Arc::new(RoomRegistry::new());

        let (history, pool): (Arc<dyn HistoryStore>, Option<PgPool>) = match &config.database_url {
            Some(url) => {
                let store = PgHistoryStore::connect(url).await?;
                let pool = store.pool().clone();
                tracing::info!("History store: postgres");
                (Arc::new(store), Some(pool))
            }
            None => {
                tracing::info!("History store: in-memory (DATABASE_URL not set)");
                (Arc::new(MemoryHistoryStore::new()), None)
            }
        };

        let broker = Arc::new(MessageBroker::with_delivered_delay(
            Arc::clone(&registry),
            Arc::clone(&history),
            config.delivered_delay,
        ));

        let blobs = Arc::new(BlobStore::open(config.data_dir.clone()).await?);
        let directory = Arc::new(DirectoryClient::new(config.directory_url.clone()));

        Ok(Self {
            config: Arc::new(config),
            registry,
            history,
            broker,
            blobs,
            directory,
            pool,
        })
    }
}
