//! Client and prediction persistence.
//!
//! The pipeline only needs two operations from the store: a best-effort
//! lookup of an existing client row and a single insert of the prediction.
//! The dashboard reads stored predictions back.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::types::prediction::{Label, StoredPrediction, TruthPair};
use async_trait::async_trait;
use std::sync::Arc;

/// Fields used to link a prediction to an existing client row.
///
/// Four-field equality is a heuristic, not an identity: several clients may
/// match and the most recently created one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMatch {
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
}

/// A prediction ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub client_id: Option<i64>,
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
    pub balance: f64,
    pub label: Label,
}

/// Storage operations consumed by the pipeline and the dashboard
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Id of the most recently created client matching all four fields
    async fn find_client(&self, criteria: &ClientMatch) -> Result<Option<i64>, StoreError>;

    /// Insert one prediction row
    async fn save_prediction(&self, prediction: &NewPrediction) -> Result<(), StoreError>;

    /// Stored predictions, most recent first
    async fn fetch_predictions(&self, limit: Option<u32>) -> Result<Vec<StoredPrediction>, StoreError>;

    /// Predictions linked to a client whose real outcome is known
    async fn fetch_with_truth(&self) -> Result<Vec<TruthPair>, StoreError>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Build the configured store backend
pub async fn connect(config: &StoreConfig) -> anyhow::Result<Arc<dyn PredictionStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = config.resolve_url().ok_or_else(|| {
                anyhow::anyhow!("No database URL: set store.url, DATABASE_URL or DB_USER/DB_HOST/DB_NAME")
            })?;
            let store = PostgresStore::connect(&url, config.max_connections, config.run_migrations).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("PostgreSQL store requested but the `postgres` feature is disabled")
        }
    }
}
