//! In-memory prediction store.
//!
//! Backs tests and database-less demo runs. Data is lost when the store is dropped.

use super::{ClientMatch, NewPrediction, PredictionStore};
use crate::error::StoreError;
use crate::types::prediction::{StoredPrediction, TruthPair};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A client row as seeded into the in-memory store
#[derive(Debug, Clone)]
pub struct ClientRow {
    pub id: i64,
    pub age: i64,
    pub job: String,
    pub marital: String,
    pub education: String,
    /// Real campaign outcome, when known
    pub deposit: Option<bool>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PredictionRow {
    stored: StoredPrediction,
    client_id: Option<i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    clients: RwLock<Vec<ClientRow>>,
    predictions: RwLock<Vec<PredictionRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a client row and return its id
    pub async fn add_client(
        &self,
        criteria: &ClientMatch,
        deposit: Option<bool>,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut clients = self.clients.write().await;
        let id = clients.len() as i64 + 1;
        clients.push(ClientRow {
            id,
            age: criteria.age,
            job: criteria.job.clone(),
            marital: criteria.marital.clone(),
            education: criteria.education.clone(),
            deposit,
            created_at,
        });
        id
    }

    /// Number of stored predictions
    pub async fn prediction_count(&self) -> usize {
        self.predictions.read().await.len()
    }

    /// Client id of every stored prediction, in insertion order
    pub async fn linked_client_ids(&self) -> Vec<Option<i64>> {
        self.predictions
            .read()
            .await
            .iter()
            .map(|p| p.client_id)
            .collect()
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn find_client(&self, criteria: &ClientMatch) -> Result<Option<i64>, StoreError> {
        let clients = self.clients.read().await;
        Ok(clients
            .iter()
            .filter(|c| {
                c.age == criteria.age
                    && c.job == criteria.job
                    && c.marital == criteria.marital
                    && c.education == criteria.education
            })
            // Later rows win ties on created_at, like an insertion-ordered table
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|c| c.id))
    }

    async fn save_prediction(&self, prediction: &NewPrediction) -> Result<(), StoreError> {
        let mut predictions = self.predictions.write().await;
        let id = predictions.len() as i64 + 1;
        predictions.push(PredictionRow {
            stored: StoredPrediction {
                id,
                age: prediction.age,
                job: prediction.job.clone(),
                marital: prediction.marital.clone(),
                education: prediction.education.clone(),
                balance: prediction.balance,
                result: prediction.label.as_int(),
                predicted_at: Utc::now(),
            },
            client_id: prediction.client_id,
        });
        Ok(())
    }

    async fn fetch_predictions(&self, limit: Option<u32>) -> Result<Vec<StoredPrediction>, StoreError> {
        let predictions = self.predictions.read().await;
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(predictions
            .iter()
            .rev()
            .take(limit)
            .map(|p| p.stored.clone())
            .collect())
    }

    async fn fetch_with_truth(&self) -> Result<Vec<TruthPair>, StoreError> {
        let clients = self.clients.read().await;
        let predictions = self.predictions.read().await;
        Ok(predictions
            .iter()
            .filter_map(|p| {
                let client = clients.iter().find(|c| Some(c.id) == p.client_id)?;
                Some(TruthPair {
                    predicted: p.stored.result == 1,
                    actual: client.deposit?,
                })
            })
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
