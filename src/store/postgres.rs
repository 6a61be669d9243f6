//! PostgreSQL prediction store.
//!
//! Gated behind the `postgres` Cargo feature.

use super::{ClientMatch, NewPrediction, PredictionStore};
use crate::error::StoreError;
use crate::types::prediction::{StoredPrediction, TruthPair};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS clients (
        id BIGSERIAL PRIMARY KEY,
        age INTEGER NOT NULL,
        job VARCHAR(32) NOT NULL,
        marital VARCHAR(16) NOT NULL,
        education VARCHAR(16) NOT NULL,
        \"default\" VARCHAR(8),
        balance DOUBLE PRECISION,
        housing VARCHAR(8),
        loan VARCHAR(8),
        contact VARCHAR(16),
        day INTEGER,
        month VARCHAR(4),
        duration INTEGER,
        campaign INTEGER,
        pdays INTEGER,
        previous INTEGER,
        poutcome VARCHAR(16),
        deposit VARCHAR(4),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS predictions (
        id BIGSERIAL PRIMARY KEY,
        client_id BIGINT REFERENCES clients(id),
        age INTEGER NOT NULL,
        job VARCHAR(32) NOT NULL,
        marital VARCHAR(16) NOT NULL,
        education VARCHAR(16) NOT NULL,
        balance DOUBLE PRECISION NOT NULL,
        result SMALLINT NOT NULL,
        predicted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_clients_match ON clients(age, job, marital, education, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_predictions_time ON predictions(predicted_at DESC)",
];

fn decode_error(what: &str, e: sqlx::Error) -> StoreError {
    StoreError::Query(format!("Failed to decode {what} row: {e}"))
}

async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Query(format!("Migration failed: {e}")))?;
    }
    Ok(())
}

/// Prediction store backed by the `clients` and `predictions` tables
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool and optionally create the tables.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        migrate: bool,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to connect to PostgreSQL: {e}")))?;

        if migrate {
            run_migrations(&pool).await?;
        }
        info!(max_connections, migrate, "Connected to PostgreSQL");
        Ok(Self { pool })
    }
}

#[async_trait]
impl PredictionStore for PostgresStore {
    async fn find_client(&self, criteria: &ClientMatch) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM clients
             WHERE age = $1 AND job = $2 AND marital = $3 AND education = $4
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(criteria.age as i32)
        .bind(&criteria.job)
        .bind(&criteria.marital)
        .bind(&criteria.education)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to look up client: {e}")))?;

        row.map(|r| r.try_get::<i64, _>("id"))
            .transpose()
            .map_err(|e| decode_error("clients", e))
    }

    async fn save_prediction(&self, prediction: &NewPrediction) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO predictions
                (client_id, age, job, marital, education, balance, result, predicted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())",
        )
        .bind(prediction.client_id)
        .bind(prediction.age as i32)
        .bind(&prediction.job)
        .bind(&prediction.marital)
        .bind(&prediction.education)
        .bind(prediction.balance)
        .bind(prediction.label.as_int())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to save prediction: {e}")))?;

        debug!(
            client_id = ?prediction.client_id,
            result = prediction.label.as_int(),
            "Prediction saved"
        );
        Ok(())
    }

    async fn fetch_predictions(&self, limit: Option<u32>) -> Result<Vec<StoredPrediction>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, age, job, marital, education, balance, result, predicted_at
             FROM predictions ORDER BY predicted_at DESC, id DESC
             LIMIT $1",
        )
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to fetch predictions: {e}")))?;

        rows.iter()
            .map(|row| -> Result<StoredPrediction, sqlx::Error> {
                Ok(StoredPrediction {
                    id: row.try_get("id")?,
                    age: i64::from(row.try_get::<i32, _>("age")?),
                    job: row.try_get("job")?,
                    marital: row.try_get("marital")?,
                    education: row.try_get("education")?,
                    balance: row.try_get("balance")?,
                    result: row.try_get("result")?,
                    predicted_at: row.try_get("predicted_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| decode_error("predictions", e))
    }

    async fn fetch_with_truth(&self) -> Result<Vec<TruthPair>, StoreError> {
        let rows = sqlx::query(
            "SELECT p.result AS predicted, c.deposit AS actual
             FROM predictions p JOIN clients c ON p.client_id = c.id
             WHERE c.deposit IN ('yes', 'no')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("Failed to fetch outcomes: {e}")))?;

        rows.iter()
            .map(|row| -> Result<TruthPair, sqlx::Error> {
                Ok(TruthPair {
                    predicted: row.try_get::<i16, _>("predicted")? == 1,
                    actual: row.try_get::<String, _>("actual")? == "yes",
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| decode_error("outcomes", e))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undecodable_row_is_a_query_error() {
        let err = decode_error("predictions", sqlx::Error::ColumnNotFound("age".to_string()));
        match err {
            StoreError::Query(msg) => {
                assert!(msg.contains("predictions"));
                assert!(msg.contains("age"));
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }
}
