//! Postgres-backed catalog collections.
//!
//! `entities` is read-only here. `update_proposals` and `run_logs` are append-only;
//! the review workflow owns every later write to `update_proposals`.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use catalog_common::{CertificationStatus, Entity, ProposalStatus, RunLogRecord, UpdateProposal};

use crate::traits::{EntityStore, ProposalStore, RunLogStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS entities (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        address     TEXT NOT NULL DEFAULT '',
        status      TEXT NOT NULL DEFAULT 'unknown',
        is_active   BOOLEAN NOT NULL DEFAULT TRUE,
        socials     JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS update_proposals (
        id          UUID PRIMARY KEY,
        entity_id   TEXT NOT NULL,
        field       TEXT NOT NULL,
        old_value   TEXT NOT NULL,
        new_value   TEXT NOT NULL,
        source      TEXT NOT NULL,
        confidence  DOUBLE PRECISION NOT NULL,
        timestamp   TIMESTAMPTZ NOT NULL,
        status      TEXT NOT NULL DEFAULT 'pending'
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS update_proposals_pending_idx
        ON update_proposals (entity_id, field, new_value)
        WHERE status = 'pending'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS run_logs (
        id                BIGSERIAL PRIMARY KEY,
        scraper_name      TEXT NOT NULL,
        timestamp         TIMESTAMPTZ NOT NULL,
        entities_checked  INTEGER,
        updates_found     INTEGER,
        errors            JSONB NOT NULL DEFAULT '[]'::jsonb,
        duration_ms       BIGINT NOT NULL
    )
    "#,
];

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .context("schema migration failed")?;
        }
        info!(statements = SCHEMA.len(), "Catalog schema ready");
        Ok(())
    }

    /// Most recent run logs for a pipeline, newest first.
    pub async fn recent_run_logs(&self, scraper_name: &str, limit: u32) -> Result<Vec<RunLogRecord>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, Option<i32>, Option<i32>, serde_json::Value, i64)>(
            r#"
            SELECT scraper_name, timestamp, entities_checked, updates_found, errors, duration_ms
            FROM run_logs
            WHERE scraper_name = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(scraper_name)
        .bind(limit.min(100) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(scraper_name, timestamp, checked, updates, errors, duration_ms)| -> Result<RunLogRecord> {
                Ok(RunLogRecord {
                    scraper_name,
                    timestamp,
                    entities_checked: checked.map(|n| n.max(0) as u32),
                    updates_found: updates.map(|n| n.max(0) as u32),
                    errors: serde_json::from_value(errors)?,
                    duration_ms: duration_ms.max(0) as u64,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, bool, serde_json::Value)>(
            r#"
            SELECT id, name, address, status, is_active, socials
            FROM entities
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name, address, status, is_active, socials)| -> Result<Entity> {
                let socials: BTreeMap<String, String> = serde_json::from_value(socials)
                    .with_context(|| format!("entity {id} has malformed socials"))?;
                Ok(Entity {
                    id,
                    name,
                    address,
                    status: CertificationStatus::parse(&status),
                    is_active,
                    socials,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProposalStore for PgStore {
    async fn pending_exists(&self, entity_id: &str, field: &str, new_value: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM update_proposals
                WHERE entity_id = $1 AND field = $2 AND new_value = $3 AND status = $4
            )
            "#,
        )
        .bind(entity_id)
        .bind(field)
        .bind(new_value)
        .bind(ProposalStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn commit_batch(&self, proposals: &[UpdateProposal]) -> Result<()> {
        if proposals.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on any error rolls back every insert.
        let mut tx = self.pool.begin().await?;
        for p in proposals {
            sqlx::query(
                r#"
                INSERT INTO update_proposals
                    (id, entity_id, field, old_value, new_value, source, confidence, timestamp, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(p.id)
            .bind(&p.entity_id)
            .bind(&p.field)
            .bind(&p.old_value)
            .bind(&p.new_value)
            .bind(&p.source)
            .bind(p.confidence)
            .bind(p.timestamp)
            .bind(p.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = proposals.len(), "Update proposals committed");
        Ok(())
    }
}

#[async_trait]
impl RunLogStore for PgStore {
    async fn append(&self, record: &RunLogRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_logs (scraper_name, timestamp, entities_checked, updates_found, errors, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.scraper_name)
        .bind(record.timestamp)
        .bind(record.entities_checked.map(|n| n as i32))
        .bind(record.updates_found.map(|n| n as i32))
        .bind(serde_json::to_value(&record.errors)?)
        .bind(record.duration_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
