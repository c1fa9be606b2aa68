// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into every PostgreSQL repository implementation. Schema
//! setup is idempotent and runs at startup.

use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        request JSONB NOT NULL,
        state TEXT NOT NULL,
        provider TEXT,
        external_task_id TEXT,
        submitted_payload JSONB,
        result_ref TEXT,
        error_message TEXT,
        cost_charged BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_jobs_external_task_id
        ON jobs (external_task_id) WHERE external_task_id IS NOT NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credit_accounts (
        user_id UUID PRIMARY KEY,
        balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        delta BIGINT NOT NULL,
        reason TEXT NOT NULL,
        related_job_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    // At most one refund entry per job: the ledger-side idempotency
    // guard for compensation.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_ledger_refund_per_job
        ON ledger_entries (related_job_id) WHERE reason = 'refund'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_ledger_entries_job
        ON ledger_entries (related_job_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queue_jobs (
        job_id UUID PRIMARY KEY,
        state TEXT NOT NULL DEFAULT 'queued',
        enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        claimed_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_queue_jobs_state
        ON queue_jobs (state, enqueued_at)
    "#,
];
