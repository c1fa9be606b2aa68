// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Durable Job Queue
//!
//! Postgres-backed queue with single-attempt semantics: a claimed job
//! is run through the pipeline exactly once and marked done on
//! success. There is no automatic retry: a submission that already
//! debited credits must not be replayed. A handler error leaves the
//! row claimed, so the abandonment sweep revisits the job and
//! finalizes it through the compensating path.
//!
//! The inline dispatcher is the fallback when no database is reachable
//! at startup: it spawns the identical pipeline handler in-process.
//! Both dispatchers are thin shims over one shared [`JobPipeline`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::pipeline::{JobDispatcher, JobPipeline};
use crate::domain::job::JobId;
use crate::domain::repository::JobRepository;
use crate::domain::service_config::QueueConfig;

/// Enqueues admitted jobs into the durable queue table.
pub struct QueueDispatcher {
    pool: PgPool,
}

impl QueueDispatcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobDispatcher for QueueDispatcher {
    async fn dispatch(&self, job_id: JobId) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_jobs (job_id, state)
            VALUES ($1, 'queued')
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(job_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Degraded-mode dispatcher: runs the same pipeline handler as a
/// detached task, no durability.
pub struct InlineDispatcher {
    pipeline: Arc<JobPipeline>,
}

impl InlineDispatcher {
    pub fn new(pipeline: Arc<JobPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobDispatcher for InlineDispatcher {
    async fn dispatch(&self, job_id: JobId) -> Result<()> {
        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run(job_id).await {
                error!(job = %job_id, error = %e, "inline job execution failed");
            }
        });
        Ok(())
    }
}

/// Background worker that drains the durable queue.
pub struct QueueWorker {
    pool: PgPool,
    pipeline: Arc<JobPipeline>,
    jobs: Arc<dyn JobRepository>,
    config: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        pool: PgPool,
        pipeline: Arc<JobPipeline>,
        jobs: Arc<dyn JobRepository>,
        config: QueueConfig,
    ) -> Self {
        Self { pool, pipeline, jobs, config }
    }

    /// Startup recovery: rows claimed by a crashed process go back to
    /// queued. The admission-time debit sits outside the handler, so
    /// redelivery cannot double-charge.
    pub async fn recover(&self) -> Result<()> {
        let requeued = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'queued', claimed_at = NULL
            WHERE state = 'claimed'
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();
        if requeued > 0 {
            info!(requeued, "requeued jobs left claimed by a previous process");
        }
        Ok(())
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(&self) {
        let claim_interval = Duration::from_millis(self.config.claim_interval_ms);
        let mut sweep_tick = tokio::time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.abandon_stale().await {
                        warn!(error = %e, "abandonment sweep failed");
                    }
                }
                _ = tokio::time::sleep(claim_interval) => {
                    match self.claim_one().await {
                        Ok(Some(job_id)) => self.run_claimed(job_id).await,
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "queue claim failed"),
                    }
                }
            }
        }
    }

    async fn claim_one(&self) -> Result<Option<JobId>> {
        let row = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'claimed', claimed_at = now()
            WHERE job_id = (
                SELECT job_id FROM queue_jobs
                WHERE state = 'queued'
                ORDER BY enqueued_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| JobId(r.get::<Uuid, _>("job_id"))))
    }

    /// One attempt. The pipeline finalizes failures itself; an error
    /// escaping it means even finalization could not be persisted, so
    /// the row stays claimed and the sweep picks the job up again.
    async fn run_claimed(&self, job_id: JobId) {
        if let Err(e) = self.pipeline.run(job_id).await {
            error!(job = %job_id, error = %e, "queued job handler failed, leaving row for the sweep");
            return;
        }
        if let Err(e) = sqlx::query(
            "UPDATE queue_jobs SET state = 'done', finished_at = now() WHERE job_id = $1",
        )
        .bind(job_id.0)
        .execute(&self.pool)
        .await
        {
            warn!(job = %job_id, error = %e, "failed to mark queue row");
        }
    }

    /// Backstop: claimed rows older than the abandonment window are
    /// failed through the normal finalization (which compensates). The
    /// polling bound is expected to fire first, making this a no-op on
    /// the already-terminal job.
    async fn abandon_stale(&self) -> Result<()> {
        let rows = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET state = 'abandoned', finished_at = now()
            WHERE state = 'claimed'
              AND claimed_at < now() - make_interval(secs => $1)
            RETURNING job_id
            "#,
        )
        .bind(self.config.abandon_after_secs as f64)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let job_id = JobId(row.get::<Uuid, _>("job_id"));
            warn!(job = %job_id, "abandoning job past the queue window");
            match self.jobs.find_by_id(job_id).await {
                Ok(Some(job)) if !job.state.is_terminal() => {
                    if let Err(e) = self
                        .pipeline
                        .finalize_failure(
                            job,
                            "abandoned: job did not complete within the queue window".to_string(),
                        )
                        .await
                    {
                        error!(job = %job_id, error = %e, "failed to finalize abandoned job");
                    }
                }
                Ok(_) => {}
                Err(e) => error!(job = %job_id, error = %e, "failed to load abandoned job"),
            }
        }
        Ok(())
    }
}
