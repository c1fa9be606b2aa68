// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts, one per aggregate, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|-----------------|
//! | `JobRepository` | `Job` | `InMemoryJobRepository`, `PostgresJobRepository` |
//! | `LedgerRepository` | `LedgerEntry` | `InMemoryLedgerRepository`, `PostgresLedgerRepository` |
//!
//! Concrete implementations are selected at startup: PostgreSQL when a
//! database is reachable, in-memory for development, tests, and the
//! degraded no-database mode.

use async_trait::async_trait;

use crate::domain::job::{Job, JobId, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerError};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("job not found: {0}")]
    NotFound(JobId),
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Save a job (create or update).
    async fn save(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomic conditional debit: succeeds with the new balance only if
    /// the current balance covers `amount`. Two concurrent debits from
    /// one user must never both succeed against a balance that covers
    /// only one.
    async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        job_id: JobId,
    ) -> Result<i64, LedgerError>;

    /// Compensating credit, idempotent on `(job_id, reason)`: a second
    /// refund for the same job is a no-op.
    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        job_id: JobId,
    ) -> Result<(), LedgerError>;

    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError>;

    /// Seed or top up an account. Admission itself never calls this.
    async fn deposit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError>;

    /// All entries referencing a job, oldest first.
    async fn entries_for_job(&self, job_id: JobId) -> Result<Vec<LedgerEntry>, LedgerError>;
}
