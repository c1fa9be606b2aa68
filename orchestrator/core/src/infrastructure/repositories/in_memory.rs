// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! In-memory repository implementations: development, tests, and the
//! degraded mode when no database is reachable at startup.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::job::{Job, JobId, UserId};
use crate::domain::ledger::{LedgerEntry, LedgerError};
use crate::domain::repository::{JobRepository, LedgerRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| RepositoryError::Database("mutex poisoned".into()))?;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| RepositoryError::Database("mutex poisoned".into()))?;
        Ok(jobs.get(&id).cloned())
    }
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<UserId, i64>,
    entries: Vec<LedgerEntry>,
    /// Jobs already refunded; the idempotency guard for `credit`.
    refunded: HashSet<JobId>,
}

/// The whole ledger lives behind one mutex, so debit is a single
/// atomic check-and-update; two concurrent debits can never both pass
/// against a balance that covers only one.
#[derive(Clone, Default)]
pub struct InMemoryLedgerRepository {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Storage("mutex poisoned".into()))
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn debit(&self, user_id: UserId, amount: i64, job_id: JobId) -> Result<i64, LedgerError> {
        let mut state = self.lock()?;
        let balance = state.balances.get(&user_id).copied().unwrap_or(0);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds { balance, required: amount });
        }
        let new_balance = balance - amount;
        state.balances.insert(user_id, new_balance);
        state.entries.push(LedgerEntry::charge(user_id, amount, job_id));
        Ok(new_balance)
    }

    async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        reason: &str,
        job_id: JobId,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        if reason == crate::domain::ledger::REASON_REFUND && !state.refunded.insert(job_id) {
            // Second refund for the same job: no-op.
            return Ok(());
        }
        *state.balances.entry(user_id).or_insert(0) += amount;
        let mut entry = LedgerEntry::refund(user_id, amount, job_id);
        entry.reason = reason.to_string();
        state.entries.push(entry);
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> Result<i64, LedgerError> {
        let state = self.lock()?;
        Ok(state.balances.get(&user_id).copied().unwrap_or(0))
    }

    async fn deposit(&self, user_id: UserId, amount: i64) -> Result<i64, LedgerError> {
        let mut state = self.lock()?;
        let balance = state.balances.entry(user_id).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    async fn entries_for_job(&self, job_id: JobId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.related_job_id == Some(job_id))
            .cloned()
            .collect())
    }
}
