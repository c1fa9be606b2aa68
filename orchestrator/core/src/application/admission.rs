// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Admission
//!
//! Validates an incoming request, computes its cost, debits atomically,
//! persists the job and hands it to the dispatcher. The debit strictly
//! precedes both persistence of the queued job and any provider
//! contact; validation and funds errors reject synchronously with no
//! side effect.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::pipeline::JobDispatcher;
use crate::domain::job::{Job, JobId, UserId, WorkRequest};
use crate::domain::ledger::{LedgerError, REASON_REFUND};
use crate::domain::pricing::PriceTable;
use crate::domain::repository::{JobRepository, LedgerRepository};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// What the presentation layer submits for admission.
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub user_id: UserId,
    pub model_id: String,
    pub prompt: String,
    pub source_files: Vec<String>,
    pub auxiliary_files: Vec<String>,
    pub aspect_ratio: Option<String>,
}

pub struct AdmissionService {
    prices: PriceTable,
    jobs: Arc<dyn JobRepository>,
    ledger: Arc<dyn LedgerRepository>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl AdmissionService {
    pub fn new(
        prices: PriceTable,
        jobs: Arc<dyn JobRepository>,
        ledger: Arc<dyn LedgerRepository>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self { prices, jobs, ledger, dispatcher }
    }

    pub async fn submit(&self, cmd: SubmitJob) -> Result<JobId, AdmissionError> {
        if cmd.prompt.trim().is_empty() {
            return Err(AdmissionError::Validation("prompt must not be empty".into()));
        }
        if cmd.model_id.trim().is_empty() {
            return Err(AdmissionError::Validation("model_id must not be empty".into()));
        }

        let cost = self.prices.cost_of(&cmd.model_id);
        let request = WorkRequest {
            model_id: cmd.model_id,
            prompt: cmd.prompt,
            reference_files: cmd.source_files,
            auxiliary_files: cmd.auxiliary_files,
            aspect_ratio: cmd.aspect_ratio,
            requester_id: cmd.user_id,
            computed_cost: cost,
        };
        let job = Job::admitted(request);
        let job_id = job.id;

        // Charge first. From here on every failure must compensate.
        match self.ledger.debit(cmd.user_id, cost, job_id).await {
            Ok(balance) => {
                info!(job = %job_id, user = %cmd.user_id, cost, balance, "job admitted");
            }
            Err(LedgerError::InsufficientFunds { balance, required }) => {
                return Err(AdmissionError::InsufficientFunds { balance, required });
            }
            Err(LedgerError::Storage(msg)) => {
                return Err(AdmissionError::Internal(anyhow::anyhow!(msg)));
            }
        }

        if let Err(e) = self.persist_and_dispatch(job).await {
            // Post-debit failure before the pipeline could take over:
            // route through compensation here, exactly once.
            warn!(job = %job_id, error = %e, "admission failed after debit, refunding");
            self.ledger
                .credit(cmd.user_id, cost, REASON_REFUND, job_id)
                .await
                .map_err(|refund_err| {
                    anyhow::anyhow!("refund after failed admission also failed: {refund_err}")
                })?;
            return Err(AdmissionError::Internal(e));
        }

        Ok(job_id)
    }

    async fn persist_and_dispatch(&self, job: Job) -> anyhow::Result<()> {
        let job_id = job.id;
        self.jobs.save(&job).await?;
        self.dispatcher.dispatch(job_id).await
    }
}
