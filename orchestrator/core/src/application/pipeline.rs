// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Job Pipeline
//!
//! The single orchestration path every job goes through:
//! resolve route → submit → poll → finalize. Both dispatch strategies
//! (durable queue worker and inline fallback) invoke this same
//! pipeline, so the two paths cannot drift.
//!
//! Compensation discipline: the debit happened at admission, strictly
//! before this pipeline runs. Any failure from here on finalizes the
//! job through [`JobPipeline::finalize_failure`], which refunds exactly
//! once (the repository's refund guard is idempotent per job).

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::application::polling::{poll_until_terminal, PollOutcome, PollSettings};
use crate::domain::extract;
use crate::domain::job::{Job, JobId};
use crate::domain::ledger::REASON_REFUND;
use crate::domain::notification::{Notifier, TerminalNotice};
use crate::domain::provider::{ProviderDirectory, SubmissionError, TaskProbe};
use crate::domain::repository::{JobRepository, LedgerRepository};
use crate::domain::routing::{ModelRoute, RouteTable};

/// Hands an admitted job to whatever executes the pipeline: the durable
/// queue in normal operation, an inline `tokio::spawn` when the queue
/// backend is unavailable.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job_id: JobId) -> Result<()>;
}

pub struct JobPipeline {
    routes: RouteTable,
    providers: Arc<dyn ProviderDirectory>,
    jobs: Arc<dyn JobRepository>,
    ledger: Arc<dyn LedgerRepository>,
    notifier: Arc<dyn Notifier>,
    poll: PollSettings,
}

impl JobPipeline {
    pub fn new(
        routes: RouteTable,
        providers: Arc<dyn ProviderDirectory>,
        jobs: Arc<dyn JobRepository>,
        ledger: Arc<dyn LedgerRepository>,
        notifier: Arc<dyn Notifier>,
        poll: PollSettings,
    ) -> Self {
        Self { routes, providers, jobs, ledger, notifier, poll }
    }

    fn route_for(&self, job: &Job) -> ModelRoute {
        self.routes.resolve(
            &job.request.model_id,
            job.request.has_reference_images(),
            job.request.has_reference_video(),
        )
    }

    /// Run one job to a terminal state. Safe to call on a redelivered
    /// job: already-terminal jobs are left untouched.
    pub async fn run(&self, job_id: JobId) -> Result<()> {
        let mut job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| anyhow!("job {job_id} not found"))?;

        if job.state.is_terminal() {
            info!(job = %job_id, state = job.state.as_str(), "job already terminal, skipping");
            return Ok(());
        }

        job.activate()?;
        if let Err(e) = self.jobs.save(&job).await {
            warn!(job = %job_id, error = %e, "failed to persist activation");
            return self.finalize_failure(job, INTERNAL_FAILURE_MESSAGE.to_string()).await;
        }

        let route = self.route_for(&job);
        let Some(provider) = self.providers.adapter(route.provider) else {
            return self
                .finalize_failure(
                    job,
                    format!("provider {} is not configured", route.provider.as_str()),
                )
                .await;
        };

        let task = match job.provider_task.clone() {
            // Redelivered job that already holds a task handle: the
            // submission happened before the crash, resume polling it.
            Some(task) => task,
            None => {
                // Submission. The idempotency key is the job id, so a
                // crash-and-redeliver cannot pay for the same work twice.
                let task = match provider
                    .submit(&job.request, &route, &job.id.to_string())
                    .await
                {
                    Ok(task) => task,
                    Err(e) => {
                        let message = user_facing_submission_error(&e);
                        warn!(job = %job_id, error = %e, "submission failed");
                        return self.finalize_failure(job, message).await;
                    }
                };

                info!(
                    job = %job_id,
                    provider = route.provider.as_str(),
                    task = %task.external_task_id,
                    "task submitted"
                );
                if let Err(e) = job.attach_provider_task(task.clone()) {
                    warn!(job = %job_id, error = %e, "failed to record provider task");
                    return self.finalize_failure(job, INTERNAL_FAILURE_MESSAGE.to_string()).await;
                }
                if let Err(e) = self.jobs.save(&job).await {
                    warn!(job = %job_id, error = %e, "failed to persist provider task");
                    return self.finalize_failure(job, INTERNAL_FAILURE_MESSAGE.to_string()).await;
                }
                task
            }
        };

        match poll_until_terminal(provider.as_ref(), &task, route.family, &self.poll).await {
            PollOutcome::Succeeded(result_ref) => self.finalize_success(job, result_ref).await,
            PollOutcome::Failed(message) | PollOutcome::TimedOut(message) => {
                self.finalize_failure(job, message).await
            }
        }
    }

    /// One reconciliation probe for a job whose stored record is still
    /// non-terminal. Finalizes through the shared paths when the
    /// provider has since reached a terminal status, so concurrent
    /// reconciliation can at worst rewrite the same terminal value
    /// (last-write-wins) and never duplicate a ledger effect.
    pub async fn reconcile_once(&self, job: Job) -> Result<Job> {
        if job.state.is_terminal() {
            return Ok(job);
        }
        let Some(task) = job.provider_task.clone() else {
            return Ok(job);
        };
        let Some(provider) = self.providers.adapter(task.provider) else {
            return Ok(job);
        };

        match provider.check(&task).await {
            Ok(TaskProbe::Finished(document)) => {
                let job_id = job.id;
                match extract::result_ref(&document) {
                    Some(result_ref) => self.finalize_success(job, result_ref).await?,
                    None => {
                        self.finalize_failure(
                            job,
                            format!(
                                "provider reported success for task {} but no result could be extracted",
                                task.external_task_id
                            ),
                        )
                        .await?
                    }
                }
                self.jobs
                    .find_by_id(job_id)
                    .await?
                    .ok_or_else(|| anyhow!("job {job_id} vanished during reconciliation"))
            }
            Ok(TaskProbe::Failed(message)) => {
                let job_id = job.id;
                self.finalize_failure(job, format!("provider reported failure: {message}"))
                    .await?;
                self.jobs
                    .find_by_id(job_id)
                    .await?
                    .ok_or_else(|| anyhow!("job {job_id} vanished during reconciliation"))
            }
            Ok(TaskProbe::Pending) | Ok(TaskProbe::Running) => Ok(job),
            Err(e) => {
                // A failed probe leaves the stored record as-is; the
                // next status query will try again.
                warn!(job = %job.id, error = %e, "reconciliation probe failed");
                Ok(job)
            }
        }
    }

    pub async fn finalize_success(&self, mut job: Job, result_ref: String) -> Result<()> {
        if job.complete(result_ref.clone()).is_err() {
            // Lost the race against another finalizer; terminal value
            // already written.
            return Ok(());
        }
        self.jobs.save(&job).await?;
        info!(job = %job.id, result = %result_ref, "job completed");
        self.notify_terminal(&job).await;
        Ok(())
    }

    /// Terminal failure: persist first, then compensate, then notify.
    pub async fn finalize_failure(&self, mut job: Job, message: String) -> Result<()> {
        if job.fail(message.clone()).is_err() {
            return Ok(());
        }
        self.jobs.save(&job).await?;
        warn!(job = %job.id, error = %message, "job failed");

        if job.cost_charged > 0 {
            self.ledger
                .credit(job.request.requester_id, job.cost_charged, REASON_REFUND, job.id)
                .await
                .map_err(|e| anyhow!("refund for job {} failed: {e}", job.id))?;
        }

        self.notify_terminal(&job).await;
        Ok(())
    }

    async fn notify_terminal(&self, job: &Job) {
        let notice = TerminalNotice {
            user_id: job.request.requester_id,
            job_id: job.id,
            result_ref: job.result_ref.clone(),
            error_message: job.error_message.clone(),
            is_video: self.route_for(job).family.is_video(),
        };
        // Best-effort: a delivery failure never rolls back the
        // terminal state reached above.
        if let Err(e) = self.notifier.notify(&notice).await {
            error!(job = %job.id, error = %e, "terminal notification failed");
        }
    }
}

/// Shown when a job dies on our side of the fence, not the provider's.
const INTERNAL_FAILURE_MESSAGE: &str =
    "an internal error interrupted the job, your credits were refunded";

/// Map submission errors to what the end user should read. Upstream
/// balance and unsupported-model cases get precise wording; everything
/// else passes the provider message through.
fn user_facing_submission_error(e: &SubmissionError) -> String {
    match e {
        SubmissionError::UpstreamBalanceExhausted { .. } => {
            "the generation service is temporarily out of capacity, your credits were refunded"
                .to_string()
        }
        SubmissionError::UnsupportedModel { model, .. } => {
            format!("model '{model}' is not supported by the generation service")
        }
        SubmissionError::MissingReferenceImage { model } => {
            format!("model '{model}' needs at least one reference image attached")
        }
        other => other.to_string(),
    }
}
