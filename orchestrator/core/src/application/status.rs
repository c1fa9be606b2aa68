// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Status Query with Lazy Reconciliation
//!
//! `get_status` answers from the stored record. If the record is still
//! non-terminal but a provider task exists, the provider is probed
//! once and a now-terminal outcome is finalized before answering, so a
//! client that missed the original completion path is never stuck.
//! Terminal records answer without any provider contact.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::application::pipeline::JobPipeline;
use crate::domain::job::{Job, JobId, JobState};
use crate::domain::repository::JobRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatusView {
    Queued,
    Active,
    Completed { result_ref: String },
    Failed { error_message: String },
}

impl JobStatusView {
    fn of(job: &Job) -> Self {
        match job.state {
            JobState::Queued => JobStatusView::Queued,
            JobState::Active => JobStatusView::Active,
            JobState::Completed => JobStatusView::Completed {
                result_ref: job.result_ref.clone().unwrap_or_default(),
            },
            JobState::Failed => JobStatusView::Failed {
                error_message: job.error_message.clone().unwrap_or_default(),
            },
        }
    }
}

pub struct StatusService {
    jobs: Arc<dyn JobRepository>,
    pipeline: Arc<JobPipeline>,
}

impl StatusService {
    pub fn new(jobs: Arc<dyn JobRepository>, pipeline: Arc<JobPipeline>) -> Self {
        Self { jobs, pipeline }
    }

    pub async fn get_status(&self, job_id: JobId) -> Result<Option<JobStatusView>> {
        let Some(job) = self.jobs.find_by_id(job_id).await? else {
            return Ok(None);
        };

        if job.state.is_terminal() {
            return Ok(Some(JobStatusView::of(&job)));
        }

        let reconciled = self.pipeline.reconcile_once(job).await?;
        Ok(Some(JobStatusView::of(&reconciled)))
    }
}
