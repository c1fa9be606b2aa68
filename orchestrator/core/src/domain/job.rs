// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Generation Job Aggregate
//!
//! A `Job` tracks one generation request end to end: admission,
//! provider submission, polling, finalization. State transitions are
//! guarded here so that no code path can leave a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::provider::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The admitted generation request. Immutable once a job is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub model_id: String,
    pub prompt: String,
    #[serde(default)]
    pub reference_files: Vec<String>,
    #[serde(default)]
    pub auxiliary_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    pub requester_id: UserId,
    pub computed_cost: i64,
}

impl WorkRequest {
    pub fn has_reference_images(&self) -> bool {
        !self.reference_files.is_empty()
    }

    pub fn has_reference_video(&self) -> bool {
        self.auxiliary_files.iter().any(|f| {
            let f = f.to_ascii_lowercase();
            f.ends_with(".mp4") || f.ends_with(".mov") || f.ends_with(".webm")
        })
    }
}

/// Provider-side handle for one in-flight request.
///
/// Created only after a successful submission; `external_task_id` is
/// the opaque join key to the provider and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTask {
    pub provider: ProviderKind,
    pub external_task_id: String,
    pub submitted_payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobTransitionError {
    #[error("job {0} is already terminal")]
    AlreadyTerminal(JobId),
    #[error("external task id is already assigned for job {0}")]
    TaskAlreadyAssigned(JobId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: WorkRequest,
    pub provider_task: Option<ProviderTask>,
    pub state: JobState,
    pub result_ref: Option<String>,
    pub error_message: Option<String>,
    pub cost_charged: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A job is created at admission, atomically with the ledger debit.
    pub fn admitted(request: WorkRequest) -> Self {
        let cost = request.computed_cost;
        Self {
            id: JobId::new(),
            request,
            provider_task: None,
            state: JobState::Queued,
            result_ref: None,
            error_message: None,
            cost_charged: cost,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn activate(&mut self) -> Result<(), JobTransitionError> {
        if self.state.is_terminal() {
            return Err(JobTransitionError::AlreadyTerminal(self.id));
        }
        self.state = JobState::Active;
        Ok(())
    }

    /// Records the provider handle. The external task id is write-once.
    pub fn attach_provider_task(&mut self, task: ProviderTask) -> Result<(), JobTransitionError> {
        if self.provider_task.is_some() {
            return Err(JobTransitionError::TaskAlreadyAssigned(self.id));
        }
        self.provider_task = Some(task);
        Ok(())
    }

    pub fn complete(&mut self, result_ref: String) -> Result<(), JobTransitionError> {
        if self.state.is_terminal() {
            return Err(JobTransitionError::AlreadyTerminal(self.id));
        }
        self.state = JobState::Completed;
        self.result_ref = Some(result_ref);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, message: String) -> Result<(), JobTransitionError> {
        if self.state.is_terminal() {
            return Err(JobTransitionError::AlreadyTerminal(self.id));
        }
        self.state = JobState::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
