// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Outbound notification contract. Delivery is best-effort: a failed
//! notification is logged and never rolls back a job's terminal state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalNotice {
    pub user_id: UserId,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub is_video: bool,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a terminal outcome. Errors are for logging only; callers
    /// must not let them affect job state or the ledger.
    async fn notify(&self, notice: &TerminalNotice) -> anyhow::Result<()>;
}
