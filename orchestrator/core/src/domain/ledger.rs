// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Credit Ledger Types
//!
//! Append-only ledger entries; a user's balance is the running sum,
//! materialized alongside the entries by the repository. Debits must be
//! a single atomic conditional update, never a read-then-write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobId, UserId};

pub const REASON_CHARGE: &str = "charge";
pub const REASON_REFUND: &str = "refund";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    /// Signed credit delta: negative for charges, positive for refunds.
    pub delta: i64,
    pub reason: String,
    pub related_job_id: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn charge(user_id: UserId, amount: i64, job_id: JobId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            delta: -amount,
            reason: REASON_CHARGE.to_string(),
            related_job_id: Some(job_id),
            created_at: Utc::now(),
        }
    }

    pub fn refund(user_id: UserId, amount: i64, job_id: JobId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            delta: amount,
            reason: REASON_REFUND.to_string(),
            related_job_id: Some(job_id),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("ledger storage error: {0}")]
    Storage(String),
}
