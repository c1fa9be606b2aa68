// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Per-conversation draft state, held in an explicit store keyed by
//! conversation id and passed into the admission layer. The
//! orchestrator itself stays stateless, so worker processes remain
//! interchangeable.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftSession {
    pub model_id: Option<String>,
    pub reference_files: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct DraftSessionStore {
    sessions: DashMap<String, DraftSession>,
}

impl DraftSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<DraftSession> {
        self.sessions.get(conversation_id).map(|s| s.clone())
    }

    pub fn update<F>(&self, conversation_id: &str, apply: F)
    where
        F: FnOnce(&mut DraftSession),
    {
        let mut entry = self.sessions.entry(conversation_id.to_string()).or_default();
        apply(&mut entry);
        entry.updated_at = Some(Utc::now());
    }

    /// Clears the draft once a job has been admitted from it.
    pub fn clear(&self, conversation_id: &str) {
        self.sessions.remove(conversation_id);
    }

    /// Drop drafts untouched for `max_age`.
    pub fn prune(&self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        self.sessions
            .retain(|_, s| s.updated_at.map(|t| t > cutoff).unwrap_or(false));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
