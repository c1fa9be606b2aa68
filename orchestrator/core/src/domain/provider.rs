// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Generation Provider Interface (Anti-Corruption Layer)
//!
//! Domain interface for external generation services. Adapters live in
//! `crate::infrastructure::providers`; the rest of the system only sees
//! this trait and its error taxonomy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::job::{ProviderTask, WorkRequest};
use crate::domain::routing::ModelRoute;

/// Which upstream service a model routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Queue-style API (submit returns a request id, status is polled).
    Fal,
    /// Prediction-style API (submit returns a prediction id).
    Replicate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Fal => "fal",
            ProviderKind::Replicate => "replicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fal" => Some(ProviderKind::Fal),
            "replicate" => Some(ProviderKind::Replicate),
            _ => None,
        }
    }
}

/// One status probe of an in-flight provider task.
///
/// `Finished` carries the raw response document: result extraction is a
/// separate, ordered-extractor concern (`crate::domain::extract`) so
/// that "finished but no extractable output" stays diagnosable.
#[derive(Debug, Clone)]
pub enum TaskProbe {
    /// Accepted but not started.
    Pending,
    /// Running on the provider side.
    Running,
    /// Provider reports success; payload is the full status document.
    Finished(serde_json::Value),
    /// Provider reports a terminal failure with its own message.
    Failed(String),
}

/// Errors from the submission/status surface of a provider.
///
/// Variants are deliberately distinguishable so the orchestrator can
/// message the end user precisely (upstream balance vs. bad model vs.
/// transport noise).
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("network error talking to {provider}: {message}")]
    Network { provider: &'static str, message: String },

    #[error("{provider} upstream account balance exhausted")]
    UpstreamBalanceExhausted { provider: &'static str },

    #[error("{provider} does not support model '{model}'")]
    UnsupportedModel { provider: &'static str, model: String },

    #[error("model '{model}' requires at least one reference image")]
    MissingReferenceImage { model: String },

    #[error("{provider} returned HTTP {status}: {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} returned a non-JSON body on an apparently successful call: {snippet}")]
    NonJsonResponse { provider: &'static str, snippet: String },

    #[error("no task id found in {provider} response; tried keys: {}", attempted.join(", "))]
    MissingTaskId {
        provider: &'static str,
        attempted: Vec<&'static str>,
    },
}

/// Lookup of configured provider adapters, injected into the pipeline
/// so the orchestration logic never constructs HTTP clients itself.
pub trait ProviderDirectory: Send + Sync {
    fn adapter(&self, kind: ProviderKind) -> Option<std::sync::Arc<dyn GenerationProvider>>;
}

/// Domain interface for generation providers.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a work request. Performs no ledger mutation.
    ///
    /// `idempotency_key` is forwarded to the provider so a redelivered
    /// job cannot pay for the same work twice upstream.
    async fn submit(
        &self,
        request: &WorkRequest,
        route: &ModelRoute,
        idempotency_key: &str,
    ) -> Result<ProviderTask, SubmissionError>;

    /// One status probe of a previously submitted task.
    async fn check(&self, task: &ProviderTask) -> Result<TaskProbe, SubmissionError>;
}
