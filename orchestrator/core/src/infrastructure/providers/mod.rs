// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Provider Adapters
//!
//! Concrete `GenerationProvider` implementations and the registry that
//! owns them. Adapters translate our domain types to each provider's
//! wire format and nothing else; routing, pricing, and ledger concerns
//! never reach this module.

pub mod fal;
pub mod replicate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::job::WorkRequest;
use crate::domain::provider::{GenerationProvider, ProviderDirectory, ProviderKind, SubmissionError};
use crate::domain::routing::ModelRoute;
use crate::domain::service_config::{resolve_secret, ServiceConfig};

pub use fal::FalAdapter;
pub use replicate::ReplicateAdapter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        // Builder only fails on TLS backend misconfiguration.
        .unwrap_or_default()
}

/// Holds one adapter per configured provider.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { adapters: HashMap::new() }
    }

    /// Build the registry from configuration. A provider that fails to
    /// initialize is skipped so the rest keep working.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut registry = Self::new();
        for provider in &config.providers {
            if !provider.enabled {
                info!(provider = provider.kind.as_str(), "provider disabled, skipping");
                continue;
            }
            let api_key = match resolve_secret(&provider.api_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(provider = provider.kind.as_str(), error = %e, "failed to initialize provider");
                    continue;
                }
            };
            info!(provider = provider.kind.as_str(), endpoint = %provider.endpoint, "initializing provider");
            let adapter: Arc<dyn GenerationProvider> = match provider.kind {
                ProviderKind::Fal => Arc::new(FalAdapter::new(provider.endpoint.clone(), api_key)),
                ProviderKind::Replicate => {
                    Arc::new(ReplicateAdapter::new(provider.endpoint.clone(), api_key))
                }
            };
            registry.register(provider.kind, adapter);
        }
        registry
    }

    pub fn register(&mut self, kind: ProviderKind, adapter: Arc<dyn GenerationProvider>) {
        self.adapters.insert(kind, adapter);
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderDirectory for ProviderRegistry {
    fn adapter(&self, kind: ProviderKind) -> Option<Arc<dyn GenerationProvider>> {
        self.adapters.get(&kind).cloned()
    }
}

/// Strict preconditions checked at submission time, once reference
/// files are final.
pub(crate) fn check_preconditions(
    request: &WorkRequest,
    route: &ModelRoute,
) -> Result<(), SubmissionError> {
    if route.requires_reference_image && !request.has_reference_images() {
        return Err(SubmissionError::MissingReferenceImage {
            model: request.model_id.clone(),
        });
    }
    Ok(())
}

pub(crate) fn truncate_snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

/// Parse a successful response body as JSON, rejecting bodies without a
/// JSON content type. Providers have been observed returning HTML error
/// pages with a 200 status; those must fail, not produce a placeholder
/// task handle.
pub(crate) async fn json_body(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<serde_json::Value, SubmissionError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let text = response
        .text()
        .await
        .map_err(|e| SubmissionError::Network { provider, message: e.to_string() })?;

    if !content_type.contains("json") {
        return Err(SubmissionError::NonJsonResponse {
            provider,
            snippet: truncate_snippet(&text),
        });
    }

    serde_json::from_str(&text).map_err(|_| SubmissionError::NonJsonResponse {
        provider,
        snippet: truncate_snippet(&text),
    })
}

/// Map a non-2xx response to a `SubmissionError`, preferring the parsed
/// provider message when the body is JSON, else a truncated raw body.
/// The unsupported-model mapping only applies when a model was named,
/// so a 404 on a status poll stays a plain provider error.
pub(crate) fn classify_error(
    provider: &'static str,
    model: &str,
    status: u16,
    body: &str,
) -> SubmissionError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| truncate_snippet(body));

    let lowered = message.to_ascii_lowercase();
    if status == 402 || lowered.contains("balance") || lowered.contains("exhausted") {
        return SubmissionError::UpstreamBalanceExhausted { provider };
    }
    if !model.is_empty()
        && (status == 404
            || lowered.contains("unknown model")
            || lowered.contains("model not found"))
    {
        return SubmissionError::UnsupportedModel { provider, model: model.to_string() };
    }
    SubmissionError::Provider { provider, status, message }
}
