// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Queue-style provider adapter (fal.ai wire format).
//!
//! Submission enqueues a request and returns a request id; status is
//! polled separately, and the final payload is fetched once the queue
//! reports completion.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::domain::extract;
use crate::domain::job::{ProviderTask, WorkRequest};
use crate::domain::provider::{GenerationProvider, SubmissionError, TaskProbe};
use crate::domain::routing::{ModelFamily, ModelRoute};

use super::{check_preconditions, classify_error, http_client, json_body};

const PROVIDER: &str = "fal";

pub struct FalAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FalAdapter {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: http_client(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn build_input(request: &WorkRequest, route: &ModelRoute) -> serde_json::Value {
        let mut input = json!({ "prompt": request.prompt });
        match route.family {
            ModelFamily::ImageToImage => {
                if let Some(first) = request.reference_files.first() {
                    input["image_url"] = json!(first);
                }
                if request.reference_files.len() > 1 {
                    input["image_urls"] = json!(request.reference_files);
                }
            }
            _ => {
                if !request.reference_files.is_empty() {
                    input["image_url"] = json!(request.reference_files[0]);
                }
            }
        }
        if let Some(ratio) = &request.aspect_ratio {
            input["aspect_ratio"] = json!(ratio);
        }
        input
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, SubmissionError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Key {}", self.api_key))
            .send()
            .await
            .map_err(|e| SubmissionError::Network { provider: PROVIDER, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(PROVIDER, "", status.as_u16(), &body));
        }
        json_body(PROVIDER, response).await
    }
}

#[async_trait]
impl GenerationProvider for FalAdapter {
    async fn submit(
        &self,
        request: &WorkRequest,
        route: &ModelRoute,
        idempotency_key: &str,
    ) -> Result<ProviderTask, SubmissionError> {
        check_preconditions(request, route)?;

        let input = Self::build_input(request, route);
        let url = format!("{}/{}", self.endpoint, route.canonical_model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .header("X-Idempotency-Key", idempotency_key)
            .json(&input)
            .send()
            .await
            .map_err(|e| SubmissionError::Network { provider: PROVIDER, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(
                PROVIDER,
                &route.canonical_model,
                status.as_u16(),
                &body,
            ));
        }

        let document = json_body(PROVIDER, response).await?;
        let external_task_id = extract::external_task_id(&document)
            .map_err(|attempted| SubmissionError::MissingTaskId { provider: PROVIDER, attempted })?;

        Ok(ProviderTask {
            provider: crate::domain::provider::ProviderKind::Fal,
            external_task_id,
            submitted_payload: json!({ "model": route.canonical_model, "input": input }),
        })
    }

    async fn check(&self, task: &ProviderTask) -> Result<TaskProbe, SubmissionError> {
        let model = task
            .submitted_payload
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();

        let status_url = format!(
            "{}/{}/requests/{}/status",
            self.endpoint, model, task.external_task_id
        );
        let document = self.get_json(&status_url).await?;

        let state = document
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("")
            .to_string();

        match state.as_str() {
            "IN_QUEUE" => Ok(TaskProbe::Pending),
            "IN_PROGRESS" => Ok(TaskProbe::Running),
            "COMPLETED" => {
                // The status document carries no payload; fetch the
                // response separately.
                let result_url =
                    format!("{}/{}/requests/{}", self.endpoint, model, task.external_task_id);
                let payload = self.get_json(&result_url).await?;
                Ok(TaskProbe::Finished(payload))
            }
            "ERROR" | "FAILED" | "CANCELLED" => {
                let message = document
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("task failed upstream")
                    .to_string();
                Ok(TaskProbe::Failed(message))
            }
            // Providers grow new transient statuses without notice.
            // Only an explicit terminal status ends the loop; anything
            // else is bounded by the attempt budget.
            other => {
                warn!(task = %task.external_task_id, status = other, "unrecognized task status, treating as running");
                Ok(TaskProbe::Running)
            }
        }
    }
}
