// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Prediction-style provider adapter (Replicate wire format).

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::domain::extract;
use crate::domain::job::{ProviderTask, WorkRequest};
use crate::domain::provider::{GenerationProvider, ProviderKind, SubmissionError, TaskProbe};
use crate::domain::routing::ModelRoute;

use super::{check_preconditions, classify_error, http_client, json_body};

const PROVIDER: &str = "replicate";

pub struct ReplicateAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ReplicateAdapter {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: http_client(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn build_input(request: &WorkRequest) -> serde_json::Value {
        let mut input = json!({ "prompt": request.prompt });
        if let Some(first) = request.reference_files.first() {
            input["image"] = json!(first);
        }
        if let Some(ratio) = &request.aspect_ratio {
            input["aspect_ratio"] = json!(ratio);
        }
        input
    }
}

#[async_trait]
impl GenerationProvider for ReplicateAdapter {
    async fn submit(
        &self,
        request: &WorkRequest,
        route: &ModelRoute,
        idempotency_key: &str,
    ) -> Result<ProviderTask, SubmissionError> {
        check_preconditions(request, route)?;

        let input = Self::build_input(request);
        let url = format!("{}/v1/models/{}/predictions", self.endpoint, route.canonical_model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Idempotency-Key", idempotency_key)
            .json(&json!({ "input": input }))
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
            provider: ProviderKind::Replicate,
            external_task_id,
            submitted_payload: json!({ "model": route.canonical_model, "input": input }),
        })
    }

    async fn check(&self, task: &ProviderTask) -> Result<TaskProbe, SubmissionError> {
        let url = format!("{}/v1/predictions/{}", self.endpoint, task.external_task_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| SubmissionError::Network { provider: PROVIDER, message: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(PROVIDER, "", status.as_u16(), &body));
        }

        let document = json_body(PROVIDER, response).await?;
        let state = document
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("")
            .to_string();

        match state.as_str() {
            "starting" => Ok(TaskProbe::Pending),
            "processing" => Ok(TaskProbe::Running),
            "succeeded" => Ok(TaskProbe::Finished(document)),
            "failed" | "canceled" => {
                let message = document
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("prediction failed upstream")
                    .to_string();
                Ok(TaskProbe::Failed(message))
            }
            // Non-terminal until the provider says otherwise; the
            // attempt budget bounds an unrecognized status.
            other => {
                warn!(task = %task.external_task_id, status = other, "unrecognized prediction status, treating as running");
                Ok(TaskProbe::Running)
            }
        }
    }
}
