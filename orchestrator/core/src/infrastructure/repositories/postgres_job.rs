// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::job::{Job, JobId, JobState, ProviderTask, UserId, WorkRequest};
use crate::domain::provider::ProviderKind;
use crate::domain::repository::{JobRepository, RepositoryError};

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let request_json = serde_json::to_value(&job.request)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        let payload_json = match &job.provider_task {
            Some(task) => Some(
                serde_json::to_value(&task.submitted_payload)
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, user_id, request, state, provider, external_task_id,
                submitted_payload, result_ref, error_message, cost_charged,
                created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state,
                provider = COALESCE(jobs.provider, EXCLUDED.provider),
                external_task_id = COALESCE(jobs.external_task_id, EXCLUDED.external_task_id),
                submitted_payload = COALESCE(jobs.submitted_payload, EXCLUDED.submitted_payload),
                result_ref = EXCLUDED.result_ref,
                error_message = EXCLUDED.error_message,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(job.id.0)
        .bind(job.request.requester_id.0)
        .bind(request_json)
        .bind(job.state.as_str())
        .bind(job.provider_task.as_ref().map(|t| t.provider.as_str()))
        .bind(job.provider_task.as_ref().map(|t| t.external_task_id.as_str()))
        .bind(payload_json)
        .bind(job.result_ref.as_deref())
        .bind(job.error_message.as_deref())
        .bind(job.cost_charged)
        .bind(job.created_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("failed to save job: {e}")))?;

        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, user_id, request, state, provider, external_task_id,
                submitted_payload, result_ref, error_message, cost_charged,
                created_at, completed_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let state_str: String = row.get("state");
        let state = JobState::parse(&state_str)
            .ok_or_else(|| RepositoryError::Serialization(format!("unknown job state '{state_str}'")))?;

        let request_val: serde_json::Value = row.get("request");
        let mut request: WorkRequest = serde_json::from_value(request_val)
            .map_err(|e| RepositoryError::Serialization(format!("bad work request: {e}")))?;
        request.requester_id = UserId(row.get("user_id"));

        let provider_task = match (
            row.get::<Option<String>, _>("provider"),
            row.get::<Option<String>, _>("external_task_id"),
        ) {
            (Some(provider_str), Some(external_task_id)) => {
                let provider = ProviderKind::parse(&provider_str).ok_or_else(|| {
                    RepositoryError::Serialization(format!("unknown provider '{provider_str}'"))
                })?;
                Some(ProviderTask {
                    provider,
                    external_task_id,
                    submitted_payload: row
                        .get::<Option<serde_json::Value>, _>("submitted_payload")
                        .unwrap_or(serde_json::Value::Null),
                })
            }
            _ => None,
        };

        Ok(Some(Job {
            id: JobId(row.get("id")),
            request,
            provider_task,
            state,
            result_ref: row.get("result_ref"),
            error_message: row.get("error_message"),
            cost_charged: row.get("cost_charged"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        }))
    }
}
