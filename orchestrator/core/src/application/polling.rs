// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! # Polling State Machine
//!
//! Drives one submitted provider task to a terminal outcome:
//! `Submitted → Polling → {Succeeded, Failed, TimedOut}`. The delay is
//! adaptive (fast for the first attempts, then slower) and the loop is
//! bounded by a per-family attempt budget that corresponds to a
//! wall-clock ceiling. A single transport error never aborts the loop;
//! only an explicit terminal provider status or attempt exhaustion
//! ends it.

use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::extract;
use crate::domain::job::ProviderTask;
use crate::domain::provider::{GenerationProvider, TaskProbe};
use crate::domain::routing::ModelFamily;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub fast_interval: Duration,
    pub slow_interval: Duration,
    /// Attempts at the fast interval before slowing down.
    pub fast_attempts: u32,
    /// Attempt budget for image/audio work (~6 minutes wall clock).
    pub max_attempts_short: u32,
    /// Attempt budget for video-class work (~15 minutes wall clock).
    pub max_attempts_video: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(1),
            slow_interval: Duration::from_secs(3),
            fast_attempts: 15,
            // 15 * 1s + 115 * 3s = 360s
            max_attempts_short: 130,
            // 15 * 1s + 295 * 3s = 900s
            max_attempts_video: 310,
        }
    }
}

impl PollSettings {
    pub fn max_attempts(&self, family: ModelFamily) -> u32 {
        if family.is_video() {
            self.max_attempts_video
        } else {
            self.max_attempts_short
        }
    }

    fn interval(&self, attempt: u32) -> Duration {
        if attempt <= self.fast_attempts {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

/// Terminal outcome of one polling run. `Failed` and `TimedOut` carry
/// distinguishable messages but are ledger-equivalent: both compensate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded(String),
    Failed(String),
    TimedOut(String),
}

/// Poll a provider task until terminal, suspending between probes.
pub async fn poll_until_terminal(
    provider: &dyn GenerationProvider,
    task: &ProviderTask,
    family: ModelFamily,
    settings: &PollSettings,
) -> PollOutcome {
    let max_attempts = settings.max_attempts(family);

    for attempt in 1..=max_attempts {
        tokio::time::sleep(settings.interval(attempt)).await;

        match provider.check(task).await {
            Ok(TaskProbe::Pending) | Ok(TaskProbe::Running) => {
                debug!(
                    task = %task.external_task_id,
                    attempt,
                    "task still in flight"
                );
            }
            Ok(TaskProbe::Finished(document)) => {
                return match extract::result_ref(&document) {
                    Some(result_ref) => PollOutcome::Succeeded(result_ref),
                    // Distinct from a provider-reported failure: the
                    // provider claims success but no known shape yields
                    // an artifact reference.
                    None => PollOutcome::Failed(format!(
                        "provider reported success for task {} but no result could be extracted",
                        task.external_task_id
                    )),
                };
            }
            Ok(TaskProbe::Failed(message)) => {
                return PollOutcome::Failed(format!("provider reported failure: {message}"));
            }
            Err(e) => {
                // Transient probe failure: log and retry on the next interval.
                warn!(
                    task = %task.external_task_id,
                    attempt,
                    error = %e,
                    "status probe failed, will retry"
                );
            }
        }
    }

    PollOutcome::TimedOut(format!(
        "generation timed out: task {} not terminal after {} status checks",
        task.external_task_id, max_attempts
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::WorkRequest;
    use crate::domain::provider::{ProviderKind, SubmissionError};
    use crate::domain::routing::ModelRoute;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays a scripted sequence of probe results, then repeats the
    /// last one forever.
    struct ScriptedProvider {
        script: Mutex<Vec<Result<TaskProbe, SubmissionError>>>,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<Result<TaskProbe, SubmissionError>>) -> Self {
            script.reverse();
            Self { script: Mutex::new(script) }
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn submit(
            &self,
            _request: &WorkRequest,
            _route: &ModelRoute,
            _idempotency_key: &str,
        ) -> Result<crate::domain::job::ProviderTask, SubmissionError> {
            unreachable!("polling tests never submit")
        }

        async fn check(
            &self,
            _task: &crate::domain::job::ProviderTask,
        ) -> Result<TaskProbe, SubmissionError> {
            let mut script = self.script.lock().unwrap();
            match script.len() {
                0 => Ok(TaskProbe::Running),
                _ => script.pop().unwrap(),
            }
        }
    }

    fn task() -> ProviderTask {
        ProviderTask {
            provider: ProviderKind::Fal,
            external_task_id: "task-1".into(),
            submitted_payload: json!({}),
        }
    }

    fn settings() -> PollSettings {
        PollSettings::default()
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_success_and_extracts_result() {
        let provider = ScriptedProvider::new(vec![
            Ok(TaskProbe::Pending),
            Ok(TaskProbe::Running),
            Ok(TaskProbe::Finished(json!({"images": [{"url": "https://cdn.example/a.png"}]}))),
        ]);
        let outcome =
            poll_until_terminal(&provider, &task(), ModelFamily::TextToImage, &settings()).await;
        assert_eq!(outcome, PollOutcome::Succeeded("https://cdn.example/a.png".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_does_not_abort_the_loop() {
        let provider = ScriptedProvider::new(vec![
            Err(SubmissionError::Network { provider: "fal", message: "connection reset".into() }),
            Err(SubmissionError::Network { provider: "fal", message: "connection reset".into() }),
            Ok(TaskProbe::Finished(json!({"url": "https://cdn.example/b.png"}))),
        ]);
        let outcome =
            poll_until_terminal(&provider, &task(), ModelFamily::TextToImage, &settings()).await;
        assert_eq!(outcome, PollOutcome::Succeeded("https://cdn.example/b.png".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_is_terminal_with_provider_message() {
        let provider = ScriptedProvider::new(vec![
            Ok(TaskProbe::Running),
            Ok(TaskProbe::Failed("NSFW content rejected".into())),
        ]);
        let outcome =
            poll_until_terminal(&provider, &task(), ModelFamily::TextToImage, &settings()).await;
        match outcome {
            PollOutcome::Failed(msg) => assert!(msg.contains("NSFW content rejected")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_extractable_result_is_its_own_failure() {
        let provider = ScriptedProvider::new(vec![Ok(TaskProbe::Finished(
            json!({"status": "completed", "seed": 7}),
        ))]);
        let outcome =
            poll_until_terminal(&provider, &task(), ModelFamily::TextToImage, &settings()).await;
        match outcome {
            PollOutcome::Failed(msg) => assert!(msg.contains("no result could be extracted")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_times_out_with_timeout_tagged_message() {
        // Script is empty: every probe reports Running.
        let provider = ScriptedProvider::new(vec![]);
        let outcome =
            poll_until_terminal(&provider, &task(), ModelFamily::TextToImage, &settings()).await;
        match outcome {
            PollOutcome::TimedOut(msg) => assert!(msg.contains("timed out")),
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn video_budget_outlasts_the_short_budget() {
        let settings = settings();
        assert!(settings.max_attempts(ModelFamily::Video) > settings.max_attempts(ModelFamily::TextToImage));
    }
}
