// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end orchestration scenarios over in-memory repositories:
//! admission, dispatch, polling, finalization, and the ledger
//! guarantees that tie them together.

mod common;

use common::{
    harness, harness_with_notifier, submit_cmd, FakeProvider, FlakyJobRepository,
    ManualDispatcher, ProviderScript, RecordingNotifier,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use easel_orchestrator_core::application::admission::{AdmissionError, AdmissionService};
use easel_orchestrator_core::application::pipeline::JobPipeline;
use easel_orchestrator_core::application::polling::PollSettings;
use easel_orchestrator_core::domain::job::{JobState, ProviderTask, UserId};
use easel_orchestrator_core::domain::pricing::PriceTable;
use easel_orchestrator_core::domain::provider::ProviderKind;
use easel_orchestrator_core::domain::repository::{JobRepository, LedgerRepository};
use easel_orchestrator_core::domain::routing::RouteTable;
use easel_orchestrator_core::infrastructure::repositories::InMemoryLedgerRepository;
use easel_orchestrator_core::infrastructure::ProviderRegistry;

fn user() -> UserId {
    UserId(Uuid::new_v4())
}

/// Balance 20, cost 5, provider succeeds: job completes with a result
/// and the balance stays at 15.
#[tokio::test(start_paused = true)]
async fn successful_generation_charges_once() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let h = harness(provider);
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);
    assert_eq!(h.dispatcher.dispatched.lock().unwrap().as_slice(), &[job_id]);

    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result_ref.as_deref(), Some("https://cdn.example/out.png"));
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);

    // Exactly one ledger entry for the job: the charge.
    let entries = h.ledger.entries_for_job(job_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.iter().map(|e| e.delta).sum::<i64>(), -5);

    assert_eq!(h.notifier.count(), 1);
}

/// Submission returns HTTP 500: the job fails, the balance returns to
/// 20, and exactly one refund entry references the job.
#[tokio::test(start_paused = true)]
async fn submission_failure_compensates_exactly_once() {
    let provider = FakeProvider::new(ProviderScript::RejectSubmission);
    let h = harness(provider.clone());
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);

    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.provider_task.is_none(), "no task handle on failed submission");
    assert_eq!(h.ledger.balance(u).await.unwrap(), 20);

    let entries = h.ledger.entries_for_job(job_id).await.unwrap();
    let refunds: Vec<_> = entries.iter().filter(|e| e.reason == "refund").collect();
    assert_eq!(refunds.len(), 1);
    assert_eq!(entries.iter().map(|e| e.delta).sum::<i64>(), 0);

    // Submission failure bypasses polling entirely.
    assert_eq!(provider.probes(), 0);
}

/// Provider never reaches a terminal status: the poll budget expires,
/// the job fails with a timeout-tagged message, and the refund matches
/// the submission-failure case.
#[tokio::test(start_paused = true)]
async fn polling_timeout_compensates_like_a_failure() {
    let provider = FakeProvider::new(ProviderScript::NeverFinish);
    let h = harness(provider);
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.as_deref().unwrap().contains("timed out"));
    assert_eq!(h.ledger.balance(u).await.unwrap(), 20);

    let entries = h.ledger.entries_for_job(job_id).await.unwrap();
    assert_eq!(entries.iter().map(|e| e.delta).sum::<i64>(), 0);
    assert_eq!(entries.iter().filter(|e| e.reason == "refund").count(), 1);
}

/// A provider-reported terminal failure carries the provider message,
/// not a timeout tag.
#[tokio::test(start_paused = true)]
async fn provider_failure_carries_provider_message() {
    let provider = FakeProvider::new(ProviderScript::FailAfterSubmit("content policy violation"));
    let h = harness(provider);
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("content policy violation"));
    assert!(!message.contains("timed out"));
}

/// Two simultaneous admissions against a balance covering exactly one
/// job: one succeeds, the other gets InsufficientFunds, and nothing is
/// charged for the rejected one.
#[tokio::test]
async fn concurrent_admission_cannot_overdraw() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let h = harness(provider);
    let u = user();
    h.ledger.deposit(u, 5).await.unwrap();

    let (a, b) = tokio::join!(
        h.admission.submit(submit_cmd(u, "flux-dev")),
        h.admission.submit(submit_cmd(u, "flux-dev")),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let rejected = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(rejected, AdmissionError::InsufficientFunds { .. }));
    assert_eq!(h.ledger.balance(u).await.unwrap(), 0);
}

/// Validation failures reject synchronously with no ledger effect.
#[tokio::test]
async fn empty_prompt_rejects_without_charge() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let h = harness(provider);
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let mut cmd = submit_cmd(u, "flux-dev");
    cmd.prompt = "   ".into();
    let err = h.admission.submit(cmd).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Validation(_)));
    assert_eq!(h.ledger.balance(u).await.unwrap(), 20);
    assert!(h.dispatcher.dispatched.lock().unwrap().is_empty());
}

/// A notification gateway outage never rolls back the terminal state
/// or touches the ledger.
#[tokio::test(start_paused = true)]
async fn notification_failure_does_not_roll_back() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let notifier = Arc::new(RecordingNotifier::failing());
    let h = harness_with_notifier(provider, notifier);
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);
    assert_eq!(h.notifier.count(), 1);
}

/// Re-running a job that already reached a terminal state is a no-op:
/// redelivery after a crash cannot double-submit or double-refund.
#[tokio::test(start_paused = true)]
async fn redelivered_terminal_job_is_untouched() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let h = harness(provider.clone());
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();

    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    h.pipeline.run(job_id).await.unwrap();
    let submits_after_first = provider.submit_calls.load(std::sync::atomic::Ordering::SeqCst);

    h.pipeline.run(job_id).await.unwrap();

    assert_eq!(
        provider.submit_calls.load(std::sync::atomic::Ordering::SeqCst),
        submits_after_first
    );
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);
}

/// A repository write failing after the debit must not strand the job
/// charged: the pipeline finalizes it as failed, refunds, and never
/// reaches the provider.
#[tokio::test(start_paused = true)]
async fn persistence_failure_after_debit_still_compensates() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    // Save 1 persists the admitted job; save 2, the activation write
    // inside the pipeline, fails.
    let jobs = FlakyJobRepository::fail_on_save(2);
    let ledger = Arc::new(InMemoryLedgerRepository::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Fal, provider.clone());

    let pipeline = JobPipeline::new(
        RouteTable::builtin(),
        Arc::new(registry),
        jobs.clone(),
        ledger.clone(),
        notifier.clone(),
        PollSettings::default(),
    );
    let admission = AdmissionService::new(
        PriceTable::builtin(),
        jobs.clone(),
        ledger.clone(),
        Arc::new(ManualDispatcher::default()),
    );

    let u = user();
    ledger.deposit(u, 20).await.unwrap();
    let job_id = admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();
    assert_eq!(ledger.balance(u).await.unwrap(), 15);

    pipeline.run(job_id).await.unwrap();

    let job = jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert!(job.provider_task.is_none());
    assert!(job.error_message.as_deref().unwrap().contains("internal error"));

    assert_eq!(ledger.balance(u).await.unwrap(), 20);
    let entries = ledger.entries_for_job(job_id).await.unwrap();
    assert_eq!(entries.iter().map(|e| e.delta).sum::<i64>(), 0);
    assert_eq!(entries.iter().filter(|e| e.reason == "refund").count(), 1);

    assert_eq!(provider.submit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.count(), 1);
}

/// A job redelivered after a crash between submission and finalization
/// already holds its task handle: the pipeline resumes polling it
/// instead of submitting again.
#[tokio::test(start_paused = true)]
async fn redelivered_submitted_job_resumes_polling() {
    let provider = FakeProvider::new(ProviderScript::Succeed("https://cdn.example/out.png"));
    let h = harness(provider.clone());
    let u = user();
    h.ledger.deposit(u, 20).await.unwrap();
    let job_id = h.admission.submit(submit_cmd(u, "flux-dev")).await.unwrap();

    // The previous process died after the submission write.
    let mut job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    job.activate().unwrap();
    job.attach_provider_task(ProviderTask {
        provider: ProviderKind::Fal,
        external_task_id: "task-before-crash".into(),
        submitted_payload: serde_json::json!({}),
    })
    .unwrap();
    h.jobs.save(&job).await.unwrap();

    h.pipeline.run(job_id).await.unwrap();

    let job = h.jobs.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(provider.submit_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ledger.balance(u).await.unwrap(), 15);
}
