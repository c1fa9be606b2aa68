// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Shared harness for orchestration scenario tests: scripted provider,
//! recording notifier, manual dispatcher, in-memory repositories.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use easel_orchestrator_core::application::admission::{AdmissionService, SubmitJob};
use easel_orchestrator_core::application::pipeline::{JobDispatcher, JobPipeline};
use easel_orchestrator_core::application::polling::PollSettings;
use easel_orchestrator_core::application::status::StatusService;
use easel_orchestrator_core::domain::job::{Job, JobId, ProviderTask, UserId, WorkRequest};
use easel_orchestrator_core::domain::notification::{Notifier, TerminalNotice};
use easel_orchestrator_core::domain::pricing::PriceTable;
use easel_orchestrator_core::domain::provider::{
    GenerationProvider, ProviderKind, SubmissionError, TaskProbe,
};
use easel_orchestrator_core::domain::repository::{JobRepository, RepositoryError};
use easel_orchestrator_core::domain::routing::{ModelRoute, RouteTable};
use easel_orchestrator_core::infrastructure::repositories::{
    InMemoryJobRepository, InMemoryLedgerRepository,
};
use easel_orchestrator_core::infrastructure::ProviderRegistry;

/// What the fake provider should do on submit and on each probe.
pub enum ProviderScript {
    /// Submission succeeds; polling finishes with this result URL.
    Succeed(&'static str),
    /// Submission fails with an HTTP-500-style provider error.
    RejectSubmission,
    /// Submission succeeds; polling never reaches a terminal status.
    NeverFinish,
    /// Submission succeeds; provider reports a terminal failure.
    FailAfterSubmit(&'static str),
}

pub struct FakeProvider {
    script: ProviderScript,
    pub probe_calls: AtomicU32,
    pub submit_calls: AtomicU32,
}

impl FakeProvider {
    pub fn new(script: ProviderScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            probe_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
        })
    }

    pub fn probes(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    async fn submit(
        &self,
        _request: &WorkRequest,
        route: &ModelRoute,
        idempotency_key: &str,
    ) -> Result<ProviderTask, SubmissionError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ProviderScript::RejectSubmission => Err(SubmissionError::Provider {
                provider: "fal",
                status: 500,
                message: "internal server error".into(),
            }),
            _ => Ok(ProviderTask {
                provider: ProviderKind::Fal,
                external_task_id: format!("task-{idempotency_key}"),
                submitted_payload: json!({"model": route.canonical_model}),
            }),
        }
    }

    async fn check(&self, task: &ProviderTask) -> Result<TaskProbe, SubmissionError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ProviderScript::Succeed(url) => {
                Ok(TaskProbe::Finished(json!({"images": [{"url": url}]})))
            }
            ProviderScript::NeverFinish => Ok(TaskProbe::Running),
            ProviderScript::FailAfterSubmit(message) => Ok(TaskProbe::Failed(message.into())),
            ProviderScript::RejectSubmission => {
                panic!("task {} should never have been submitted", task.external_task_id)
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<TerminalNotice>>,
    pub fail_delivery: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { notices: Mutex::new(Vec::new()), fail_delivery: true }
    }

    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &TerminalNotice) -> anyhow::Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.fail_delivery {
            anyhow::bail!("gateway unreachable");
        }
        Ok(())
    }
}

/// Delegates to the in-memory store but fails one chosen `save` call,
/// for exercising persistence-failure paths.
pub struct FlakyJobRepository {
    inner: InMemoryJobRepository,
    saves: AtomicU32,
    fail_on: u32,
}

impl FlakyJobRepository {
    /// Fails the `n`th save call (1-based); everything else delegates.
    pub fn fail_on_save(n: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryJobRepository::new(),
            saves: AtomicU32::new(0),
            fail_on: n,
        })
    }
}

#[async_trait]
impl JobRepository for FlakyJobRepository {
    async fn save(&self, job: &Job) -> Result<(), RepositoryError> {
        let call = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(RepositoryError::Database("connection reset by peer".into()));
        }
        self.inner.save(job).await
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.find_by_id(id).await
    }
}

/// Records dispatched jobs without running them, so tests drive the
/// pipeline explicitly.
#[derive(Default)]
pub struct ManualDispatcher {
    pub dispatched: Mutex<Vec<JobId>>,
}

#[async_trait]
impl JobDispatcher for ManualDispatcher {
    async fn dispatch(&self, job_id: JobId) -> anyhow::Result<()> {
        self.dispatched.lock().unwrap().push(job_id);
        Ok(())
    }
}

pub struct Harness {
    pub jobs: Arc<InMemoryJobRepository>,
    pub ledger: Arc<InMemoryLedgerRepository>,
    pub pipeline: Arc<JobPipeline>,
    pub admission: Arc<AdmissionService>,
    pub status: Arc<StatusService>,
    pub notifier: Arc<RecordingNotifier>,
    pub dispatcher: Arc<ManualDispatcher>,
}

pub fn harness(provider: Arc<FakeProvider>) -> Harness {
    harness_with_notifier(provider, Arc::new(RecordingNotifier::default()))
}

pub fn harness_with_notifier(
    provider: Arc<FakeProvider>,
    notifier: Arc<RecordingNotifier>,
) -> Harness {
    let jobs = Arc::new(InMemoryJobRepository::new());
    let ledger = Arc::new(InMemoryLedgerRepository::new());
    let dispatcher = Arc::new(ManualDispatcher::default());

    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Fal, provider);

    let pipeline = Arc::new(JobPipeline::new(
        RouteTable::builtin(),
        Arc::new(registry),
        jobs.clone(),
        ledger.clone(),
        notifier.clone(),
        PollSettings::default(),
    ));

    let admission = Arc::new(AdmissionService::new(
        PriceTable::builtin(),
        jobs.clone(),
        ledger.clone(),
        dispatcher.clone(),
    ));
    let status = Arc::new(StatusService::new(jobs.clone(), pipeline.clone()));

    Harness { jobs, ledger, pipeline, admission, status, notifier, dispatcher }
}

pub fn submit_cmd(user: UserId, model_id: &str) -> SubmitJob {
    SubmitJob {
        user_id: user,
        model_id: model_id.into(),
        prompt: "a lighthouse at dusk".into(),
        source_files: vec![],
        auxiliary_files: vec![],
        aspect_ratio: None,
    }
}
