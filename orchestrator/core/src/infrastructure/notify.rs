// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Outbound notification gateway client. One delivery attempt per
//! terminal outcome; a failure is the caller's to log, never to retry
//! indefinitely and never to roll back job state.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::notification::{Notifier, TerminalNotice};

pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: super::providers::http_client(),
            endpoint,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notice: &TerminalNotice) -> anyhow::Result<()> {
        let response = self.client.post(&self.endpoint).json(notice).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("notification gateway returned HTTP {}", response.status());
        }
        debug!(job = %notice.job_id, user = %notice.user_id, "terminal notice delivered");
        Ok(())
    }
}

/// Used when no gateway is configured, and in tests.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, notice: &TerminalNotice) -> anyhow::Result<()> {
        debug!(job = %notice.job_id, "no notification gateway configured");
        Ok(())
    }
}
