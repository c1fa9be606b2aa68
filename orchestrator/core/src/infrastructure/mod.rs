// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod notify;
pub mod providers;
pub mod queue;
pub mod repositories;

pub use db::Database;
pub use notify::{HttpNotifier, NoopNotifier};
pub use providers::ProviderRegistry;
pub use queue::{InlineDispatcher, QueueDispatcher, QueueWorker};
