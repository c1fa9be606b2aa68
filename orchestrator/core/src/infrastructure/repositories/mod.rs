// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod in_memory;
pub mod postgres_job;
pub mod postgres_ledger;

pub use in_memory::{InMemoryJobRepository, InMemoryLedgerRepository};
pub use postgres_job::PostgresJobRepository;
pub use postgres_ledger::PostgresLedgerRepository;
