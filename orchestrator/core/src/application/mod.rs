// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod admission;
pub mod pipeline;
pub mod polling;
pub mod session;
pub mod status;

pub use admission::{AdmissionError, AdmissionService, SubmitJob};
pub use pipeline::{JobDispatcher, JobPipeline};
pub use polling::{PollOutcome, PollSettings};
pub use status::{JobStatusView, StatusService};
