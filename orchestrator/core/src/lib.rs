// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
