// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod extract;
pub mod job;
pub mod ledger;
pub mod provider;
pub mod routing;
pub mod pricing;
pub mod notification;
pub mod repository;
pub mod service_config;
