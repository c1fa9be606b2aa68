// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0
//! Model → credit-cost table with longest-matching-prefix fallback.
//!
//! Costs are computed once at admission and carried on the job; the
//! table is never consulted again for a running job.

use std::collections::BTreeMap;

pub const DEFAULT_COST: i64 = 5;

#[derive(Debug, Clone)]
pub struct PriceTable {
    /// prefix → cost in credits. BTreeMap keeps iteration stable.
    entries: BTreeMap<String, i64>,
    default_cost: i64,
}

impl PriceTable {
    pub fn new(default_cost: i64) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_cost: default_cost.max(0),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self::new(DEFAULT_COST);
        for (prefix, cost) in [
            ("flux-dev", 5),
            ("flux-pro", 8),
            ("flux-ultra", 10),
            ("flux-kontext", 8),
            ("flux", 5),
            ("sdxl", 3),
            ("kling", 20),
            ("veo", 25),
            ("wan", 15),
            ("musicgen", 6),
        ] {
            table.set(prefix, cost);
        }
        table
    }

    pub fn set_default(&mut self, cost: i64) {
        self.default_cost = cost.max(0);
    }

    pub fn set(&mut self, prefix: &str, cost: i64) {
        // Negative costs would turn a charge into a grant.
        self.entries.insert(prefix.to_ascii_lowercase(), cost.max(0));
    }

    /// Cost for a model id: exact entry, else the longest prefix entry
    /// that matches, else the default.
    pub fn cost_of(&self, model_id: &str) -> i64 {
        let key = model_id.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, cost)| *cost)
            .unwrap_or(self.default_cost)
    }
}
