// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use crate::span::DependencyLink;

/// Run-scoped counter of observed calls per (parent service, child service)
/// pair. Created empty at run start, owned exclusively by the run, and
/// consumed by `into_links` at export. Keys compare exactly; no case
/// normalization.
#[derive(Debug, Default)]
pub struct DependencyAggregator {
    counts: HashMap<(String, String), u64>,
}

impl DependencyAggregator {
    pub fn new() -> DependencyAggregator {
        DependencyAggregator {
            counts: HashMap::new(),
        }
    }

    /// Records one call from `parent_service` to `child_service`, inserting
    /// the pair with count 1 if it has not been seen this run.
    pub fn increment(&mut self, parent_service: &str, child_service: &str) {
        let count = self
            .counts
            .entry((parent_service.to_string(), child_service.to_string()))
            .or_insert(0);
        *count += 1;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &HashMap<(String, String), u64> {
        &self.counts
    }

    /// Consumes the counter into one link per pair, sorted for a stable
    /// export order.
    pub fn into_links(self) -> Vec<DependencyLink> {
        let mut links: Vec<DependencyLink> = self
            .counts
            .into_iter()
            .map(|((parent, child), call_count)| DependencyLink {
                parent,
                child,
                call_count,
            })
            .collect();
        links.sort_by(|a, b| (&a.parent, &a.child).cmp(&(&b.parent, &b.child)));
        links
    }
}
