// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{NaiveDate, Utc};

pub const SPAN_INDEX_BASE: &str = "jaeger-span-";
pub const DEPENDENCY_INDEX_BASE: &str = "jaeger-dependencies-";

/// The date-bounded scope of one run: which daily span index is scanned and
/// which dependency index the graph is written to. Computed once per run and
/// constant for its duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    prefix: String,
    date: NaiveDate,
}

impl Partition {
    pub fn new(prefix: &str, date: NaiveDate) -> Partition {
        // A non-empty namespace prefix is joined with ':', matching the
        // convention used when the indices were written.
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}:")
        };
        Partition { prefix, date }
    }

    pub fn today(prefix: &str) -> Partition {
        Partition::new(prefix, Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn span_index(&self) -> String {
        format!(
            "{}{}{}",
            self.prefix,
            SPAN_INDEX_BASE,
            self.date.format("%Y-%m-%d")
        )
    }

    pub fn dependency_index(&self) -> String {
        format!(
            "{}{}{}",
            self.prefix,
            DEPENDENCY_INDEX_BASE,
            self.date.format("%Y-%m-%d")
        )
    }
}
