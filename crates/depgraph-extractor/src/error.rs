// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced by the span and dependency store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never completed: connection refused, DNS failure, timeout.
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status code.
    #[error("store returned status {status} during {context}: {body}")]
    Status {
        status: u16,
        context: &'static str,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("malformed store response during {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The two conditions that abort a run. Everything else (a failed partition
/// reset, a scan cut short, an unresolvable parent) degrades completeness but
/// lets the run finish.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not reach the span store: {0}")]
    Connection(#[source] StoreError),

    #[error("dependency export failed: {0}")]
    Export(#[source] StoreError),
}
