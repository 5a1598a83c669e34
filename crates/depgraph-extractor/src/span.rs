// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed models for the span store's JSON documents and the exported
//! dependency edges. Records that fail to decode into these shapes are
//! skipped by the callers, never coerced.

use serde::{Deserialize, Serialize};

/// The service a span belongs to.
#[derive(Clone, Debug, Deserialize)]
pub struct Process {
    #[serde(rename = "serviceName")]
    pub service_name: String,
}

/// A typed pointer from one span to another. Only the span id is used for
/// parent resolution; `ref_type` is carried but not consulted.
#[derive(Clone, Debug, Deserialize)]
pub struct SpanRef {
    #[serde(rename = "refType", default)]
    pub ref_type: String,
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

/// One recorded unit of work, as stored. Immutable once decoded.
#[derive(Clone, Debug, Deserialize)]
pub struct Span {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
    pub process: Process,
    #[serde(default)]
    pub references: Vec<SpanRef>,
}

impl Span {
    /// The first reference in document order, treated as the causal parent.
    /// The store does not validate that this entry is a child-of relation;
    /// the positional convention is all there is.
    pub fn primary_parent_ref(&self) -> Option<&SpanRef> {
        self.references.first()
    }
}

/// One weighted directed edge of the derived graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DependencyLink {
    pub parent: String,
    pub child: String,
    #[serde(rename = "callCount")]
    pub call_count: u64,
}
