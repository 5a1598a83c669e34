// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read side of the pipeline: the paginated scan over candidate child spans
//! and the point lookup used to resolve their parents.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::StoreError;
use crate::es_client::EsClient;
use crate::partition::Partition;
use crate::span::Span;

#[async_trait]
pub trait SpanStore {
    /// Cheap reachability check, run once before any scan work starts.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Opens a lazy paginated scan over server-kind spans that carry at least
    /// one reference. Nothing is fetched until the first `next_page` call.
    fn scan_server_spans(&self, partition: &Partition) -> Box<dyn SpanScroll + Send>;

    /// Point lookup of a span by id within the partition. When several
    /// documents share the id, the first hit in store order wins; no further
    /// tie-break is applied, so the result is store-order dependent.
    async fn find_span_by_id(
        &self,
        partition: &Partition,
        span_id: &str,
    ) -> Result<Option<Span>, StoreError>;
}

/// A server-side cursor over one partition's candidate spans. Finite and not
/// restartable; `close` must be called on every exit path so the cursor is
/// released rather than left to expire.
#[async_trait]
pub trait SpanScroll: Send {
    /// The next page of decoded spans. `Ok(None)` is normal exhaustion; an
    /// error means retrieval failed and the scan cannot continue. Entries
    /// that fail to decode are skipped and do not abort the page.
    async fn next_page(&mut self) -> Result<Option<Vec<Span>>, StoreError>;

    /// Releases the server-side cursor. Best-effort.
    async fn close(&mut self);
}

pub struct EsSpanStore {
    client: EsClient,
    page_size: usize,
    scroll_keep_alive: String,
}

impl EsSpanStore {
    pub fn new(client: EsClient, config: &Config) -> EsSpanStore {
        EsSpanStore {
            client,
            page_size: config.page_size,
            scroll_keep_alive: config.scroll_keep_alive.clone(),
        }
    }
}

#[async_trait]
impl SpanStore for EsSpanStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.client.ping().await
    }

    fn scan_server_spans(&self, partition: &Partition) -> Box<dyn SpanScroll + Send> {
        Box::new(EsSpanScroll {
            client: self.client.clone(),
            index: partition.span_index(),
            page_size: self.page_size,
            keep_alive: self.scroll_keep_alive.clone(),
            scroll_id: None,
            started: false,
            exhausted: false,
        })
    }

    async fn find_span_by_id(
        &self,
        partition: &Partition,
        span_id: &str,
    ) -> Result<Option<Span>, StoreError> {
        let body = json!({ "query": { "term": { "spanID": span_id } } });
        let response = self
            .client
            .search(
                &partition.span_index(),
                &body,
                &[("ignore_unavailable", "true")],
            )
            .await?;
        let Some(hit) = response["hits"]["hits"].get(0) else {
            return Ok(None);
        };
        match serde_json::from_value::<Span>(hit["_source"].clone()) {
            Ok(span) => Ok(Some(span)),
            Err(err) => {
                debug!("span {span_id} found but failed to decode, treating as absent: {err}");
                Ok(None)
            }
        }
    }
}

struct EsSpanScroll {
    client: EsClient,
    index: String,
    page_size: usize,
    keep_alive: String,
    scroll_id: Option<String>,
    started: bool,
    exhausted: bool,
}

/// Server-kind spans with at least one recorded reference. Both predicates
/// run against nested documents, matching the span index mapping.
fn server_span_query() -> Value {
    json!({
        "query": {
            "bool": {
                "must": [
                    {
                        "nested": {
                            "path": "references",
                            "query": { "exists": { "field": "references" } }
                        }
                    },
                    {
                        "nested": {
                            "path": "tags",
                            "query": {
                                "bool": {
                                    "must": [
                                        { "term": { "tags.key": "span.kind" } },
                                        { "term": { "tags.value": "server" } }
                                    ]
                                }
                            }
                        }
                    }
                ]
            }
        }
    })
}

#[async_trait]
impl SpanScroll for EsSpanScroll {
    async fn next_page(&mut self) -> Result<Option<Vec<Span>>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }

        let response = if self.started {
            let Some(scroll_id) = self.scroll_id.as_ref() else {
                self.exhausted = true;
                return Ok(None);
            };
            self.client
                .scroll(&json!({
                    "scroll": self.keep_alive,
                    "scroll_id": scroll_id,
                }))
                .await?
        } else {
            self.started = true;
            let size = self.page_size.to_string();
            self.client
                .search(
                    &self.index,
                    &server_span_query(),
                    &[
                        ("scroll", &self.keep_alive),
                        ("size", &size),
                        ("ignore_unavailable", "true"),
                    ],
                )
                .await?
        };

        if let Some(scroll_id) = response["_scroll_id"].as_str() {
            self.scroll_id = Some(scroll_id.to_string());
        }

        let hits = match response["hits"]["hits"].as_array() {
            Some(hits) if !hits.is_empty() => hits,
            _ => {
                self.exhausted = true;
                return Ok(None);
            }
        };

        let mut spans = Vec::with_capacity(hits.len());
        for hit in hits {
            match serde_json::from_value::<Span>(hit["_source"].clone()) {
                Ok(span) => spans.push(span),
                Err(err) => debug!("skipping span record that failed to decode: {err}"),
            }
        }
        Ok(Some(spans))
    }

    async fn close(&mut self) {
        self.exhausted = true;
        if let Some(scroll_id) = self.scroll_id.take() {
            if let Err(err) = self.client.clear_scroll(&scroll_id).await {
                debug!("failed to release scan cursor: {err}");
            }
        }
    }
}
