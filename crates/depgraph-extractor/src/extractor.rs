// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The run orchestrator. One invocation owns the whole pipeline: clear the
//! previous dependency document, scan candidate spans page by page, resolve
//! each span's parent, count the (parent service, child service) pairs, and
//! export the aggregated edges once the scan is done.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::DependencyAggregator;
use crate::dependency_store::DependencyStore;
use crate::error::RunError;
use crate::partition::Partition;
use crate::span::Span;
use crate::span_store::SpanStore;

pub struct DependencyExtractor {
    pub span_store: Arc<dyn SpanStore + Send + Sync>,
    pub dependency_store: Arc<dyn DependencyStore + Send + Sync>,
}

/// How a non-fatal run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The aggregated graph was written out.
    Exported { links: usize },
    /// The run was cancelled mid-scan; nothing was written, since a partial
    /// graph would silently understate call counts.
    Cancelled,
}

impl DependencyExtractor {
    /// Drives one extraction run over `partition`. Only an unreachable store
    /// before the scan and a failed export are fatal; a failed partition
    /// reset, a scan cut short by a retrieval error, and unresolvable
    /// parents all degrade completeness without aborting.
    pub async fn run(
        &self,
        partition: &Partition,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        self.span_store.ping().await.map_err(RunError::Connection)?;

        if let Err(err) = self.dependency_store.delete_partition(partition).await {
            warn!(
                "could not clear previous dependency document for {}: {err}",
                partition.dependency_index()
            );
        }

        let mut aggregator = DependencyAggregator::new();
        let mut scroll = self.span_store.scan_server_spans(partition);
        let mut pages = 0usize;

        loop {
            if cancel.is_cancelled() {
                scroll.close().await;
                info!("run cancelled after {pages} pages, skipping export");
                return Ok(RunOutcome::Cancelled);
            }
            let page = match scroll.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(err) => {
                    // Partial data is still worth exporting; stale data is
                    // gone either way because the reset already ran.
                    warn!("span retrieval failed after {pages} pages, ending scan early: {err}");
                    break;
                }
            };
            pages += 1;
            debug!("processing page {pages} with {} candidate spans", page.len());
            for span in &page {
                if cancel.is_cancelled() {
                    scroll.close().await;
                    info!("run cancelled mid-page, skipping export");
                    return Ok(RunOutcome::Cancelled);
                }
                self.record_span(partition, span, &mut aggregator).await;
            }
        }
        scroll.close().await;

        info!(
            "aggregated {} service pairs over {pages} pages: {:?}",
            aggregator.len(),
            aggregator.counts()
        );

        let links = aggregator.into_links();
        let exported = links.len();
        self.dependency_store
            .write_dependencies(Utc::now(), &links)
            .await
            .map_err(RunError::Export)?;
        info!(
            "wrote {exported} dependency links for {}",
            partition.dependency_index()
        );
        Ok(RunOutcome::Exported { links: exported })
    }

    async fn record_span(
        &self,
        partition: &Partition,
        span: &Span,
        aggregator: &mut DependencyAggregator,
    ) {
        let Some(parent_ref) = span.primary_parent_ref() else {
            // The scan filter requires a reference, but the store does not
            // enforce that on every matched document.
            return;
        };
        match self
            .span_store
            .find_span_by_id(partition, &parent_ref.span_id)
            .await
        {
            Ok(Some(parent)) => {
                aggregator.increment(&parent.process.service_name, &span.process.service_name);
            }
            Ok(None) => debug!(
                "no span {} in partition, skipping edge for child {}",
                parent_ref.span_id, span.span_id
            ),
            Err(err) => debug!(
                "parent lookup for {} failed, skipping edge for child {}: {err}",
                parent_ref.span_id, span.span_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::error::StoreError;
    use crate::span::{DependencyLink, Process, SpanRef};
    use crate::span_store::SpanScroll;

    fn test_partition() -> Partition {
        Partition::new("", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    fn span(span_id: &str, service: &str, parent: Option<&str>) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: span_id.to_string(),
            process: Process {
                service_name: service.to_string(),
            },
            references: parent
                .map(|parent_id| {
                    vec![SpanRef {
                        ref_type: "CHILD_OF".to_string(),
                        trace_id: "t1".to_string(),
                        span_id: parent_id.to_string(),
                    }]
                })
                .unwrap_or_default(),
        }
    }

    fn retrieval_error() -> StoreError {
        StoreError::Status {
            status: 500,
            context: "search",
            body: "boom".to_string(),
        }
    }

    struct FakeScroll {
        pages: VecDeque<Result<Vec<Span>, StoreError>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SpanScroll for FakeScroll {
        async fn next_page(&mut self) -> Result<Option<Vec<Span>>, StoreError> {
            match self.pages.pop_front() {
                None => Ok(None),
                Some(Ok(page)) => Ok(Some(page)),
                Some(Err(err)) => Err(err),
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeSpanStore {
        pages: Mutex<VecDeque<Result<Vec<Span>, StoreError>>>,
        parents: HashMap<String, Span>,
        failing_parents: Vec<String>,
        ping_ok: bool,
        scroll_closed: Arc<AtomicBool>,
    }

    impl FakeSpanStore {
        fn new(pages: Vec<Result<Vec<Span>, StoreError>>) -> FakeSpanStore {
            FakeSpanStore {
                pages: Mutex::new(pages.into_iter().collect()),
                parents: HashMap::new(),
                failing_parents: Vec::new(),
                ping_ok: true,
                scroll_closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn with_parent(mut self, parent: Span) -> FakeSpanStore {
            self.parents.insert(parent.span_id.clone(), parent);
            self
        }
    }

    #[async_trait]
    impl SpanStore for FakeSpanStore {
        async fn ping(&self) -> Result<(), StoreError> {
            if self.ping_ok {
                Ok(())
            } else {
                Err(retrieval_error())
            }
        }

        fn scan_server_spans(&self, _partition: &Partition) -> Box<dyn SpanScroll + Send> {
            Box::new(FakeScroll {
                pages: std::mem::take(&mut *self.pages.lock().unwrap()),
                closed: Arc::clone(&self.scroll_closed),
            })
        }

        async fn find_span_by_id(
            &self,
            _partition: &Partition,
            span_id: &str,
        ) -> Result<Option<Span>, StoreError> {
            if self.failing_parents.iter().any(|id| id == span_id) {
                return Err(retrieval_error());
            }
            Ok(self.parents.get(span_id).cloned())
        }
    }

    #[derive(Default)]
    struct FakeDependencyStore {
        fail_delete: bool,
        fail_write: bool,
        deletes: Mutex<usize>,
        writes: Mutex<Vec<Vec<DependencyLink>>>,
    }

    #[async_trait]
    impl DependencyStore for FakeDependencyStore {
        async fn delete_partition(&self, _partition: &Partition) -> Result<(), StoreError> {
            *self.deletes.lock().unwrap() += 1;
            if self.fail_delete {
                Err(retrieval_error())
            } else {
                Ok(())
            }
        }

        async fn write_dependencies(
            &self,
            _timestamp: DateTime<Utc>,
            links: &[DependencyLink],
        ) -> Result<(), StoreError> {
            if self.fail_write {
                return Err(retrieval_error());
            }
            self.writes.lock().unwrap().push(links.to_vec());
            Ok(())
        }
    }

    fn extractor(
        span_store: FakeSpanStore,
        dependency_store: FakeDependencyStore,
    ) -> (
        DependencyExtractor,
        Arc<FakeSpanStore>,
        Arc<FakeDependencyStore>,
    ) {
        let span_store = Arc::new(span_store);
        let dependency_store = Arc::new(dependency_store);
        (
            DependencyExtractor {
                span_store: Arc::clone(&span_store) as Arc<dyn SpanStore + Send + Sync>,
                dependency_store:
                    Arc::clone(&dependency_store) as Arc<dyn DependencyStore + Send + Sync>,
            },
            span_store,
            dependency_store,
        )
    }

    #[tokio::test]
    async fn test_counts_one_edge_per_resolved_child() {
        let span_store = FakeSpanStore::new(vec![
            Ok(vec![span("c1", "svcB", Some("p1")), span("c2", "svcB", Some("p2"))]),
            Ok(vec![span("c3", "svcC", Some("p1"))]),
        ])
        .with_parent(span("p1", "svcA", None))
        .with_parent(span("p2", "svcA", None));
        let (extractor, span_store, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let outcome = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exported { links: 2 });
        let writes = dependency_store.writes.lock().unwrap();
        assert_eq!(
            writes[0],
            vec![
                DependencyLink {
                    parent: "svcA".to_string(),
                    child: "svcB".to_string(),
                    call_count: 2,
                },
                DependencyLink {
                    parent: "svcA".to_string(),
                    child: "svcC".to_string(),
                    call_count: 1,
                },
            ]
        );
        assert!(span_store.scroll_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unresolvable_parent_contributes_no_edge() {
        let span_store = FakeSpanStore::new(vec![Ok(vec![span("c1", "svcB", Some("ghost"))])]);
        let (extractor, _, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let outcome = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exported { links: 0 });
        assert!(dependency_store.writes.lock().unwrap()[0].is_empty());
    }

    #[tokio::test]
    async fn test_parent_lookup_error_skips_edge_without_aborting() {
        let mut span_store = FakeSpanStore::new(vec![Ok(vec![
            span("c1", "svcB", Some("broken")),
            span("c2", "svcB", Some("p1")),
        ])])
        .with_parent(span("p1", "svcA", None));
        span_store.failing_parents.push("broken".to_string());
        let (extractor, _, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let outcome = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exported { links: 1 });
        assert_eq!(
            dependency_store.writes.lock().unwrap()[0],
            vec![DependencyLink {
                parent: "svcA".to_string(),
                child: "svcB".to_string(),
                call_count: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_retrieval_error_exports_partial_aggregation() {
        let span_store = FakeSpanStore::new(vec![
            Ok(vec![span("c1", "svcB", Some("p1"))]),
            Err(retrieval_error()),
        ])
        .with_parent(span("p1", "svcA", None));
        let (extractor, span_store, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let outcome = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exported { links: 1 });
        assert_eq!(dependency_store.writes.lock().unwrap().len(), 1);
        assert!(span_store.scroll_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancellation_skips_export_and_releases_cursor() {
        let span_store = FakeSpanStore::new(vec![Ok(vec![span("c1", "svcB", Some("p1"))])])
            .with_parent(span("p1", "svcA", None));
        let (extractor, span_store, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = extractor.run(&test_partition(), &cancel).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(dependency_store.writes.lock().unwrap().is_empty());
        assert!(span_store.scroll_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reset_failure_is_not_fatal() {
        let span_store = FakeSpanStore::new(vec![]);
        let dependency_store = FakeDependencyStore {
            fail_delete: true,
            ..FakeDependencyStore::default()
        };
        let (extractor, _, dependency_store) = extractor(span_store, dependency_store);

        let outcome = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Exported { links: 0 });
        assert_eq!(*dependency_store.deletes.lock().unwrap(), 1);
        assert_eq!(dependency_store.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_export_failure_is_fatal() {
        let span_store = FakeSpanStore::new(vec![]);
        let dependency_store = FakeDependencyStore {
            fail_write: true,
            ..FakeDependencyStore::default()
        };
        let (extractor, _, _) = extractor(span_store, dependency_store);

        let result = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RunError::Export(_))));
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_before_any_scan() {
        let mut span_store = FakeSpanStore::new(vec![Ok(vec![span("c1", "svcB", Some("p1"))])]);
        span_store.ping_ok = false;
        let (extractor, span_store, dependency_store) =
            extractor(span_store, FakeDependencyStore::default());

        let result = extractor
            .run(&test_partition(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RunError::Connection(_))));
        assert_eq!(*dependency_store.deletes.lock().unwrap(), 0);
        assert_eq!(span_store.pages.lock().unwrap().len(), 1);
    }
}
