// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Write side of the pipeline: clearing a partition's previous dependency
//! document and writing the freshly aggregated one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::StoreError;
use crate::es_client::EsClient;
use crate::partition::Partition;
use crate::span::DependencyLink;

#[async_trait]
pub trait DependencyStore {
    /// Deletes any previously written dependency document for the partition.
    async fn delete_partition(&self, partition: &Partition) -> Result<(), StoreError>;

    /// Writes the full link set as one document tagged with `timestamp`.
    /// The partition key is derived from the timestamp's calendar date. An
    /// empty link list is still written.
    async fn write_dependencies(
        &self,
        timestamp: DateTime<Utc>,
        links: &[DependencyLink],
    ) -> Result<(), StoreError>;
}

pub struct EsDependencyStore {
    client: EsClient,
    index_prefix: String,
}

impl EsDependencyStore {
    pub fn new(client: EsClient, index_prefix: &str) -> EsDependencyStore {
        EsDependencyStore {
            client,
            index_prefix: index_prefix.to_string(),
        }
    }
}

#[async_trait]
impl DependencyStore for EsDependencyStore {
    async fn delete_partition(&self, partition: &Partition) -> Result<(), StoreError> {
        self.client
            .delete_index(&partition.dependency_index())
            .await
    }

    async fn write_dependencies(
        &self,
        timestamp: DateTime<Utc>,
        links: &[DependencyLink],
    ) -> Result<(), StoreError> {
        let partition = Partition::new(&self.index_prefix, timestamp.date_naive());
        let document = json!({
            "timestamp": timestamp.to_rfc3339(),
            "dependencies": links,
        });
        self.client
            .create_doc(&partition.dependency_index(), &document)
            .await
    }
}
