//! Store contracts for the deal source and the project destination, plus
//! their HubSpot, Notion, fixture, in-memory and dry-run implementations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dealsync_core::{ColumnDescriptor, DestinationRow, RowProperties, SchemaChange, SourceRecord};
use dealsync_http::RemoteError;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod dry_run;
pub mod hubspot;
pub mod memory;
pub mod notion;

pub use dry_run::DryRunDestination;
pub use hubspot::HubspotDeals;
pub use memory::{DestinationCall, MemoryDestination};
pub use notion::NotionDatabase;

pub const CRATE_NAME: &str = "dealsync-adapters";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// The CRM side. Implementations exhaust pagination themselves.
#[async_trait]
pub trait SourceStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_all_records(&self) -> Result<Vec<SourceRecord>, StoreError>;
}

/// The project-store side, addressed by container (database) and row ids.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn query_rows(&self, container_id: &str) -> Result<Vec<DestinationRow>, StoreError>;

    async fn get_schema(&self, container_id: &str) -> Result<Vec<ColumnDescriptor>, StoreError>;

    async fn update_schema(
        &self,
        container_id: &str,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError>;

    /// Returns the id the store assigned to the new row.
    async fn create_row(
        &self,
        container_id: &str,
        properties: &RowProperties,
    ) -> Result<String, StoreError>;

    async fn update_row(&self, row_id: &str, properties: &RowProperties) -> Result<(), StoreError>;

    async fn archive_row(&self, row_id: &str) -> Result<(), StoreError>;

    /// Writes accepted but never sent to the backing store.
    fn skipped_writes(&self) -> usize {
        0
    }
}

#[async_trait]
impl<T: DestinationStore + ?Sized> DestinationStore for Arc<T> {
    async fn query_rows(&self, container_id: &str) -> Result<Vec<DestinationRow>, StoreError> {
        (**self).query_rows(container_id).await
    }

    async fn get_schema(&self, container_id: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        (**self).get_schema(container_id).await
    }

    async fn update_schema(
        &self,
        container_id: &str,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        (**self).update_schema(container_id, changes).await
    }

    async fn create_row(
        &self,
        container_id: &str,
        properties: &RowProperties,
    ) -> Result<String, StoreError> {
        (**self).create_row(container_id, properties).await
    }

    async fn update_row(&self, row_id: &str, properties: &RowProperties) -> Result<(), StoreError> {
        (**self).update_row(row_id, properties).await
    }

    async fn archive_row(&self, row_id: &str) -> Result<(), StoreError> {
        (**self).archive_row(row_id).await
    }

    fn skipped_writes(&self) -> usize {
        (**self).skipped_writes()
    }
}

/// Deals captured to a JSON file (`[{"id": "...", "fields": {...}}]`), for
/// offline runs against a real or in-memory destination.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    records: Vec<SourceRecord>,
}

impl FixtureSource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let records: Vec<SourceRecord> = read_json_file(path)?;
        Ok(Self { records })
    }
}

#[async_trait]
impl SourceStore for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn list_all_records(&self) -> Result<Vec<SourceRecord>, StoreError> {
        Ok(self.records.clone())
    }
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}
