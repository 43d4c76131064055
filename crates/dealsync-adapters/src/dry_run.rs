//! Read-through destination wrapper that logs writes instead of sending them.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dealsync_core::{ColumnDescriptor, DestinationRow, RowProperties, SchemaChange};
use tracing::info;

use crate::{DestinationStore, StoreError};

#[derive(Debug)]
pub struct DryRunDestination<D> {
    inner: D,
    skipped_writes: AtomicUsize,
}

impl<D> DryRunDestination<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            skipped_writes: AtomicUsize::new(0),
        }
    }

    fn skip(&self) -> usize {
        self.skipped_writes.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl<D: DestinationStore> DestinationStore for DryRunDestination<D> {
    async fn query_rows(&self, container_id: &str) -> Result<Vec<DestinationRow>, StoreError> {
        self.inner.query_rows(container_id).await
    }

    async fn get_schema(&self, container_id: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        self.inner.get_schema(container_id).await
    }

    async fn update_schema(
        &self,
        container_id: &str,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        self.skip();
        info!(container_id, ?changes, "dry run: skipping schema update");
        Ok(())
    }

    async fn create_row(
        &self,
        container_id: &str,
        properties: &RowProperties,
    ) -> Result<String, StoreError> {
        let n = self.skip();
        info!(container_id, ?properties, "dry run: skipping row create");
        Ok(format!("dry-run-{n}"))
    }

    async fn update_row(&self, row_id: &str, properties: &RowProperties) -> Result<(), StoreError> {
        self.skip();
        info!(row_id, ?properties, "dry run: skipping row update");
        Ok(())
    }

    async fn archive_row(&self, row_id: &str) -> Result<(), StoreError> {
        self.skip();
        info!(row_id, "dry run: skipping row archive");
        Ok(())
    }

    fn skipped_writes(&self) -> usize {
        self.skipped_writes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryDestination;

    #[tokio::test]
    async fn reads_pass_through_and_writes_are_counted() {
        let inner = MemoryDestination::new().with_rows(vec![DestinationRow::new("r1")]);
        let dry = DryRunDestination::new(inner.clone());

        assert_eq!(dry.query_rows("db").await.unwrap().len(), 1);
        dry.archive_row("r1").await.unwrap();
        let id = dry.create_row("db", &RowProperties::new()).await.unwrap();
        dry.update_schema("db", &[SchemaChange::AddText { name: "x".into() }])
            .await
            .unwrap();

        assert_eq!(id, "dry-run-2");
        assert_eq!(dry.skipped_writes(), 3);
        assert!(inner.write_calls().is_empty());
        assert!(!inner.rows()[0].archived);
    }
}
