//! One full reconciliation run: schema, matching, partitioning, writes.

use chrono::{DateTime, Utc};
use dealsync_adapters::{DestinationStore, SourceStore};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::batch::{write_in_chunks, BatchReport, RowProjector};
use crate::config::SyncSettings;
use crate::error::SyncError;
use crate::matcher::{match_rows, IdCollision, MatchOptions};
use crate::partition::partition;
use crate::schema::{reconcile_schema, source_field_names, SchemaPlan};

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub source_records: usize,
    pub destination_rows: usize,
    pub schema_updated: bool,
    pub schema: SchemaPlan,
    pub archived: Vec<String>,
    pub collisions: Vec<IdCollision>,
    pub updates: BatchReport,
    pub creates: BatchReport,
    /// Writes a dry run logged instead of sending.
    pub skipped_writes: usize,
}

pub struct SyncPipeline {
    source: Box<dyn SourceStore>,
    destination: Box<dyn DestinationStore>,
    container_id: String,
    namespace: String,
    settings: SyncSettings,
}

impl SyncPipeline {
    pub fn new(
        source: Box<dyn SourceStore>,
        destination: Box<dyn DestinationStore>,
        container_id: impl Into<String>,
        namespace: impl Into<String>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            destination,
            container_id: container_id.into(),
            namespace: namespace.into(),
            settings,
        }
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, container_id = %self.container_id);
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary, SyncError> {
        let started_at = Utc::now();
        let destination = self.destination.as_ref();

        let records = self
            .source
            .list_all_records()
            .await
            .map_err(SyncError::remote("list_all_records"))?;
        info!(source = self.source.name(), records = records.len(), "fetched source records");

        let fields = source_field_names(&records, &self.settings);
        if records.is_empty() {
            warn!("source returned no records; keeping existing destination columns");
        }
        let known_fields = (!records.is_empty()).then_some(&fields);
        let schema =
            reconcile_schema(destination, &self.container_id, known_fields, &self.settings).await?;

        let rows = destination
            .query_rows(&self.container_id)
            .await
            .map_err(SyncError::remote("query_rows"))?;
        let matched = match_rows(
            destination,
            &rows,
            MatchOptions {
                namespace: &self.namespace,
                external_ref_column: &self.settings.external_ref_column,
                strict_identifier_validation: self.settings.strict_identifier_validation,
            },
        )
        .await?;

        let split = partition(&records, &matched.map);
        info!(
            updates = split.updates.len(),
            creates = split.creates.len(),
            "partitioned source records"
        );

        let projector = RowProjector {
            namespace: &self.namespace,
            settings: &self.settings,
            fields: &fields,
        };

        let updates = write_in_chunks("update", &split.updates, self.settings.chunk_size, |pending| {
            let row_id = pending.row_id;
            let props = projector.project(pending.record);
            async move {
                debug!(row_id, "updating row");
                destination
                    .update_row(row_id, &props?)
                    .await
                    .map_err(SyncError::remote("update_row"))
            }
        })
        .await?;

        let container_id = self.container_id.as_str();
        let creates = write_in_chunks("create", &split.creates, self.settings.chunk_size, |record| {
            let props = projector.project(record);
            let source_id = record.id.clone();
            async move {
                debug!(%source_id, "creating row");
                destination
                    .create_row(container_id, &props?)
                    .await
                    .map(|_| ())
                    .map_err(SyncError::remote("create_row"))
            }
        })
        .await?;

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            source: self.source.name().to_string(),
            source_records: records.len(),
            destination_rows: rows.len(),
            schema_updated: schema.updated,
            schema: schema.plan,
            archived: matched.archived,
            collisions: matched.collisions,
            updates,
            creates,
            skipped_writes: destination.skipped_writes(),
        };
        info!(
            updated = summary.updates.written,
            created = summary.creates.written,
            archived = summary.archived.len(),
            "sync run complete"
        );
        Ok(summary)
    }
}
