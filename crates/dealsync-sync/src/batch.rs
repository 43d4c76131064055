//! Chunked destination writes and the deal -> row projection they send.

use std::collections::BTreeSet;
use std::future::Future;

use dealsync_core::{encode_external_ref, IdentifierError, PropertyValue, RowProperties, SourceRecord};
use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::config::SyncSettings;

/// Upper bound on concurrent writes against the destination.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub chunk_sizes: Vec<usize>,
    pub written: usize,
}

/// Runs `write` for every item, `chunk_size` at a time. All writes of a chunk
/// are in flight together and all of them settle before the next chunk
/// starts. The first failure (in item order) of a chunk stops the batch;
/// chunks already written stay written.
pub async fn write_in_chunks<T, F, Fut, E>(
    label: &str,
    items: &[T],
    chunk_size: usize,
    mut write: F,
) -> Result<BatchReport, E>
where
    F: FnMut(&T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let chunk_size = chunk_size.max(1);
    let total_chunks = items.len().div_ceil(chunk_size);
    let mut report = BatchReport::default();

    for (index, chunk) in items.chunks(chunk_size).enumerate() {
        let results = join_all(chunk.iter().map(&mut write)).await;
        results.into_iter().collect::<Result<Vec<()>, E>>()?;

        report.chunk_sizes.push(chunk.len());
        report.written += chunk.len();
        info!(
            batch = label,
            chunk = index + 1,
            of = total_chunks,
            written = report.written,
            total = items.len(),
            "chunk written"
        );
    }

    Ok(report)
}

/// Builds the row properties sent for one deal.
#[derive(Debug, Clone, Copy)]
pub struct RowProjector<'a> {
    pub namespace: &'a str,
    pub settings: &'a SyncSettings,
    pub fields: &'a BTreeSet<String>,
}

impl RowProjector<'_> {
    pub fn project(&self, record: &SourceRecord) -> Result<RowProperties, IdentifierError> {
        let mut properties = RowProperties::new();
        properties.insert(
            self.settings.title_column.clone(),
            PropertyValue::Title(record.field_text(&self.settings.title_source_field)),
        );
        properties.insert(
            self.settings.external_ref_column.clone(),
            PropertyValue::Url(Some(encode_external_ref(self.namespace, &record.id)?)),
        );
        for name in self.fields {
            properties.insert(name.clone(), PropertyValue::RichText(record.field_text(name)));
        }
        Ok(properties)
    }
}
