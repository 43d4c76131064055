//! Maps existing destination rows back to their deals.

use dealsync_adapters::DestinationStore;
use dealsync_core::{decode_external_ref, DestinationRow, IdentifierMap, PropertyValue, RowKind};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions<'a> {
    pub namespace: &'a str,
    pub external_ref_column: &'a str,
    pub strict_identifier_validation: bool,
}

/// Two rows decoding to the same deal. The first row seen keeps the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdCollision {
    pub source_id: String,
    pub kept_row_id: String,
    pub shadowed_row_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub map: IdentifierMap,
    pub archived: Vec<String>,
    pub collisions: Vec<IdCollision>,
}

/// Reference URL stored on the row, if it is present, URL-typed and parses.
fn usable_ref<'r>(row: &'r DestinationRow, column: &str) -> Option<&'r str> {
    match row.properties.get(column) {
        Some(PropertyValue::Url(Some(value))) => {
            let value = value.trim();
            (!value.is_empty() && Url::parse(value).is_ok()).then_some(value)
        }
        _ => None,
    }
}

async fn archive<D: DestinationStore + ?Sized>(
    destination: &D,
    row: &DestinationRow,
    outcome: &mut MatchOutcome,
    reason: &str,
) -> Result<(), SyncError> {
    if row.archived {
        debug!(row_id = %row.row_id, reason, "row already archived");
        return Ok(());
    }
    warn!(row_id = %row.row_id, reason, "archiving destination row");
    destination
        .archive_row(&row.row_id)
        .await
        .map_err(SyncError::remote("archive_row"))?;
    outcome.archived.push(row.row_id.clone());
    Ok(())
}

/// Scans every row once. Rows without a usable reference are archived on the
/// spot; undecodable references are archived too unless strict validation is
/// on, in which case the decode error aborts the scan.
pub async fn match_rows<D: DestinationStore + ?Sized>(
    destination: &D,
    rows: &[DestinationRow],
    options: MatchOptions<'_>,
) -> Result<MatchOutcome, SyncError> {
    let mut outcome = MatchOutcome::default();

    for row in rows {
        if row.kind != RowKind::Row {
            return Err(SyncError::UnexpectedRowKind {
                row_id: row.row_id.clone(),
                kind: row.kind.clone(),
            });
        }

        let Some(external_ref) = usable_ref(row, options.external_ref_column) else {
            archive(destination, row, &mut outcome, "missing external reference").await?;
            continue;
        };

        let source_id = match decode_external_ref(options.namespace, external_ref) {
            Ok(id) => id,
            Err(err) if options.strict_identifier_validation => return Err(err.into()),
            Err(err) => {
                archive(destination, row, &mut outcome, &err.to_string()).await?;
                continue;
            }
        };

        if let Err(kept_row_id) = outcome.map.insert_first(source_id.clone(), row.row_id.clone()) {
            warn!(
                source_id = %source_id,
                kept_row_id = %kept_row_id,
                shadowed_row_id = %row.row_id,
                "two destination rows reference the same deal; keeping the first"
            );
            outcome.collisions.push(IdCollision {
                source_id,
                kept_row_id,
                shadowed_row_id: row.row_id.clone(),
            });
        }
    }

    info!(
        rows = rows.len(),
        matched = outcome.map.len(),
        archived = outcome.archived.len(),
        collisions = outcome.collisions.len(),
        "matched destination rows"
    );
    Ok(outcome)
}
