//! Keeps the destination's columns in line with the deal field set.

use std::collections::BTreeSet;

use dealsync_adapters::DestinationStore;
use dealsync_core::{ColumnDescriptor, ColumnKind, SchemaChange, SourceRecord};
use serde::Serialize;
use tracing::info;

use crate::config::SyncSettings;
use crate::error::SyncError;

/// Field names mirrored into their own text columns: every field seen on any
/// record, minus the title source field and anything named like a required
/// column.
pub fn source_field_names(records: &[SourceRecord], settings: &SyncSettings) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.fields.keys())
        .filter(|name| {
            **name != settings.title_source_field
                && **name != settings.title_column
                && **name != settings.external_ref_column
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaPlan {
    pub title_column: String,
    pub external_ref_column: String,
    pub title_exists: bool,
    pub external_ref_exists: bool,
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl SchemaPlan {
    /// With no known field set (a run that saw no deals) nothing is removed
    /// and only the required columns are ensured.
    pub fn compute(
        columns: &[ColumnDescriptor],
        source_fields: Option<&BTreeSet<String>>,
        settings: &SyncSettings,
    ) -> Self {
        let existing: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let mut wanted: BTreeSet<&str> = match source_fields {
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None => existing.clone(),
        };
        wanted.insert(&settings.title_column);
        wanted.insert(&settings.external_ref_column);

        Self {
            title_column: settings.title_column.clone(),
            external_ref_column: settings.external_ref_column.clone(),
            title_exists: existing.contains(settings.title_column.as_str()),
            external_ref_exists: existing.contains(settings.external_ref_column.as_str()),
            added: wanted.difference(&existing).map(|s| s.to_string()).collect(),
            removed: existing.difference(&wanted).map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.title_exists && self.external_ref_exists
    }

    /// Payload of the single schema-update call. Required columns are always
    /// restated; other columns appear only when they drift.
    pub fn changes(&self) -> Vec<SchemaChange> {
        let mut changes = vec![
            SchemaChange::EnsureTitle {
                name: self.title_column.clone(),
                existing: self.title_exists,
            },
            SchemaChange::EnsureUrl {
                name: self.external_ref_column.clone(),
                existing: self.external_ref_exists,
            },
        ];
        changes.extend(
            self.added
                .iter()
                .filter(|name| **name != self.title_column && **name != self.external_ref_column)
                .map(|name| SchemaChange::AddText { name: name.clone() }),
        );
        changes.extend(
            self.removed
                .iter()
                .map(|name| SchemaChange::Remove { name: name.clone() }),
        );
        changes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaOutcome {
    pub plan: SchemaPlan,
    pub updated: bool,
}

/// Reads the destination columns and issues one schema update if they drifted.
pub async fn reconcile_schema<D: DestinationStore + ?Sized>(
    destination: &D,
    container_id: &str,
    source_fields: Option<&BTreeSet<String>>,
    settings: &SyncSettings,
) -> Result<SchemaOutcome, SyncError> {
    let columns = destination
        .get_schema(container_id)
        .await
        .map_err(SyncError::remote("get_schema"))?;
    // A database holds a single title column; it cannot be replaced by another name.
    if let Some(other) = columns
        .iter()
        .find(|c| c.kind == ColumnKind::Title && c.name != settings.title_column)
    {
        return Err(SyncError::TitleColumnConflict {
            expected: settings.title_column.clone(),
            found: other.name.clone(),
        });
    }
    let plan = SchemaPlan::compute(&columns, source_fields, settings);

    if plan.is_up_to_date() {
        info!(columns = columns.len(), "destination schema up to date");
        return Ok(SchemaOutcome {
            plan,
            updated: false,
        });
    }

    info!(
        added = ?plan.added,
        removed = ?plan.removed,
        "destination schema drifted; updating"
    );
    destination
        .update_schema(container_id, &plan.changes())
        .await
        .map_err(SyncError::remote("update_schema"))?;
    Ok(SchemaOutcome {
        plan,
        updated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealsync_adapters::{DestinationCall, MemoryDestination};

    fn fields(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn field_names_skip_title_source_and_required_columns() {
        let settings = SyncSettings::default();
        let records = vec![
            SourceRecord::new("1").with_field("dealname", "A").with_field("amount", "1"),
            SourceRecord::new("2").with_field("dealstage", "won").with_field("HubSpot", "x"),
        ];
        assert_eq!(source_field_names(&records, &settings), fields(&["amount", "dealstage"]));
    }

    #[test]
    fn fresh_destination_gets_required_columns_without_names() {
        let plan = SchemaPlan::compute(&[], Some(&fields(&["amount"])), &SyncSettings::default());
        assert!(!plan.is_up_to_date());
        assert_eq!(plan.added, fields(&["HubSpot", "Name", "amount"]));
        assert!(plan.removed.is_empty());
        assert_eq!(
            plan.changes(),
            vec![
                SchemaChange::EnsureTitle { name: "Name".into(), existing: false },
                SchemaChange::EnsureUrl { name: "HubSpot".into(), existing: false },
                SchemaChange::AddText { name: "amount".into() },
            ]
        );
    }

    #[test]
    fn drift_adds_and_removes_columns() {
        let columns = vec![
            ColumnDescriptor::new("Name", ColumnKind::Title),
            ColumnDescriptor::new("HubSpot", ColumnKind::Url),
            ColumnDescriptor::new("amount", ColumnKind::RichText),
            ColumnDescriptor::new("retired", ColumnKind::RichText),
        ];
        let plan = SchemaPlan::compute(
            &columns,
            Some(&fields(&["amount", "pipeline"])),
            &SyncSettings::default(),
        );
        assert_eq!(plan.added, fields(&["pipeline"]));
        assert_eq!(plan.removed, fields(&["retired"]));
        assert_eq!(
            plan.changes(),
            vec![
                SchemaChange::EnsureTitle { name: "Name".into(), existing: true },
                SchemaChange::EnsureUrl { name: "HubSpot".into(), existing: true },
                SchemaChange::AddText { name: "pipeline".into() },
                SchemaChange::Remove { name: "retired".into() },
            ]
        );
    }

    #[test]
    fn matching_columns_are_up_to_date() {
        let columns = vec![
            ColumnDescriptor::new("HubSpot", ColumnKind::Url),
            ColumnDescriptor::new("Name", ColumnKind::Title),
            ColumnDescriptor::new("amount", ColumnKind::RichText),
        ];
        let plan = SchemaPlan::compute(&columns, Some(&fields(&["amount"])), &SyncSettings::default());
        assert!(plan.is_up_to_date());
    }

    #[test]
    fn unknown_field_set_keeps_extra_columns() {
        let columns = vec![
            ColumnDescriptor::new("Name", ColumnKind::Title),
            ColumnDescriptor::new("amount", ColumnKind::RichText),
        ];
        let plan = SchemaPlan::compute(&columns, None, &SyncSettings::default());
        assert!(plan.removed.is_empty());
        assert_eq!(plan.added, fields(&["HubSpot"]));
    }

    #[tokio::test]
    async fn second_reconcile_is_a_no_op() {
        let settings = SyncSettings::default();
        let dest = MemoryDestination::new().with_columns(vec![
            ColumnDescriptor::new("Name", ColumnKind::Title),
            ColumnDescriptor::new("stale", ColumnKind::RichText),
        ]);
        let source_fields = fields(&["amount", "dealstage"]);

        let first = reconcile_schema(&dest, "db", Some(&source_fields), &settings).await.unwrap();
        assert!(first.updated);

        let second = reconcile_schema(&dest, "db", Some(&source_fields), &settings).await.unwrap();
        assert!(!second.updated);
        assert!(second.plan.added.is_empty());
        assert!(second.plan.removed.is_empty());

        let updates = dest
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DestinationCall::UpdateSchema(_)))
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn differently_named_title_column_is_a_conflict() {
        let dest = MemoryDestination::new().with_columns(vec![
            ColumnDescriptor::new("Project", ColumnKind::Title),
            ColumnDescriptor::new("HubSpot", ColumnKind::Url),
        ]);

        let err = reconcile_schema(&dest, "db", Some(&fields(&["amount"])), &SyncSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::TitleColumnConflict { ref expected, ref found }
                if expected == "Name" && found == "Project"
        ));
        assert!(dest.write_calls().is_empty());
    }
}
