//! In-process destination that applies and records every call.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dealsync_core::{
    ColumnDescriptor, ColumnKind, DestinationRow, PropertyValue, RowKind, RowProperties,
    SchemaChange,
};

use crate::{DestinationStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationCall {
    QueryRows,
    GetSchema,
    UpdateSchema(Vec<SchemaChange>),
    CreateRow { properties: RowProperties },
    UpdateRow { row_id: String, properties: RowProperties },
    ArchiveRow { row_id: String },
}

impl DestinationCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, DestinationCall::QueryRows | DestinationCall::GetSchema)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<DestinationRow>,
    calls: Vec<DestinationCall>,
    next_row: usize,
    reject_title: Option<String>,
}

/// Cloning shares the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(self, columns: Vec<ColumnDescriptor>) -> Self {
        self.lock().columns = columns;
        self
    }

    pub fn with_rows(self, rows: Vec<DestinationRow>) -> Self {
        self.lock().rows = rows;
        self
    }

    /// Create and update calls whose title equals `title` fail with a store error.
    pub fn rejecting_title(self, title: impl Into<String>) -> Self {
        self.lock().reject_title = Some(title.into());
        self
    }

    pub fn calls(&self) -> Vec<DestinationCall> {
        self.lock().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<DestinationCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn rows(&self) -> Vec<DestinationRow> {
        self.lock().rows.clone()
    }

    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.lock().columns.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn title_of(properties: &RowProperties) -> Option<&str> {
    properties.values().find_map(|v| match v {
        PropertyValue::Title(t) => Some(t.as_str()),
        _ => None,
    })
}

impl MemoryState {
    fn check_rejected(&self, properties: &RowProperties) -> Result<(), StoreError> {
        match (&self.reject_title, title_of(properties)) {
            (Some(rejected), Some(title)) if rejected == title => Err(StoreError::Message(
                format!("memory destination rejected row titled {title:?}"),
            )),
            _ => Ok(()),
        }
    }

    fn row_mut(&mut self, row_id: &str) -> Result<&mut DestinationRow, StoreError> {
        self.rows
            .iter_mut()
            .find(|r| r.row_id == row_id)
            .ok_or_else(|| StoreError::Message(format!("no row {row_id}")))
    }
}

#[async_trait]
impl DestinationStore for MemoryDestination {
    async fn query_rows(&self, _container_id: &str) -> Result<Vec<DestinationRow>, StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::QueryRows);
        Ok(state.rows.iter().filter(|r| !r.archived).cloned().collect())
    }

    async fn get_schema(&self, _container_id: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::GetSchema);
        Ok(state.columns.clone())
    }

    async fn update_schema(
        &self,
        _container_id: &str,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::UpdateSchema(changes.to_vec()));
        for change in changes {
            let (name, kind) = match change {
                SchemaChange::EnsureTitle { name, .. } => (name, ColumnKind::Title),
                SchemaChange::EnsureUrl { name, .. } => (name, ColumnKind::Url),
                SchemaChange::AddText { name } => (name, ColumnKind::RichText),
                SchemaChange::Remove { name } => {
                    state.columns.retain(|c| &c.name != name);
                    continue;
                }
            };
            match state.columns.iter().position(|c| &c.name == name) {
                Some(idx) => state.columns[idx].kind = kind,
                None => state.columns.push(ColumnDescriptor::new(name.clone(), kind)),
            }
        }
        Ok(())
    }

    async fn create_row(
        &self,
        _container_id: &str,
        properties: &RowProperties,
    ) -> Result<String, StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::CreateRow {
            properties: properties.clone(),
        });
        state.check_rejected(properties)?;
        state.next_row += 1;
        let row_id = format!("mem-{}", state.next_row);
        state.rows.push(DestinationRow {
            row_id: row_id.clone(),
            kind: RowKind::Row,
            archived: false,
            properties: properties.clone(),
        });
        Ok(row_id)
    }

    async fn update_row(&self, row_id: &str, properties: &RowProperties) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::UpdateRow {
            row_id: row_id.to_string(),
            properties: properties.clone(),
        });
        state.check_rejected(properties)?;
        let row = state.row_mut(row_id)?;
        row.properties.extend(properties.clone());
        Ok(())
    }

    async fn archive_row(&self, row_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(DestinationCall::ArchiveRow {
            row_id: row_id.to_string(),
        });
        state.row_mut(row_id)?.archived = true;
        Ok(())
    }
}
