//! Notion database adapter: pages are rows, database properties are columns.

use async_trait::async_trait;
use dealsync_core::{
    ColumnDescriptor, ColumnKind, DestinationRow, PropertyValue, RowKind, RowProperties,
    SchemaChange,
};
use dealsync_http::ApiClient;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use crate::{DestinationStore, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich text content longer than this.
pub const RICH_TEXT_LIMIT: usize = 2000;
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    results: Vec<JsonValue>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseObject {
    #[serde(default)]
    properties: Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

#[derive(Debug, Clone)]
pub struct NotionDatabase {
    client: ApiClient,
}

impl NotionDatabase {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

fn plain_text(items: Option<&JsonValue>) -> String {
    items
        .and_then(JsonValue::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.pointer("/text/content"))
                        .and_then(JsonValue::as_str)
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn property_type(prop: &JsonValue) -> &str {
    prop.get("type").and_then(JsonValue::as_str).unwrap_or("unknown")
}

pub(crate) fn property_from_json(prop: &JsonValue) -> PropertyValue {
    match property_type(prop) {
        "title" => PropertyValue::Title(plain_text(prop.get("title"))),
        "rich_text" => PropertyValue::RichText(plain_text(prop.get("rich_text"))),
        "url" => PropertyValue::Url(
            prop.get("url")
                .and_then(JsonValue::as_str)
                .map(ToString::to_string),
        ),
        other => PropertyValue::Other {
            kind: other.to_string(),
        },
    }
}

pub(crate) fn row_from_json(page: &JsonValue) -> Result<DestinationRow, StoreError> {
    let row_id = page
        .get("id")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| StoreError::Message("notion query result without an id".to_string()))?
        .to_string();
    let kind = match page.get("object").and_then(JsonValue::as_str) {
        Some("page") => RowKind::Row,
        Some(other) => RowKind::Other(other.to_string()),
        None => RowKind::Other("missing".to_string()),
    };
    let archived = ["archived", "in_trash"]
        .iter()
        .any(|key| page.get(*key).and_then(JsonValue::as_bool).unwrap_or(false));
    let properties: RowProperties = page
        .get("properties")
        .and_then(JsonValue::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), property_from_json(prop)))
                .collect()
        })
        .unwrap_or_default();

    Ok(DestinationRow {
        row_id,
        kind,
        archived,
        properties,
    })
}

pub(crate) fn column_from_json(name: &str, prop: &JsonValue) -> ColumnDescriptor {
    let kind = match property_type(prop) {
        "title" => ColumnKind::Title,
        "url" => ColumnKind::Url,
        "rich_text" => ColumnKind::RichText,
        other => ColumnKind::Other(other.to_string()),
    };
    ColumnDescriptor::new(name, kind)
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn text_runs(text: &str) -> JsonValue {
    if text.is_empty() {
        return json!([]);
    }
    json!([{ "type": "text", "text": { "content": truncate_chars(text, RICH_TEXT_LIMIT) } }])
}

pub(crate) fn properties_to_json(properties: &RowProperties) -> JsonValue {
    let mut out = Map::new();
    for (name, value) in properties {
        let encoded = match value {
            PropertyValue::Title(text) => json!({ "title": text_runs(text) }),
            PropertyValue::RichText(text) => json!({ "rich_text": text_runs(text) }),
            PropertyValue::Url(url) => json!({ "url": url }),
            PropertyValue::Other { .. } => continue,
        };
        out.insert(name.clone(), encoded);
    }
    JsonValue::Object(out)
}

/// Column edits for `PATCH /v1/databases/{id}`. An existing column is sent
/// with its own name so Notion never treats the edit as a rename.
pub(crate) fn schema_changes_to_json(changes: &[SchemaChange]) -> JsonValue {
    let mut out = Map::new();
    for change in changes {
        let (name, encoded) = match change {
            SchemaChange::EnsureTitle { name, existing } => {
                let mut column = json!({ "title": {} });
                if *existing {
                    column["name"] = json!(name);
                }
                (name, column)
            }
            SchemaChange::EnsureUrl { name, existing } => {
                let mut column = json!({ "url": {} });
                if *existing {
                    column["name"] = json!(name);
                }
                (name, column)
            }
            SchemaChange::AddText { name } => (name, json!({ "rich_text": {} })),
            SchemaChange::Remove { name } => (name, JsonValue::Null),
        };
        out.insert(name.clone(), encoded);
    }
    json!({ "properties": out })
}

#[async_trait]
impl DestinationStore for NotionDatabase {
    async fn query_rows(&self, container_id: &str) -> Result<Vec<DestinationRow>, StoreError> {
        let path = format!("/v1/databases/{container_id}/query");
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page: QueryPage = self.client.post_json(&path, &body).await?;
            debug!(count = page.results.len(), has_more = page.has_more, "queried notion rows");
            for result in &page.results {
                rows.push(row_from_json(result)?);
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(rows)
    }

    async fn get_schema(&self, container_id: &str) -> Result<Vec<ColumnDescriptor>, StoreError> {
        let db: DatabaseObject = self
            .client
            .get_json(&format!("/v1/databases/{container_id}"), &[])
            .await?;
        Ok(db
            .properties
            .iter()
            .map(|(name, prop)| column_from_json(name, prop))
            .collect())
    }

    async fn update_schema(
        &self,
        container_id: &str,
        changes: &[SchemaChange],
    ) -> Result<(), StoreError> {
        let _: JsonValue = self
            .client
            .patch_json(
                &format!("/v1/databases/{container_id}"),
                &schema_changes_to_json(changes),
            )
            .await?;
        Ok(())
    }

    async fn create_row(
        &self,
        container_id: &str,
        properties: &RowProperties,
    ) -> Result<String, StoreError> {
        let body = json!({
            "parent": { "database_id": container_id },
            "properties": properties_to_json(properties),
        });
        let created: CreatedPage = self.client.post_json("/v1/pages", &body).await?;
        Ok(created.id)
    }

    async fn update_row(&self, row_id: &str, properties: &RowProperties) -> Result<(), StoreError> {
        let body = json!({ "properties": properties_to_json(properties) });
        let _: JsonValue = self
            .client
            .patch_json(&format!("/v1/pages/{row_id}"), &body)
            .await?;
        Ok(())
    }

    async fn archive_row(&self, row_id: &str) -> Result<(), StoreError> {
        let _: JsonValue = self
            .client
            .patch_json(&format!("/v1/pages/{row_id}"), &json!({ "archived": true }))
            .await?;
        Ok(())
    }
}
