//! HubSpot CRM deals listing (`/crm/v3/objects/deals`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use dealsync_core::{FieldValue, SourceRecord};
use dealsync_http::ApiClient;
use serde::Deserialize;
use tracing::debug;

use crate::{SourceStore, StoreError};

pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";
pub const DEALS_PATH: &str = "/crm/v3/objects/deals";
const PAGE_SIZE: usize = 100;

/// Properties requested when the settings do not name any.
pub const DEFAULT_DEAL_PROPERTIES: &[&str] = &[
    "dealname",
    "amount",
    "dealstage",
    "pipeline",
    "closedate",
    "createdate",
    "hs_lastmodifieddate",
];

#[derive(Debug, Deserialize)]
struct DealPage {
    #[serde(default)]
    results: Vec<DealObject>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Deserialize)]
struct DealObject {
    id: String,
    #[serde(default)]
    properties: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone)]
pub struct HubspotDeals {
    client: ApiClient,
    properties: Vec<String>,
}

impl HubspotDeals {
    pub fn new(client: ApiClient, properties: Vec<String>) -> Self {
        let properties = if properties.is_empty() {
            DEFAULT_DEAL_PROPERTIES.iter().map(|p| p.to_string()).collect()
        } else {
            properties
        };
        Self { client, properties }
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Keeps exactly the requested properties so every record carries the same
    /// field set; HubSpot adds bookkeeping properties of its own.
    fn to_record(&self, deal: DealObject) -> SourceRecord {
        let mut raw = deal.properties;
        let fields: BTreeMap<String, FieldValue> = self
            .properties
            .iter()
            .map(|name| {
                let value = raw.remove(name).flatten();
                (name.clone(), FieldValue::from(value))
            })
            .collect();
        SourceRecord {
            id: deal.id,
            fields,
        }
    }
}

#[async_trait]
impl SourceStore for HubspotDeals {
    fn name(&self) -> &'static str {
        "hubspot"
    }

    async fn list_all_records(&self) -> Result<Vec<SourceRecord>, StoreError> {
        let mut records = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![
                ("limit", PAGE_SIZE.to_string()),
                ("archived", "false".to_string()),
                ("properties", self.properties.join(",")),
            ];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: DealPage = self.client.get_json(DEALS_PATH, &query).await?;
            debug!(count = page.results.len(), after = ?after, "fetched deals page");
            records.extend(page.results.into_iter().map(|deal| self.to_record(deal)));

            match page.paging.and_then(|p| p.next) {
                Some(next) if Some(&next.after) != after.as_ref() => after = Some(next.after),
                Some(next) => {
                    return Err(StoreError::Message(format!(
                        "hubspot paging cursor {} did not advance",
                        next.after
                    )))
                }
                None => break,
            }
        }

        Ok(records)
    }
}
