//! Deal -> project-row reconciliation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dealsync_adapters::{
    notion::NOTION_VERSION, DestinationStore, DryRunDestination, FixtureSource, HubspotDeals,
    NotionDatabase, SourceStore,
};
use dealsync_http::{ApiClient, HttpClientConfig};

pub mod batch;
pub mod config;
pub mod error;
pub mod matcher;
pub mod partition;
pub mod pipeline;
pub mod schema;

pub use batch::{write_in_chunks, BatchReport, RowProjector, DEFAULT_CHUNK_SIZE};
pub use config::{ConfigError, SyncConfig, SyncSettings};
pub use error::SyncError;
pub use matcher::{match_rows, IdCollision, MatchOptions, MatchOutcome};
pub use partition::{partition, Partition, PendingUpdate};
pub use pipeline::{SyncPipeline, SyncRunSummary};
pub use schema::{reconcile_schema, source_field_names, SchemaOutcome, SchemaPlan};

pub const CRATE_NAME: &str = "dealsync-sync";

#[derive(Debug, Clone, Default)]
pub struct RunMode {
    /// Read both stores but skip every destination write.
    pub dry_run: bool,
    /// Read deals from this JSON file instead of HubSpot.
    pub source_fixture: Option<PathBuf>,
}

fn http_config(config: &SyncConfig, base_url: &str, token: &str) -> HttpClientConfig {
    HttpClientConfig {
        timeout: config.http_timeout,
        user_agent: Some(config.user_agent.clone()),
        ..HttpClientConfig::new(base_url, token)
    }
}

pub fn build_pipeline(config: &SyncConfig, mode: &RunMode) -> Result<SyncPipeline> {
    let source: Box<dyn SourceStore> = match &mode.source_fixture {
        Some(path) => Box::new(
            FixtureSource::load(path)
                .with_context(|| format!("loading deal fixture {}", path.display()))?,
        ),
        None => {
            let client = ApiClient::new(http_config(
                config,
                &config.hubspot_base_url,
                &config.hubspot_api_key,
            ))
            .context("building HubSpot client")?;
            Box::new(HubspotDeals::new(client, config.settings.deal_properties.clone()))
        }
    };

    let notion_client = ApiClient::new(
        http_config(config, &config.notion_base_url, &config.notion_token)
            .with_header("Notion-Version", NOTION_VERSION),
    )
    .context("building Notion client")?;
    let notion = NotionDatabase::new(notion_client);
    let destination: Box<dyn DestinationStore> = if mode.dry_run {
        Box::new(DryRunDestination::new(notion))
    } else {
        Box::new(notion)
    };

    Ok(SyncPipeline::new(
        source,
        destination,
        config.notion_database_id.clone(),
        config.portal_id.clone(),
        config.settings.clone(),
    ))
}

pub async fn run_sync(config: &SyncConfig, mode: &RunMode) -> Result<SyncRunSummary> {
    let pipeline = build_pipeline(config, mode)?;
    Ok(pipeline.run_once().await?)
}
