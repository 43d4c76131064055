//! Run configuration: credentials and ids from the environment, column layout
//! from an optional YAML settings file.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use dealsync_adapters::{hubspot, notion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration value {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How deals map onto the destination's columns, and run tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Deal property that becomes the row title.
    pub title_source_field: String,
    pub title_column: String,
    pub external_ref_column: String,
    /// HubSpot properties to mirror; empty means the adapter defaults.
    pub deal_properties: Vec<String>,
    pub chunk_size: usize,
    /// Fail the run on an undecodable reference instead of archiving the row.
    pub strict_identifier_validation: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            title_source_field: "dealname".to_string(),
            title_column: "Name".to_string(),
            external_ref_column: "HubSpot".to_string(),
            deal_properties: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            strict_identifier_validation: false,
        }
    }
}

impl SyncSettings {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: SyncSettings = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("title_source_field", &self.title_source_field),
            ("title_column", &self.title_column),
            ("external_ref_column", &self.external_ref_column),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.title_column == self.external_ref_column {
            return Err(ConfigError::Invalid {
                name: "external_ref_column",
                reason: "must differ from title_column".to_string(),
            });
        }
        let title_requested = if self.deal_properties.is_empty() {
            hubspot::DEFAULT_DEAL_PROPERTIES.contains(&self.title_source_field.as_str())
        } else {
            self.deal_properties.contains(&self.title_source_field)
        };
        if !title_requested {
            return Err(ConfigError::Invalid {
                name: "deal_properties",
                reason: format!(
                    "must include the title source field {:?}",
                    self.title_source_field
                ),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                name: "chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub hubspot_api_key: String,
    pub notion_token: String,
    pub notion_database_id: String,
    /// HubSpot portal id; the namespace of every external reference.
    pub portal_id: String,
    pub hubspot_base_url: String,
    pub notion_base_url: String,
    pub http_timeout: Option<Duration>,
    pub user_agent: String,
    pub settings: SyncSettings,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("hubspot_api_key", &"<redacted>")
            .field("notion_token", &"<redacted>")
            .field("notion_database_id", &self.notion_database_id)
            .field("portal_id", &self.portal_id)
            .field("hubspot_base_url", &self.hubspot_base_url)
            .field("notion_base_url", &self.notion_base_url)
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .field("settings", &self.settings)
            .finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "False" | "no" => Some(false),
        _ => None,
    }
}

impl SyncConfig {
    pub fn from_env(settings: SyncSettings) -> Result<Self, ConfigError> {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as absent.
    pub fn from_lookup(
        mut settings: SyncSettings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let hubspot_api_key = require("HUBSPOT_API_KEY")?;
        let notion_token = require("NOTION_TOKEN")?;
        let notion_database_id = match get("NOTION_PROJECT_DB") {
            Some(id) => id,
            None => require("NOTION_INTCUBE_PROJECT_DB")
                .map_err(|_| ConfigError::Missing("NOTION_PROJECT_DB"))?,
        };
        let portal_id = require("HUBSPOT_PORTAL_ID")?.trim().to_string();
        if !portal_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                name: "HUBSPOT_PORTAL_ID",
                reason: format!("{portal_id:?} is not numeric"),
            });
        }

        if let Some(raw) = get("DEALSYNC_CHUNK_SIZE") {
            settings.chunk_size = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "DEALSYNC_CHUNK_SIZE",
                reason: format!("{raw:?} is not a positive integer"),
            })?;
        }
        if let Some(raw) = get("DEALSYNC_STRICT_IDS") {
            settings.strict_identifier_validation =
                parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                    name: "DEALSYNC_STRICT_IDS",
                    reason: format!("{raw:?} is not a boolean"),
                })?;
        }
        settings.validate()?;

        let timeout_secs: u64 = match get("DEALSYNC_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "DEALSYNC_HTTP_TIMEOUT_SECS",
                reason: format!("{raw:?} is not a number of seconds"),
            })?,
            None => 30,
        };

        Ok(Self {
            hubspot_api_key,
            notion_token,
            notion_database_id,
            portal_id,
            hubspot_base_url: get("HUBSPOT_API_BASE")
                .unwrap_or_else(|| hubspot::DEFAULT_BASE_URL.to_string()),
            notion_base_url: get("NOTION_API_BASE")
                .unwrap_or_else(|| notion::DEFAULT_BASE_URL.to_string()),
            http_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            user_agent: get("DEALSYNC_USER_AGENT")
                .unwrap_or_else(|| format!("dealsync/{}", env!("CARGO_PKG_VERSION"))),
            settings,
        })
    }
}
