//! Deal id <-> HubSpot record URL codec.
//!
//! Destination rows point back at their deal through a URL of the form
//! `https://app.hubspot.com/contacts/{portal}/deal/{deal_id}`. The portal id is
//! the namespace: a decoded id only counts if it came from the configured portal.

use thiserror::Error;
use url::Url;

pub const EXTERNAL_REF_HOST: &str = "app.hubspot.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("namespace mismatch: expected {expected}, found {found}")]
    NamespaceMismatch { expected: String, found: String },
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn require_numeric(label: &str, value: &str) -> Result<(), IdentifierError> {
    if is_numeric(value) {
        Ok(())
    } else {
        Err(IdentifierError::InvalidIdentifier(format!(
            "{label} {value:?} is not numeric"
        )))
    }
}

pub fn encode_external_ref(namespace: &str, source_id: &str) -> Result<String, IdentifierError> {
    require_numeric("namespace", namespace)?;
    require_numeric("source id", source_id)?;
    Ok(format!(
        "https://{EXTERNAL_REF_HOST}/contacts/{namespace}/deal/{source_id}"
    ))
}

pub fn decode_external_ref(namespace: &str, external_ref: &str) -> Result<String, IdentifierError> {
    require_numeric("namespace", namespace)?;

    let invalid = || IdentifierError::InvalidIdentifier(format!("unrecognized reference {external_ref:?}"));
    let url = Url::parse(external_ref).map_err(|_| invalid())?;
    if url.scheme() != "https"
        || url.host_str() != Some(EXTERNAL_REF_HOST)
        || !url.username().is_empty()
        || url.password().is_some()
        || url.port().is_some()
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return Err(invalid());
    }

    // One trailing slash is tolerated; any other empty segment is not.
    let path = url.path().strip_prefix('/').unwrap_or(url.path());
    let path = path.strip_suffix('/').unwrap_or(path);
    let segments: Vec<&str> = path.split('/').collect();
    let [contacts, found_namespace, deal, source_id] = segments.as_slice() else {
        return Err(invalid());
    };
    if *contacts != "contacts" || *deal != "deal" || !is_numeric(found_namespace) || !is_numeric(source_id)
    {
        return Err(invalid());
    }
    if *found_namespace != namespace {
        return Err(IdentifierError::NamespaceMismatch {
            expected: namespace.to_string(),
            found: found_namespace.to_string(),
        });
    }
    Ok(source_id.to_string())
}
