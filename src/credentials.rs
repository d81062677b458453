//! Google credentials file inspection
//!
//! Credential files come in several shapes that carry no explicit type tag;
//! the shape is recognised by which top-level key is present. The checks are
//! applied in a fixed order and the first match wins, so a document carrying
//! several discriminator keys always classifies the same way.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{CheckError, CheckResult};
use crate::settings::read_json_object;

/// Shape of a credentials document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialVariant {
    /// Top-level `client_id`: an OAuth client or `authorized_user` ADC file
    OAuthBare,
    /// `web` OAuth client descriptor
    OAuthWeb,
    /// `installed` (desktop) OAuth client descriptor
    OAuthDesktop,
    /// Top-level `project_id` without a client id
    ServiceAccount,
    Unknown,
}

impl fmt::Display for CredentialVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::OAuthBare => "OAuth 2.0 Client ID",
            Self::OAuthWeb => "OAuth 2.0 Web Client",
            Self::OAuthDesktop => "OAuth 2.0 Desktop Client",
            Self::ServiceAccount => "Service Account",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Result of classifying a credentials document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    pub variant: CredentialVariant,
    pub client_id: Option<String>,
    pub project_id: Option<String>,
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Classify a parsed credentials document.
///
/// Order: `client_id`, `web`, `installed`, `project_id`.
pub fn classify(creds: &Map<String, Value>) -> CredentialSummary {
    if creds.contains_key("client_id") {
        return CredentialSummary {
            variant: CredentialVariant::OAuthBare,
            client_id: string_field(creds, "client_id"),
            project_id: string_field(creds, "quota_project_id")
                .or_else(|| string_field(creds, "project_id")),
        };
    }

    let nested = |key: &str| creds.get(key).and_then(Value::as_object);

    if creds.contains_key("web") {
        return nested_summary(CredentialVariant::OAuthWeb, nested("web"));
    }

    if creds.contains_key("installed") {
        return nested_summary(CredentialVariant::OAuthDesktop, nested("installed"));
    }

    if creds.contains_key("project_id") {
        return CredentialSummary {
            variant: CredentialVariant::ServiceAccount,
            client_id: None,
            project_id: string_field(creds, "project_id"),
        };
    }

    CredentialSummary {
        variant: CredentialVariant::Unknown,
        client_id: None,
        project_id: None,
    }
}

fn nested_summary(variant: CredentialVariant, inner: Option<&Map<String, Value>>) -> CredentialSummary {
    CredentialSummary {
        variant,
        client_id: inner.and_then(|m| string_field(m, "client_id")),
        project_id: inner.and_then(|m| string_field(m, "project_id")),
    }
}

/// Load a credentials file with the same contract as the settings reader
pub fn load_credentials(path: &Path) -> CheckResult<Map<String, Value>> {
    read_json_object(path)
}

/// `authorized_user` Application Default Credentials document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdcCredentials {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub client_id: String,
    pub client_secret: String,
    pub quota_project_id: String,
    /// Filled in by a later interactive login
    pub refresh_token: Option<String>,
}

impl AdcCredentials {
    /// Build an ADC document from an OAuth client descriptor.
    ///
    /// Only `installed` and `web` descriptors carry a client secret and a
    /// project id together; every other shape is rejected.
    pub fn from_client(path: &Path, creds: &Map<String, Value>) -> CheckResult<Self> {
        let key = match classify(creds).variant {
            CredentialVariant::OAuthDesktop => "installed",
            CredentialVariant::OAuthWeb => "web",
            _ => {
                return Err(CheckError::UnknownCredentialVariant {
                    path: path.to_path_buf(),
                })
            }
        };

        let inner = creds
            .get(key)
            .and_then(Value::as_object)
            .ok_or_else(|| CheckError::missing_key(path, key))?;
        let field = |name: &str| {
            string_field(inner, name).ok_or_else(|| CheckError::missing_key(path, format!("{key}.{name}")))
        };

        Ok(Self {
            kind: "authorized_user",
            client_id: field("client_id")?,
            client_secret: field("client_secret")?,
            quota_project_id: field("project_id")?,
            refresh_token: None,
        })
    }

    /// Serialize with two-space indentation
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
