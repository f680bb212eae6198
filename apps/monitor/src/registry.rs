//! Project registry client.
//!
//! Monitored projects live in an external registry (an Airtable-style REST
//! API) and are fetched fresh at the start of every pass. Rows without a name
//! or URL are dropped, and rows with an unrecognized type are rejected with a
//! warning rather than silently defaulted to some other check.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry API returned status {0}")]
    Api(reqwest::StatusCode),
    #[error("unknown project type: {0}")]
    UnknownKind(String),
}

/// How a project is verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectKind {
    /// Plain GET plus markup heuristics, no browser
    #[serde(rename = "http-heuristic")]
    HttpHeuristic,
    /// Pre-authenticated entry link driven through a browser session
    #[serde(rename = "magic-link-session")]
    MagicLinkSession,
    /// Credentialed login form driven through a browser session
    #[serde(rename = "credential-login")]
    CredentialLogin,
}

impl ProjectKind {
    /// Whether this kind drives a browser session instead of a plain probe
    pub fn needs_browser(&self) -> bool {
        matches!(self, ProjectKind::MagicLinkSession | ProjectKind::CredentialLogin)
    }
}

impl FromStr for ProjectKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http-heuristic" => Ok(ProjectKind::HttpHeuristic),
            "magic-link-session" => Ok(ProjectKind::MagicLinkSession),
            "credential-login" => Ok(ProjectKind::CredentialLogin),
            other => Err(RegistryError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::HttpHeuristic => write!(f, "http-heuristic"),
            ProjectKind::MagicLinkSession => write!(f, "magic-link-session"),
            ProjectKind::CredentialLogin => write!(f, "credential-login"),
        }
    }
}

/// Login credentials for credential-login projects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// A monitored target, immutable for the duration of one pass
#[derive(Debug, Clone)]
pub struct Project {
    /// Stable slug derived from the name
    pub id: String,
    pub name: String,
    pub kind: ProjectKind,
    pub url: String,
    /// Secondary path probed after authentication, same session
    pub check_page: Option<String>,
    pub alert_email: Option<String>,
    pub alert_webhook: Option<String>,
    pub credentials: Option<Credentials>,
    /// Desired check cadence; carried through to the snapshot for the
    /// external scheduler, not acted on here
    pub interval_minutes: u32,
}

/// Derive a stable id from a project name: lowercase, runs of
/// non-alphanumerics collapse to a single hyphen, no leading or trailing
/// hyphen.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    out
}

#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    /// Fetch every valid project, in registry order
    async fn fetch_all(&self) -> Result<Vec<Project>, RegistryError>;
}

/// Registry backed by an Airtable-style REST API
pub struct HttpProjectRegistry {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    fields: RecordFields,
}

fn default_interval() -> u32 {
    15
}

#[derive(Debug, Deserialize)]
struct RecordFields {
    #[serde(rename = "Project Name", default)]
    name: String,
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(rename = "Check Page", default)]
    check_page: String,
    #[serde(rename = "Check Interval (mins)", default = "default_interval")]
    interval_minutes: u32,
    #[serde(rename = "Alert Email", default)]
    alert_email: String,
    #[serde(rename = "Alert Webhook", default)]
    alert_webhook: String,
    #[serde(rename = "Login Email", default)]
    login_email: String,
    #[serde(rename = "Login Password", default)]
    login_password: String,
}

impl HttpProjectRegistry {
    pub fn new(endpoint: String, token: String) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, endpoint, token })
    }
}

#[async_trait]
impl ProjectRegistry for HttpProjectRegistry {
    async fn fetch_all(&self) -> Result<Vec<Project>, RegistryError> {
        let response =
            self.client.get(&self.endpoint).bearer_auth(&self.token).send().await?;

        if !response.status().is_success() {
            return Err(RegistryError::Api(response.status()));
        }

        let page: RecordPage = response.json().await?;
        Ok(page.records.into_iter().filter_map(|record| project_from_fields(record.fields)).collect())
    }
}

/// Map one registry row to a project, or drop it when it is unusable
fn project_from_fields(fields: RecordFields) -> Option<Project> {
    if fields.name.is_empty() || fields.url.is_empty() {
        return None;
    }

    let kind = match fields.kind.to_lowercase().parse::<ProjectKind>() {
        Ok(kind) => kind,
        Err(_) => {
            warn!("Dropping project {:?}: unknown type {:?}", fields.name, fields.kind);
            return None;
        }
    };

    let credentials = (!fields.login_email.is_empty() && !fields.login_password.is_empty())
        .then(|| Credentials { email: fields.login_email, password: fields.login_password });

    Some(Project {
        id: slug(&fields.name),
        name: fields.name,
        kind,
        url: fields.url,
        check_page: none_if_empty(fields.check_page),
        alert_email: none_if_empty(fields.alert_email),
        alert_webhook: none_if_empty(fields.alert_webhook),
        credentials,
        interval_minutes: fields.interval_minutes,
    })
}

fn none_if_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
