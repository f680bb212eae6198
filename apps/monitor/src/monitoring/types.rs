use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Health status of a component or a whole check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Operational,
    Degraded,
    Down,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Operational => write!(f, "operational"),
            Status::Degraded => write!(f, "degraded"),
            Status::Down => write!(f, "down"),
        }
    }
}

/// One independently verified aspect of a target page (e.g. "Navigation")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    pub name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentResult {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self { name: name.into(), status, detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Fold component statuses into one overall status.
///
/// Any down component wins, then any degraded one; an empty list is
/// operational.
pub fn aggregate(components: &[ComponentResult]) -> Status {
    if components.iter().any(|c| c.status == Status::Down) {
        Status::Down
    } else if components.iter().any(|c| c.status == Status::Degraded) {
        Status::Degraded
    } else {
        Status::Operational
    }
}

/// Outcome of one project's health check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Overall status; equals `aggregate(&components)` unless the check
    /// short-circuited before the component list was complete
    pub status: Status,

    /// Wall-clock duration of the whole check in milliseconds
    pub response_time_ms: u64,

    /// HTTP status of the main document, when observable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Title of the rendered page (session-based checks only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,

    /// Underlying failure message, when the check did not complete cleanly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Per-component findings, in detection order
    pub components: Vec<ComponentResult>,
}

impl CheckResult {
    /// Result whose overall status is the aggregate of its components
    pub fn from_components(components: Vec<ComponentResult>, response_time_ms: u64) -> Self {
        Self {
            status: aggregate(&components),
            response_time_ms,
            http_status: None,
            page_title: None,
            error: None,
            components,
        }
    }

    /// Conclusively down, with the underlying failure captured as `error`
    /// and whatever partial components were established before the failure
    pub fn failed(
        error: impl Into<String>,
        components: Vec<ComponentResult>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            status: Status::Down,
            response_time_ms,
            http_status: None,
            page_title: None,
            error: Some(error.into()),
            components,
        }
    }

    pub fn with_http_status(mut self, http_status: Option<u16>) -> Self {
        self.http_status = http_status;
        self
    }

    pub fn with_page_title(mut self, page_title: Option<String>) -> Self {
        self.page_title = page_title;
        self
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
