//! Result persistence: current-status snapshot and bounded rolling history.
//!
//! Both artifacts are plain JSON files meant for a static dashboard. The
//! snapshot is overwritten every pass; the history is append-only with FIFO
//! eviction once the cap is reached. A missing or corrupt history file starts
//! a fresh sequence rather than failing the run.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::monitoring::CheckResult;
use crate::registry::{Project, ProjectKind};

/// 7 days of 15-minute passes
pub const DEFAULT_HISTORY_CAP: usize = 672;

/// Snapshot entry for one project in one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProjectKind,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_page: Option<String>,
    pub interval_minutes: u32,
    pub checked_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: CheckResult,
}

impl ProjectReport {
    pub fn new(project: &Project, result: CheckResult) -> Self {
        Self {
            id: project.id.clone(),
            name: project.name.clone(),
            kind: project.kind,
            url: project.url.clone(),
            check_page: project.check_page.clone(),
            interval_minutes: project.interval_minutes,
            checked_at: Utc::now(),
            result,
        }
    }
}

/// One pass appended to the rolling history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub results: Vec<ProjectReport>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    updated_at: DateTime<Utc>,
    results: &'a [ProjectReport],
}

pub struct ResultStore {
    out_dir: PathBuf,
    history_cap: usize,
}

impl ResultStore {
    pub fn new(out_dir: impl Into<PathBuf>, history_cap: usize) -> Self {
        Self { out_dir: out_dir.into(), history_cap }
    }

    fn status_path(&self) -> PathBuf {
        self.out_dir.join("status.json")
    }

    fn history_path(&self) -> PathBuf {
        self.out_dir.join("history.json")
    }

    /// Overwrite the current-status artifact
    pub fn write_snapshot(&self, results: &[ProjectReport]) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let snapshot = Snapshot { updated_at: Utc::now(), results };
        let body = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.status_path(), body)
            .with_context(|| format!("failed to write {}", self.status_path().display()))
    }

    /// Append one pass to the rolling history, evicting the oldest records
    /// beyond the cap
    pub fn append_history(&self, results: &[ProjectReport]) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let mut history = self.read_history();
        history.push(HistoryRecord { timestamp: Utc::now(), results: results.to_vec() });
        if history.len() > self.history_cap {
            let excess = history.len() - self.history_cap;
            history.drain(..excess);
        }

        let body = serde_json::to_string_pretty(&history)?;
        fs::write(self.history_path(), body)
            .with_context(|| format!("failed to write {}", self.history_path().display()))
    }

    fn read_history(&self) -> Vec<HistoryRecord> {
        let path = self.history_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(error) => {
                warn!("Discarding corrupt history file {}: {error}", path.display());
                Vec::new()
            }
        }
    }
}
