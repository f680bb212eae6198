use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::credential::CredentialLoginChecker;
use super::http::HttpHeuristicChecker;
use super::magic_link::MagicLinkChecker;
use super::session::SessionProvider;
use super::types::CheckResult;
use crate::config::Config;
use crate::registry::{Credentials, Project, ProjectKind};

/// Checker trait for the type-specific verification strategies.
///
/// A checker never fails: every error is folded into the returned
/// [`CheckResult`]. Session-based checkers acquire their session from the
/// provider passed per invocation; `None` means the shared browser was not
/// available this run.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(
        &self,
        project: &Project,
        sessions: Option<&dyn SessionProvider>,
    ) -> CheckResult;
}

/// Timing and threshold knobs shared by the session-based strategies
#[derive(Debug, Clone)]
pub struct BrowserTuning {
    /// Settle budget after a navigation expected to trigger server-side auth
    pub auth_settle: Duration,
    /// Settle budget after an ordinary in-app navigation
    pub page_settle: Duration,
    /// Poll interval inside a settle budget
    pub settle_poll: Duration,
    /// Pause between form-fill steps, for reactive re-rendering
    pub form_pause: Duration,
    /// Body-text length that counts as "content present"
    pub min_body_text_len: usize,
}

impl BrowserTuning {
    pub fn from_config(config: &Config) -> Self {
        Self {
            auth_settle: Duration::from_secs(config.timing.auth_settle_seconds),
            page_settle: Duration::from_secs(config.timing.page_settle_seconds),
            settle_poll: Duration::from_millis(config.timing.settle_poll_ms),
            form_pause: Duration::from_millis(config.timing.form_pause_ms),
            min_body_text_len: config.heuristics.min_body_text_len,
        }
    }
}

/// Executes one check by handing the project to the strategy for its kind
pub struct CheckExecutor {
    http: HttpHeuristicChecker,
    magic_link: MagicLinkChecker,
    credential: CredentialLoginChecker,
}

impl CheckExecutor {
    pub fn new(
        http_timeout: Duration,
        tuning: BrowserTuning,
        fallback_login: Option<Credentials>,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpHeuristicChecker::new(http_timeout)?,
            magic_link: MagicLinkChecker::new(tuning.clone()),
            credential: CredentialLoginChecker::new(tuning, fallback_login),
        })
    }

    pub async fn execute(
        &self,
        project: &Project,
        sessions: Option<&dyn SessionProvider>,
    ) -> CheckResult {
        let checker: &dyn Checker = match project.kind {
            ProjectKind::HttpHeuristic => &self.http,
            ProjectKind::MagicLinkSession => &self.magic_link,
            ProjectKind::CredentialLogin => &self.credential,
        };

        checker.check(project, sessions).await
    }
}
