//! Credential-login strategy.
//!
//! Navigates to the login page, authenticates through the form with real
//! credentials, and verifies the authenticated app the same way the
//! magic-link strategy does. A rejected login is conclusive: the remaining
//! checks would only describe the login page itself.

use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;

use super::checker::{BrowserTuning, Checker};
use super::heuristics::{
    self, EMAIL_INPUT_SELECTOR, LOGIN_REJECTED_PHRASES, LOGIN_ROUTE_MARKERS,
    PASSWORD_INPUT_SELECTOR,
};
use super::session::{Session, SessionProvider, settle};
use super::types::{CheckResult, ComponentResult, Status, elapsed_ms};
use crate::registry::{Credentials, Project};

pub struct CredentialLoginChecker {
    tuning: BrowserTuning,
    /// Instance-wide default login, used when a project has none of its own
    fallback_login: Option<Credentials>,
}

impl CredentialLoginChecker {
    pub fn new(tuning: BrowserTuning, fallback_login: Option<Credentials>) -> Self {
        Self { tuning, fallback_login }
    }

    async fn inspect(
        &self,
        session: &Session,
        project: &Project,
        started: Instant,
    ) -> Result<CheckResult> {
        let http_status = session.goto(&project.url).await?;
        settle(&**session, self.tuning.page_settle, self.tuning.settle_poll).await;

        let page_ok = matches!(http_status, Some(status) if status < 400);
        if !page_ok {
            return Ok(CheckResult {
                status: Status::Down,
                response_time_ms: elapsed_ms(started),
                http_status,
                page_title: session.page_title().await.ok().flatten(),
                error: None,
                components: vec![ComponentResult::new("Page loads", Status::Degraded)],
            });
        }
        let mut components = vec![ComponentResult::new("Page loads", Status::Operational)];

        match project.credentials.as_ref().or(self.fallback_login.as_ref()) {
            None => {
                // Still worth knowing whether the public shell renders.
                components.push(
                    ComponentResult::new("Login", Status::Degraded)
                        .with_detail("No credentials configured"),
                );
            }
            Some(credentials) => {
                self.log_in(session, credentials).await?;
                settle(&**session, self.tuning.auth_settle, self.tuning.settle_poll).await;

                let url = session.current_url().await.unwrap_or_default();
                let body = session.body_text().await.unwrap_or_default();
                let still_on_login =
                    heuristics::match_phrase(&url, LOGIN_ROUTE_MARKERS).is_some();
                let rejected =
                    heuristics::match_phrase(&body, LOGIN_REJECTED_PHRASES).is_some();

                if still_on_login || rejected {
                    let detail = if still_on_login {
                        "Still on login page"
                    } else {
                        "Credentials rejected"
                    };
                    components.push(
                        ComponentResult::new("Login", Status::Down).with_detail(detail),
                    );
                    return Ok(CheckResult::from_components(components, elapsed_ms(started))
                        .with_http_status(http_status)
                        .with_page_title(session.page_title().await.ok().flatten()));
                }
                components.push(ComponentResult::new("Login", Status::Operational));
            }
        }

        let body = session.body_text().await.unwrap_or_default();
        components.push(heuristics::navigation_component(&**session).await);
        components.push(heuristics::error_scan_component(&body));

        Ok(CheckResult::from_components(components, elapsed_ms(started))
            .with_http_status(http_status)
            .with_page_title(session.page_title().await.ok().flatten()))
    }

    /// Fill the first text and password inputs with short pauses between
    /// steps; reactive forms re-render while we type.
    async fn log_in(&self, session: &Session, credentials: &Credentials) -> Result<()> {
        session.type_into(EMAIL_INPUT_SELECTOR, &credentials.email).await?;
        tokio::time::sleep(self.tuning.form_pause).await;
        session.type_into(PASSWORD_INPUT_SELECTOR, &credentials.password).await?;
        tokio::time::sleep(self.tuning.form_pause).await;
        session.press_key(PASSWORD_INPUT_SELECTOR, "Enter").await?;
        Ok(())
    }
}

#[async_trait]
impl Checker for CredentialLoginChecker {
    async fn check(
        &self,
        project: &Project,
        sessions: Option<&dyn SessionProvider>,
    ) -> CheckResult {
        let started = Instant::now();

        let Some(sessions) = sessions else {
            return CheckResult::failed(
                "No browser session available",
                vec![ComponentResult::new("Page loads", Status::Down)],
                elapsed_ms(started),
            );
        };

        let session = match sessions.open().await {
            Ok(session) => session,
            Err(error) => {
                return CheckResult::failed(
                    format!("{error:#}"),
                    vec![ComponentResult::new("Page loads", Status::Down)],
                    elapsed_ms(started),
                );
            }
        };

        let outcome = self.inspect(&session, project, started).await;
        session.release().await;

        outcome.unwrap_or_else(|error| {
            CheckResult::failed(
                format!("{error:#}"),
                vec![ComponentResult::new("Page loads", Status::Down)],
                elapsed_ms(started),
            )
        })
    }
}
