//! Magic-link session strategy.
//!
//! The monitored URL is a pre-authenticated entry link: visiting it logs the
//! session in server-side. The check verifies the link still authenticates,
//! then that the app renders navigation chrome, no platform errors, and (when
//! a check page is configured) actual data rows, all within the same session,
//! since session persistence is part of what is under test.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use super::checker::{BrowserTuning, Checker};
use super::heuristics::{self, EXPIRED_LINK_PHRASES};
use super::session::{Session, SessionProvider, settle};
use super::types::{CheckResult, ComponentResult, Status, elapsed_ms};
use crate::registry::Project;

pub struct MagicLinkChecker {
    tuning: BrowserTuning,
}

impl MagicLinkChecker {
    pub fn new(tuning: BrowserTuning) -> Self {
        Self { tuning }
    }

    async fn inspect(
        &self,
        session: &Session,
        project: &Project,
        started: Instant,
    ) -> Result<CheckResult> {
        // Visiting the magic link logs in and redirects to the app root.
        let http_status = session.goto(&project.url).await?;
        settle(&**session, self.tuning.auth_settle, self.tuning.settle_poll).await;

        let page_ok = matches!(http_status, Some(status) if status < 400);
        let mut components = vec![ComponentResult::new(
            "Page loads",
            if page_ok { Status::Operational } else { Status::Degraded },
        )];

        let body = session.body_text().await.unwrap_or_default();
        if heuristics::match_phrase(&body, EXPIRED_LINK_PHRASES).is_some() {
            // Nothing past the login is interpretable without a valid
            // session; report only the conclusively dead components.
            let components = vec![
                ComponentResult::new("Login", Status::Down)
                    .with_detail("Magic link expired or invalid"),
                ComponentResult::new("App content", Status::Down),
                ComponentResult::new("Data loads", Status::Down),
            ];
            return Ok(CheckResult::failed("Magic link expired", components, elapsed_ms(started))
                .with_http_status(http_status)
                .with_page_title(session.page_title().await.ok().flatten()));
        }
        components.push(ComponentResult::new("Login", Status::Operational));

        // The session survives the redirect, so an in-app page is reachable
        // without re-authenticating.
        if let Some(check_page) = &project.check_page {
            let base = Url::parse(&project.url)
                .with_context(|| format!("invalid project url: {}", project.url))?;
            let check_url = format!("{}{}", base.origin().ascii_serialization(), check_page);
            session.goto(&check_url).await?;
            settle(&**session, self.tuning.page_settle, self.tuning.settle_poll).await;
        }

        let page_title = session.page_title().await.ok().flatten();
        let body = session.body_text().await.unwrap_or_default();

        components.push(heuristics::navigation_component(&**session).await);
        components.push(heuristics::error_scan_component(&body));

        if project.check_page.is_some() {
            components.push(
                heuristics::data_loads_component(&**session, &body, self.tuning.min_body_text_len)
                    .await,
            );
        }

        Ok(CheckResult::from_components(components, elapsed_ms(started))
            .with_http_status(http_status)
            .with_page_title(page_title))
    }
}

#[async_trait]
impl Checker for MagicLinkChecker {
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

        // Single release point for every exit path of the inspection.
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
