//! Outbound alert delivery.
//!
//! Alerts are fire-and-forget at the orchestrator boundary: delivery failures
//! are logged and swallowed, so a broken mail API can never affect the pass's
//! results, history, or exit signal.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::monitoring::types::{CheckResult, Status};
use crate::registry::Project;

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Per-project alert for a non-operational result
    async fn notify(&self, project: &Project, result: &CheckResult) -> Result<()>;

    /// Run-level summary, sent once when any project is down
    async fn notify_down(&self, names: &[String]) -> Result<()>;
}

/// Dispatcher delivering through a SendGrid-style mail API and a
/// Slack-style webhook
pub struct HttpAlertDispatcher {
    client: reqwest::Client,
    mail_endpoint: String,
    mail_api_key: Option<String>,
    from_email: String,
    default_webhook: Option<String>,
}

impl HttpAlertDispatcher {
    pub fn new(
        mail_endpoint: String,
        mail_api_key: Option<String>,
        from_email: String,
        default_webhook: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, mail_endpoint, mail_api_key, from_email, default_webhook })
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let Some(api_key) = &self.mail_api_key else {
            debug!("No mail API key configured; skipping email alert");
            return Ok(());
        };

        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_email },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let response = self
            .client
            .post(&self.mail_endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("mail API request failed")?;

        if !response.status().is_success() {
            bail!("mail API returned status {}", response.status());
        }
        Ok(())
    }

    async fn post_webhook(&self, url: &str, text: String) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("webhook request failed")?;

        if !response.status().is_success() {
            bail!("webhook returned status {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl AlertDispatcher for HttpAlertDispatcher {
    async fn notify(&self, project: &Project, result: &CheckResult) -> Result<()> {
        let subject = alert_subject(project, result);
        let body = alert_body(project, result);

        // Both channels are attempted; the first failure is reported after.
        let mut first_error = None;

        if let Some(to) = &project.alert_email {
            if let Err(error) = self.send_email(to, &subject, &body).await {
                first_error.get_or_insert(error);
            }
        }

        if let Some(webhook) = project.alert_webhook.as_ref().or(self.default_webhook.as_ref()) {
            let text = format!("*{subject}*\n{}", project.url);
            if let Err(error) = self.post_webhook(webhook, text).await {
                first_error.get_or_insert(error);
            }
        }

        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    async fn notify_down(&self, names: &[String]) -> Result<()> {
        let Some(webhook) = &self.default_webhook else {
            return Ok(());
        };
        let lines: Vec<String> = names.iter().map(|name| format!("- *{name}* is DOWN")).collect();
        self.post_webhook(webhook, format!("*Health Alert*\n{}", lines.join("\n"))).await
    }
}

fn alert_subject(project: &Project, result: &CheckResult) -> String {
    format!("{} is {}", project.name, result.status.to_string().to_uppercase())
}

fn alert_body(project: &Project, result: &CheckResult) -> String {
    let mut body = format!(
        "{} is {}\nURL: {}\nResponse: {}ms\n",
        project.name,
        result.status.to_string().to_uppercase(),
        project.url,
        result.response_time_ms,
    );

    let failed: Vec<_> =
        result.components.iter().filter(|c| c.status != Status::Operational).collect();
    if !failed.is_empty() {
        body.push_str("Failed components:\n");
        for component in failed {
            body.push_str(&format!("  - {}: {}", component.name, component.status));
            if let Some(detail) = &component.detail {
                body.push_str(&format!(" ({detail})"));
            }
            body.push('\n');
        }
    }

    if let Some(error) = &result.error {
        body.push_str(&format!("Error: {error}\n"));
    }
    body.push_str(&format!("Checked: {}", Utc::now().to_rfc2822()));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ComponentResult;
    use crate::registry::ProjectKind;

    fn project() -> Project {
        Project {
            id: "shop".into(),
            name: "Shop".into(),
            kind: ProjectKind::HttpHeuristic,
            url: "https://shop.example".into(),
            check_page: None,
            alert_email: Some("ops@example.com".into()),
            alert_webhook: None,
            credentials: None,
            interval_minutes: 15,
        }
    }

    #[test]
    fn subject_includes_uppercased_status() {
        let result = CheckResult::failed("boom", vec![], 10);
        assert_eq!(alert_subject(&project(), &result), "Shop is DOWN");
    }

    #[test]
    fn body_lists_only_failed_components() {
        let result = CheckResult::from_components(
            vec![
                ComponentResult::new("Page loads", Status::Operational),
                ComponentResult::new("Header", Status::Degraded),
                ComponentResult::new("No errors", Status::Down).with_detail("access denied"),
            ],
            42,
        );

        let body = alert_body(&project(), &result);
        assert!(body.contains("Shop is DOWN"));
        assert!(body.contains("Response: 42ms"));
        assert!(body.contains("  - Header: degraded"));
        assert!(body.contains("  - No errors: down (access denied)"));
        assert!(!body.contains("Page loads"));
    }

    #[test]
    fn body_carries_the_error_message() {
        let result = CheckResult::failed("connection refused", vec![], 5);
        let body = alert_body(&project(), &result);
        assert!(body.contains("Error: connection refused"));
    }
}
