//! Plain-HTTP heuristic strategy for storefront-style sites.
//!
//! One bounded GET, then five independent markup probes over the body. A
//! probe miss only degrades its component: missing markup is a content
//! anomaly, not an outage. A non-success response is conclusive on its own
//! and short-circuits the body scan entirely.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use super::checker::Checker;
use super::session::SessionProvider;
use super::types::{CheckResult, ComponentResult, Status, elapsed_ms};
use crate::registry::Project;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; VigilMonitor/1.0)";

struct MarkupProbe {
    name: &'static str,
    patterns: &'static [&'static str],
}

/// The five storefront components, each detected by case-insensitive
/// substring patterns against the raw markup
const MARKUP_PROBES: &[MarkupProbe] = &[
    MarkupProbe { name: "Header", patterns: &["<header", "class=\"header", "id=\"header"] },
    MarkupProbe { name: "Navigation", patterns: &["<nav", "class=\"nav", "role=\"navigation"] },
    MarkupProbe { name: "Products", patterns: &["product", "collection", ".product-"] },
    MarkupProbe { name: "Cart", patterns: &["cart", "basket"] },
    MarkupProbe { name: "Footer", patterns: &["<footer", "class=\"footer"] },
];

pub struct HttpHeuristicChecker {
    client: reqwest::Client,
}

impl HttpHeuristicChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    async fn probe(&self, project: &Project, started: Instant) -> CheckResult {
        let response = match self.client.get(&project.url).send().await {
            Ok(response) => response,
            Err(error) => {
                return CheckResult::failed(
                    error.to_string(),
                    vec![ComponentResult::new("Page loads", Status::Down)],
                    elapsed_ms(started),
                );
            }
        };

        let http_status = response.status().as_u16();
        let ok = response.status().is_success();
        let mut components = vec![ComponentResult::new(
            "Page loads",
            if ok { Status::Operational } else { Status::Degraded },
        )];

        if !ok {
            // Conclusive on its own; don't scan a body we know is wrong.
            return CheckResult {
                status: Status::Down,
                response_time_ms: elapsed_ms(started),
                http_status: Some(http_status),
                page_title: None,
                error: None,
                components,
            };
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                return CheckResult::failed(
                    error.to_string(),
                    vec![ComponentResult::new("Page loads", Status::Down)],
                    elapsed_ms(started),
                )
                .with_http_status(Some(http_status));
            }
        };

        components.extend(scan_markup(&body));
        CheckResult::from_components(components, elapsed_ms(started))
            .with_http_status(Some(http_status))
    }
}

#[async_trait]
impl Checker for HttpHeuristicChecker {
    async fn check(
        &self,
        project: &Project,
        _sessions: Option<&dyn SessionProvider>,
    ) -> CheckResult {
        let started = Instant::now();
        self.probe(project, started).await
    }
}

/// Run every markup probe against the body. Output order matches display
/// order; the probes themselves are independent.
fn scan_markup(html: &str) -> Vec<ComponentResult> {
    let html = html.to_lowercase();
    MARKUP_PROBES
        .iter()
        .map(|probe| {
            let hit = probe.patterns.iter().any(|pattern| html.contains(pattern));
            ComponentResult::new(probe.name, if hit { Status::Operational } else { Status::Degraded })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::registry::ProjectKind;

    fn project(url: &str) -> Project {
        Project {
            id: "shop".into(),
            name: "Shop".into(),
            kind: ProjectKind::HttpHeuristic,
            url: url.into(),
            check_page: None,
            alert_email: None,
            alert_webhook: None,
            credentials: None,
            interval_minutes: 15,
        }
    }

    /// Serve one canned HTTP response per connection on a loopback port.
    async fn spawn_fixture(status_line: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    const FULL_MARKUP: &str = concat!(
        "<html><body><header class=\"header\"></header><nav></nav>",
        "<div class=\"product-grid\">product</div><a href=\"/cart\">cart</a>",
        "<footer></footer></body></html>"
    );

    #[test]
    fn scan_markup_degrades_missing_sections() {
        let body = "<html><body><div class=\"product-list\">product</div>\
                    <a href=\"/cart\">Cart</a><footer></footer></body></html>";
        let components = scan_markup(body);
        let by_name: Vec<(&str, Status)> =
            components.iter().map(|c| (c.name.as_str(), c.status)).collect();
        assert_eq!(
            by_name,
            vec![
                ("Header", Status::Degraded),
                ("Navigation", Status::Degraded),
                ("Products", Status::Operational),
                ("Cart", Status::Operational),
                ("Footer", Status::Operational),
            ]
        );
    }

    #[tokio::test]
    async fn healthy_storefront_is_operational() {
        let url = spawn_fixture("HTTP/1.1 200 OK", FULL_MARKUP).await;
        let checker = HttpHeuristicChecker::new(Duration::from_secs(5)).unwrap();

        let result = checker.check(&project(&url), None).await;

        assert_eq!(result.status, Status::Operational);
        assert_eq!(result.http_status, Some(200));
        assert_eq!(result.components.len(), 6);
        assert!(result.components.iter().all(|c| c.status == Status::Operational));
    }

    #[tokio::test]
    async fn partial_markup_degrades_overall() {
        let url = spawn_fixture(
            "HTTP/1.1 200 OK",
            "<div class=\"product\">product</div><span>cart</span><footer></footer>",
        )
        .await;
        let checker = HttpHeuristicChecker::new(Duration::from_secs(5)).unwrap();

        let result = checker.check(&project(&url), None).await;

        assert_eq!(result.status, Status::Degraded);
        let degraded: Vec<&str> = result
            .components
            .iter()
            .filter(|c| c.status == Status::Degraded)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(degraded, vec!["Header", "Navigation"]);
    }

    #[tokio::test]
    async fn non_success_short_circuits_the_body_scan() {
        let url = spawn_fixture("HTTP/1.1 500 Internal Server Error", FULL_MARKUP).await;
        let checker = HttpHeuristicChecker::new(Duration::from_secs(5)).unwrap();

        let result = checker.check(&project(&url), None).await;

        assert_eq!(result.status, Status::Down);
        assert_eq!(result.http_status, Some(500));
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].name, "Page loads");
        assert_eq!(result.components[0].status, Status::Degraded);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_down_with_error() {
        // Port 9 (discard) is not listening; the connection is refused.
        let checker = HttpHeuristicChecker::new(Duration::from_secs(5)).unwrap();

        let result = checker.check(&project("http://127.0.0.1:9"), None).await;

        assert_eq!(result.status, Status::Down);
        assert!(result.error.is_some());
        assert_eq!(result.components.len(), 1);
        assert_eq!(result.components[0].status, Status::Down);
    }
}
