//! Orchestrator module - coordinates one full monitoring pass
//!
//! The orchestrator is the core coordinator that:
//! - Fetches the project list fresh from the registry
//! - Runs every project through its strategy, strictly one at a time
//! - Launches the shared browser lazily, only when some project needs it
//! - Dispatches alerts on non-operational results without letting delivery
//!   failures touch the pass
//! - Hands the accumulated results to the snapshot and history store

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::alert::AlertDispatcher;
use crate::monitoring::CheckExecutor;
use crate::monitoring::session::{BrowserLauncher, SessionProvider};
use crate::monitoring::types::Status;
use crate::registry::{Project, ProjectRegistry};
use crate::storage::{ProjectReport, ResultStore};

/// Outcome of one monitoring pass
#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub down: usize,
    pub degraded: usize,
}

impl RunSummary {
    /// Exit signal for the external scheduler: non-zero iff anything is down
    pub fn exit_code(&self) -> i32 {
        if self.down > 0 { 1 } else { 0 }
    }
}

pub struct RunOrchestrator {
    registry: Arc<dyn ProjectRegistry>,
    executor: CheckExecutor,
    launcher: Arc<dyn BrowserLauncher>,
    alerts: Arc<dyn AlertDispatcher>,
    store: ResultStore,
}

impl RunOrchestrator {
    pub fn new(
        registry: Arc<dyn ProjectRegistry>,
        executor: CheckExecutor,
        launcher: Arc<dyn BrowserLauncher>,
        alerts: Arc<dyn AlertDispatcher>,
        store: ResultStore,
    ) -> Self {
        Self { registry, executor, launcher, alerts, store }
    }

    /// Execute one full pass: check every project in registry order, alert
    /// on anything non-operational, persist the snapshot and history.
    pub async fn run(&self) -> Result<RunSummary> {
        let projects = self.registry.fetch_all().await.context("failed to load projects")?;
        info!("Loaded {} project(s) from the registry", projects.len());
        for project in &projects {
            debug!("  {} [{}] {}", project.name, project.kind, project.url);
        }

        let sessions = self.launch_browser_if_needed(&projects).await;

        let mut reports = Vec::with_capacity(projects.len());
        for project in &projects {
            info!("Checking {} [{}]", project.name, project.kind);
            let result = self.executor.execute(project, sessions.as_deref()).await;

            info!("{}: {} ({} ms)", project.name, result.status, result.response_time_ms);
            if let Some(error) = &result.error {
                warn!("  error: {error}");
            }
            for component in &result.components {
                let detail = component
                    .detail
                    .as_ref()
                    .map(|detail| format!(" ({detail})"))
                    .unwrap_or_default();
                info!("  {}: {}{}", component.name, component.status, detail);
            }

            if result.status != Status::Operational {
                if let Err(error) = self.alerts.notify(project, &result).await {
                    warn!("Alert delivery failed for {}: {error:#}", project.name);
                }
            }

            reports.push(ProjectReport::new(project, result));
        }

        if let Some(sessions) = &sessions {
            if let Err(error) = sessions.shutdown().await {
                warn!("Failed to shut down browser: {error:#}");
            }
        }

        let down: Vec<String> = reports
            .iter()
            .filter(|report| report.result.status == Status::Down)
            .map(|report| report.name.clone())
            .collect();
        if !down.is_empty() {
            if let Err(error) = self.alerts.notify_down(&down).await {
                warn!("Down-summary delivery failed: {error:#}");
            }
        }

        self.store.write_snapshot(&reports).context("failed to write snapshot")?;
        self.store.append_history(&reports).context("failed to append history")?;

        let summary = RunSummary {
            total: reports.len(),
            down: down.len(),
            degraded: reports
                .iter()
                .filter(|report| report.result.status == Status::Degraded)
                .count(),
        };
        info!(
            "Run complete: {} checked, {} down, {} degraded",
            summary.total, summary.down, summary.degraded
        );
        Ok(summary)
    }

    /// The browser is expensive: launch it once, and only when some project
    /// actually drives a session. A failed launch degrades those projects to
    /// down results instead of aborting the pass.
    async fn launch_browser_if_needed(
        &self,
        projects: &[Project],
    ) -> Option<Arc<dyn SessionProvider>> {
        if !projects.iter().any(|project| project.kind.needs_browser()) {
            return None;
        }
        match self.launcher.launch().await {
            Ok(provider) => Some(provider),
            Err(error) => {
                warn!("Browser launch failed; session-based checks will report down: {error:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::monitoring::checker::BrowserTuning;
    use crate::monitoring::types::CheckResult;
    use crate::registry::{ProjectKind, RegistryError};

    struct FakeRegistry {
        projects: Vec<Project>,
    }

    #[async_trait]
    impl ProjectRegistry for FakeRegistry {
        async fn fetch_all(&self) -> Result<Vec<Project>, RegistryError> {
            Ok(self.projects.clone())
        }
    }

    #[derive(Default)]
    struct RecordingAlerts {
        notified: Mutex<Vec<String>>,
        down_summaries: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AlertDispatcher for RecordingAlerts {
        async fn notify(&self, project: &Project, _result: &CheckResult) -> Result<()> {
            self.notified.lock().unwrap().push(project.id.clone());
            Ok(())
        }

        async fn notify_down(&self, names: &[String]) -> Result<()> {
            self.down_summaries.lock().unwrap().push(names.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingLauncher {
        launches: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(&self) -> Result<Arc<dyn SessionProvider>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("no browser in tests"))
        }
    }

    fn tuning() -> BrowserTuning {
        BrowserTuning {
            auth_settle: Duration::from_millis(20),
            page_settle: Duration::from_millis(10),
            settle_poll: Duration::from_millis(5),
            form_pause: Duration::from_millis(1),
            min_body_text_len: 20,
        }
    }

    fn http_project(id: &str, url: &str) -> Project {
        Project {
            id: id.into(),
            name: id.into(),
            kind: ProjectKind::HttpHeuristic,
            url: url.into(),
            check_page: None,
            alert_email: Some("ops@example.com".into()),
            alert_webhook: None,
            credentials: None,
            interval_minutes: 15,
        }
    }

    const HEALTHY_BODY: &str = concat!(
        "<header class=\"header\"></header><nav></nav>",
        "<div>product</div><a>cart</a><footer></footer>"
    );

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

    #[tokio::test]
    async fn alerts_once_and_signals_failure_when_one_project_is_down() {
        let healthy_a = spawn_fixture("HTTP/1.1 200 OK", HEALTHY_BODY).await;
        let healthy_b = spawn_fixture("HTTP/1.1 200 OK", HEALTHY_BODY).await;

        let registry = Arc::new(FakeRegistry {
            projects: vec![
                http_project("a", &healthy_a),
                // Port 9 (discard) is not listening; connection refused.
                http_project("broken", "http://127.0.0.1:9"),
                http_project("b", &healthy_b),
            ],
        });
        let alerts = Arc::new(RecordingAlerts::default());
        let launcher = Arc::new(CountingLauncher::default());
        let dir = tempdir().unwrap();
        let store = ResultStore::new(dir.path(), 10);
        let executor =
            CheckExecutor::new(Duration::from_secs(5), tuning(), None).unwrap();

        let orchestrator = RunOrchestrator::new(
            registry,
            executor,
            Arc::clone(&launcher) as Arc<dyn BrowserLauncher>,
            Arc::clone(&alerts) as Arc<dyn AlertDispatcher>,
            store,
        );
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.down, 1);
        assert_eq!(summary.exit_code(), 1);

        // Exactly one per-project alert, for the broken project.
        assert_eq!(*alerts.notified.lock().unwrap(), vec!["broken".to_string()]);
        assert_eq!(
            *alerts.down_summaries.lock().unwrap(),
            vec![vec!["broken".to_string()]]
        );

        // No session-based projects, so the browser never launched.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);

        // Both artifacts were written.
        assert!(dir.path().join("status.json").exists());
        assert!(dir.path().join("history.json").exists());
    }

    #[tokio::test]
    async fn all_operational_exits_cleanly() {
        let healthy = spawn_fixture("HTTP/1.1 200 OK", HEALTHY_BODY).await;

        let registry =
            Arc::new(FakeRegistry { projects: vec![http_project("only", &healthy)] });
        let alerts = Arc::new(RecordingAlerts::default());
        let launcher = Arc::new(CountingLauncher::default());
        let dir = tempdir().unwrap();
        let executor =
            CheckExecutor::new(Duration::from_secs(5), tuning(), None).unwrap();

        let orchestrator = RunOrchestrator::new(
            registry,
            executor,
            launcher,
            Arc::clone(&alerts) as Arc<dyn AlertDispatcher>,
            ResultStore::new(dir.path(), 10),
        );
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(summary.exit_code(), 0);
        assert!(alerts.notified.lock().unwrap().is_empty());
        assert!(alerts.down_summaries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_browser_launch_downs_session_projects_only() {
        let healthy = spawn_fixture("HTTP/1.1 200 OK", HEALTHY_BODY).await;

        let mut portal = http_project("portal", "https://portal.example.com/magic");
        portal.kind = ProjectKind::MagicLinkSession;

        let registry = Arc::new(FakeRegistry {
            projects: vec![http_project("shop", &healthy), portal],
        });
        let alerts = Arc::new(RecordingAlerts::default());
        let launcher = Arc::new(CountingLauncher::default());
        let dir = tempdir().unwrap();
        let executor =
            CheckExecutor::new(Duration::from_secs(5), tuning(), None).unwrap();

        let orchestrator = RunOrchestrator::new(
            registry,
            executor,
            Arc::clone(&launcher) as Arc<dyn BrowserLauncher>,
            Arc::clone(&alerts) as Arc<dyn AlertDispatcher>,
            ResultStore::new(dir.path(), 10),
        );
        let summary = orchestrator.run().await.unwrap();

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(summary.down, 1);
        assert_eq!(*alerts.notified.lock().unwrap(), vec!["portal".to_string()]);
    }
}
