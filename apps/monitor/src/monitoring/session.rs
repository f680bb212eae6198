//! Browser session seams.
//!
//! Strategies never talk to a browser directly: each invocation receives a
//! [`SessionProvider`] and drives the page through the [`PageSession`] trait,
//! so tests can substitute scripted fakes and the orchestrator decides when a
//! real browser is worth launching.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

/// One isolated page context (fresh cookies/storage), discarded after a check
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate and return the main document's HTTP status when observable
    async fn goto(&self, url: &str) -> Result<Option<u16>>;

    async fn page_title(&self) -> Result<Option<String>>;

    /// Visible text of the page body; empty when no body has rendered
    async fn body_text(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Number of elements matching a CSS selector group
    async fn count_elements(&self, selector: &str) -> Result<usize>;

    /// Click the first match and type into it
    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;

    /// Press a key in the first match (e.g. Enter to submit a form)
    async fn press_key(&self, selector: &str, key: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Hands out isolated sessions from one shared browser process
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self) -> Result<Session>;

    /// Tear down the shared browser once the whole run is over
    async fn shutdown(&self) -> Result<()>;
}

/// Launches the shared browser process, at most once per run
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn SessionProvider>>;
}

/// Scoped session handle.
///
/// Every acquisition must end in [`Session::release`]; strategies route all
/// exit paths (normal return, short-circuit, error) through a single release
/// point so a failing project can never leak a session.
pub struct Session {
    page: Box<dyn PageSession>,
}

impl Session {
    pub fn new(page: Box<dyn PageSession>) -> Self {
        Self { page }
    }

    /// Close the underlying page context. Failures are logged, not returned:
    /// release also runs on error paths where a second failure has nowhere
    /// to go.
    pub async fn release(self) {
        if let Err(error) = self.page.close().await {
            warn!("Failed to release browser session: {error:#}");
        }
    }
}

impl Deref for Session {
    type Target = dyn PageSession;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

/// Wait for a page to settle after a navigation.
///
/// Polls the body text and returns as soon as two consecutive reads have the
/// same non-zero length; `budget` is the unconditional upper bound, so the
/// worst case behaves like the fixed delay it replaces.
pub async fn settle(session: &dyn PageSession, budget: Duration, poll: Duration) {
    let started = Instant::now();
    let mut last_len: Option<usize> = None;

    while started.elapsed() < budget {
        let remaining = budget.saturating_sub(started.elapsed());
        tokio::time::sleep(poll.min(remaining)).await;

        let len = match session.body_text().await {
            Ok(text) => text.len(),
            Err(_) => continue,
        };
        if len > 0 && last_len == Some(len) {
            return;
        }
        last_len = Some(len);
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use super::testing::{ScriptState, ScriptedSession};
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn settle_returns_once_body_is_stable() {
        let state = Arc::new(ScriptState::default());
        {
            let mut bodies = state.bodies.lock().unwrap();
            bodies.push_back("a".into());
            bodies.push_back("ab".into());
            bodies.push_back("loaded".into());
            // last entry repeats: stable from here on
        }
        let session = ScriptedSession { state };

        let started = Instant::now();
        settle(&session, Duration::from_secs(8), Duration::from_millis(500)).await;

        // Four polls (a, ab, loaded, loaded), well before the full budget.
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_falls_back_to_the_full_budget() {
        let state = Arc::new(ScriptState::default());
        // Body never renders: every read is empty, which never counts as
        // stable.
        let session = ScriptedSession { state };

        let started = Instant::now();
        settle(&session, Duration::from_secs(2), Duration::from_millis(500)).await;

        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn release_closes_the_page() {
        let state = Arc::new(ScriptState::default());
        let session = Session::new(Box::new(ScriptedSession { state: Arc::clone(&state) }));

        session.release().await;

        assert!(state.closed.load(Ordering::SeqCst));
    }
}
