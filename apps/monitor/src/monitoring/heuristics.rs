//! Page-content heuristics shared by the session-based strategies.
//!
//! The phrase lists, selectors and thresholds are environment-tuned: they
//! encode what broken pages actually render, not a formal contract. Keep them
//! in one place so retuning them is a constant edit, not a code change.

use crate::monitoring::session::PageSession;
use crate::monitoring::types::{ComponentResult, Status};

/// Phrases a dead magic link renders instead of logging in
pub const EXPIRED_LINK_PHRASES: &[&str] =
    &["magic link is no longer valid", "link has expired", "invalid link"];

/// Failure messages the app platform renders in-page
pub const ERROR_PHRASES: &[&str] = &[
    "invalid permissions",
    "database is missing",
    "something went wrong",
    "database connection",
    "access denied",
];

/// Rejected-credential messages on a login form
pub const LOGIN_REJECTED_PHRASES: &[&str] = &[
    "invalid password",
    "incorrect password",
    "wrong password",
    "login failed",
    "invalid credentials",
    "incorrect email",
];

/// Path fragments that mean the browser is still on a login route
pub const LOGIN_ROUTE_MARKERS: &[&str] = &["/login", "/signin", "/sign-in", "/auth"];

/// Navigation chrome, in any of the shapes page builders emit
pub const NAV_SELECTOR: &str = r#"nav, header, [class*="nav"], [class*="header"], [class*="menu"]"#;

/// Structural shapes a populated data view renders rows in
pub const ROW_SELECTORS: &[&str] = &[
    "table tbody tr",
    "table tr + tr",
    r#"[class*="list-item"]"#,
    r#"[class*="record-row"]"#,
    r#"[class*="sf-list"] > *"#,
    r#"[class*="records"] > *"#,
    r#"[class*="table-row"]"#,
    r#"[class*="grid-row"]"#,
    r#"[class*="data-row"]"#,
    "tbody tr",
];

/// First plain-text input on a login form, assumed to take the email
pub const EMAIL_INPUT_SELECTOR: &str = r#"input[type="email"], input[type="text"]"#;

/// First password input on a login form
pub const PASSWORD_INPUT_SELECTOR: &str = r#"input[type="password"]"#;

/// Case-insensitive containment against a phrase list; returns the matched
/// phrase.
pub fn match_phrase<'a>(text: &str, phrases: &[&'a str]) -> Option<&'a str> {
    let text = text.to_lowercase();
    phrases.iter().copied().find(|phrase| text.contains(phrase))
}

/// "Navigation" component: present iff any nav-chrome element matches
pub async fn navigation_component(session: &dyn PageSession) -> ComponentResult {
    let count = session.count_elements(NAV_SELECTOR).await.unwrap_or(0);
    let status = if count > 0 { Status::Operational } else { Status::Degraded };
    ComponentResult::new("Navigation", status)
}

/// "No errors" component: down with the offending phrase when the body shows
/// a known failure message
pub fn error_scan_component(body: &str) -> ComponentResult {
    match match_phrase(body, ERROR_PHRASES) {
        Some(phrase) => ComponentResult::new("No errors", Status::Down).with_detail(phrase),
        None => ComponentResult::new("No errors", Status::Operational),
    }
}

/// "Data loads" component: structural row count, with body-text volume as the
/// weaker fallback signal of content being present
pub async fn data_loads_component(
    session: &dyn PageSession,
    body: &str,
    min_body_text_len: usize,
) -> ComponentResult {
    let selector = ROW_SELECTORS.join(", ");
    let rows = session.count_elements(&selector).await.unwrap_or(0);

    if rows > 0 {
        ComponentResult::new("Data loads", Status::Operational)
            .with_detail(format!("{rows} record(s) found"))
    } else if body.len() > min_body_text_len {
        ComponentResult::new("Data loads", Status::Operational).with_detail("No rows detected")
    } else {
        ComponentResult::new("Data loads", Status::Down).with_detail("No rows detected")
    }
}
