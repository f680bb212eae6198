/// Health-verification engine.
///
/// This module is responsible for:
/// - Executing the type-specific check strategies (HTTP heuristic,
///   magic-link session, credential login)
/// - Managing isolated browser sessions with guaranteed release
/// - Folding per-component findings into one overall status
pub mod browser;
pub mod checker;
pub mod credential;
pub mod heuristics;
pub mod http;
pub mod magic_link;
pub mod session;
pub mod types;

pub use checker::{BrowserTuning, CheckExecutor};
pub use types::{CheckResult, ComponentResult, Status, aggregate};
