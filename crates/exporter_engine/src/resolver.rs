use std::time::Duration;

use export_logging::export_debug;
use tokio::time::Instant;

use crate::errors::NotFound;
use crate::scope::{Query, UiNode, UiScope};

/// How often a strategy re-runs its query while waiting for its timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One prioritized way to locate a semantic target, bounded by its own wait.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub query: Query,
    pub timeout: Duration,
}

impl Candidate {
    pub fn new(query: Query, timeout: Duration) -> Self {
        Self { query, timeout }
    }

    pub fn millis(query: Query, millis: u64) -> Self {
        Self::new(query, Duration::from_millis(millis))
    }
}

/// Tries each candidate in priority order and returns the first that resolves
/// to exactly one visible, actionable element within its budget.
///
/// The ordering callers pass is deliberate: role/name and attribute hooks
/// survive restyling, so text and structural selectors come last. The
/// resolver never mutates the page; the caller applies the action.
pub async fn resolve(
    scope: &dyn UiScope,
    target: &str,
    candidates: &[Candidate],
) -> Result<UiNode, NotFound> {
    for candidate in candidates {
        let deadline = Instant::now() + candidate.timeout;
        loop {
            match scope.query(&candidate.query).await {
                Ok(nodes) => {
                    let mut visible: Vec<UiNode> =
                        nodes.into_iter().filter(|n| n.visible).collect();
                    if visible.len() == 1 {
                        return Ok(visible.remove(0));
                    }
                    if visible.len() > 1 {
                        export_debug!(
                            "'{target}': {} ambiguous matches for {}",
                            visible.len(),
                            candidate.query
                        );
                    }
                }
                Err(err) => {
                    export_debug!("'{target}': query {} failed: {err}", candidate.query);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
    Err(NotFound::new(target))
}

/// Waits until `query` yields at least one visible node and returns the last
/// one, for surfaces where the newest overlay wins (stacked menu panes).
pub(crate) async fn wait_for_last(
    scope: &dyn UiScope,
    query: &Query,
    timeout: Duration,
) -> Option<UiNode> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(nodes) = scope.query(query).await {
            if let Some(node) = nodes.into_iter().filter(|n| n.visible).next_back() {
                return Some(node);
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Waits for the first visible node matching `query`, best-effort.
pub(crate) async fn wait_for_first(
    scope: &dyn UiScope,
    query: &Query,
    timeout: Duration,
) -> Option<UiNode> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(nodes) = scope.query(query).await {
            if let Some(node) = nodes.into_iter().find(|n| n.visible) {
                return Some(node);
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
