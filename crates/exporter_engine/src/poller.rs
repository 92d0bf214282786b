//! Completion poller: waits for the newest finished export job whose
//! filename matches the target layout, then downloads and parses it.

use std::time::Duration;

use export_logging::{export_debug, export_info, export_warn};
use exporter_core::{filename_matches_layout, layout_tokens, TabularArtifact};
use tokio::time::Instant;

use crate::artifact::{decode_artifact, parse_artifact};
use crate::cache::ArtifactCache;
use crate::errors::ExportError;
use crate::nav::goto_admin_exports;
use crate::resolver::wait_for_first;
use crate::scope::{Query, TextMatch, UiNode, UiScope};

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
    /// Skip the download when the matched filename equals the cache's
    /// last-recorded one for this layout.
    pub dedup: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(180),
            dedup: true,
        }
    }
}

const ROW_SELECTOR: &str = "table tbody tr";
const HEADER_SELECTOR: &str = "table thead th";

/// Finds the newest complete job for `layout` on the administration export
/// table, downloads its artifact, and parses it. Returns an empty artifact
/// when dedup decides the newest file was already processed.
pub async fn fetch_latest_artifact(
    scope: &dyn UiScope,
    layout: &str,
    cache: &mut ArtifactCache,
    settings: &PollSettings,
) -> Result<TabularArtifact, ExportError> {
    ensure_on_admin_exports(scope).await?;
    disable_auto_refresh(scope).await;
    sort_newest_first(scope).await;

    let file_column = resolve_file_column(scope).await;
    let tokens = layout_tokens(layout);

    let deadline = Instant::now() + settings.deadline;
    let matched = loop {
        if let Some(found) = scan_for_complete(scope, &tokens, file_column).await? {
            break found;
        }
        if Instant::now() >= deadline {
            return Err(ExportError::PollTimeout {
                layout: layout.to_string(),
                deadline: settings.deadline,
            });
        }
        tokio::time::sleep(settings.interval).await;
    };
    let (link, filename) = matched;

    if settings.dedup {
        if cache.last_filename(layout) == Some(filename.as_str()) {
            export_info!("latest file for '{layout}' already processed: {filename}");
            return Ok(TabularArtifact::empty());
        }
        // Advance the cache before downloading; it only ever moves forward.
        if let Err(err) = cache.record(layout, &filename) {
            export_warn!("could not persist artifact cache: {err}");
        }
    }

    let path = scope
        .download(&link)
        .await
        .map_err(|e| ExportError::Download(e.to_string()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ExportError::Download(format!("read {path:?}: {e}")))?;
    let text = decode_artifact(&bytes)?;
    let artifact = parse_artifact(&text)?;
    export_info!(
        "downloaded '{filename}' for '{layout}': {} rows",
        artifact.row_count()
    );
    Ok(artifact)
}

async fn ensure_on_admin_exports(scope: &dyn UiScope) -> Result<(), ExportError> {
    let url = scope.current_url().await?.to_lowercase();
    if url.contains("admin") && url.contains("export") {
        return Ok(());
    }
    goto_admin_exports(scope)
        .await
        .map_err(|e| ExportError::at_stage(exporter_core::WorkflowStage::AdminJobsPage, e))
}

const REFRESH_BANNER: &str = "this page will auto-refresh";

/// Turns off the job list's auto-refresh so row handles stay valid for the
/// whole poll loop. Best-effort: absence of the toggle is fine.
async fn disable_auto_refresh(scope: &dyn UiScope) {
    let banner = Query::Text(TextMatch::contains(REFRESH_BANNER));
    if wait_for_first(scope, &banner, Duration::from_millis(2000))
        .await
        .is_none()
    {
        return;
    }
    // The toggle sits beside the banner text, not inside it. Searching only
    // the banner's container keeps unrelated pressed buttons out of reach.
    let containers = Query::css_with_text(
        "div, section, tr, mat-toolbar",
        TextMatch::contains(REFRESH_BANNER),
    );
    let Ok(containers) = scope.query(&containers).await else {
        return;
    };
    let mut toggle = None;
    for container in containers.iter().filter(|n| n.visible) {
        let Ok(buttons) = scope
            .query_within(container, &Query::css("button[aria-pressed]"))
            .await
        else {
            continue;
        };
        // Document order lists ancestors first; the last hit is the tightest
        // container that still holds a toggle.
        if let Some(found) = buttons.into_iter().find(|n| n.visible) {
            toggle = Some(found);
        }
    }
    let Some(toggle) = toggle else {
        return;
    };
    let pressed = scope.attr(&toggle, "aria-pressed").await.ok().flatten();
    if pressed.as_deref().is_none_or(|v| v.eq_ignore_ascii_case("true")) {
        if scope.click(&toggle).await.is_ok() {
            let _ = scope.settle().await;
        }
    }
}

/// Clicks the "Submit Date" header up to twice for a descending sort.
/// Best-effort, and the resulting order is trusted rather than re-verified
/// against timestamps; an unreliable sort control could surface a stale
/// artifact. Assumption to validate against the real system.
async fn sort_newest_first(scope: &dyn UiScope) {
    let header = Query::css_with_text(HEADER_SELECTOR, TextMatch::exact("Submit Date"));
    for _ in 0..2 {
        let Some(node) = wait_for_first(scope, &header, Duration::from_millis(1500)).await else {
            return;
        };
        if scope.click(&node).await.is_err() {
            return;
        }
        let _ = scope.settle().await;
    }
}

/// Resolves the filename column index once from the header text; `None`
/// falls back to "first link in the row".
async fn resolve_file_column(scope: &dyn UiScope) -> Option<usize> {
    let headers = scope.query(&Query::css(HEADER_SELECTOR)).await.ok()?;
    headers.iter().position(|th| {
        let text = th.text.to_lowercase();
        text.contains("file") && text.contains("data")
    })
}

/// One scan over the visible rows, top to bottom (newest first after the
/// sort): the first row with a complete status and a token-matching filename
/// wins. No reloads happen here; auto-refresh was disabled.
async fn scan_for_complete(
    scope: &dyn UiScope,
    tokens: &[String],
    file_column: Option<usize>,
) -> Result<Option<(UiNode, String)>, ExportError> {
    let rows = scope.query(&Query::css(ROW_SELECTOR)).await?;
    for row in rows {
        if !has_complete_marker(&row.text) {
            continue;
        }
        let link = match file_column {
            Some(idx) => {
                let cells = scope.query_within(&row, &Query::css("td")).await?;
                let Some(cell) = cells.get(idx) else { continue };
                scope.query_within(cell, &Query::css("a")).await?.into_iter().next()
            }
            None => scope.query_within(&row, &Query::css("a")).await?.into_iter().next(),
        };
        let Some(link) = link else { continue };
        let filename = link.text.trim().to_string();
        if filename.is_empty() || !filename_matches_layout(&filename, tokens) {
            export_debug!("row '{filename}' does not match layout tokens");
            continue;
        }
        return Ok(Some((link, filename)));
    }
    Ok(None)
}

/// Word-level "Complete"/"Completed" marker, so "Incomplete" never matches.
fn has_complete_marker(text: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("complete") || word.eq_ignore_ascii_case("completed"))
}
