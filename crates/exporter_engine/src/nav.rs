//! Navigation primitives: idempotent UI steps shared by every transition.
//!
//! Each step is "attempt primary action, then each fallback in order"; the
//! idempotent primitives (`expand_section`, `ensure_checkbox_checked`) check
//! observable state before clicking, so a retried workflow never undoes
//! progress it already made.

use std::time::Duration;

use export_logging::export_debug;

use crate::errors::{NotFound, StepError};
use crate::resolver::{resolve, wait_for_first, Candidate};
use crate::scope::{Query, TextMatch, UiNode, UiScope};

/// Fixed scroll step and attempt bound for revealing off-screen labels.
const SCROLL_STEP: i64 = 300;
const MAX_SCROLL_STEPS: usize = 20;

/// Containers that may hold a collapsible filter section.
const SECTION_CONTAINERS: &str = "section,div,aside";

/// Expands a collapsible section if it is currently collapsed. Never toggles
/// a section closed: a second invocation on an expanded section is a no-op.
/// Missing sections are tolerated; the caller decides how hard to fail.
pub async fn expand_section(scope: &dyn UiScope, title: &str) -> Result<(), StepError> {
    // Preferred: the header is a real button carrying aria-expanded.
    if let Some(header) = wait_for_first(
        scope,
        &Query::role("button", TextMatch::exact(title)),
        Duration::from_millis(1200),
    )
    .await
    {
        let expanded = scope.attr(&header, "aria-expanded").await?;
        if expanded.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("false")) {
            scope.click(&header).await?;
            scope.settle().await?;
        }
        return Ok(());
    }

    // Structural fallback: an expansion-panel header marked with a class.
    if let Some(header) = wait_for_first(
        scope,
        &Query::css_with_text(".mat-expansion-panel-header", TextMatch::exact(title)),
        Duration::from_millis(1200),
    )
    .await
    {
        let classes = scope.attr(&header, "class").await?.unwrap_or_default();
        if !classes.contains("mat-expanded") {
            scope.click(&header).await?;
        }
        return Ok(());
    }

    export_debug!("section '{title}' not found; leaving as-is");
    Ok(())
}

/// Checks a checkbox identified by its label, clicking only when it is
/// currently unchecked. A second invocation on a checked item is a no-op.
pub async fn ensure_checkbox_checked(
    scope: &dyn UiScope,
    label: &TextMatch,
) -> Result<(), StepError> {
    // Component host first: its class carries the checked state.
    if let Some(host) = scope
        .query(&Query::css_with_text("mat-checkbox", label.clone()))
        .await?
        .into_iter()
        .next()
    {
        let classes = scope.attr(&host, "class").await?.unwrap_or_default();
        if classes.contains("mat-checkbox-checked") {
            return Ok(());
        }
        for inner in [".mat-checkbox-inner-container", "label", ".mat-checkbox-layout"] {
            if let Some(target) = scope
                .query_within(&host, &Query::css(inner))
                .await?
                .into_iter()
                .next()
            {
                scope.click(&target).await?;
                return Ok(());
            }
        }
        scope.click(&host).await?;
        return Ok(());
    }

    // Plain labeled input.
    if let Some(input) = scope
        .query(&Query::LabeledInput(label.clone()))
        .await?
        .into_iter()
        .next()
    {
        let checked = scope.attr(&input, "checked").await?;
        if checked.is_none() {
            scope.click(&input).await?;
        }
        return Ok(());
    }

    // Last resort: click the visible label text itself.
    if let Some(text_node) = scope
        .query(&Query::Text(label.clone()))
        .await?
        .into_iter()
        .next()
    {
        scope.click(&text_node).await?;
        return Ok(());
    }

    Err(NotFound::new(format!("checkbox '{}'", label.needle())).into())
}

/// Clicks a shortcut link ("all" / "none") inside the titled filter section.
/// Falls back to a scope-wide search when the section container cannot be
/// isolated. Returns whether anything was clicked.
pub async fn click_link_in_section(
    scope: &dyn UiScope,
    section_title: &str,
    link_text: &TextMatch,
) -> Result<bool, StepError> {
    let section = scope
        .query(&Query::css_with_text(
            SECTION_CONTAINERS,
            TextMatch::contains(section_title),
        ))
        .await?
        .into_iter()
        .next();

    let link_queries = [
        Query::role("link", link_text.clone()),
        Query::Text(link_text.clone()),
    ];
    for query in &link_queries {
        let found = match &section {
            Some(container) => scope.query_within(container, query).await?,
            None => scope.query(query).await?,
        };
        if let Some(link) = found.into_iter().find(|n| n.visible) {
            scope.click(&link).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

/// Scrolls the content container in bounded increments until an element whose
/// text matches becomes visible. Returns the node, or `None` after the fixed
/// attempt budget.
pub async fn scroll_until_visible(
    scope: &dyn UiScope,
    target: &TextMatch,
) -> Result<Option<UiNode>, StepError> {
    for _ in 0..MAX_SCROLL_STEPS {
        let nodes = scope.query(&Query::Text(target.clone())).await?;
        if let Some(node) = nodes.into_iter().find(|n| n.visible) {
            return Ok(Some(node));
        }
        scope.scroll_container(SCROLL_STEP).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(None)
}

/// Finds the document context holding the filter panel: the page itself, or
/// the first embedded frame that shows the "Grad. Year" marker. Returns
/// `None` when the page scope should be used directly.
pub async fn find_filters_scope(
    root: &dyn UiScope,
) -> Result<Option<Box<dyn UiScope>>, StepError> {
    let marker = Query::Text(TextMatch::exact("Grad. Year"));
    if wait_for_first(root, &marker, Duration::from_millis(1200))
        .await
        .is_some()
    {
        return Ok(None);
    }
    for frame in root.frames().await? {
        if wait_for_first(frame.as_ref(), &marker, Duration::from_millis(800))
            .await
            .is_some()
        {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

/// From the dashboard, opens the left-rail "Recruiting" entry and its
/// "Recruits" flyout item, landing on the entity list.
pub async fn open_entity_list(scope: &dyn UiScope) -> Result<(), StepError> {
    // Some tenants hide the left drawer behind a chevron; open it if present.
    if let Some(chevron) = wait_for_first(
        scope,
        &Query::css_with_text("button, [role='button']", TextMatch::exact("Open Menu")),
        Duration::from_millis(800),
    )
    .await
    {
        if scope.click(&chevron).await.is_err() {
            export_debug!("nav chevron did not accept a click; continuing");
        }
    }

    let recruiting = resolve(
        scope,
        "'Recruiting' in left navigation",
        &[
            Candidate::millis(Query::role("link", TextMatch::exact("Recruiting")), 3000),
            Candidate::millis(Query::role("button", TextMatch::exact("Recruiting")), 1500),
            Candidate::millis(
                Query::css_with_text("nav,aside", TextMatch::exact("Recruiting")),
                1000,
            ),
            // Icon-only entry on narrow skins.
            Candidate::millis(
                Query::css("nav svg use[href*='recruiting-icon'], nav svg use[xlink\\:href*='recruiting-icon']"),
                1000,
            ),
        ],
    )
    .await?;
    scope.click(&recruiting).await?;

    let recruits = resolve(
        scope,
        "'Recruits' in flyout",
        &[
            Candidate::millis(Query::role("link", TextMatch::exact("Recruits")), 4000),
            Candidate::millis(Query::role("menuitem", TextMatch::exact("Recruits")), 2000),
            Candidate::millis(Query::Text(TextMatch::exact("Recruits")), 2000),
        ],
    )
    .await?;
    scope.click(&recruits).await?;
    scope.settle().await?;
    Ok(())
}

/// Navigates Administration, then Exports. Used by the kickoff fallback path and
/// by the poller when the post-submit prompt did not land there already.
pub async fn goto_admin_exports(scope: &dyn UiScope) -> Result<(), StepError> {
    for (target, label) in [("Administration", "Administration"), ("Exports", "Exports")] {
        let node = resolve(
            scope,
            target,
            &[
                Candidate::millis(Query::role("link", TextMatch::contains(label)), 3000),
                Candidate::millis(Query::Text(TextMatch::exact(label)), 3000),
            ],
        )
        .await?;
        scope.click(&node).await?;
        scope.settle().await?;
    }
    Ok(())
}

/// Dismisses a leftover modal from a prior spec, if one is open. Best-effort.
pub async fn dismiss_stray_modal(scope: &dyn UiScope) {
    if let Some(cancel) = wait_for_first(
        scope,
        &Query::role("button", TextMatch::exact("Cancel")),
        Duration::from_millis(800),
    )
    .await
    {
        if scope.click(&cancel).await.is_ok() {
            let _ = scope.settle().await;
        }
    }
}
