//! Dual-path export kickoff: the contextual toolbar menu first, the
//! administration panel as the automatic fallback. Both are strategies for
//! one logical operation, "start an export job for layout L"; the first to
//! succeed wins, so the primary path is allowed to fail non-fatally.

use std::time::Duration;

use export_logging::{export_debug, export_warn};

use crate::errors::ExportError;
use crate::resolver::{resolve, wait_for_first, wait_for_last, Candidate};
use crate::scope::{Query, TextMatch, UiNode, UiScope};

/// How the export job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickoffPath {
    Primary,
    AdminFallback,
}

/// Menus can lose state in headless runs; the open-and-click sequence is
/// retried this many times before the primary path gives up.
const MENU_ATTEMPTS: usize = 3;

/// Toolbar triggers that may be the kebab/hamburger menu.
const TRIGGER_SELECTORS: &str = "button[aria-haspopup='menu'], \
     button[aria-label*='menu' i], \
     button[title*='menu' i], \
     div[role='toolbar'] button, \
     header button";

/// The icon itself is labeled on some skins; target its host button.
const BULK_ICON_BUTTON: &str = "button:has(mat-icon[aria-label*='Bulk Update Menu' i])";

/// Overlay surface that hosts the opened menu.
const MENU_SURFACE: &str = ".cdk-overlay-pane:has(.mat-menu-content), [role='menu']";

/// Offscreen guard for the trigger heuristic: candidates rendered below this
/// are detached leftovers, not the toolbar.
const ONSCREEN_Y_BOUND: f64 = 4000.0;

/// Starts an export job for `layout`, trying the toolbar-menu path and
/// falling back to the administration panel when it raises. Fallback failure
/// is fatal to the current spec only.
pub async fn start_export(scope: &dyn UiScope, layout: &str) -> Result<KickoffPath, ExportError> {
    match start_from_toolbar(scope, layout).await {
        Ok(()) => {
            maybe_follow_exports_prompt(scope).await;
            Ok(KickoffPath::Primary)
        }
        Err(primary_err) => {
            export_warn!("toolbar kickoff failed: {primary_err}; falling back to admin panel");
            start_from_admin(scope, layout).await?;
            Ok(KickoffPath::AdminFallback)
        }
    }
}

async fn start_from_toolbar(scope: &dyn UiScope, layout: &str) -> Result<(), ExportError> {
    let trigger = pick_rightmost_trigger(scope).await?;

    for attempt in 1..=MENU_ATTEMPTS {
        if open_menu_and_click_export(scope, &trigger).await? {
            choose_layout_and_submit(scope, layout).await?;
            return Ok(());
        }
        export_debug!("export menu attempt {attempt}/{MENU_ATTEMPTS} did not stick");
        // Close any stale overlay before retrying.
        let _ = scope.press_key("Escape").await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    Err(ExportError::Kickoff(
        "export option not found after opening menu".to_string(),
    ))
}

/// Picks the menu trigger among visually similar toolbar buttons: the one
/// with the largest x among visible candidates whose y is within the
/// on-screen bound. The max-x tie-break distinguishes the intended kebab
/// from sibling icon buttons and is preserved exactly.
async fn pick_rightmost_trigger(scope: &dyn UiScope) -> Result<UiNode, ExportError> {
    let mut pool = scope.query(&Query::css(TRIGGER_SELECTORS)).await?;
    pool.extend(scope.query(&Query::css(BULK_ICON_BUTTON)).await.unwrap_or_default());

    if pool.is_empty() {
        return Err(ExportError::Kickoff("menu trigger not found".to_string()));
    }

    let mut best: Option<UiNode> = None;
    let mut best_x = -1.0f64;
    for node in pool {
        if !node.visible {
            continue;
        }
        let Some(rect) = node.rect else { continue };
        if rect.y < ONSCREEN_Y_BOUND && rect.x > best_x {
            best_x = rect.x;
            best = Some(node);
        }
    }
    best.ok_or_else(|| ExportError::Kickoff("no on-screen menu trigger".to_string()))
}

/// One open-the-menu-and-click-Export attempt. `Ok(false)` means the menu or
/// its Export item never became clickable and the caller may retry.
async fn open_menu_and_click_export(
    scope: &dyn UiScope,
    trigger: &UiNode,
) -> Result<bool, ExportError> {
    scope.click(trigger).await?;

    let Some(surface) =
        wait_for_last(scope, &Query::css(MENU_SURFACE), Duration::from_millis(3000)).await
    else {
        return Ok(false);
    };

    // Stable data attribute first; role and plain text are last resorts.
    let item_queries = [
        Query::css("[data-cy='export']"),
        Query::css("button[role='menuitem'][data-cy='export']"),
        Query::role("menuitem", TextMatch::exact("Export")),
        Query::role("button", TextMatch::exact("Export")),
        Query::css_with_text(".mat-menu-content .mat-menu-item", TextMatch::exact("Export")),
        Query::Text(TextMatch::exact("Export")),
    ];
    for query in &item_queries {
        let found = scope.query_within(&surface, query).await?;
        if let Some(item) = found.into_iter().find(|n| n.visible) {
            scope.click(&item).await?;
            scope.settle().await?;
            return Ok(true);
        }
    }

    if let Ok(items) = scope
        .query_within(
            &surface,
            &Query::css("[role='menuitem'], .mat-menu-content .mat-menu-item, .mat-menu-content a"),
        )
        .await
    {
        let seen: Vec<String> = items.into_iter().map(|n| n.text).take(20).collect();
        if !seen.is_empty() {
            export_debug!("menu items seen: {}", seen.join(" | "));
        }
    }
    Ok(false)
}

/// On the export modal: pick the layout by exact, case-insensitive name and
/// click the primary submit control. Shared by both kickoff paths.
async fn choose_layout_and_submit(scope: &dyn UiScope, layout: &str) -> Result<(), ExportError> {
    let dropdown = resolve(
        scope,
        "export layout dropdown",
        &[
            Candidate::millis(Query::css("#exportLayout"), 5000),
            Candidate::millis(
                Query::role("combobox", TextMatch::contains("layout")),
                2000,
            ),
            Candidate::millis(Query::role("button", TextMatch::contains("layout")), 2000),
            Candidate::millis(Query::LabeledInput(TextMatch::contains("layout")), 2000),
        ],
    )
    .await
    .map_err(|e| ExportError::Kickoff(e.to_string()))?;
    scope.click(&dropdown).await?;

    let option = resolve(
        scope,
        &format!("layout option '{layout}'"),
        &[
            Candidate::millis(Query::role("option", TextMatch::exact(layout)), 5000),
            Candidate::millis(Query::role("menuitem", TextMatch::exact(layout)), 2000),
            Candidate::millis(Query::Text(TextMatch::exact(layout)), 2000),
        ],
    )
    .await
    .map_err(|e| ExportError::Kickoff(e.to_string()))?;
    scope.click(&option).await?;

    let submit = resolve(
        scope,
        "export submit button",
        &[
            Candidate::millis(Query::role("button", TextMatch::prefix("Export")), 5000),
            Candidate::millis(Query::css("button[type='submit']"), 2000),
            Candidate::millis(
                Query::css_with_text(
                    "button.k-button--primary, button.mat-primary",
                    TextMatch::prefix("Export"),
                ),
                2000,
            ),
            Candidate::millis(Query::Text(TextMatch::prefix("Export")), 2000),
        ],
    )
    .await
    .map_err(|e| ExportError::Kickoff(e.to_string()))?;
    scope.click(&submit).await?;
    scope.settle().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

/// Clicks the post-submit "take me to the exports page" prompt when the site
/// offers one. Best-effort and not required for success.
async fn maybe_follow_exports_prompt(scope: &dyn UiScope) {
    let prompts = [
        Query::role("button", TextMatch::exact("Take me to Exports page")),
        Query::Text(TextMatch::exact("Take me to Exports page")),
        Query::role("button", TextMatch::exact("Go to Exports")),
        Query::role("link", TextMatch::exact("Go to Exports")),
        Query::role("button", TextMatch::exact("Go to Exports Page")),
        Query::Text(TextMatch::exact("Go to Exports")),
    ];
    for query in &prompts {
        if let Some(node) = wait_for_first(scope, query, Duration::from_millis(2000)).await {
            if scope.click(&node).await.is_ok() {
                let _ = scope.settle().await;
                return;
            }
        }
    }
}

/// Fallback path: the administration job list is more stable, so its menu is
/// opened with a less specific selector set.
async fn start_from_admin(scope: &dyn UiScope, layout: &str) -> Result<(), ExportError> {
    crate::nav::goto_admin_exports(scope)
        .await
        .map_err(|e| ExportError::Kickoff(format!("admin navigation: {e}")))?;

    let mut opened = false;
    for selector in [
        "button[aria-label*='Menu']",
        "button[title*='Menu']",
        "button:has(svg)",
        "button:has(.kebab), button:has(.hamburger)",
    ] {
        if let Some(button) =
            wait_for_first(scope, &Query::css(selector), Duration::from_millis(5000)).await
        {
            if scope.click(&button).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                opened = true;
                break;
            }
        }
    }
    if !opened {
        return Err(ExportError::Kickoff(
            "admin export menu trigger not found".to_string(),
        ));
    }

    let export_item = resolve(
        scope,
        "admin 'Export' menu item",
        &[
            Candidate::millis(Query::Text(TextMatch::exact("Export")), 5000),
            Candidate::millis(
                Query::css_with_text("button", TextMatch::exact("Export")),
                2000,
            ),
            Candidate::millis(
                Query::css_with_text("div[role='menu'] *", TextMatch::exact("Export")),
                2000,
            ),
        ],
    )
    .await
    .map_err(|e| ExportError::Kickoff(e.to_string()))?;
    scope.click(&export_item).await?;
    scope.settle().await?;

    choose_layout_and_submit(scope, layout).await
}
