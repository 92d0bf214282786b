use export_logging::{export_debug, export_warn};

use crate::nav::{
    click_link_in_section, ensure_checkbox_checked, expand_section, scroll_until_visible,
};
use crate::scope::{TextMatch, UiScope};

const STATUS_SECTION: &str = "Status";
const GRAD_YEAR_SECTION: &str = "Grad. Year";

/// What the filter pass managed to apply. Filtering is best-effort by policy:
/// a failed sub-step is logged and skipped, and the export proceeds with
/// whatever subset succeeded. Escalating this into a hard failure would
/// change the resulting row counts, so callers must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterReport {
    pub status_applied: bool,
    pub grad_year_applied: bool,
}

/// Applies status and graduation-year filters on the entity list.
///
/// Explicit statuses: clear the section with its "none" shortcut, then check
/// each named status. No statuses: use the "all" shortcut. A grad year clears
/// its section, scrolls the year label into view, and checks it.
pub async fn apply_filters(
    scope: &dyn UiScope,
    grad_year: Option<&str>,
    statuses: &[String],
) -> FilterReport {
    let mut report = FilterReport::default();

    if let Err(err) = expand_section(scope, STATUS_SECTION).await {
        export_warn!("could not expand '{STATUS_SECTION}': {err}");
    }
    if let Err(err) = expand_section(scope, GRAD_YEAR_SECTION).await {
        export_warn!("could not expand '{GRAD_YEAR_SECTION}': {err}");
    }

    report.status_applied = apply_status_filter(scope, statuses).await;
    if let Some(year) = grad_year {
        report.grad_year_applied = apply_grad_year_filter(scope, year).await;
    }

    report
}

async fn apply_status_filter(scope: &dyn UiScope, statuses: &[String]) -> bool {
    if statuses.is_empty() {
        return match click_link_in_section(scope, STATUS_SECTION, &TextMatch::exact("all")).await {
            Ok(clicked) => clicked,
            Err(err) => {
                export_warn!("status 'all' shortcut failed: {err}");
                false
            }
        };
    }

    match click_link_in_section(scope, STATUS_SECTION, &TextMatch::exact("none")).await {
        Ok(false) => export_debug!("status 'none' shortcut not found"),
        Err(err) => export_warn!("status 'none' shortcut failed: {err}"),
        Ok(true) => {}
    }

    let mut applied = 0usize;
    for status in statuses {
        match ensure_checkbox_checked(scope, &TextMatch::exact(status.clone())).await {
            Ok(()) => applied += 1,
            Err(err) => export_warn!("status '{status}' not applied: {err}"),
        }
    }
    applied == statuses.len()
}

async fn apply_grad_year_filter(scope: &dyn UiScope, year: &str) -> bool {
    match click_link_in_section(scope, GRAD_YEAR_SECTION, &TextMatch::exact("none")).await {
        Ok(false) => export_debug!("grad-year 'none' shortcut not found"),
        Err(err) => export_warn!("grad-year 'none' shortcut failed: {err}"),
        Ok(true) => {}
    }

    let label = TextMatch::prefix(year.to_string());
    match scroll_until_visible(scope, &label).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            export_warn!("grad year '{year}' never scrolled into view");
            return false;
        }
        Err(err) => {
            export_warn!("scrolling for grad year '{year}' failed: {err}");
            return false;
        }
    }
    match ensure_checkbox_checked(scope, &label).await {
        Ok(()) => true,
        Err(err) => {
            export_warn!("grad year '{year}' not applied: {err}");
            false
        }
    }
}
