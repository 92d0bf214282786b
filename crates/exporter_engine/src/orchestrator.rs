//! Batch orchestration. Every export spec runs in isolation: whatever one
//! spec raises is logged and the loop moves on. This is the top-level
//! resilience contract.

use export_logging::{export_error, export_info, set_current_export};
use exporter_core::ExportSpec;

use crate::cache::ArtifactCache;
use crate::errors::ExportError;
use crate::filters::apply_filters;
use crate::kickoff::start_export;
use crate::nav::{dismiss_stray_modal, find_filters_scope, open_entity_list};
use crate::poller::{fetch_latest_artifact, PollSettings};
use crate::scope::UiScope;
use crate::sink::DatasetSink;

/// What happened to one spec; `rows_written` is 0 when dedup found nothing
/// new or the artifact was empty.
#[derive(Debug)]
pub struct SpecReport {
    pub name: String,
    pub outcome: Result<usize, ExportError>,
}

/// Runs every configured spec in order against one authenticated session.
pub async fn run_batch(
    scope: &dyn UiScope,
    specs: &[ExportSpec],
    cache: &mut ArtifactCache,
    sink: &dyn DatasetSink,
    poll: &PollSettings,
) -> Vec<SpecReport> {
    let mut reports = Vec::with_capacity(specs.len());
    for spec in specs {
        set_current_export(Some(&spec.name));
        export_info!("=== export '{}' -> tab '{}' ===", spec.name, spec.destination_tab);
        let outcome = run_one(scope, spec, cache, sink, poll).await;
        if let Err(err) = &outcome {
            export_error!("export '{}' failed: {err}", spec.name);
        }
        reports.push(SpecReport {
            name: spec.name.clone(),
            outcome,
        });
        set_current_export(None);
    }
    export_info!("all exports processed");
    reports
}

async fn run_one(
    scope: &dyn UiScope,
    spec: &ExportSpec,
    cache: &mut ArtifactCache,
    sink: &dyn DatasetSink,
    poll: &PollSettings,
) -> Result<usize, ExportError> {
    // A failed prior spec may have left its modal open.
    dismiss_stray_modal(scope).await;

    open_entity_list(scope)
        .await
        .map_err(|e| ExportError::at_stage(exporter_core::WorkflowStage::EntityList, e))?;

    let frame = find_filters_scope(scope)
        .await
        .map_err(|e| ExportError::at_stage(exporter_core::WorkflowStage::EntityList, e))?;
    let filter_scope: &dyn UiScope = frame.as_deref().unwrap_or(scope);
    let report = apply_filters(filter_scope, spec.grad_year.as_deref(), &spec.statuses).await;
    export_info!(
        "filters applied: status={} grad_year={}",
        report.status_applied,
        report.grad_year_applied
    );

    let path = start_export(scope, &spec.layout_display_name).await?;
    export_info!("export started via {path:?}");

    let artifact =
        fetch_latest_artifact(scope, &spec.layout_display_name, cache, poll).await?;
    if artifact.is_empty() {
        export_info!("no new rows for '{}'", spec.layout_display_name);
        return Ok(0);
    }

    let rows = artifact.row_count();
    sink.overwrite_tab(&spec.destination_tab, &artifact).await?;
    export_info!("wrote {rows} rows to '{}'", spec.destination_tab);
    Ok(rows)
}
