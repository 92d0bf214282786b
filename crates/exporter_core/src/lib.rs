//! Exporter core: pure export-spec model, token matching, and workflow stages.
mod matching;
mod spec;
mod stage;
mod tabular;

pub use matching::{filename_matches_layout, layout_tokens};
pub use spec::{
    parse_batch, BatchConfig, ExportSpec, RawExportOptions, RawExportSpec, RawFilters,
    RawGradYear, RawStatus, StatusValues,
};
pub use stage::WorkflowStage;
pub use tabular::TabularArtifact;
