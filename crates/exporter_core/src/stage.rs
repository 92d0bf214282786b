use std::fmt;

/// Position in the export workflow. Each navigation step is scoped to the
/// stage it tries to reach, so a failed step can name where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkflowStage {
    LoggedOut,
    LoggingIn,
    Dashboard,
    EntityList,
    FiltersApplied,
    ExportMenuOpen,
    ExportSubmitted,
    AdminJobsPage,
    ArtifactReady,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowStage::LoggedOut => "logged-out",
            WorkflowStage::LoggingIn => "logging-in",
            WorkflowStage::Dashboard => "dashboard",
            WorkflowStage::EntityList => "entity-list",
            WorkflowStage::FiltersApplied => "filters-applied",
            WorkflowStage::ExportMenuOpen => "export-menu-open",
            WorkflowStage::ExportSubmitted => "export-submitted",
            WorkflowStage::AdminJobsPage => "admin-jobs-page",
            WorkflowStage::ArtifactReady => "artifact-ready",
        };
        write!(f, "{label}")
    }
}
