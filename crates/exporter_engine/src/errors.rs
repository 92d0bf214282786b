use std::time::Duration;

use thiserror::Error;

use exporter_core::WorkflowStage;

use crate::artifact::DecodeError;
use crate::scope::DriverError;
use crate::sink::SinkError;

/// Resolver exhaustion: every candidate strategy for one semantic target
/// failed within its budget.
#[derive(Debug, Error)]
#[error("no usable candidate for '{target}'")]
pub struct NotFound {
    pub target: String,
}

impl NotFound {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Failure of one navigation step, before stage attribution.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Everything that can end one export spec. Only configuration and login
/// problems abort the whole run; the batch loop catches each of these per
/// spec and moves on.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("navigation failed at stage {stage}: {source}")]
    Navigation {
        stage: WorkflowStage,
        #[source]
        source: StepError,
    },
    #[error("export kickoff failed: {0}")]
    Kickoff(String),
    #[error("no complete artifact for layout '{layout}' within {deadline:?}")]
    PollTimeout { layout: String, deadline: Duration },
    #[error("artifact download failed: {0}")]
    Download(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("artifact parse failed: {0}")]
    Parse(#[from] csv::Error),
    #[error("downstream write failed: {0}")]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl ExportError {
    /// Attributes a step failure to the workflow stage it was trying to reach.
    pub fn at_stage(stage: WorkflowStage, source: impl Into<StepError>) -> Self {
        ExportError::Navigation {
            stage,
            source: source.into(),
        }
    }
}
