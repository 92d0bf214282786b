//! Exporter engine: resilient UI navigation and export retrieval.
mod artifact;
mod cache;
mod cdp;
mod errors;
mod filters;
mod kickoff;
mod nav;
mod orchestrator;
mod poller;
mod resolver;
mod scope;
mod session;
mod sink;

pub use artifact::{decode_artifact, parse_artifact, DecodeError};
pub use cache::{ArtifactCache, CacheError};
pub use cdp::{BrowserSettings, CdpScope, CdpSession};
pub use errors::{ExportError, NotFound, StepError};
pub use filters::{apply_filters, FilterReport};
pub use kickoff::{start_export, KickoffPath};
pub use nav::{
    click_link_in_section, dismiss_stray_modal, ensure_checkbox_checked, expand_section,
    find_filters_scope, goto_admin_exports, open_entity_list, scroll_until_visible,
};
pub use orchestrator::{run_batch, SpecReport};
pub use poller::{fetch_latest_artifact, PollSettings};
pub use resolver::{resolve, Candidate};
pub use scope::{DriverError, Query, Rect, TextMatch, UiNode, UiScope};
pub use session::{login, Credentials};
pub use sink::{DatasetSink, SinkError};
