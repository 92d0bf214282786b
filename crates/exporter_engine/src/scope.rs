use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failures from the automation driver. Anything the driver
/// cannot answer (lost element, backend disconnect, failed download) surfaces
/// here; semantic failures like "no candidate matched" live one layer up.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser backend error: {0}")]
    Backend(String),
    #[error("element is no longer attached to the document")]
    Detached,
    #[error("navigation failed: {0}")]
    Goto(String),
    #[error("download failed: {0}")]
    Download(String),
}

/// Case-insensitive, whitespace-trimmed text matching, the way the upstream
/// UI is matched throughout: labels and menu items vary in casing and padding
/// across tenant skins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Exact(String),
    /// Matches at the start, ending on a word boundary ("2025" matches
    /// "2025 (14)" but not "20253").
    Prefix(String),
    Contains(String),
}

impl TextMatch {
    pub fn exact(s: impl Into<String>) -> Self {
        TextMatch::Exact(s.into())
    }

    pub fn prefix(s: impl Into<String>) -> Self {
        TextMatch::Prefix(s.into())
    }

    pub fn contains(s: impl Into<String>) -> Self {
        TextMatch::Contains(s.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.trim().to_lowercase();
        match self {
            TextMatch::Exact(n) => haystack == n.trim().to_lowercase(),
            TextMatch::Prefix(n) => {
                let needle = n.trim().to_lowercase();
                match haystack.strip_prefix(&needle) {
                    Some(rest) => !rest.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()),
                    None => false,
                }
            }
            TextMatch::Contains(n) => haystack.contains(&n.trim().to_lowercase()),
        }
    }

    pub fn needle(&self) -> &str {
        match self {
            TextMatch::Exact(n) | TextMatch::Prefix(n) | TextMatch::Contains(n) => n,
        }
    }
}

/// One way of locating elements in the active scope. Ordered lists of these
/// form the fallback ladders the resolver walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Accessible role plus accessible name. Survives restyling best.
    Role { role: String, name: TextMatch },
    /// Raw CSS, for stable attribute hooks and structural fallbacks.
    Css(String),
    /// CSS narrowed to elements whose text matches.
    CssWithText { css: String, text: TextMatch },
    /// Visible text match, innermost matching element.
    Text(TextMatch),
    /// A form control located through its label text or aria-label.
    LabeledInput(TextMatch),
}

impl Query {
    pub fn role(role: &str, name: TextMatch) -> Self {
        Query::Role {
            role: role.to_string(),
            name,
        }
    }

    pub fn css(css: impl Into<String>) -> Self {
        Query::Css(css.into())
    }

    pub fn css_with_text(css: impl Into<String>, text: TextMatch) -> Self {
        Query::CssWithText {
            css: css.into(),
            text,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Role { role, name } => write!(f, "role={role} name~'{}'", name.needle()),
            Query::Css(css) => write!(f, "css={css}"),
            Query::CssWithText { css, text } => write!(f, "css={css} text~'{}'", text.needle()),
            Query::Text(text) => write!(f, "text~'{}'", text.needle()),
            Query::LabeledInput(text) => write!(f, "label~'{}'", text.needle()),
        }
    }
}

/// On-screen geometry of a node, in CSS pixels relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A resolved element handle plus the metadata captured at query time.
/// Handles are transient: the underlying document may be replaced at any
/// navigation, so nothing caches them across workflow stages.
#[derive(Debug, Clone, PartialEq)]
pub struct UiNode {
    pub id: u64,
    pub visible: bool,
    pub rect: Option<Rect>,
    pub text: String,
}

/// The active document context: the top-level page or one embedded frame.
///
/// Everything above the driver (resolver, navigation, filters, kickoff,
/// poller) speaks only this trait, so the whole engine runs unchanged against
/// an in-memory fake in tests.
#[async_trait]
pub trait UiScope: Send + Sync {
    async fn query(&self, query: &Query) -> Result<Vec<UiNode>, DriverError>;

    /// Like `query`, scoped to the subtree under `node`.
    async fn query_within(&self, node: &UiNode, query: &Query)
        -> Result<Vec<UiNode>, DriverError>;

    /// Scrolls the node into view and clicks it.
    async fn click(&self, node: &UiNode) -> Result<(), DriverError>;

    async fn fill(&self, node: &UiNode, text: &str) -> Result<(), DriverError>;

    async fn attr(&self, node: &UiNode, name: &str) -> Result<Option<String>, DriverError>;

    /// Sends a key to the focused element ("Enter", "Escape", "Tab").
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    /// Scrolls the main content container (or the window) by `pixels`.
    async fn scroll_container(&self, pixels: i64) -> Result<(), DriverError>;

    /// Scopes for each embedded frame of this document, top-level only.
    async fn frames(&self) -> Result<Vec<Box<dyn UiScope>>, DriverError>;

    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    /// Cooperatively waits until the document looks quiescent. Bounded.
    async fn settle(&self) -> Result<(), DriverError>;

    /// Clicks a download link and resolves the materialized file location.
    async fn download(&self, node: &UiNode) -> Result<PathBuf, DriverError>;
}
