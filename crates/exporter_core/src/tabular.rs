/// A parsed export artifact: ordered column headers plus ordered rows.
///
/// Every cell is kept as a string. Downstream writers receive the dataset
/// exactly in this shape, headers first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabularArtifact {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularArtifact {
    /// An artifact with no headers and no rows; the poller returns this when
    /// dedup decides there is nothing new to download.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
