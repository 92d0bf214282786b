use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use export_logging::export_warn;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The last-downloaded filename per layout, persisted as a flat JSON map.
///
/// This is the process's only persisted state besides the downstream
/// spreadsheet. Entries only ever advance forward: a recorded filename is
/// never rolled back. A missing or corrupt file is treated as an empty cache.
#[derive(Debug)]
pub struct ArtifactCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ArtifactCache {
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(err) => {
                    export_warn!("ignoring corrupt artifact cache {path:?}: {err}");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                export_warn!("ignoring unreadable artifact cache {path:?}: {err}");
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn last_filename(&self, layout: &str) -> Option<&str> {
        self.entries.get(layout).map(String::as_str)
    }

    /// Records a newly confirmed filename and persists the map atomically
    /// (temp file in the same directory, then rename). Re-recording the
    /// current value is a no-op.
    pub fn record(&mut self, layout: &str, filename: &str) -> Result<(), CacheError> {
        if self.last_filename(layout) == Some(filename) {
            return Ok(());
        }
        self.entries
            .insert(layout.to_string(), filename.to_string());
        self.persist()
    }

    fn persist(&self) -> Result<(), CacheError> {
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = match dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}
