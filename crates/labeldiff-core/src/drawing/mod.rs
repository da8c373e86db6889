//! Drawing documents and the store that loads and saves them.

pub mod dxf;
pub mod model;

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::DocumentError;

pub use model::{
    BlockDefinition, DrawingDocument, Entity, EntityKind, Layer, PaperLayout, Rgb, TextKind,
};

/// Loads and persists drawing documents.
pub trait DrawingStore: Send + Sync {
    fn open(&self, path: &Path) -> Result<DrawingDocument, DocumentError>;

    fn save(&self, document: &DrawingDocument, path: &Path) -> Result<(), DocumentError>;
}

/// ASCII DXF files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DxfStore;

impl DxfStore {
    pub fn new() -> Self {
        Self
    }
}

impl DrawingStore for DxfStore {
    fn open(&self, path: &Path) -> Result<DrawingDocument, DocumentError> {
        let bytes = fs::read(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = dxf::read_dxf(&bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "drawing opened");
        Ok(doc)
    }

    fn save(&self, document: &DrawingDocument, path: &Path) -> Result<(), DocumentError> {
        let bytes = dxf::write_dxf(document)?;
        let io_err = |source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        // Write beside the target, then rename over it.
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!(path = %path.display(), bytes = bytes.len(), "drawing saved");
        Ok(())
    }
}
