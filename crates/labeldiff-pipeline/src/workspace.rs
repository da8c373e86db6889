//! Per-run working directory with one unique subdirectory per pair.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug)]
pub struct RunWorkspace {
    root: PathBuf,
    temp: Option<TempDir>,
    taken: HashSet<String>,
}

impl RunWorkspace {
    /// Use (and create) `root`.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| PipelineError::Workspace {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            temp: None,
            taken: HashSet::new(),
        })
    }

    /// A fresh temporary directory, removed on drop unless [`keep`](Self::keep) is called.
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix("labeldiff-")
            .tempdir()
            .map_err(|source| PipelineError::Workspace {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            temp: Some(temp),
            taken: HashSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keep a temporary directory after the workspace is dropped.
    pub fn keep(mut self) -> PathBuf {
        if let Some(temp) = self.temp.take() {
            #[allow(deprecated)]
            let _ = temp.into_path();
        }
        self.root.clone()
    }

    /// Create the working subdirectory for `pair_name`.
    ///
    /// Path-hostile characters become `_`; a name already handed out gets a
    /// numeric suffix so every pair writes to its own directory.
    pub fn pair_dir(&mut self, pair_name: &str) -> Result<PathBuf> {
        let base = sanitize(pair_name);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains(&candidate.to_lowercase()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(candidate.to_lowercase());

        let dir = self.root.join(&candidate);
        fs::create_dir_all(&dir).map_err(|source| PipelineError::Workspace {
            path: dir.clone(),
            source,
        })?;
        debug!(pair = %pair_name, dir = %dir.display(), "pair directory ready");
        Ok(dir)
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ').to_string();
    if cleaned.is_empty() {
        "pair".to_string()
    } else {
        cleaned
    }
}
