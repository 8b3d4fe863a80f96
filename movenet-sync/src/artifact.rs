//! Artifact sets: the files materialized under one variant's staging directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One file of an artifact set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Path relative to the set root, always `/`-separated.
    pub relative_path: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    pub size: u64,
}

/// Files under a staging root, ordered by relative path.
///
/// Ordering never depends on filesystem iteration order, so hashing and
/// publishing see the same sequence on every platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    root: PathBuf,
    files: Vec<ArtifactFile>,
}

impl ArtifactSet {
    /// Walk `root` and collect every regular file beneath it.
    ///
    /// Symlinks are not followed.
    pub fn discover(root: &Path) -> std::io::Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(std::io::Error::other)?;
            let relative_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata()?.len();
            files.push(ArtifactFile {
                relative_path,
                path: entry.path().to_path_buf(),
                size,
            });
        }
        Ok(Self::from_files(root, files))
    }

    /// Build a set from already-known files; sorts by relative path.
    pub fn from_files(root: &Path, mut files: Vec<ArtifactFile>) -> Self {
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[ArtifactFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// First path segment of every file that sits inside a directory.
    pub fn top_level_dirs(&self) -> BTreeSet<&str> {
        self.files
            .iter()
            .filter_map(|f| f.relative_path.split_once('/'))
            .map(|(dir, _)| dir)
            .collect()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.files
            .binary_search_by(|f| f.relative_path.as_str().cmp(relative_path))
            .is_ok()
    }
}
