use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use ropey::Rope;

use crate::error::{ProjectError, Result};
use crate::scanner::{self, ScanResult};

/// A buffer the host has open. Its text wins over the file on disk.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub text: Rope,
    pub revision: i32,
}

pub type OpenDocuments = HashMap<PathBuf, OpenDocument>;

/// A scanned document stored as a node of the include graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentNode {
    /// Absolute path to the `.tex` file
    pub path: PathBuf,
    /// Buffer revision the scan was taken from; `None` when read from disk
    pub revision: Option<i32>,
    pub scan: ScanResult,
}

impl DocumentNode {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }

    /// Reads `path` (open buffer first) and scans it.
    pub fn load(path: &Path, open: &OpenDocuments) -> Result<DocumentNode> {
        let (text, revision) = read_snapshot(path, open)?;
        tracing::debug!("scanning {}", path.display());
        Ok(DocumentNode {
            path: path.to_path_buf(),
            revision,
            scan: scanner::scan(&text),
        })
    }
}

/// Reads a file from disk, retrying once before giving up.
pub fn read_source(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ProjectError::Unreadable {
            path: path.to_path_buf(),
            source: err,
        }),
        Err(err) => {
            tracing::debug!("retrying read of {}: {err}", path.display());
            std::fs::read_to_string(path).map_err(|source| ProjectError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Text of `path` as the host currently sees it.
pub fn read_snapshot(path: &Path, open: &OpenDocuments) -> Result<(String, Option<i32>)> {
    match open.get(path) {
        Some(document) => Ok((document.text.to_string(), Some(document.revision))),
        None => Ok((read_source(path)?, None)),
    }
}

pub fn exists(path: &Path, open: &OpenDocuments) -> bool {
    open.contains_key(path) || path.is_file()
}

/// Lexically resolves `.` and `..` without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Resolves a directive argument against each base directory in turn.
///
/// `extension` (e.g. `.tex`) is appended when the name doesn't already end
/// with it. The first candidate that exists wins.
pub fn resolve_relative(
    name: &str,
    bases: &[&Path],
    extension: &str,
    open: &OpenDocuments,
) -> Option<PathBuf> {
    let file_name = if name.ends_with(extension) {
        name.to_string()
    } else {
        format!("{name}{extension}")
    };

    bases
        .iter()
        .map(|base| normalize_path(&base.join(&file_name)))
        .find(|candidate| exists(candidate, open))
}
