//! Project discovery and project path encoding.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A project found under one of the scan paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Directory name.
    pub name: String,
    /// Absolute path of the project root.
    pub path: PathBuf,
    /// Whether the project already has a rules directory.
    pub has_cursor_rules: bool,
}

/// Scan the immediate children of each scan path for projects.
///
/// A child directory is a project when any of `markers` exists inside it.
/// Scan paths that do not exist are skipped; unreadable ones are logged
/// and skipped.
#[must_use]
pub fn scan(scan_paths: &[PathBuf], markers: &[String], rules_dir: &Path) -> Vec<Project> {
    let mut projects = Vec::new();

    for scan_path in scan_paths {
        if !scan_path.exists() {
            debug!("Skipping missing scan path {}", scan_path.display());
            continue;
        }

        let entries = match std::fs::read_dir(scan_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Error scanning {}", scan_path.display());
                continue;
            }
        };

        let mut found: Vec<Project> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| inspect(&entry.path(), markers, rules_dir))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            count = found.len(),
            "Scanned {}",
            scan_path.display()
        );
        projects.extend(found);
    }

    projects
}

fn inspect(dir: &Path, markers: &[String], rules_dir: &Path) -> Option<Project> {
    if !markers.iter().any(|m| dir.join(m).exists()) {
        return None;
    }

    // The rules directory only counts when the assistant's own marker is present.
    let assistant_dir = rules_dir.components().next().map(|c| dir.join(c));
    let has_cursor_rules =
        assistant_dir.is_some_and(|d| d.exists()) && dir.join(rules_dir).exists();

    Some(Project {
        name: dir.file_name()?.to_string_lossy().into_owned(),
        path: dir.to_path_buf(),
        has_cursor_rules,
    })
}

/// A project path carried in a URL segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPath(PathBuf);

impl ProjectPath {
    /// Decode a base64 URL segment into a project path.
    ///
    /// Accepts URL-safe base64 without padding as well as the standard
    /// alphabet with padding.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment is empty, is not base64, or does
    /// not decode to UTF-8.
    pub fn decode(segment: &str) -> Result<Self> {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(invalid("empty project path"));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(segment.trim_end_matches('='))
            .or_else(|_| STANDARD.decode(segment))
            .map_err(|e| invalid(e.to_string()))?;
        let path = String::from_utf8(bytes).map_err(|_| invalid("path is not valid UTF-8"))?;
        if path.is_empty() {
            return Err(invalid("empty project path"));
        }
        Ok(Self(PathBuf::from(path)))
    }

    /// Encode a path for use in a URL segment.
    #[must_use]
    pub fn encode(path: &Path) -> String {
        URL_SAFE_NO_PAD.encode(path.to_string_lossy().as_bytes())
    }

    /// The decoded path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consume into the decoded path.
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidProjectPath {
        reason: reason.into(),
    }
}
