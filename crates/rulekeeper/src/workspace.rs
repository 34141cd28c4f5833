//! The data directory: global rules and the project list.
//!
//! Both files are plain text on disk. `projects.json` is read-modify-written
//! on every change so keys written by other tools survive.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

/// Content written to `global-rules.md` the first time the tool runs.
pub const GLOBAL_RULES_TEMPLATE: &str = "# Global Cursor Rules

## Files to Always Read
<!-- List files that should ALWAYS be read before any task -->

## Core Instructions
<!-- Your global instructions here -->
";

const SCAN_PATHS_KEY: &str = "scanPaths";
const PROJECTS_KEY: &str = "projects";

/// Handle to the data directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    global_rules_path: PathBuf,
    projects_path: PathBuf,
}

impl Workspace {
    /// Open the data directory described by `config`, creating and seeding
    /// it when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or seed files cannot be created.
    pub fn open(config: &Config) -> Result<Self> {
        let workspace = Self {
            root: config.data_dir(),
            global_rules_path: config.global_rules_path(),
            projects_path: config.projects_path(),
        };
        workspace.initialize(&config.scan.default_paths)?;
        Ok(workspace)
    }

    fn initialize(&self, default_scan_paths: &[PathBuf]) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|source| Error::DirectoryCreate {
                path: self.root.clone(),
                source,
            })?;
            info!("Created data directory at {}", self.root.display());
        }

        if !self.global_rules_path.exists() {
            write_file(&self.global_rules_path, GLOBAL_RULES_TEMPLATE)?;
            debug!("Seeded {}", self.global_rules_path.display());
        }

        if !self.projects_path.exists() {
            let paths: Vec<String> = default_scan_paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            let mut doc = Map::new();
            doc.insert(PROJECTS_KEY.to_string(), Value::Array(Vec::new()));
            doc.insert(SCAN_PATHS_KEY.to_string(), serde_json::to_value(paths)?);
            self.write_projects_doc(&doc)?;
            debug!("Seeded {}", self.projects_path.display());
        }

        Ok(())
    }

    /// The data directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the global rules file.
    #[must_use]
    pub fn global_rules_path(&self) -> &Path {
        &self.global_rules_path
    }

    /// Read the global rules Markdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn global_rules(&self) -> Result<String> {
        read_file(&self.global_rules_path)
    }

    /// Replace the global rules Markdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_global_rules(&self, content: &str) -> Result<()> {
        write_file(&self.global_rules_path, content)?;
        info!(bytes = content.len(), "Saved global rules");
        Ok(())
    }

    /// The configured scan paths. A missing key reads as no paths.
    ///
    /// # Errors
    ///
    /// Returns an error if `projects.json` cannot be read or parsed.
    pub fn scan_paths(&self) -> Result<Vec<PathBuf>> {
        let doc = self.read_projects_doc()?;
        let Some(value) = doc.get(SCAN_PATHS_KEY) else {
            return Ok(Vec::new());
        };
        let paths: Vec<String> = serde_json::from_value(value.clone())?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    /// Replace the scan paths, leaving the rest of `projects.json` intact.
    ///
    /// # Errors
    ///
    /// Returns an error if `projects.json` cannot be read or written.
    pub fn set_scan_paths(&self, paths: &[PathBuf]) -> Result<()> {
        let mut doc = self.read_projects_doc()?;
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        doc.insert(SCAN_PATHS_KEY.to_string(), serde_json::to_value(&paths)?);
        self.write_projects_doc(&doc)?;
        info!(count = paths.len(), "Updated scan paths");
        Ok(())
    }

    fn read_projects_doc(&self) -> Result<Map<String, Value>> {
        let raw = read_file(&self.projects_path)?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::invalid_input(format!(
                "{} must contain a JSON object",
                self.projects_path.display()
            ))),
        }
    }

    fn write_projects_doc(&self, doc: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(doc)?;
        write_file(&self.projects_path, &json)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::file_access(path, source))
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|source| Error::file_access(path, source))
}
