//! Rule files: parsing, listing, saving, deleting and generating.
//!
//! A rule file is Markdown with optional YAML front-matter:
//!
//! ```text
//! ---
//! description: "API conventions"
//! globs: ["src/api/**"]
//! ---
//!
//! # Instructions
//! ...
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::workspace::{read_file, write_file};

const FRONT_MATTER_FENCE: &str = "---";

/// A rule file read from a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFile {
    /// File name inside the rules directory.
    pub filename: String,
    /// Parsed front-matter (empty object when absent).
    pub frontmatter: Value,
    /// Body without the front-matter.
    pub content: String,
    /// The file exactly as stored.
    pub raw: String,
}

/// Result of splitting a document into front-matter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    /// Front-matter as a JSON object.
    pub frontmatter: Value,
    /// Body text.
    pub content: String,
}

/// Split `raw` into front-matter and body.
///
/// Invalid YAML (for instance an unquoted `globs: *.ts`) falls back to
/// reading `key: value` lines as strings.
#[must_use]
pub fn parse(raw: &str) -> ParsedRule {
    let Some((yaml, body)) = split_front_matter(raw) else {
        return ParsedRule {
            frontmatter: Value::Object(Map::new()),
            content: raw.to_string(),
        };
    };

    let frontmatter = match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(serde_yaml::Value::Null) => Value::Object(Map::new()),
        Ok(value) => serde_json::to_value(value)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| loose_front_matter(yaml)),
        Err(e) => {
            debug!(error = %e, "Front-matter is not valid YAML, reading it line by line");
            loose_front_matter(yaml)
        }
    };

    ParsedRule {
        frontmatter,
        content: body.to_string(),
    }
}

fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix(FRONT_MATTER_FENCE)?
        .strip_prefix('\n')
        .or_else(|| raw.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn loose_front_matter(yaml: &str) -> Value {
    let map = yaml
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| !key.trim().is_empty() && !key.starts_with(char::is_whitespace))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"');
            let value = match value {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            };
            (key.trim().to_string(), value)
        })
        .collect();
    Value::Object(map)
}

/// Check that `filename` names a single file inside the rules directory.
///
/// # Errors
///
/// Returns [`Error::InvalidFilename`] when it is empty, a relative
/// directory reference, or contains a separator or NUL.
pub fn validate_filename(filename: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidFilename {
            filename: filename.to_string(),
            reason,
        })
    };

    if filename.trim().is_empty() {
        return reject("filename is empty");
    }
    if filename == "." || filename == ".." {
        return reject("filename refers to a directory");
    }
    if filename.contains(['/', '\\']) {
        return reject("filename contains a path separator");
    }
    if filename.contains('\0') {
        return reject("filename contains a NUL byte");
    }
    Ok(())
}

/// Rule files of one project.
#[derive(Debug, Clone)]
pub struct RuleSet {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl RuleSet {
    /// Rules of the project at `project`, stored under `rules_dir`.
    #[must_use]
    pub fn new(project: &Path, rules_dir: &Path, extensions: &[String]) -> Self {
        Self {
            dir: project.join(rules_dir),
            extensions: extensions.to_vec(),
        }
    }

    /// The rules directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_rule_file(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }

    /// Read every rule file, sorted by name. A missing directory yields no rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a rule file cannot be read.
    pub fn list(&self) -> Result<Vec<RuleFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            std::fs::read_dir(&self.dir).map_err(|source| Error::file_access(&self.dir, source))?;

        let mut names: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.is_rule_file(name))
            .collect();
        names.sort();

        names
            .into_iter()
            .map(|filename| {
                let raw = read_file(&self.dir.join(&filename))?;
                let ParsedRule {
                    frontmatter,
                    content,
                } = parse(&raw);
                Ok(RuleFile {
                    filename,
                    frontmatter,
                    content,
                    raw,
                })
            })
            .collect()
    }

    /// Names of the rule files, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn filenames(&self) -> Result<Vec<String>> {
        Ok(self.list()?.into_iter().map(|r| r.filename).collect())
    }

    /// Write a rule file, creating the rules directory as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the filename is invalid or the write fails.
    pub fn save(&self, filename: &str, content: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
        }
        let path = self.dir.join(filename);
        write_file(&path, content)?;
        info!("Saved rule {}", path.display());
        Ok(path)
    }

    /// Delete a rule file. Deleting a file that does not exist succeeds.
    ///
    /// Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the filename is invalid or removal fails.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let path = self.dir.join(filename);
        if !path.exists() {
            warn!("Rule {} does not exist, nothing to delete", path.display());
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|source| Error::file_access(&path, source))?;
        info!("Deleted rule {}", path.display());
        Ok(true)
    }
}

/// Input for [`generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleSpec {
    /// Base name of the rule file; defaults to `rule`.
    pub name: Option<String>,
    /// Front-matter description.
    pub description: Option<String>,
    /// File globs the rule applies to.
    pub globs: Vec<String>,
    /// Whether the rule applies to every request.
    pub always_apply: bool,
    /// Files the assistant must read before acting.
    pub must_read_files: Vec<String>,
    /// Free-form instructions.
    pub instructions: Option<String>,
}

/// A generated rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedRule {
    /// The MDC text.
    pub content: String,
    /// Suggested file name.
    pub filename: String,
}

/// Render a rule as MDC text.
#[must_use]
pub fn generate(spec: &RuleSpec) -> GeneratedRule {
    let mut content = String::from("---\n");

    if let Some(description) = spec.description.as_deref().filter(|d| !d.is_empty()) {
        content.push_str("description: ");
        content.push_str(&json_string(description));
        content.push('\n');
    }
    if !spec.globs.is_empty() {
        content.push_str("globs: ");
        content.push_str(&serde_json::to_string(&spec.globs).unwrap_or_else(|_| "[]".into()));
        content.push('\n');
    }
    if spec.always_apply {
        content.push_str("alwaysApply: true\n");
    }
    content.push_str("---\n\n");

    if !spec.must_read_files.is_empty() {
        content.push_str("# Files You MUST Read\n\n");
        content.push_str("Before doing ANYTHING, you MUST read and understand these files:\n\n");
        for file in &spec.must_read_files {
            content.push_str("- `");
            content.push_str(file);
            content.push_str("`\n");
        }
        content.push_str("\n**DO NOT proceed without reading these files first.**\n\n");
    }

    if let Some(instructions) = spec.instructions.as_deref().filter(|i| !i.is_empty()) {
        content.push_str("# Instructions\n\n");
        content.push_str(instructions);
        content.push('\n');
    }

    let name = spec
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("rule");

    GeneratedRule {
        content,
        filename: format!("{name}.mdc"),
    }
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}
