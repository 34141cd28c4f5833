//! Postmortem records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How badly the assistant went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Minor annoyance.
    Low,
    /// Wasted time or needed a manual fix.
    #[default]
    Medium,
    /// Broke something or lost work.
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::invalid_input(format!(
                "unknown severity '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

/// What the user submits when recording a postmortem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostmortemDraft {
    /// Short title.
    pub title: Option<String>,
    /// Free-text notes.
    pub notes: String,
    /// What the assistant did.
    pub what_happened: Option<String>,
    /// What should have happened instead.
    pub expected: Option<String>,
    /// Severity, `medium` when omitted.
    pub severity: Option<Severity>,
    /// Files involved.
    pub files: Vec<String>,
}

/// A recorded mistake of the assistant on one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Postmortem {
    /// Identifier assigned by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Project the postmortem belongs to.
    pub project_path: PathBuf,

    /// When the postmortem was recorded.
    pub created_at: DateTime<Utc>,

    /// Short title.
    pub title: Option<String>,

    /// Free-text notes.
    pub notes: String,

    /// What the assistant did.
    pub what_happened: Option<String>,

    /// What should have happened instead.
    pub expected: Option<String>,

    /// How bad it was.
    pub severity: Severity,

    /// Files involved.
    pub files: Vec<String>,

    /// BLAKE3 hash of the project path and every text field.
    pub content_hash: String,

    /// Rule suggestions from the last analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,

    /// When the last analysis ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Postmortem {
    /// Build a new record from a draft.
    ///
    /// Blank optional fields are dropped and the content hash is computed.
    ///
    /// # Errors
    ///
    /// Returns an error if both `notes` and `what_happened` are blank.
    pub fn new(project_path: &Path, draft: PostmortemDraft) -> Result<Self> {
        let notes = draft.notes.trim().to_string();
        let what_happened = non_blank(draft.what_happened);
        if notes.is_empty() && what_happened.is_none() {
            return Err(Error::invalid_input(
                "a postmortem needs notes or a description of what happened",
            ));
        }

        let title = non_blank(draft.title);
        let expected = non_blank(draft.expected);
        let severity = draft.severity.unwrap_or_default();
        let files: Vec<String> = draft
            .files
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let content_hash = Self::compute_hash(&[
            &project_path.to_string_lossy(),
            title.as_deref().unwrap_or_default(),
            &notes,
            what_happened.as_deref().unwrap_or_default(),
            expected.as_deref().unwrap_or_default(),
            &severity.to_string(),
            &files.join("\n"),
        ]);

        Ok(Self {
            id: None,
            project_path: project_path.to_path_buf(),
            created_at: Utc::now(),
            title,
            notes,
            what_happened,
            expected,
            severity,
            files,
            content_hash,
            analysis: None,
            analyzed_at: None,
        })
    }

    /// Compute the BLAKE3 hash of the given fields.
    ///
    /// Fields are length-prefixed so moving text between fields changes
    /// the hash.
    #[must_use]
    pub fn compute_hash(fields: &[&str]) -> String {
        let mut hasher = blake3::Hasher::new();
        for field in fields {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Title, or the first line of the notes when untitled.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| {
            self.notes
                .lines()
                .chain(self.what_happened.as_deref().unwrap_or_default().lines())
                .find(|l| !l.trim().is_empty())
                .unwrap_or("(untitled)")
        })
    }

    /// Check if the postmortem has been analyzed.
    #[must_use]
    pub fn is_analyzed(&self) -> bool {
        self.analyzed_at.is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(notes: &str) -> PostmortemDraft {
        PostmortemDraft {
            notes: notes.to_string(),
            ..PostmortemDraft::default()
        }
    }

    #[test]
    fn test_new_computes_hash_and_defaults() {
        let pm = Postmortem::new(Path::new("/p"), draft("edited the lockfile")).unwrap();
        assert_eq!(pm.id, None);
        assert_eq!(pm.severity, Severity::Medium);
        assert_eq!(pm.content_hash.len(), 64);
        assert!(!pm.is_analyzed());
    }

    #[test]
    fn test_new_requires_notes_or_what_happened() {
        assert!(Postmortem::new(Path::new("/p"), draft("   ")).is_err());

        let only_structured = PostmortemDraft {
            what_happened: Some("deleted tests".to_string()),
            ..PostmortemDraft::default()
        };
        assert!(Postmortem::new(Path::new("/p"), only_structured).is_ok());
    }

    #[test]
    fn test_hash_depends_on_project() {
        let a = Postmortem::new(Path::new("/a"), draft("same")).unwrap();
        let b = Postmortem::new(Path::new("/b"), draft("same")).unwrap();
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_hash_is_field_sensitive() {
        let left = Postmortem::compute_hash(&["ab", "c"]);
        let right = Postmortem::compute_hash(&["a", "bc"]);
        assert_ne!(left, right);
    }

    #[test]
    fn test_blank_fields_dropped() {
        let pm = Postmortem::new(
            Path::new("/p"),
            PostmortemDraft {
                title: Some("  ".to_string()),
                notes: "n".to_string(),
                files: vec![" src/a.rs ".to_string(), String::new()],
                ..PostmortemDraft::default()
            },
        )
        .unwrap();
        assert_eq!(pm.title, None);
        assert_eq!(pm.files, vec!["src/a.rs"]);
    }

    #[test]
    fn test_display_title() {
        let pm = Postmortem::new(Path::new("/p"), draft("\nfirst line\nsecond")).unwrap();
        assert_eq!(pm.display_title(), "first line");
    }

    #[test]
    fn test_severity_parse_and_display() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(Severity::Low.to_string(), "low");
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_draft_deserializes_camel_case() {
        let d: PostmortemDraft = serde_json::from_str(
            r#"{"notes":"n","whatHappened":"w","severity":"high","files":["a"]}"#,
        )
        .unwrap();
        assert_eq!(d.what_happened.as_deref(), Some("w"));
        assert_eq!(d.severity, Some(Severity::High));
    }

    #[test]
    fn test_serializes_camel_case() {
        let pm = Postmortem::new(Path::new("/p"), draft("n")).unwrap();
        let json = serde_json::to_value(&pm).unwrap();
        assert!(json.get("projectPath").is_some());
        assert!(json.get("contentHash").is_some());
        assert!(json.get("analysis").is_none());
    }
}
