//! Turning free-form model output into suggestions and reviews.
//!
//! Models wrap JSON in prose or code fences and sometimes emit a broken
//! array. Parsing degrades gracefully: whatever can be recovered is kept.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::rules::{self, RuleSpec};

/// A rule proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Normalized filename ending in `.mdc`.
    pub filename: String,
    /// Front-matter description.
    pub description: String,
    /// Globs the rule applies to.
    pub globs: Vec<String>,
    /// Whether the rule applies to every request.
    pub always_apply: bool,
    /// Rule body.
    pub instructions: String,
    /// Why the model proposes it.
    pub rationale: String,
    /// Rendered MDC text ready to save.
    pub content: String,
}

/// Severity of a review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    /// The rule is broken or contradicts itself.
    Error,
    /// The rule works but could mislead.
    Warning,
    /// A suggestion.
    Info,
}

impl std::fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One problem found in a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// How serious it is.
    pub severity: FindingSeverity,
    /// What is wrong.
    pub message: String,
}

/// Review of a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanityReport {
    /// Overall verdict.
    pub summary: String,
    /// Individual problems.
    pub findings: Vec<Finding>,
}

/// Parse raw model output into rule suggestions.
///
/// Returns an empty vec when nothing can be recovered. Suggestions
/// without instructions are dropped.
#[must_use]
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    let Some(json_str) = extract_json_array(raw) else {
        debug!("No JSON array in model output");
        return Vec::new();
    };

    let items: Vec<Value> = serde_json::from_str(json_str).unwrap_or_else(|e| {
        debug!(error = %e, "Malformed JSON array, extracting objects one by one");
        parse_objects(json_str)
    });

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| suggestion_from_value(item, i))
        .collect()
}

/// Parse raw model output into a review.
///
/// When the output holds no JSON object the trimmed text becomes the
/// summary.
#[must_use]
pub fn parse_sanity_report(raw: &str) -> SanityReport {
    let parsed = extract_json_object(raw).and_then(|s| serde_json::from_str::<Value>(s).ok());
    let Some(obj) = parsed.as_ref().and_then(Value::as_object) else {
        debug!("No JSON object in model output, using text as summary");
        return SanityReport {
            summary: raw.trim().to_string(),
            findings: Vec::new(),
        };
    };

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let findings = obj
        .get("findings")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(finding_from_value).collect())
        .unwrap_or_default();

    SanityReport { summary, findings }
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Recover top-level objects from a malformed JSON array.
fn parse_objects(json_str: &str) -> Vec<Value> {
    let inner = json_str.trim();
    let inner = inner.strip_prefix('[').unwrap_or(inner);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in inner.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value) = serde_json::from_str::<Value>(&inner[s..=i]) {
                            objects.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    objects
}

fn suggestion_from_value(value: &Value, index: usize) -> Option<Suggestion> {
    let obj = value.as_object()?;
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let instructions = text("instructions");
    if instructions.is_empty() {
        return None;
    }

    let globs = match obj.get("globs") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };

    let always_apply = match obj.get("alwaysApply").or_else(|| obj.get("always_apply")) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    let stem = match slug(&text("filename")) {
        s if s.is_empty() => format!("suggested-rule-{}", index + 1),
        s => s,
    };
    let description = text("description");

    let generated = rules::generate(&RuleSpec {
        name: Some(stem),
        description: Some(description.clone()),
        globs: globs.clone(),
        always_apply,
        must_read_files: Vec::new(),
        instructions: Some(instructions.clone()),
    });

    Some(Suggestion {
        filename: generated.filename,
        description,
        globs,
        always_apply,
        instructions,
        rationale: text("rationale"),
        content: generated.content,
    })
}

fn finding_from_value(value: &Value) -> Option<Finding> {
    let (severity, message) = match value {
        Value::String(s) => (FindingSeverity::Info, s.trim()),
        Value::Object(obj) => (
            map_severity(obj.get("severity").and_then(Value::as_str)),
            obj.get("message").and_then(Value::as_str)?.trim(),
        ),
        _ => return None,
    };
    (!message.is_empty()).then(|| Finding {
        severity,
        message: message.to_string(),
    })
}

fn map_severity(s: Option<&str>) -> FindingSeverity {
    match s.map(str::to_ascii_lowercase).as_deref() {
        Some("error" | "critical" | "high") => FindingSeverity::Error,
        Some("warning" | "warn" | "medium") => FindingSeverity::Warning,
        _ => FindingSeverity::Info,
    }
}

/// Lowercase kebab-case stem without a rule extension.
fn slug(name: &str) -> String {
    let name = name.trim();
    let stem = name
        .strip_suffix(".mdc")
        .or_else(|| name.strip_suffix(".md"))
        .unwrap_or(name);

    let mut out = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_array() {
        let raw = r#"[{"filename":"package-manager.mdc","description":"Use pnpm","globs":["package.json"],"alwaysApply":false,"instructions":"Always use pnpm.","rationale":"npm was used"}]"#;
        let suggestions = parse_suggestions(raw);

        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.filename, "package-manager.mdc");
        assert_eq!(s.globs, vec!["package.json"]);
        assert_eq!(s.rationale, "npm was used");
        assert!(s.content.starts_with("---\ndescription: \"Use pnpm\"\n"));
        assert!(s.content.contains("# Instructions\n\nAlways use pnpm."));
    }

    #[test]
    fn test_parse_wrapped_in_prose_and_fences() {
        let raw = "Here you go:\n```json\n[{\"filename\":\"a\",\"instructions\":\"Do it.\"}]\n```\nHope this helps.";
        let suggestions = parse_suggestions(raw);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].filename, "a.mdc");
    }

    #[test]
    fn test_parse_malformed_array_recovers_objects() {
        let raw = r#"[{"filename":"one","instructions":"First {braces} in text."}, {"filename":"two" "instructions":"broken"}, {"filename":"three","instructions":"Third."},]"#;
        let names: Vec<_> = parse_suggestions(raw)
            .into_iter()
            .map(|s| s.filename)
            .collect();
        assert_eq!(names, vec!["one.mdc", "three.mdc"]);
    }

    #[test]
    fn test_parse_drops_suggestions_without_instructions() {
        let raw = r#"[{"filename":"empty","instructions":"  "},{"filename":"none"},{"filename":"ok","instructions":"x"}]"#;
        let suggestions = parse_suggestions(raw);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].filename, "ok.mdc");
    }

    #[test]
    fn test_parse_nothing() {
        assert!(parse_suggestions("I could not find anything.").is_empty());
        assert!(parse_suggestions("] backwards [").is_empty());
        assert!(parse_suggestions("[]").is_empty());
    }

    #[test]
    fn test_globs_as_string_and_always_apply_as_string() {
        let raw = r#"[{"filename":"x","globs":"*.ts, *.tsx","alwaysApply":"true","instructions":"y"}]"#;
        let s = &parse_suggestions(raw)[0];
        assert_eq!(s.globs, vec!["*.ts", "*.tsx"]);
        assert!(s.always_apply);
    }

    #[test]
    fn test_filename_normalization() {
        assert_eq!(slug("Package Manager.mdc"), "package-manager");
        assert_eq!(slug("../../etc/passwd"), "etc-passwd");
        assert_eq!(slug("testing.md"), "testing");
        assert_eq!(slug("__"), "");

        let raw = r#"[{"filename":"","instructions":"a"},{"instructions":"b"}]"#;
        let names: Vec<_> = parse_suggestions(raw)
            .into_iter()
            .map(|s| s.filename)
            .collect();
        assert_eq!(names, vec!["suggested-rule-1.mdc", "suggested-rule-2.mdc"]);
    }

    #[test]
    fn test_parse_sanity_report() {
        let raw = r#"Sure! {"summary":"Mostly fine.","findings":[{"severity":"warning","message":"Glob *.ts is unquoted."},{"severity":"ERROR","message":"Contradicts global rules."},{"severity":"info","message":"  "},"Consider a description."]}"#;
        let report = parse_sanity_report(raw);

        assert_eq!(report.summary, "Mostly fine.");
        assert_eq!(
            report.findings,
            vec![
                Finding {
                    severity: FindingSeverity::Warning,
                    message: "Glob *.ts is unquoted.".to_string()
                },
                Finding {
                    severity: FindingSeverity::Error,
                    message: "Contradicts global rules.".to_string()
                },
                Finding {
                    severity: FindingSeverity::Info,
                    message: "Consider a description.".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_sanity_report_plain_text() {
        let report = parse_sanity_report("  The rule looks good.  ");
        assert_eq!(report.summary, "The rule looks good.");
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_sanity_report_serializes_lowercase_severity() {
        let json = serde_json::to_value(Finding {
            severity: FindingSeverity::Warning,
            message: "m".to_string(),
        })
        .unwrap();
        assert_eq!(json["severity"], "warning");
    }
}
