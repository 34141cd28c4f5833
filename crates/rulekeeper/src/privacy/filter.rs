//! Secret filter applied to text bound for the LLM provider.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::patterns::{builtin_patterns, SecretPattern};
use crate::error::{Error, Result};

/// Result of filtering content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    /// No secrets found.
    Passed,

    /// Content must not be sent at all.
    Blocked {
        /// Name of the pattern that caused the block.
        pattern_name: String,
    },

    /// Secrets were replaced with the placeholder.
    Redacted {
        /// The redacted content.
        content: String,

        /// Patterns that matched, in application order.
        redacted_patterns: Vec<String>,
    },
}

/// Mode of operation for the filter, set by `llm.redaction_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Refuse content that contains secrets.
    Block,

    /// Replace secrets with a placeholder.
    #[default]
    Redact,

    /// Only log warnings, don't filter.
    WarnOnly,
}

/// Configuration for the filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Whether filtering is enabled.
    pub enabled: bool,

    /// Filter mode.
    pub mode: FilterMode,

    /// Extra regex patterns.
    pub custom_patterns: Vec<String>,

    /// Replacement text for redacted secrets.
    pub redaction_placeholder: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: FilterMode::Redact,
            custom_patterns: Vec::new(),
            redaction_placeholder: "[REDACTED]".to_string(),
        }
    }
}

/// Finds and removes secrets from free text.
#[derive(Debug)]
pub struct SecretFilter {
    config: FilterConfig,
    patterns: Vec<SecretPattern>,
    custom_regexes: Vec<Regex>,
}

impl SecretFilter {
    /// Filter with the default configuration (redact mode).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    /// Filter with a custom configuration. Invalid custom patterns are
    /// logged and skipped.
    #[must_use]
    pub fn with_config(config: FilterConfig) -> Self {
        let custom_regexes = config
            .custom_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Invalid custom secret pattern");
                    None
                }
            })
            .collect();

        Self {
            config,
            patterns: builtin_patterns(),
            custom_regexes,
        }
    }

    /// Filter content and return the result.
    #[must_use]
    pub fn filter(&self, content: &str) -> FilterResult {
        if !self.config.enabled {
            return FilterResult::Passed;
        }

        match self.config.mode {
            FilterMode::Block => self.filter_block(content),
            FilterMode::Redact => self.filter_redact(content),
            FilterMode::WarnOnly => self.filter_warn(content),
        }
    }

    /// The text that may be sent in place of `content`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] in block mode when `content` holds a
    /// secret.
    pub fn redact(&self, content: &str) -> Result<String> {
        match self.filter(content) {
            FilterResult::Passed => Ok(content.to_string()),
            FilterResult::Redacted { content, .. } => Ok(content),
            FilterResult::Blocked { pattern_name } => Err(Error::invalid_input(format!(
                "text contains a secret ({pattern_name}); remove it before sending"
            ))),
        }
    }

    fn filter_block(&self, content: &str) -> FilterResult {
        if let Some(pattern) = self.patterns.iter().find(|p| p.matches(content)) {
            debug!(pattern = %pattern.name, "Content blocked by pattern");
            return FilterResult::Blocked {
                pattern_name: pattern.name.to_string(),
            };
        }

        if let Some(i) = self.custom_regexes.iter().position(|r| r.is_match(content)) {
            debug!(pattern_index = i, "Content blocked by custom pattern");
            return FilterResult::Blocked {
                pattern_name: format!("custom_{i}"),
            };
        }

        FilterResult::Passed
    }

    fn filter_redact(&self, content: &str) -> FilterResult {
        let placeholder = &self.config.redaction_placeholder;
        let mut result = content.to_string();
        let mut redacted_patterns = Vec::new();

        for pattern in &self.patterns {
            if pattern.matches(&result) {
                result = pattern.redact(&result, placeholder);
                redacted_patterns.push(pattern.name.to_string());
            }
        }

        for (i, regex) in self.custom_regexes.iter().enumerate() {
            if regex.is_match(&result) {
                result = regex.replace_all(&result, placeholder.as_str()).into_owned();
                redacted_patterns.push(format!("custom_{i}"));
            }
        }

        if redacted_patterns.is_empty() {
            FilterResult::Passed
        } else {
            debug!(patterns = ?redacted_patterns, "Redacted secrets");
            FilterResult::Redacted {
                content: result,
                redacted_patterns,
            }
        }
    }

    fn filter_warn(&self, content: &str) -> FilterResult {
        for pattern in self.patterns.iter().filter(|p| p.matches(content)) {
            warn!(
                pattern = %pattern.name,
                description = %pattern.description,
                occurrences = pattern.count(content),
                "Secret detected (warn mode)"
            );
        }
        for (i, _) in self
            .custom_regexes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_match(content))
        {
            warn!(pattern_index = i, "Secret detected by custom pattern (warn mode)");
        }
        FilterResult::Passed
    }
}

impl Default for SecretFilter {
    fn default() -> Self {
        Self::new()
    }
}
