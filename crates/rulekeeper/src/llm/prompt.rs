//! Prompt construction for rule suggestions and rule reviews.

use std::fmt::Write;

use crate::postmortem::Postmortem;

use super::ChatMessage;

const SUGGESTION_FORMAT: &str = r#"Respond with ONLY a JSON array, no prose and no code fences. Each element:
{"filename": "kebab-case-name.mdc", "description": "one sentence shown to the assistant when deciding whether to load the rule", "globs": ["src/**/*.ts"], "alwaysApply": false, "instructions": "Markdown instructions addressed to the assistant", "rationale": "why this rule prevents the mistake"}
Use an empty globs array together with "alwaysApply": true for rules that apply everywhere.
Prefer extending an existing rule file (reuse its filename) over creating a near-duplicate.
Return [] if no rule would have prevented the mistake."#;

const POSTMORTEM_SYSTEM: &str = "You turn postmortems of AI coding assistant mistakes into \
Cursor rule files. A rule is short, concrete and actionable: it names the files, commands or \
conventions involved and states what to do instead. Do not write generic advice such as \
'be careful' or 'follow best practices'.";

const PATTERN_SYSTEM: &str = "You review a history of postmortems of AI coding assistant \
mistakes on one project and look for recurring failure patterns. Only suggest rules for \
problems that happened more than once or clearly share a root cause. Each rule is short, \
concrete and actionable.";

const SANITY_SYSTEM: &str = r#"You review Cursor rule files written for an AI coding assistant. Look for:
- instructions that contradict each other or the global rules,
- vague instructions the assistant cannot act on,
- globs that cannot match any file in the project or are missing where needed,
- front-matter problems (missing description, alwaysApply combined with globs),
- content that belongs in a different rule.
Respond with ONLY a JSON object, no prose and no code fences:
{"summary": "one or two sentences", "findings": [{"severity": "error|warning|info", "message": "what is wrong and how to fix it"}]}
Use an empty findings array when the rule is fine."#;

/// What the model is told about the project.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    /// Project directory name.
    pub name: String,
    /// Filenames of the project's existing rules.
    pub existing_rules: Vec<String>,
    /// Contents of the global rules file.
    pub global_rules: String,
}

/// Messages asking for rules that would have prevented one postmortem.
#[must_use]
pub fn postmortem_messages(postmortem: &Postmortem, context: &ProjectContext) -> Vec<ChatMessage> {
    let mut user = String::new();
    write_context(&mut user, context);
    user.push_str("## Postmortem\n\n");
    write_postmortem(&mut user, postmortem);

    vec![
        ChatMessage::system(format!("{POSTMORTEM_SYSTEM}\n\n{SUGGESTION_FORMAT}")),
        ChatMessage::user(user),
    ]
}

/// Messages asking for rules addressing patterns across many postmortems.
#[must_use]
pub fn pattern_messages(postmortems: &[Postmortem], context: &ProjectContext) -> Vec<ChatMessage> {
    let mut user = String::new();
    write_context(&mut user, context);
    let _ = writeln!(user, "## Postmortems ({} most recent)\n", postmortems.len());
    for (i, postmortem) in postmortems.iter().enumerate() {
        let _ = writeln!(user, "### {}. {}\n", i + 1, postmortem.display_title());
        write_postmortem(&mut user, postmortem);
    }

    vec![
        ChatMessage::system(format!("{PATTERN_SYSTEM}\n\n{SUGGESTION_FORMAT}")),
        ChatMessage::user(user),
    ]
}

/// Messages asking for a review of one rule file.
#[must_use]
pub fn sanity_messages(rule: &str, context: Option<&ProjectContext>) -> Vec<ChatMessage> {
    let mut user = String::new();
    if let Some(context) = context {
        write_context(&mut user, context);
    }
    user.push_str("## Rule under review\n\n");
    user.push_str(rule.trim());
    user.push('\n');

    vec![ChatMessage::system(SANITY_SYSTEM), ChatMessage::user(user)]
}

fn write_context(out: &mut String, context: &ProjectContext) {
    if !context.name.is_empty() {
        let _ = writeln!(out, "Project: {}\n", context.name);
    }

    if context.existing_rules.is_empty() {
        out.push_str("Existing rule files: none\n\n");
    } else {
        out.push_str("Existing rule files:\n");
        for name in &context.existing_rules {
            let _ = writeln!(out, "- {name}");
        }
        out.push('\n');
    }

    let global = context.global_rules.trim();
    if !global.is_empty() {
        let _ = writeln!(out, "## Global rules\n\n{global}\n");
    }
}

fn write_postmortem(out: &mut String, postmortem: &Postmortem) {
    if let Some(title) = &postmortem.title {
        let _ = writeln!(out, "Title: {title}");
    }
    let _ = writeln!(out, "Severity: {}", postmortem.severity);
    let _ = writeln!(out, "Recorded: {}", postmortem.created_at.format("%Y-%m-%d"));
    if !postmortem.files.is_empty() {
        let _ = writeln!(out, "Files involved: {}", postmortem.files.join(", "));
    }
    if let Some(what) = &postmortem.what_happened {
        let _ = writeln!(out, "What happened: {what}");
    }
    if let Some(expected) = &postmortem.expected {
        let _ = writeln!(out, "Expected: {expected}");
    }
    if !postmortem.notes.is_empty() {
        let _ = writeln!(out, "Notes:\n{}", postmortem.notes);
    }
    out.push('\n');
}
