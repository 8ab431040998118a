//! Plan parsing and phase prompts.
//!
//! The plan phase must end with a machine-parsed `PLAN_RESULT:` block; the
//! parser here is deliberately line-oriented and forgiving about
//! surrounding prose. When the model never produces a parsable block the
//! executor falls back to a single work item derived from the prompt.

use crate::state::WorkPlan;

const MAX_SLUG_LEN: usize = 40;

/// Generate a URL-safe slug from free text.
/// Example: "Add dark mode toggle" → "add-dark-mode-toggle".
pub fn slugify(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    let slug = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let mut slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Parse the `PLAN_RESULT:` block out of the plan phase's final answer.
///
/// Expected shape, anywhere in the text:
///
/// ```text
/// PLAN_RESULT:
/// title: Add dark mode
/// items: add-toggle-component, wire-theme-state, update-docs
/// notes: keep the default light
/// ```
///
/// Returns `None` when the block is missing or lists no items.
pub fn parse_plan_result(text: &str) -> Option<WorkPlan> {
    let start = text.find("PLAN_RESULT:")?;
    let block = &text[start + "PLAN_RESULT:".len()..];

    let mut title = String::new();
    let mut items_line = String::new();
    let mut notes = String::new();

    // Field lines are parsed individually to avoid cross-line matching;
    // anything that is not a known field ends the block.
    for line in block.lines() {
        let trimmed = line.trim().trim_start_matches("```").trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("title:") {
            title = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("items:") {
            items_line = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("notes:") {
            notes = rest.trim().to_string();
        } else {
            break;
        }
    }

    let items: Vec<String> = items_line
        .split(',')
        .map(|item| slugify(item.trim()))
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return None;
    }

    Some(WorkPlan {
        title: if title.is_empty() {
            "untitled".to_string()
        } else {
            title
        },
        items,
        notes: if notes.is_empty() { None } else { Some(notes) },
    })
}

/// Single-item plan used when the model never produced a parsable block.
pub fn fallback_plan(prompt: &str) -> WorkPlan {
    let slug = slugify(prompt);
    let item = if slug.is_empty() {
        "execute-task".to_string()
    } else {
        slug
    };
    WorkPlan {
        title: truncate(prompt, 80),
        items: vec![item],
        notes: None,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

// ── Phase prompts ──────────────────────────────────────────────────

pub(crate) fn plan_system_prompt() -> String {
    "You are an autonomous build agent working through a structured task. \
You are in the PLAN phase.\n\n\
Read the task carefully, inspect the workspace with the available tools \
if you need context, and break the task into a short ordered list of \
work items. Each item should be a self-contained unit of work.\n\n\
End your final answer with exactly this block:\n\n\
PLAN_RESULT:\n\
title: <short task title>\n\
items: <comma-separated list of kebab-case work item ids>\n\
notes: <one line of guidance for the execution phase>\n\n\
Keep the list focused: 1-6 items. This block is parsed automatically."
        .to_string()
}

pub(crate) fn work_system_prompt() -> String {
    "You are an autonomous build agent working through a structured task. \
You are in the WORK phase.\n\n\
You will be given one work item at a time. Complete it using the \
available tools, then reply with a short summary of what you did and no \
further tool calls. Do not start the next item on your own; do not redo \
items reported as already complete."
        .to_string()
}

pub(crate) fn review_system_prompt() -> String {
    "You are an autonomous build agent working through a structured task. \
You are in the REVIEW phase.\n\n\
All work items are complete. Verify the result against the original \
task, using tools only if something needs double-checking, and reply \
with a concise summary of what was accomplished and anything a human \
should look at."
        .to_string()
}
