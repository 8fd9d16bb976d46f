//! Draft sanitization
//!
//! Enforces per-field maximum lengths, strips control characters except
//! newline and tab, checks ID pattern conformance, bounds list lengths, and
//! rejects drafts whose canonical serialization exceeds a hard cap.
//! Failures name the offending field.

use crate::{canonical_draft_bytes, PacketDraft};
use fastband_core::{FastbandError, FastbandResult};
use std::collections::BTreeSet;
use std::path::{Component, Path};

/// Maximum characters in the ticket summary.
const MAX_SUMMARY_CHARS: usize = 2_000;
/// Maximum characters in one task, decision, or path string.
const MAX_ITEM_CHARS: usize = 500;
/// Maximum characters in a file path.
const MAX_PATH_CHARS: usize = 256;
/// Maximum characters in the condensed hot context.
const MAX_HOT_CONTEXT_CHARS: usize = 32_000;
/// Maximum entries in a task list.
const MAX_TASKS: usize = 100;
/// Maximum files in the modified set.
const MAX_FILES: usize = 200;
/// Maximum recorded decisions.
const MAX_DECISIONS: usize = 50;
/// Maximum warm references.
const MAX_WARM_REFERENCES: usize = 100;
/// Hard cap on the canonical serialization of the whole draft.
const MAX_SERIALIZED_BYTES: usize = 128 * 1024;

/// Strip control characters, keeping newline and tab.
fn scrub(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn scrub_bounded(value: &str, max_chars: usize, field: &str) -> FastbandResult<String> {
    let cleaned = scrub(value);
    if cleaned.chars().count() > max_chars {
        return Err(FastbandError::malformed(
            field,
            format!("exceeds {max_chars} characters"),
        ));
    }
    Ok(cleaned)
}

fn check_list_len(len: usize, max: usize, field: &str) -> FastbandResult<()> {
    if len > max {
        return Err(FastbandError::malformed(
            field,
            format!("{len} items exceeds the {max}-item bound"),
        ));
    }
    Ok(())
}

/// A file path must be relative and stay relative: no rooted paths, no
/// parent traversal.
fn check_relative_path(path: &str) -> bool {
    if path.is_empty() || path.len() > MAX_PATH_CHARS {
        return false;
    }
    let path = Path::new(path);
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Sanitize a draft, returning the cleaned copy.
///
/// String fields come back scrubbed of control characters; structural
/// violations (over-length fields, oversized lists, bad paths, an oversized
/// serialization) are `malformed` with the offending field named.
pub fn sanitize(draft: PacketDraft) -> FastbandResult<PacketDraft> {
    let ticket_summary = scrub_bounded(&draft.ticket_summary, MAX_SUMMARY_CHARS, "ticket_summary")?;

    check_list_len(draft.completed_tasks.len(), MAX_TASKS, "completed_tasks")?;
    let completed_tasks = draft
        .completed_tasks
        .iter()
        .map(|t| scrub_bounded(t, MAX_ITEM_CHARS, "completed_tasks"))
        .collect::<FastbandResult<Vec<_>>>()?;

    check_list_len(draft.pending_tasks.len(), MAX_TASKS, "pending_tasks")?;
    let pending_tasks = draft
        .pending_tasks
        .iter()
        .map(|t| scrub_bounded(t, MAX_ITEM_CHARS, "pending_tasks"))
        .collect::<FastbandResult<Vec<_>>>()?;

    let current_task = draft
        .current_task
        .as_deref()
        .map(|t| scrub_bounded(t, MAX_ITEM_CHARS, "current_task"))
        .transpose()?;

    check_list_len(draft.files_modified.len(), MAX_FILES, "files_modified")?;
    let mut files_modified = BTreeSet::new();
    for path in &draft.files_modified {
        if !check_relative_path(path) {
            return Err(FastbandError::malformed(
                "files_modified",
                format!("'{path}' is not a plain relative path"),
            ));
        }
        files_modified.insert(path.clone());
    }

    check_list_len(draft.key_decisions.len(), MAX_DECISIONS, "key_decisions")?;
    let key_decisions = draft
        .key_decisions
        .iter()
        .map(|d| {
            Ok(crate::KeyDecision {
                when: d.when,
                what: scrub_bounded(&d.what, MAX_ITEM_CHARS, "key_decisions.what")?,
                why: scrub_bounded(&d.why, MAX_ITEM_CHARS, "key_decisions.why")?,
            })
        })
        .collect::<FastbandResult<Vec<_>>>()?;

    let hot_context = scrub_bounded(&draft.hot_context, MAX_HOT_CONTEXT_CHARS, "hot_context")?;

    check_list_len(
        draft.warm_references.len(),
        MAX_WARM_REFERENCES,
        "warm_references",
    )?;

    let sanitized = PacketDraft {
        source_agent: draft.source_agent,
        source_session: draft.source_session,
        target_agent: draft.target_agent,
        ticket_id: draft.ticket_id,
        ticket_summary,
        completed_tasks,
        pending_tasks,
        current_task,
        files_modified,
        key_decisions,
        hot_context,
        warm_references: draft.warm_references,
        budget_used: draft.budget_used,
        budget_peak: draft.budget_peak,
        expansion_count: draft.expansion_count,
    };

    let serialized = canonical_draft_bytes(&sanitized).len();
    if serialized > MAX_SERIALIZED_BYTES {
        return Err(FastbandError::malformed(
            "packet",
            format!("serialized size {serialized} exceeds {MAX_SERIALIZED_BYTES} bytes"),
        ));
    }

    Ok(sanitized)
}

// ============================================================================
// TESTS
// ============================================================================
