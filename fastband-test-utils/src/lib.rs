//! Fastband Test Utils - Fixtures and Generators
//!
//! Shared helpers for the crate test suites. Everything here assumes the
//! fallback meter (bytes / 4) so token arithmetic in tests is exact.

use fastband_core::{
    AgentName, EntityIdType, EntryKey, FastbandConfig, Payload, SessionId, TicketId,
};
use fastband_handoff::{KeyDecision, SessionSnapshot};
use std::collections::BTreeSet;
use std::path::Path;

/// Deterministic signing key used across the test suites.
pub const TEST_SIGNING_KEY: [u8; 32] = [0x42; 32];

/// A workspace configuration with the documented defaults and the test
/// signing key.
pub fn workspace_config(bible_root: impl AsRef<Path>) -> FastbandConfig {
    FastbandConfig::for_workspace(bible_root.as_ref(), TEST_SIGNING_KEY.to_vec())
}

/// A validated agent name.
pub fn agent(name: &str) -> AgentName {
    AgentName::new(name).expect("test agent name is valid")
}

/// A validated ticket id.
pub fn ticket_id(id: &str) -> TicketId {
    TicketId::new(id).expect("test ticket id is valid")
}

/// A validated entry key.
pub fn entry_key(key: &str) -> EntryKey {
    EntryKey::new(key).expect("test entry key is valid")
}

/// A text payload that the fallback meter sizes to exactly `tokens`.
pub fn payload_of_tokens(tokens: u32) -> Payload {
    Payload::Text("x".repeat(tokens as usize * 4))
}

/// A populated session snapshot for handoff tests.
pub fn sample_snapshot(target: Option<&str>) -> SessionSnapshot {
    SessionSnapshot {
        source_agent: agent("agent-a"),
        source_session: SessionId::now_v7(),
        target_agent: target.map(agent),
        ticket_id: ticket_id("T-42"),
        ticket_summary: "Fix the flaky importer".into(),
        completed_tasks: vec!["triage the failure".into()],
        pending_tasks: vec!["patch the retry loop".into(), "rerun CI".into()],
        current_task: Some("patch the retry loop".into()),
        files_modified: BTreeSet::from(["src/importer.rs".to_string()]),
        key_decisions: vec![KeyDecision {
            when: chrono::Utc::now(),
            what: "pin the parser version".into(),
            why: "upstream broke streaming".into(),
        }],
        hot_context: "The importer double-retries on 429 responses.".into(),
        warm_references: vec![entry_key("notes/importer")],
        budget_used: 13_000,
        budget_peak: 14_000,
        expansion_count: 0,
    }
}

/// Seed a bible root with a few sections and return their ids.
pub fn seed_bible_root(root: impl AsRef<Path>) -> Vec<String> {
    let root = root.as_ref();
    std::fs::create_dir_all(root.join("tools")).expect("bible root is writable");
    std::fs::write(root.join("conventions.md"), "Always run the linter.")
        .expect("bible root is writable");
    std::fs::write(root.join("tools/grep.md"), "How to search the tree.")
        .expect("bible root is writable");
    vec!["conventions".into(), "tools/grep".into()]
}

/// A fresh session id.
pub fn session_id() -> SessionId {
    SessionId::now_v7()
}
