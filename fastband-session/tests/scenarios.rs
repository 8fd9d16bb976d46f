//! End-to-end scenarios for the session coordinator.
//!
//! These drive the public facade with the fallback meter (bytes / 4) so
//! every token figure is exact.

use fastband_core::{
    AuditKind, BudgetTier, BudgetTransition, EntryOrigin, FallbackMeter, FastbandError,
    MemoryAuditSink, OpContext,
};
use fastband_handoff::{HandoffManager, HandoffPacket, MemoryPacketStore, PacketStore};
use fastband_opslog::NewOpsEntry;
use fastband_session::{SessionCoordinator, SessionHandle, Ticket};
use fastband_test_utils::{
    agent, entry_key, payload_of_tokens, sample_snapshot, session_id, ticket_id, workspace_config,
    TEST_SIGNING_KEY,
};
use std::sync::Arc;
use std::time::Duration;

fn make_coordinator() -> (SessionCoordinator, Arc<MemoryAuditSink>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    fastband_test_utils::seed_bible_root(dir.path());
    let audit = Arc::new(MemoryAuditSink::new());
    let coordinator = SessionCoordinator::new(
        workspace_config(dir.path()),
        Arc::new(FallbackMeter),
        audit.clone(),
    )
    .unwrap();
    (coordinator, audit, dir)
}

fn begin(coordinator: &SessionCoordinator, agent_name: &str, ticket: Ticket) -> SessionHandle {
    coordinator
        .begin(session_id(), agent(agent_name), ticket, &OpContext::unbounded())
        .unwrap()
}

/// Poll until `check` passes or the timeout elapses. Background preparation
/// runs on a worker thread, so packet visibility is eventually consistent.
fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("condition not reached within the polling window");
}

// ============================================================================
// S1 — simple inserts, session close drains through WARM
// ============================================================================

#[test]
fn s1_simple_insert_no_handoff() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket_id("T-1"), "simple inserts"),
    );

    let sizes = [2_000u32, 3_000, 1_500, 4_000, 2_500];
    let mut transitions = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let receipt = coordinator
            .ingest(
                &handle,
                entry_key(&format!("notes/{i}")),
                payload_of_tokens(*size),
                EntryOrigin::Discovery,
            )
            .unwrap();
        assert_eq!(receipt.tokens, *size);
        transitions.push(receipt.transition);
    }

    let state = coordinator.budget_state(&handle).unwrap();
    assert_eq!(state.used, 13_000);
    assert_eq!(state.tier, BudgetTier::Minimal);
    assert!(!state.critical_fired);
    // 13,000 crosses the 12,000-token warn line on the final insert; no
    // handoff is required and every ingest was accepted.
    assert_eq!(
        transitions,
        vec![
            BudgetTransition::None,
            BudgetTransition::None,
            BudgetTransition::None,
            BudgetTransition::None,
            BudgetTransition::Warn,
        ]
    );

    let drained = coordinator
        .end(&handle, "done", &OpContext::unbounded())
        .unwrap();

    // All five entries pass through WARM on close, then are discarded
    // (access_count is 1: the insert itself).
    let to_warm = drained
        .iter()
        .filter(|e| e.to == Some(fastband_core::MemoryTier::Warm))
        .count();
    let discarded = drained.iter().filter(|e| e.to.is_none()).count();
    assert_eq!(to_warm, 5);
    assert_eq!(discarded, 5);

    let stats = coordinator.memory_stats().unwrap();
    assert_eq!(stats.hot.tokens, 0);
    assert_eq!(stats.warm.count, 0);
    assert_eq!(stats.cool.count, 0);
}

// ============================================================================
// S2 — WARN then CRITICAL triggers handoff
// ============================================================================

#[test]
fn s2_warn_then_critical_triggers_handoff() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let ticket = ticket_id("T-2");
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket.clone(), "escalating work"),
    );

    let mut last = BudgetTransition::None;
    for (i, size) in [5_000u32, 5_000, 3_000].iter().enumerate() {
        last = coordinator
            .ingest(
                &handle,
                entry_key(&format!("warm-up/{i}")),
                payload_of_tokens(*size),
                EntryOrigin::Discovery,
            )
            .unwrap()
            .transition;
    }
    // used = 13,000 >= 12,000 (60% of 20,000): WARN fires exactly once.
    assert_eq!(last, BudgetTransition::Warn);
    assert_eq!(coordinator.budget_state(&handle).unwrap().used, 13_000);

    // used = 18,000 >= 16,000 (80%): CRITICAL.
    let receipt = coordinator
        .ingest(
            &handle,
            entry_key("the-straw"),
            payload_of_tokens(5_000),
            EntryOrigin::Discovery,
        )
        .unwrap();
    assert_eq!(receipt.transition, BudgetTransition::Critical);

    // The next ingest is refused: the session must hand off.
    let err = coordinator
        .ingest(
            &handle,
            entry_key("refused"),
            payload_of_tokens(100),
            EntryOrigin::Discovery,
        )
        .unwrap_err();
    assert!(matches!(err, FastbandError::HandoffRequired { .. }));

    // The WARN edge kicked off a background prepare; exactly one pending
    // packet shows up for the ticket.
    wait_for(|| coordinator.handoff_list(Some(&ticket)).unwrap().len() == 1);
    let listed = coordinator.handoff_list(Some(&ticket)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].source_agent, agent("agent-a"));
}

// ============================================================================
// S3 — accept is single-use
// ============================================================================

#[test]
fn s3_accept_is_single_use() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let handoffs = coordinator.handoffs();

    let draft = handoffs.prepare(sample_snapshot(Some("agent-b")));
    let sanitized = handoffs.sanitize(draft).unwrap();
    let receipt = handoffs
        .store(sanitized.clone(), &OpContext::unbounded())
        .unwrap();

    let packet = handoffs
        .accept(
            receipt.packet_id,
            &agent("agent-b"),
            &receipt.access_token,
            &OpContext::unbounded(),
        )
        .unwrap();
    assert_eq!(packet.to_draft(), sanitized);

    // The second accept is indistinguishable from never-existed.
    let err = handoffs
        .accept(
            receipt.packet_id,
            &agent("agent-b"),
            &receipt.access_token,
            &OpContext::unbounded(),
        )
        .unwrap_err();
    assert!(matches!(err, FastbandError::NotFound { .. }));
}

// ============================================================================
// S4 — tampering with the backing store
// ============================================================================

#[test]
fn s4_tampered_packet_is_unauthorized() {
    let store: &'static MemoryPacketStore = Box::leak(Box::new(MemoryPacketStore::new()));
    let manager = HandoffManager::new(
        &TEST_SIGNING_KEY,
        Duration::from_secs(3_600),
        Box::new(ForwardingStore(store)),
        Arc::new(MemoryAuditSink::new()),
    );

    let receipt = manager
        .store(
            manager.sanitize(manager.prepare(sample_snapshot(Some("agent-b")))).unwrap(),
            &OpContext::unbounded(),
        )
        .unwrap();

    // Flip one byte of hot_context behind the manager's back.
    let mut packet = store.load(receipt.packet_id).unwrap().unwrap();
    let mut bytes = packet.hot_context.into_bytes();
    bytes[0] ^= 0x01;
    packet.hot_context = String::from_utf8(bytes).unwrap();
    store.insert(packet).unwrap();

    let err = manager
        .accept(
            receipt.packet_id,
            &agent("agent-b"),
            &receipt.access_token,
            &OpContext::unbounded(),
        )
        .unwrap_err();
    assert_eq!(err, FastbandError::Unauthorized);
}

/// Keeps a handle on the backing store so the test can corrupt it.
struct ForwardingStore(&'static MemoryPacketStore);

impl PacketStore for ForwardingStore {
    fn insert(&self, packet: HandoffPacket) -> fastband_core::FastbandResult<()> {
        self.0.insert(packet)
    }
    fn load(
        &self,
        id: fastband_core::PacketId,
    ) -> fastband_core::FastbandResult<Option<HandoffPacket>> {
        self.0.load(id)
    }
    fn remove(
        &self,
        id: fastband_core::PacketId,
    ) -> fastband_core::FastbandResult<Option<HandoffPacket>> {
        self.0.remove(id)
    }
    fn list(
        &self,
        ticket: Option<&fastband_core::TicketId>,
    ) -> fastband_core::FastbandResult<Vec<fastband_handoff::PacketMeta>> {
        self.0.list(ticket)
    }
    fn ids(&self) -> fastband_core::FastbandResult<Vec<fastband_core::PacketId>> {
        self.0.ids()
    }
}

// ============================================================================
// S5 — ops log serialization and rebuild holds
// ============================================================================

#[test]
fn s5_ops_log_serializes_and_rebuild_denies() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let ops = coordinator.ops_log();

    let mut handles = Vec::new();
    for i in 0..8 {
        let ops = Arc::clone(&ops);
        handles.push(std::thread::spawn(move || {
            ops.append(
                NewOpsEntry::activity(
                    agent(&format!("agent-{i}")),
                    None,
                    "concurrent activity",
                ),
                &OpContext::unbounded(),
            )
            .unwrap()
        }));
    }
    let mut sequences: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());

    let read_back: Vec<u64> = ops
        .read(0, usize::MAX)
        .unwrap()
        .iter()
        .map(|e| e.sequence)
        .collect();
    assert_eq!(read_back, (1..=8).collect::<Vec<u64>>());

    // Interleave a rebuild at sequence k: every admit until the matching
    // rebuild_end is denied with since_sequence = k.
    let k = ops
        .begin_rebuild(agent("ops"), "reindex", &OpContext::unbounded())
        .unwrap();
    for j in 0..3 {
        let err = coordinator
            .begin(
                session_id(),
                agent(&format!("late-{j}")),
                Ticket::new(ticket_id("T-5"), "denied work"),
                &OpContext::unbounded(),
            )
            .unwrap_err();
        match err {
            FastbandError::Denied { since_sequence, .. } => assert_eq!(since_sequence, k),
            other => panic!("expected denied, got {other:?}"),
        }
    }

    ops.end_rebuild(agent("ops"), "reindex done", &OpContext::unbounded())
        .unwrap();
    assert!(coordinator
        .begin(
            session_id(),
            agent("agent-late"),
            Ticket::new(ticket_id("T-5"), "admitted work"),
            &OpContext::unbounded(),
        )
        .is_ok());
}

// ============================================================================
// S6 — escalation on file count resets the edges
// ============================================================================

#[test]
fn s6_escalation_on_file_count() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket_id("T-6"), "file-heavy work"),
    );
    assert_eq!(
        coordinator.budget_state(&handle).unwrap().tier,
        BudgetTier::Minimal
    );

    let transition = coordinator.record_files_modified(&handle, 5).unwrap();
    assert_eq!(transition, BudgetTransition::Escalated);

    let state = coordinator.budget_state(&handle).unwrap();
    assert_eq!(state.tier, BudgetTier::Standard);
    assert!(!state.warn_fired);
    assert!(!state.critical_fired);
    assert_eq!(state.expansion_count, 1);

    // 18,000 was CRITICAL at MINIMAL; at STANDARD (cap 40,000) it is below
    // the 24,000-token warn line, so neither edge fires.
    for (i, size) in [9_000u32, 9_000].iter().enumerate() {
        let receipt = coordinator
            .ingest(
                &handle,
                entry_key(&format!("bulk/{i}")),
                payload_of_tokens(*size),
                EntryOrigin::Discovery,
            )
            .unwrap();
        assert_eq!(receipt.transition, BudgetTransition::None);
    }
    let state = coordinator.budget_state(&handle).unwrap();
    assert_eq!(state.used, 18_000);
    assert!(!state.warn_fired);
    assert!(!state.critical_fired);
}

// ============================================================================
// Handoff round trip through the facade
// ============================================================================

#[test]
fn handoff_roundtrip_resumes_with_context() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let ticket = ticket_id("T-77");
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket.clone(), "long migration"),
    );
    coordinator
        .set_handoff_target(&handle, agent("agent-b"))
        .unwrap();
    coordinator
        .set_tasks(
            &handle,
            vec!["survey schema".into()],
            vec!["rewrite queries".into()],
            Some("rewrite queries".into()),
        )
        .unwrap();
    coordinator
        .record_decision(&handle, "batch by table", "keeps locks short")
        .unwrap();

    // A key accessed three times survives into COOL at session close, so
    // the successor can still fetch it lazily.
    coordinator
        .ingest(
            &handle,
            entry_key("notes/keep"),
            payload_of_tokens(2_000),
            EntryOrigin::Discovery,
        )
        .unwrap();
    let store = coordinator.tier_store();
    store.get(&entry_key("notes/keep")).unwrap().unwrap();
    store.get(&entry_key("notes/keep")).unwrap().unwrap();

    // One large insert jumps straight past CRITICAL and schedules the
    // background preparation.
    let receipt = coordinator
        .ingest(
            &handle,
            entry_key("notes/bulk"),
            payload_of_tokens(16_000),
            EntryOrigin::Discovery,
        )
        .unwrap();
    assert_eq!(receipt.transition, BudgetTransition::Critical);

    let mut prepared = None;
    wait_for(|| {
        prepared = coordinator.prepared_handoff(&handle).unwrap();
        prepared.is_some()
    });
    let prepared = prepared.unwrap();

    coordinator
        .end(&handle, "handing off", &OpContext::unbounded())
        .unwrap();

    // The wrong agent cannot take the packet.
    let err = coordinator
        .resume(
            prepared.packet_id,
            agent("agent-c"),
            &prepared.access_token,
            &OpContext::unbounded(),
        )
        .unwrap_err();
    assert_eq!(err, FastbandError::Unauthorized);

    let resumed = coordinator
        .resume(
            prepared.packet_id,
            agent("agent-b"),
            &prepared.access_token,
            &OpContext::unbounded(),
        )
        .unwrap();

    // The rehydrated context landed in HOT and is budget-accounted.
    let state = coordinator.budget_state(&resumed).unwrap();
    assert!(state.used > 0);

    // Warm references stay lazy and still resolve after the source closed.
    let entry = coordinator
        .fetch_reference(&resumed, &entry_key("notes/keep"))
        .unwrap();
    assert_eq!(entry.token_cost, 2_000);

    // Accept deleted the packet.
    assert!(coordinator.handoff_list(Some(&ticket)).unwrap().is_empty());
}

// ============================================================================
// Audit trail
// ============================================================================

#[test]
fn audit_trail_covers_durable_operations() {
    let (coordinator, audit, _dir) = make_coordinator();
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket_id("T-9"), "audited work"),
    );
    coordinator
        .ingest(
            &handle,
            entry_key("notes/a"),
            payload_of_tokens(100),
            EntryOrigin::Ticket,
        )
        .unwrap();
    coordinator
        .end(&handle, "done", &OpContext::unbounded())
        .unwrap();

    let kinds: Vec<AuditKind> = audit.records().unwrap().iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&AuditKind::SessionBegin));
    assert!(kinds.contains(&AuditKind::OpsAppend));
    assert!(kinds.contains(&AuditKind::Ingest));
    assert!(kinds.contains(&AuditKind::SessionEnd));
}

// ============================================================================
// Bible loading through the facade
// ============================================================================

#[test]
fn bible_sections_load_into_working_memory() {
    let (coordinator, _audit, _dir) = make_coordinator();
    let handle = begin(
        &coordinator,
        "agent-a",
        Ticket::new(ticket_id("T-10"), "reference-heavy work"),
    );

    let summary = coordinator.bible_bootstrap().unwrap();
    assert!(summary.contains("conventions"));

    let entry = coordinator
        .load_bible_section(&handle, "conventions")
        .unwrap();
    assert_eq!(entry.tier, fastband_core::MemoryTier::Hot);
    assert_eq!(
        coordinator.budget_state(&handle).unwrap().used,
        entry.token_cost
    );

    let err = coordinator
        .load_bible_section(&handle, "../escape")
        .unwrap_err();
    assert!(matches!(err, FastbandError::PathEscape { .. }));
}
