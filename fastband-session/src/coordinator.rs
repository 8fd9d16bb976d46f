//! The session coordinator
//!
//! Sole owner of the tier store, the handoff manager, and the ops log;
//! sessions hold non-owning handles. Within one session, operations are
//! totally ordered through the per-session lock; across sessions the only
//! ordering is the ops log.

use crate::worker::{PrepareWorker, ReceiptSlot};
use crate::Ticket;
use fastband_budget::{BudgetLimits, BudgetManager, BudgetState};
use fastband_core::{
    AgentName, AuditKind, AuditRecord, AuditSink, BudgetTier, BudgetTransition, EntityIdType,
    EntryKey, EntryOrigin, FastbandConfig, FastbandError, FastbandResult, MemoryTier, OpContext,
    PacketId, Payload, SessionId, TicketId, TokenMeter,
};
use fastband_handoff::{
    HandoffManager, KeyDecision, MemoryPacketStore, PacketMeta, PacketReceipt, PacketStore,
    SessionSnapshot,
};
use fastband_memory::{BibleLoader, Evicted, MemoryEntry, TierStats, TierStore};
use fastband_opslog::{
    ActiveAgent, Directive, LogStore, MemoryLogStore, NewOpsEntry, OpsLog, DEFAULT_ACTIVE_WINDOW,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Character bound on the condensed hot context carried in a packet.
const CONDENSED_CONTEXT_CHARS: usize = 8_000;

// ============================================================================
// HANDLE AND RECEIPTS
// ============================================================================

/// Non-owning handle to a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub agent_id: AgentName,
}

/// Result of one accepted ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Measured token cost of the payload.
    pub tokens: u32,
    /// Edge transition this ingest produced, if any.
    pub transition: BudgetTransition,
}

// ============================================================================
// SESSION STATE
// ============================================================================

struct SessionState {
    agent_id: AgentName,
    ticket: Ticket,
    budget: BudgetManager,
    completed_tasks: Vec<String>,
    pending_tasks: Vec<String>,
    current_task: Option<String>,
    files_modified: BTreeSet<String>,
    key_decisions: Vec<KeyDecision>,
    /// Keys this session ingested, in order; feeds the packet snapshot.
    recent_keys: Vec<EntryKey>,
    /// Keys a resumed session may fetch lazily.
    warm_references: Vec<EntryKey>,
    handoff_target: Option<AgentName>,
    prepare_scheduled: bool,
    /// Filled by the background worker once a packet is stored.
    prepared: ReceiptSlot,
}

// ============================================================================
// SESSION COORDINATOR
// ============================================================================

/// Glues the meter, tier store, budget manager, handoff manager, and ops log
/// behind a per-session facade.
pub struct SessionCoordinator {
    config: FastbandConfig,
    meter: Arc<dyn TokenMeter>,
    store: Arc<TierStore>,
    bible: BibleLoader,
    handoffs: Arc<HandoffManager>,
    ops: Arc<OpsLog>,
    audit: Arc<dyn AuditSink>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
    worker: PrepareWorker,
}

impl SessionCoordinator {
    /// Create a coordinator with in-memory packet and log stores.
    pub fn new(
        config: FastbandConfig,
        meter: Arc<dyn TokenMeter>,
        audit: Arc<dyn AuditSink>,
    ) -> FastbandResult<Self> {
        Self::with_stores(
            config,
            meter,
            audit,
            Box::new(MemoryPacketStore::new()),
            Box::new(MemoryLogStore::new()),
        )
    }

    /// Create a coordinator over caller-supplied durable stores.
    pub fn with_stores(
        config: FastbandConfig,
        meter: Arc<dyn TokenMeter>,
        audit: Arc<dyn AuditSink>,
        packets: Box<dyn PacketStore>,
        log: Box<dyn LogStore>,
    ) -> FastbandResult<Self> {
        config.validate()?;
        let store = Arc::new(TierStore::from_config(&config));
        let bible = BibleLoader::new(
            config.bible_root.clone(),
            config.bible_summary_tokens,
            Arc::clone(&meter),
            Arc::clone(&store),
        );
        let handoffs = Arc::new(HandoffManager::new(
            &config.signing_key,
            config.handoff_retention,
            packets,
            Arc::clone(&audit),
        ));
        let ops = Arc::new(OpsLog::new(log, Arc::clone(&audit)));
        let worker = PrepareWorker::spawn(Arc::clone(&handoffs));

        Ok(Self {
            config,
            meter,
            store,
            bible,
            handoffs,
            ops,
            audit,
            sessions: RwLock::new(HashMap::new()),
            worker,
        })
    }

    // ------------------------------------------------------------------
    // session lifecycle
    // ------------------------------------------------------------------

    /// Begin a session: ops-log admission first, then budget placement from
    /// the ticket's tags and flags.
    pub fn begin(
        &self,
        session_id: SessionId,
        agent_id: AgentName,
        ticket: Ticket,
        ctx: &OpContext,
    ) -> FastbandResult<SessionHandle> {
        ctx.check()?;
        self.ops.admit(&agent_id, &ticket.id)?;

        let budget = BudgetManager::for_ticket(
            BudgetLimits::from_config(&self.config),
            &ticket.tags,
            ticket.flags.budget_override,
        );

        {
            let mut sessions = self.write_sessions()?;
            if sessions.contains_key(&session_id) {
                return Err(FastbandError::Conflict {
                    resource: format!("session {session_id}"),
                });
            }
            sessions.insert(
                session_id,
                Arc::new(Mutex::new(SessionState {
                    agent_id: agent_id.clone(),
                    ticket: ticket.clone(),
                    budget,
                    completed_tasks: Vec::new(),
                    pending_tasks: Vec::new(),
                    current_task: None,
                    files_modified: BTreeSet::new(),
                    key_decisions: Vec::new(),
                    recent_keys: Vec::new(),
                    warm_references: Vec::new(),
                    handoff_target: None,
                    prepare_scheduled: false,
                    prepared: ReceiptSlot::default(),
                })),
            );
        }

        let recorded = self
            .ops
            .append(
                NewOpsEntry::activity(
                    agent_id.clone(),
                    Some(ticket.id.clone()),
                    "session started",
                ),
                ctx,
            )
            .and_then(|_| {
                self.audit.record(AuditRecord::success(
                    agent_id.as_str(),
                    AuditKind::SessionBegin,
                    session_id.to_string(),
                    format!("ticket {}", ticket.id),
                ))
            });
        if let Err(err) = recorded {
            // Roll the registration back so a retry does not hit `conflict`.
            self.write_sessions()?.remove(&session_id);
            return Err(err);
        }

        Ok(SessionHandle {
            session_id,
            agent_id,
        })
    }

    /// Ingest a payload into the session's working memory.
    ///
    /// Sizes the payload, inserts it into HOT, and updates the budget. A
    /// WARN edge schedules exactly one background packet preparation; once
    /// CRITICAL has fired, further ingest is refused with
    /// `handoff_required`. Never blocks on packet storage.
    pub fn ingest(
        &self,
        handle: &SessionHandle,
        key: EntryKey,
        payload: Payload,
        origin: EntryOrigin,
    ) -> FastbandResult<IngestReceipt> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;

        if state.budget.state().critical_fired {
            self.ensure_prepare(handle.session_id, &mut state);
            return Err(FastbandError::HandoffRequired {
                session: handle.session_id,
            });
        }

        let tokens = self.meter.size(&payload);
        let max_cap = BudgetTier::Maximum.cap(
            self.config.working_memory_default,
            self.config.working_memory_max,
        );
        if tokens > max_cap {
            return Err(FastbandError::TooLarge {
                tokens,
                cap: max_cap,
            });
        }

        if state.budget.would_overflow(tokens) {
            self.ensure_prepare(handle.session_id, &mut state);
            return Err(FastbandError::HandoffRequired {
                session: handle.session_id,
            });
        }

        let receipt = self.store.put(
            key.clone(),
            payload,
            MemoryTier::Hot,
            tokens,
            origin,
            Some(handle.session_id),
        )?;
        for evicted in &receipt.displaced {
            if evicted.owner == Some(handle.session_id) && evicted.from == MemoryTier::Hot {
                state.budget.on_remove(evicted.token_cost);
            }
        }

        let transition = state.budget.on_insert(tokens);
        state.recent_keys.retain(|k| k != &key);
        state.recent_keys.push(key);

        if matches!(
            transition,
            BudgetTransition::Warn | BudgetTransition::Critical
        ) {
            self.ensure_prepare(handle.session_id, &mut state);
        }

        self.audit_best_effort(AuditRecord::success(
            handle.agent_id.as_str(),
            AuditKind::Ingest,
            handle.session_id.to_string(),
            format!("{tokens} tokens ({transition})"),
        ));

        Ok(IngestReceipt { tokens, transition })
    }

    /// Resume from a stored handoff packet.
    ///
    /// Blocks until the accept completes or the deadline expires. The new
    /// session's HOT is rehydrated from the packet's condensed context;
    /// warm references stay lazy.
    pub fn resume(
        &self,
        packet_id: PacketId,
        agent_id: AgentName,
        presented_token: &str,
        ctx: &OpContext,
    ) -> FastbandResult<SessionHandle> {
        ctx.check()?;

        // Admission is checked before the single-use accept so a denied
        // agent does not burn the packet.
        let directive = self.ops.current_directive()?;
        if !directive.status.admits() {
            return Err(FastbandError::Denied {
                reason: format!("workspace is {}: {}", directive.status, directive.reason),
                since_sequence: directive.since_sequence,
            });
        }

        let packet = self
            .handoffs
            .accept(packet_id, &agent_id, presented_token, ctx)?;

        let session_id = SessionId::now_v7();
        let mut budget = BudgetManager::for_ticket(
            BudgetLimits::from_config(&self.config),
            &[],
            false,
        );

        let context_key = EntryKey::new(format!("handoff/{packet_id}/context"))
            .map_err(|e| FastbandError::malformed("packet_id", e.to_string()))?;
        let tokens = self.meter.size_text(&packet.hot_context);
        self.store.put(
            context_key.clone(),
            Payload::Text(packet.hot_context.clone()),
            MemoryTier::Hot,
            tokens,
            EntryOrigin::HandoffRehydrate,
            Some(session_id),
        )?;
        budget.on_insert(tokens);

        let ticket = Ticket::new(packet.ticket_id.clone(), packet.ticket_summary.clone());
        self.write_sessions()?.insert(
            session_id,
            Arc::new(Mutex::new(SessionState {
                agent_id: agent_id.clone(),
                ticket: ticket.clone(),
                budget,
                completed_tasks: packet.completed_tasks.clone(),
                pending_tasks: packet.pending_tasks.clone(),
                current_task: packet.current_task.clone(),
                files_modified: packet.files_modified.clone(),
                key_decisions: packet.key_decisions.clone(),
                recent_keys: vec![context_key],
                warm_references: packet.warm_references.clone(),
                handoff_target: None,
                prepare_scheduled: false,
                prepared: ReceiptSlot::default(),
            })),
        );

        self.ops.append(
            NewOpsEntry::activity(
                agent_id.clone(),
                Some(ticket.id.clone()),
                format!("session resumed from handoff {packet_id}"),
            ),
            ctx,
        )?;
        self.audit.record(AuditRecord::success(
            agent_id.as_str(),
            AuditKind::SessionBegin,
            session_id.to_string(),
            format!("resumed from packet {packet_id}"),
        ))?;

        debug!(session = %session_id, packet = %packet_id, "session resumed");
        Ok(SessionHandle {
            session_id,
            agent_id,
        })
    }

    /// End a session: drain its working memory and record the close.
    ///
    /// Returns the drain report (HOT entries pass through WARM; survivors
    /// move to COOL, the rest are discarded).
    pub fn end(
        &self,
        handle: &SessionHandle,
        reason: &str,
        ctx: &OpContext,
    ) -> FastbandResult<Vec<Evicted>> {
        ctx.check()?;
        let Some(session) = self.write_sessions()?.remove(&handle.session_id) else {
            return Err(FastbandError::NotFound {
                resource: format!("session {}", handle.session_id),
            });
        };
        let ticket_id = lock_session(&session)?.ticket.id.clone();

        let drained = self.store.close_session(handle.session_id)?;

        self.ops.append(
            NewOpsEntry::activity(
                handle.agent_id.clone(),
                Some(ticket_id),
                format!("session ended: {reason}"),
            ),
            ctx,
        )?;
        self.audit.record(AuditRecord::success(
            handle.agent_id.as_str(),
            AuditKind::SessionEnd,
            handle.session_id.to_string(),
            reason,
        ))?;

        Ok(drained)
    }

    // ------------------------------------------------------------------
    // session progress reporting
    // ------------------------------------------------------------------

    /// Report the session's files-modified count. May escalate the budget.
    pub fn record_files_modified(
        &self,
        handle: &SessionHandle,
        count: u32,
    ) -> FastbandResult<BudgetTransition> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        let transition = state.budget.record_files_modified(count);
        if transition == BudgetTransition::Escalated {
            self.audit_best_effort(AuditRecord::success(
                handle.agent_id.as_str(),
                AuditKind::BudgetEscalation,
                handle.session_id.to_string(),
                format!("files_modified {count}"),
            ));
        }
        Ok(transition)
    }

    /// Report one retry. May escalate the budget.
    pub fn record_retry(&self, handle: &SessionHandle) -> FastbandResult<BudgetTransition> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        let transition = state.budget.record_retry();
        if transition == BudgetTransition::Escalated {
            self.audit_best_effort(AuditRecord::success(
                handle.agent_id.as_str(),
                AuditKind::BudgetEscalation,
                handle.session_id.to_string(),
                "retries",
            ));
        }
        Ok(transition)
    }

    /// Record a decision for the handoff trail.
    pub fn record_decision(
        &self,
        handle: &SessionHandle,
        what: impl Into<String>,
        why: impl Into<String>,
    ) -> FastbandResult<()> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        state.key_decisions.push(KeyDecision {
            when: chrono::Utc::now(),
            what: what.into(),
            why: why.into(),
        });
        Ok(())
    }

    /// Replace the session's task bookkeeping.
    pub fn set_tasks(
        &self,
        handle: &SessionHandle,
        completed: Vec<String>,
        pending: Vec<String>,
        current: Option<String>,
    ) -> FastbandResult<()> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        state.completed_tasks = completed;
        state.pending_tasks = pending;
        state.current_task = current;
        Ok(())
    }

    /// Note a file the session modified.
    pub fn note_file_modified(
        &self,
        handle: &SessionHandle,
        path: impl Into<String>,
    ) -> FastbandResult<BudgetTransition> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        state.files_modified.insert(path.into());
        let count = state.files_modified.len() as u32;
        Ok(state.budget.record_files_modified(count))
    }

    /// Direct a future handoff packet at a specific agent.
    pub fn set_handoff_target(
        &self,
        handle: &SessionHandle,
        target: AgentName,
    ) -> FastbandResult<()> {
        let session = self.session(handle.session_id)?;
        lock_session(&session)?.handoff_target = Some(target);
        Ok(())
    }

    // ------------------------------------------------------------------
    // memory access
    // ------------------------------------------------------------------

    /// Lazily fetch a warm reference carried over by a resume.
    pub fn fetch_reference(
        &self,
        handle: &SessionHandle,
        key: &EntryKey,
    ) -> FastbandResult<MemoryEntry> {
        let session = self.session(handle.session_id)?;
        let known = lock_session(&session)?.warm_references.contains(key);
        if !known {
            return Err(FastbandError::NotFound {
                resource: format!("warm reference {key}"),
            });
        }
        self.store.get(key)?.ok_or_else(|| FastbandError::NotFound {
            resource: format!("warm reference {key}"),
        })
    }

    /// Load a bible section into the session's working memory.
    pub fn load_bible_section(
        &self,
        handle: &SessionHandle,
        id: &str,
    ) -> FastbandResult<MemoryEntry> {
        let session = self.session(handle.session_id)?;
        let mut state = lock_session(&session)?;
        if state.budget.state().critical_fired {
            return Err(FastbandError::HandoffRequired {
                session: handle.session_id,
            });
        }

        let entry = self.bible.load_section(id, Some(handle.session_id))?;
        let transition = state.budget.on_insert(entry.token_cost);
        state.recent_keys.retain(|k| k != &entry.key);
        state.recent_keys.push(entry.key.clone());
        if matches!(
            transition,
            BudgetTransition::Warn | BudgetTransition::Critical
        ) {
            self.ensure_prepare(handle.session_id, &mut state);
        }

        self.audit_best_effort(AuditRecord::success(
            handle.agent_id.as_str(),
            AuditKind::BibleLoad,
            id,
            format!("{} tokens", entry.token_cost),
        ));
        Ok(entry)
    }

    /// The bootstrap section summary.
    pub fn bible_bootstrap(&self) -> FastbandResult<String> {
        self.bible.bootstrap()
    }

    // ------------------------------------------------------------------
    // facade queries
    // ------------------------------------------------------------------

    /// Budget state of a live session.
    pub fn budget_state(&self, handle: &SessionHandle) -> FastbandResult<BudgetState> {
        let session = self.session(handle.session_id)?;
        let state = lock_session(&session)?;
        Ok(state.budget.state())
    }

    /// The receipt of this session's background-prepared packet, if the
    /// worker has stored one. The source agent forwards the token out of
    /// band; listings never disclose it.
    pub fn prepared_handoff(&self, handle: &SessionHandle) -> FastbandResult<Option<PacketReceipt>> {
        let session = self.session(handle.session_id)?;
        let slot = Arc::clone(&lock_session(&session)?.prepared);
        let receipt = slot
            .lock()
            .map_err(|_| FastbandError::unavailable("receipt slot poisoned"))?
            .clone();
        Ok(receipt)
    }

    /// Per-tier memory usage.
    pub fn memory_stats(&self) -> FastbandResult<TierStats> {
        self.store.stats()
    }

    /// Handoff packet metadata, optionally filtered by ticket.
    pub fn handoff_list(&self, ticket: Option<&TicketId>) -> FastbandResult<Vec<PacketMeta>> {
        self.handoffs.list(ticket)
    }

    /// The workspace's current derived directive.
    pub fn directive(&self) -> FastbandResult<Directive> {
        self.ops.current_directive()
    }

    /// Recently active agents.
    pub fn active_agents(&self) -> FastbandResult<Vec<ActiveAgent>> {
        self.ops.check_active_agents(DEFAULT_ACTIVE_WINDOW)
    }

    /// The workspace handoff manager.
    pub fn handoffs(&self) -> Arc<HandoffManager> {
        Arc::clone(&self.handoffs)
    }

    /// The workspace ops log.
    pub fn ops_log(&self) -> Arc<OpsLog> {
        Arc::clone(&self.ops)
    }

    /// The workspace tier store.
    pub fn tier_store(&self) -> Arc<TierStore> {
        Arc::clone(&self.store)
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn session(&self, session_id: SessionId) -> FastbandResult<Arc<Mutex<SessionState>>> {
        self.sessions
            .read()
            .map_err(|_| FastbandError::unavailable("session table lock poisoned"))?
            .get(&session_id)
            .cloned()
            .ok_or_else(|| FastbandError::NotFound {
                resource: format!("session {session_id}"),
            })
    }

    fn write_sessions(
        &self,
    ) -> FastbandResult<std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<Mutex<SessionState>>>>>
    {
        self.sessions
            .write()
            .map_err(|_| FastbandError::unavailable("session table lock poisoned"))
    }

    /// Schedule exactly one background preparation for this session.
    fn ensure_prepare(&self, session_id: SessionId, state: &mut SessionState) {
        if state.prepare_scheduled {
            return;
        }
        state.prepare_scheduled = true;
        let snapshot = self.build_snapshot(session_id, state);
        self.worker.submit(snapshot, Arc::clone(&state.prepared));
        debug!(session = %session_id, "handoff preparation scheduled");
    }

    fn build_snapshot(&self, session_id: SessionId, state: &SessionState) -> SessionSnapshot {
        let budget = state.budget.state();
        SessionSnapshot {
            source_agent: state.agent_id.clone(),
            source_session: session_id,
            target_agent: state.handoff_target.clone(),
            ticket_id: state.ticket.id.clone(),
            ticket_summary: state.ticket.summary.clone(),
            completed_tasks: state.completed_tasks.clone(),
            pending_tasks: state.pending_tasks.clone(),
            current_task: state.current_task.clone(),
            files_modified: state.files_modified.clone(),
            key_decisions: state.key_decisions.clone(),
            hot_context: self.condense_hot_context(&state.recent_keys),
            warm_references: state.recent_keys.clone(),
            budget_used: budget.used,
            budget_peak: budget.peak,
            expansion_count: budget.expansion_count,
        }
    }

    /// Condense the session's text entries into a bounded transfer context.
    fn condense_hot_context(&self, keys: &[EntryKey]) -> String {
        let mut parts = Vec::new();
        for key in keys {
            if let Ok(Some(entry)) = self.store.peek(key) {
                if let Some(text) = entry.payload.as_text() {
                    parts.push(format!("[{key}]\n{text}"));
                }
            }
        }
        let joined = parts.join("\n\n");
        safe_truncate(&joined, CONDENSED_CONTEXT_CHARS).to_string()
    }

    fn audit_best_effort(&self, record: AuditRecord) {
        if let Err(err) = self.audit.record(record) {
            warn!(error = %err, "audit sink refused a non-durable record");
        }
    }
}

/// Truncate at a UTF-8 boundary.
fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn lock_session(
    session: &Arc<Mutex<SessionState>>,
) -> FastbandResult<std::sync::MutexGuard<'_, SessionState>> {
    session
        .lock()
        .map_err(|_| FastbandError::unavailable("session lock poisoned"))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fastband_core::{FallbackMeter, MemoryAuditSink};

    fn make_coordinator() -> (SessionCoordinator, Arc<MemoryAuditSink>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(MemoryAuditSink::new());
        let config = FastbandConfig::for_workspace(dir.path(), vec![9u8; 32]);
        let coordinator =
            SessionCoordinator::new(config, Arc::new(FallbackMeter), audit.clone()).unwrap();
        (coordinator, audit, dir)
    }

    fn agent(name: &str) -> AgentName {
        AgentName::new(name).unwrap()
    }

    fn ticket(id: &str) -> Ticket {
        Ticket::new(TicketId::new(id).unwrap(), "work the ticket")
    }

    fn text_of_tokens(tokens: u32) -> Payload {
        // The fallback meter sizes text at exactly bytes / 4.
        Payload::Text("x".repeat(tokens as usize * 4))
    }

    #[test]
    fn test_begin_ingest_end_flow() {
        let (coordinator, _audit, _dir) = make_coordinator();
        let handle = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-a"),
                ticket("T-1"),
                &OpContext::unbounded(),
            )
            .unwrap();

        let receipt = coordinator
            .ingest(
                &handle,
                EntryKey::new("notes/first").unwrap(),
                Payload::Text("a small note".into()),
                EntryOrigin::Discovery,
            )
            .unwrap();
        assert!(receipt.tokens > 0);
        assert_eq!(receipt.transition, BudgetTransition::None);

        let drained = coordinator
            .end(&handle, "done", &OpContext::unbounded())
            .unwrap();
        assert!(!drained.is_empty());

        // The session is gone afterwards.
        let err = coordinator
            .ingest(
                &handle,
                EntryKey::new("notes/late").unwrap(),
                Payload::Text("too late".into()),
                EntryOrigin::Discovery,
            )
            .unwrap_err();
        assert!(matches!(err, FastbandError::NotFound { .. }));
    }

    #[test]
    fn test_begin_denied_under_hold() {
        let (coordinator, _audit, _dir) = make_coordinator();
        coordinator
            .ops_log()
            .hold(agent("ops"), "maintenance", &OpContext::unbounded())
            .unwrap();

        let err = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-a"),
                ticket("T-1"),
                &OpContext::unbounded(),
            )
            .unwrap_err();
        assert!(matches!(err, FastbandError::Denied { .. }));
    }

    #[test]
    fn test_duplicate_session_id_conflicts() {
        let (coordinator, _audit, _dir) = make_coordinator();
        let id = SessionId::now_v7();
        coordinator
            .begin(id, agent("agent-a"), ticket("T-1"), &OpContext::unbounded())
            .unwrap();
        let err = coordinator
            .begin(id, agent("agent-b"), ticket("T-2"), &OpContext::unbounded())
            .unwrap_err();
        assert!(matches!(err, FastbandError::Conflict { .. }));
    }

    #[test]
    fn test_too_large_payload_rejected() {
        let (coordinator, _audit, _dir) = make_coordinator();
        let handle = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-a"),
                ticket("T-1"),
                &OpContext::unbounded(),
            )
            .unwrap();

        let err = coordinator
            .ingest(
                &handle,
                EntryKey::new("huge").unwrap(),
                text_of_tokens(90_000),
                EntryOrigin::Discovery,
            )
            .unwrap_err();
        assert!(matches!(err, FastbandError::TooLarge { .. }));
    }

    #[test]
    fn test_session_ids_stay_isolated() {
        let (coordinator, _audit, _dir) = make_coordinator();
        let a = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-a"),
                ticket("T-1"),
                &OpContext::unbounded(),
            )
            .unwrap();
        let b = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-b"),
                ticket("T-2"),
                &OpContext::unbounded(),
            )
            .unwrap();

        coordinator
            .ingest(
                &a,
                EntryKey::new("a/one").unwrap(),
                text_of_tokens(5_000),
                EntryOrigin::Discovery,
            )
            .unwrap();

        assert_eq!(coordinator.budget_state(&a).unwrap().used, 5_000);
        assert_eq!(coordinator.budget_state(&b).unwrap().used, 0);
    }

    #[test]
    fn test_active_agents_reflect_session_activity() {
        let (coordinator, _audit, _dir) = make_coordinator();
        let handle = coordinator
            .begin(
                SessionId::now_v7(),
                agent("agent-a"),
                ticket("T-1"),
                &OpContext::unbounded(),
            )
            .unwrap();
        coordinator
            .end(&handle, "done", &OpContext::unbounded())
            .unwrap();

        let agents = coordinator.active_agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_id, agent("agent-a"));
        assert!(agents[0].current_action.contains("session ended"));
    }
}
