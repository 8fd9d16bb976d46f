//! Background handoff preparation
//!
//! WARN-triggered preparation runs on a worker thread with a deadline, so
//! `ingest` never blocks on packet storage. No async keywords leak into any
//! interface contract.

use fastband_core::OpContext;
use fastband_handoff::{HandoffManager, PacketReceipt, SessionSnapshot};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How long a background preparation may take before it is cancelled.
const PREPARE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a finished preparation leaves its receipt. The source agent reads
/// it through the coordinator and forwards the token out of band.
pub(crate) type ReceiptSlot = Arc<Mutex<Option<PacketReceipt>>>;

struct PrepareJob {
    snapshot: SessionSnapshot,
    slot: ReceiptSlot,
    deadline: Instant,
}

/// Worker pool (of one) draining preparation jobs.
pub(crate) struct PrepareWorker {
    tx: Option<mpsc::Sender<PrepareJob>>,
    handle: Option<JoinHandle<()>>,
}

impl PrepareWorker {
    /// Spawn the worker thread.
    pub(crate) fn spawn(handoffs: Arc<HandoffManager>) -> Self {
        let (tx, rx) = mpsc::channel::<PrepareJob>();
        let handle = std::thread::Builder::new()
            .name("handoff-prepare".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    run_job(&handoffs, job);
                }
            })
            .expect("worker thread spawns");

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Submit a snapshot for preparation. Never blocks.
    pub(crate) fn submit(&self, snapshot: SessionSnapshot, slot: ReceiptSlot) {
        let job = PrepareJob {
            snapshot,
            slot,
            deadline: Instant::now() + PREPARE_TIMEOUT,
        };
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                warn!("prepare worker gone; handoff packet not scheduled");
            }
        }
    }
}

impl Drop for PrepareWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_job(handoffs: &HandoffManager, job: PrepareJob) {
    let ctx = OpContext::with_deadline(job.deadline);
    let session = job.snapshot.source_session;
    let draft = handoffs.prepare(job.snapshot);
    let result = handoffs
        .sanitize(draft)
        .and_then(|clean| handoffs.store(clean, &ctx));

    match result {
        Ok(receipt) => {
            info!(session = %session, packet = %receipt.packet_id, "handoff packet prepared");
            if let Ok(mut slot) = job.slot.lock() {
                *slot = Some(receipt);
            }
        }
        Err(err) => {
            warn!(session = %session, error = %err, "handoff preparation failed");
        }
    }
}
