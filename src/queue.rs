//! Durable write-back queue: a crash-safe JSON-lines spool plus the
//! in-process runtime channel the Governor worker drains. Spool rewrites go
//! through write-to-temp + rename so a crash mid-rewrite can't corrupt the
//! file.

use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{QueueJob, WriteBackPayload};

/// Crash-safe on-disk spool backing the durable queue. Every enqueue is
/// persisted before it is acknowledged to the caller; a job is removed only
/// after its write-back succeeds.
pub struct DurableQueue {
    spool_path: PathBuf,
    backlog: Mutex<Vec<QueueJob>>,
}

impl DurableQueue {
    /// Reads the spool line-by-line at startup; each valid JSON object
    /// becomes a pending job. Malformed lines are skipped.
    pub fn open(spool_path: PathBuf) -> Result<Self> {
        let backlog = if spool_path.exists() {
            let contents = std::fs::read_to_string(&spool_path)?;
            contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| serde_json::from_str::<QueueJob>(line).ok())
                .collect()
        } else {
            Vec::new()
        };
        Ok(DurableQueue {
            spool_path,
            backlog: Mutex::new(backlog),
        })
    }

    /// Wrap `payload` in a job, append to the backlog, and atomically
    /// rewrite the spool before returning.
    pub fn enqueue(&self, payload: WriteBackPayload) -> Result<QueueJob> {
        let job = QueueJob {
            id: uuid::Uuid::new_v4().to_string(),
            ts: chrono::Utc::now().timestamp(),
            payload,
        };
        let mut backlog = self.backlog.lock();
        backlog.push(job.clone());
        self.persist(&backlog)?;
        Ok(job)
    }

    /// Snapshot of every job not yet marked done.
    pub fn pending(&self) -> Vec<QueueJob> {
        self.backlog.lock().clone()
    }

    /// Remove `job_id` from the backlog and rewrite the spool.
    pub fn mark_done(&self, job_id: &str) -> Result<()> {
        let mut backlog = self.backlog.lock();
        backlog.retain(|job| job.id != job_id);
        self.persist(&backlog)
    }

    fn persist(&self, backlog: &[QueueJob]) -> Result<()> {
        if let Some(parent) = self.spool_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut body = String::new();
        for job in backlog {
            body.push_str(&serde_json::to_string(job)?);
            body.push('\n');
        }
        let tmp_path = self.spool_path.with_extension("spool.tmp");
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &self.spool_path)?;
        Ok(())
    }
}

/// Handle for pushing jobs onto the in-process cooperative queue the
/// write-back worker drains. Cheap to clone (wraps an unbounded
/// `mpsc::UnboundedSender`), so every HTTP handler that enqueues a memory
/// can hold its own copy.
#[derive(Clone)]
pub struct RuntimeQueue {
    sender: mpsc::UnboundedSender<QueueJob>,
}

impl RuntimeQueue {
    pub fn push(&self, job: QueueJob) {
        // The receiver only drops when the worker task ends at shutdown;
        // a send error here just means the process is already stopping.
        let _ = self.sender.send(job);
    }
}

/// The consuming half, moved into the worker task at spawn time. Not
/// `Clone` — there is exactly one worker.
pub struct RuntimeQueueReceiver {
    receiver: mpsc::UnboundedReceiver<QueueJob>,
}

impl RuntimeQueueReceiver {
    pub async fn recv(&mut self) -> Option<QueueJob> {
        self.receiver.recv().await
    }
}

/// Create the runtime queue's sender/receiver pair.
pub fn runtime_queue() -> (RuntimeQueue, RuntimeQueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (RuntimeQueue { sender }, RuntimeQueueReceiver { receiver })
}
