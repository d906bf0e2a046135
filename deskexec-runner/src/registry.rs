//! Process registry: the single shared map from execution id to the
//! handles needed to stop a running command.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{ExecError, ExecResult};
use crate::process::ChildTerminator;

/// Unique token identifying one launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl FromStr for ExecutionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.trim()))
    }
}

/// Read-only view of a registered execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: ExecutionId,
    pub command: String,
    pub working_dir: PathBuf,
    pub pid: Option<u32>,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
}

impl ExecutionInfo {
    pub fn new(
        id: ExecutionId,
        command: impl Into<String>,
        working_dir: PathBuf,
        pid: Option<u32>,
    ) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            id,
            command: command.into(),
            working_dir,
            pid,
            started_at,
        }
    }
}

/// Registry entry. Exists exactly while its process is alive or pending
/// termination; dropping it disarms the timeout timer.
pub struct ExecutionRecord {
    info: ExecutionInfo,
    terminator: Arc<dyn ChildTerminator>,
    timer: Option<AbortHandle>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl fmt::Debug for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRecord")
            .field("info", &self.info)
            .field("timer_armed", &self.timer.is_some())
            .finish()
    }
}

impl ExecutionRecord {
    /// `cancel_tx` notifies the execution's supervisor of an explicit cancel.
    /// It is dropped unsent on every other eviction path.
    pub fn new(
        info: ExecutionInfo,
        terminator: Arc<dyn ChildTerminator>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            info,
            terminator,
            timer: None,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn info(&self) -> &ExecutionInfo {
        &self.info
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ExecutionRecord {
    fn drop(&mut self) {
        self.clear_timer();
    }
}

/// Concurrent map of running executions.
///
/// Cloning yields another handle to the same map. Every mutation happens
/// under one lock that is never held across an `.await` or a signal send.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    records: Arc<Mutex<HashMap<ExecutionId, ExecutionRecord>>>,
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ExecutionRecord) {
        let id = record.info.id.clone();
        let previous = self.records.lock().insert(id.clone(), record);
        if previous.is_some() {
            tracing::warn!(execution_id = %id, "replaced an existing registry entry");
        }
    }

    /// Attach the timeout timer to a registered execution. If the entry is
    /// already gone the timer is aborted on the spot.
    pub fn arm_timer(&self, id: &ExecutionId, timer: AbortHandle) {
        let mut records = self.records.lock();
        match records.get_mut(id) {
            Some(record) => {
                record.clear_timer();
                record.timer = Some(timer);
            }
            None => timer.abort(),
        }
    }

    pub fn lookup(&self, id: &ExecutionId) -> Option<ExecutionInfo> {
        self.records.lock().get(id).map(|record| record.info.clone())
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.records.lock().contains_key(id)
    }

    /// Remove an entry. Absent ids are a no-op.
    pub fn evict(&self, id: &ExecutionId) -> Option<ExecutionRecord> {
        let record = self.records.lock().remove(id);
        if record.is_some() {
            tracing::debug!(execution_id = %id, "evicted execution");
        }
        record
    }

    /// Explicit cancel: evict, notify the supervisor, signal the process and
    /// disarm the timer.
    pub fn cancel(&self, id: &ExecutionId) -> ExecResult<ExecutionInfo> {
        let mut record = {
            let mut records = self.records.lock();
            let mut record = records
                .remove(id)
                .ok_or_else(|| ExecError::NotFound(id.clone()))?;
            // Sent under the lock: a supervisor that fails to evict this id
            // is then guaranteed to observe the cancel.
            if let Some(cancel_tx) = record.cancel_tx.take()
                && cancel_tx.send(()).is_err()
            {
                tracing::debug!(execution_id = %id, "supervisor already finished");
            }
            record
        };

        tracing::info!(execution_id = %id, command = %record.info.command, "cancelling execution");
        record.terminator.terminate();
        record.clear_timer();
        Ok(record.info.clone())
    }

    /// Timeout path: evict and signal. Returns whether the entry was still
    /// registered.
    pub fn expire(&self, id: &ExecutionId) -> bool {
        let Some(record) = self.evict(id) else {
            return false;
        };
        tracing::warn!(
            execution_id = %id,
            command = %record.info.command,
            "execution timed out; terminating"
        );
        record.terminator.terminate();
        true
    }

    pub fn list(&self) -> Vec<ExecutionInfo> {
        let mut infos: Vec<ExecutionInfo> = self
            .records
            .lock()
            .values()
            .map(|record| record.info.clone())
            .collect();
        infos.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        infos
    }

    /// Terminate and evict everything, e.g. on shutdown.
    pub fn terminate_all(&self) -> usize {
        let drained: Vec<ExecutionRecord> = {
            let mut records = self.records.lock();
            records.drain().map(|(_, record)| record).collect()
        };
        for record in &drained {
            record.terminator.terminate();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
