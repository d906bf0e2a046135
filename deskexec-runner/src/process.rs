//! Termination strategies for launched processes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::process_group::{KillSignal, ProcessGroup};

/// Trait for process termination strategies.
///
/// The registry only ever talks to a running process through this seam.
pub trait ChildTerminator: Send + Sync {
    /// Ask the process to stop, escalating to a forced kill if it lingers.
    fn terminate(&self);

    /// Stop the process immediately.
    fn kill(&self);
}

/// Signals the process group of a piped child.
///
/// `terminate` sends SIGTERM and, unless the group is gone after the grace
/// period, SIGKILL. Escalation is scheduled at most once.
pub struct ProcessGroupTerminator {
    group: ProcessGroup,
    grace: Duration,
    escalation_scheduled: AtomicBool,
}

impl fmt::Debug for ProcessGroupTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroupTerminator")
            .field("process_group_id", &self.group.id())
            .field("grace", &self.grace)
            .finish()
    }
}

impl ProcessGroupTerminator {
    pub fn new(process_group_id: u32, grace: Duration) -> Self {
        Self {
            group: ProcessGroup::new(process_group_id),
            grace,
            escalation_scheduled: AtomicBool::new(false),
        }
    }

    pub fn process_group_id(&self) -> u32 {
        self.group.id()
    }

    fn signal(&self, signal: KillSignal) {
        if let Err(error) = self.group.signal(signal) {
            tracing::warn!(
                pgid = self.group.id(),
                ?signal,
                %error,
                "failed to signal process group"
            );
        }
    }
}

impl ChildTerminator for ProcessGroupTerminator {
    fn terminate(&self) {
        self.signal(KillSignal::Term);

        if self.escalation_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let group = self.group;
        let grace = self.grace;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if group.is_alive() {
                        let pgid = group.id();
                        tracing::debug!(pgid, "process group ignored SIGTERM; sending SIGKILL");
                        if let Err(error) = group.signal(KillSignal::Kill) {
                            tracing::warn!(pgid, %error, "failed to kill process group");
                        }
                    }
                });
            }
            Err(_) => self.signal(KillSignal::Kill),
        }
    }

    fn kill(&self) {
        self.signal(KillSignal::Kill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_includes_group() {
        let terminator = ProcessGroupTerminator::new(2_000_000_000, Duration::from_millis(10));
        let debug = format!("{terminator:?}");
        assert!(debug.contains("2000000000"));
    }

    #[tokio::test]
    async fn terminating_a_missing_group_does_not_panic() {
        let terminator = ProcessGroupTerminator::new(2_000_000_000, Duration::from_millis(10));
        terminator.terminate();
        terminator.terminate();
        terminator.kill();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(terminator.process_group_id(), 2_000_000_000);
    }
}
