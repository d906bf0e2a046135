//! Launch pipeline: validate, resolve, spawn, register, supervise.
//!
//! Every execution gets one supervisor task. It owns the child, the pipe
//! receiver and the output sink, and is the only place an execution's
//! stream is closed. Natural exit, timeout, explicit cancel and consumer
//! teardown all end in [`ExecutionCleanup::finish`].

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::pin::pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use deskexec_config::DeskexecConfig;
use deskexec_config::constants::{server, timeouts};
use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{ExecError, ExecResult};
use crate::path_env::augmented_path;
use crate::pipe::{ExecutionContext, SpawnedChild, spawn_piped, spawn_readers};
use crate::policy::{AllowListPolicy, CommandPolicy};
use crate::process::{ChildTerminator, ProcessGroupTerminator};
use crate::registry::{ExecutionId, ExecutionInfo, ExecutionRecord, ProcessRegistry};
use crate::stream::{ChunkSink, OutputStream, Trailer, output_channel};
use crate::workspace::ProjectRoot;

/// Body of a launch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Missing is treated like blank and rejected by the policy.
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A started execution: its id and the only subscription to its output.
#[derive(Debug)]
pub struct Launched {
    pub id: ExecutionId,
    pub stream: OutputStream,
}

/// Starts commands inside the project root and tracks them in a
/// [`ProcessRegistry`].
#[derive(Clone)]
pub struct Launcher {
    policy: Arc<dyn CommandPolicy>,
    root: ProjectRoot,
    path_env: OsString,
    timeout: Option<Duration>,
    kill_grace: Duration,
    buffer_chunks: usize,
    registry: ProcessRegistry,
}

impl fmt::Debug for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Launcher")
            .field("root", &self.root)
            .field("timeout", &self.timeout)
            .field("kill_grace", &self.kill_grace)
            .field("buffer_chunks", &self.buffer_chunks)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    /// A launcher with the host PATH, default timeouts and the given policy.
    pub fn new(policy: Arc<dyn CommandPolicy>, root: ProjectRoot) -> Self {
        Self {
            policy,
            root,
            path_env: std::env::var_os("PATH").unwrap_or_default(),
            timeout: Some(Duration::from_secs(
                timeouts::DEFAULT_EXECUTION_TIMEOUT_SECONDS,
            )),
            kill_grace: Duration::from_millis(timeouts::DEFAULT_KILL_GRACE_MS),
            buffer_chunks: server::DEFAULT_OUTPUT_BUFFER_CHUNKS,
            registry: ProcessRegistry::new(),
        }
    }

    pub fn from_config(config: &DeskexecConfig, project_root: impl AsRef<Path>) -> Self {
        let policy = Arc::new(AllowListPolicy::from_config(&config.commands));
        Self::new(policy, ProjectRoot::new(project_root))
            .with_path_env(augmented_path(&config.commands.resolved_extra_paths()))
            .with_timeout(config.timeouts.execution_timeout())
            .with_kill_grace(config.timeouts.kill_grace())
            .with_buffer_chunks(config.server.output_buffer_chunks)
    }

    pub fn with_path_env(mut self, path_env: OsString) -> Self {
        self.path_env = path_env;
        self
    }

    /// `None` disables the wall-clock limit.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_buffer_chunks(mut self, chunks: usize) -> Self {
        self.buffer_chunks = chunks.max(1);
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn project_root(&self) -> &ProjectRoot {
        &self.root
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Validate and resolve a request without spawning anything.
    pub fn prepare(&self, request: &CommandRequest) -> ExecResult<ExecutionContext> {
        let command = self.policy.validate(&request.command)?;
        let working_dir = self.root.resolve(request.cwd.as_deref())?;
        Ok(ExecutionContext {
            base: command.base,
            args: command.args,
            working_dir,
            path_env: self.path_env.clone(),
        })
    }

    /// Start a command and return its output stream.
    ///
    /// Validation and path errors are returned directly. A process that
    /// cannot be spawned still yields a stream, holding a single
    /// `Error: ...` trailer.
    pub async fn launch(&self, request: &CommandRequest) -> ExecResult<Launched> {
        let context = self.prepare(request)?;
        let id = ExecutionId::generate();
        let (mut sink, stream) = output_channel(self.buffer_chunks);

        let SpawnedChild { mut child, pid } = match spawn_piped(&context) {
            Ok(spawned) => spawned,
            Err(source) => {
                let error = ExecError::Spawn {
                    command: context.base.clone(),
                    source,
                };
                warn!(execution_id = %id, %error, "spawn failed");
                sink.close(&Trailer::Error(error.to_string())).await;
                return Ok(Launched { id, stream });
            }
        };

        let terminator: Arc<dyn ChildTerminator> =
            Arc::new(ProcessGroupTerminator::new(pid, self.kill_grace));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let command_line = context.command_line();
        let info = ExecutionInfo::new(
            id.clone(),
            command_line.clone(),
            context.working_dir.clone(),
            Some(pid),
        );
        self.registry
            .insert(ExecutionRecord::new(info, Arc::clone(&terminator), cancel_tx));

        let (raw_tx, raw_rx) = mpsc::channel(self.buffer_chunks);
        spawn_readers(&mut child, raw_tx);

        info!(
            execution_id = %id,
            command = %command_line,
            cwd = %context.working_dir.display(),
            pid,
            "launched command"
        );

        let supervisor = Supervisor {
            child,
            raw_rx,
            cancel_rx,
            terminator,
            cleanup: ExecutionCleanup::new(id.clone(), self.registry.clone(), sink),
        };
        tokio::spawn(supervisor.run());

        if let Some(timeout) = self.timeout {
            let registry = self.registry.clone();
            let timer_id = id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                registry.expire(&timer_id);
            });
            self.registry.arm_timer(&id, timer.abort_handle());
        }

        Ok(Launched { id, stream })
    }
}

/// How an execution ended, from the supervisor's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Finished(Trailer),
    /// Nobody is reading the output any more.
    Detached,
}

/// The single convergence point for an execution's terminal events.
#[derive(Debug)]
pub struct ExecutionCleanup {
    id: ExecutionId,
    registry: ProcessRegistry,
    sink: ChunkSink,
}

impl ExecutionCleanup {
    pub fn new(id: ExecutionId, registry: ProcessRegistry, sink: ChunkSink) -> Self {
        Self { id, registry, sink }
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    pub fn sink_mut(&mut self) -> &mut ChunkSink {
        &mut self.sink
    }

    /// Evict the registry entry and close the stream.
    ///
    /// Safe to call any number of times; returns `true` only for the call
    /// that actually closed the stream.
    pub async fn finish(&mut self, outcome: &Outcome) -> bool {
        // Dropping the evicted record disarms its timer.
        drop(self.registry.evict(&self.id));
        let closed = match outcome {
            Outcome::Finished(trailer) => self.sink.close(trailer).await,
            Outcome::Detached => self.sink.detach(),
        };
        if closed {
            debug!(execution_id = %self.id, ?outcome, "execution closed");
        }
        closed
    }
}

struct Supervisor {
    child: Child,
    raw_rx: mpsc::Receiver<Bytes>,
    cancel_rx: oneshot::Receiver<()>,
    terminator: Arc<dyn ChildTerminator>,
    cleanup: ExecutionCleanup,
}

impl Supervisor {
    async fn run(mut self) {
        let outcome = self.drive().await;
        let outcome = self.settle(outcome);

        match &outcome {
            Outcome::Finished(Trailer::Exited(code)) => {
                info!(execution_id = %self.cleanup.id(), code, "command exited");
            }
            Outcome::Finished(Trailer::Cancelled) => {
                info!(execution_id = %self.cleanup.id(), "command cancelled");
            }
            Outcome::Finished(Trailer::Error(message)) => {
                warn!(execution_id = %self.cleanup.id(), %message, "command failed");
            }
            Outcome::Detached => {
                info!(execution_id = %self.cleanup.id(), "output consumer gone; killing process group");
                self.terminator.kill();
            }
        }

        self.cleanup.finish(&outcome).await;

        let Supervisor {
            mut child,
            raw_rx,
            cleanup,
            ..
        } = self;
        // Readers stop once nobody receives; then reap so no zombie lingers.
        drop(raw_rx);
        match child.wait().await {
            Ok(status) => debug!(execution_id = %cleanup.id(), %status, "reaped child"),
            Err(error) => warn!(execution_id = %cleanup.id(), %error, "failed to reap child"),
        }
    }

    async fn drive(&mut self) -> Outcome {
        let Supervisor {
            child,
            raw_rx,
            cancel_rx,
            cleanup,
            ..
        } = self;

        let mut teardown = pin!(cleanup.sink.consumer_gone());
        let mut cancel_open = true;
        let mut pipes_open = true;
        let mut exit: Option<i32> = None;

        loop {
            if !pipes_open && let Some(code) = exit {
                return Outcome::Finished(Trailer::Exited(code));
            }

            tokio::select! {
                biased;

                signal = &mut *cancel_rx, if cancel_open => match signal {
                    Ok(()) => return Outcome::Finished(Trailer::Cancelled),
                    // Evicted by timeout or shutdown: keep waiting for exit.
                    Err(_) => cancel_open = false,
                },
                () = &mut teardown => return Outcome::Detached,
                chunk = raw_rx.recv(), if pipes_open => match chunk {
                    Some(chunk) => {
                        if cleanup.sink_mut().push(chunk).await.is_err() {
                            return Outcome::Detached;
                        }
                    }
                    None => pipes_open = false,
                },
                status = child.wait(), if exit.is_none() => match status {
                    Ok(status) => exit = Some(exit_code(status)),
                    Err(error) => {
                        return Outcome::Finished(Trailer::Error(format!(
                            "failed to wait for process: {error}"
                        )));
                    }
                },
            }
        }
    }

    /// A cancel that evicted the entry before the supervisor did wins over a
    /// natural exit, so a successful cancel always ends with its trailer.
    fn settle(&mut self, outcome: Outcome) -> Outcome {
        let Outcome::Finished(Trailer::Exited(_)) = outcome else {
            return outcome;
        };
        let evicted = self.cleanup.registry.evict(self.cleanup.id()).is_some();
        if !evicted && self.cancel_rx.try_recv().is_ok() {
            return Outcome::Finished(Trailer::Cancelled);
        }
        outcome
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
