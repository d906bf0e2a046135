//! Pipe-based process spawning.
//!
//! Commands run without a shell or PTY: stdin is `/dev/null`, stdout and
//! stderr are pipes drained by one reader task each. Both readers feed the
//! same channel, so per-stream order is preserved while the two streams
//! interleave in arrival order.

use std::ffi::OsString;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(unix)]
use crate::process_group;

const READ_BUFFER_SIZE: usize = 8_192;

/// Everything needed to start one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub base: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub path_env: OsString,
}

impl ExecutionContext {
    pub fn command_line(&self) -> String {
        std::iter::once(self.base.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A child that started successfully, with its pipes still attached.
#[derive(Debug)]
pub struct SpawnedChild {
    pub child: Child,
    pub pid: u32,
}

/// Spawn `context` in its own session with piped stdout/stderr.
pub fn spawn_piped(context: &ExecutionContext) -> io::Result<SpawnedChild> {
    if !context.working_dir.is_dir() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            format!(
                "working directory {} does not exist",
                context.working_dir.display()
            ),
        ));
    }

    let mut command = Command::new(&context.base);
    command
        .args(&context.args)
        .current_dir(&context.working_dir)
        .env("PATH", &context.path_env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    #[allow(unsafe_code)]
    {
        let parent_pid = unsafe { libc::getpid() };
        unsafe {
            command.pre_exec(move || process_group::isolate_child(parent_pid));
        }
    }

    let child = command.spawn()?;
    let pid = child
        .id()
        .ok_or_else(|| io::Error::other("missing child pid"))?;

    Ok(SpawnedChild { child, pid })
}

/// Start draining the child's stdout and stderr into `output_tx`.
///
/// The channel closes once both pipes reach EOF (or their readers are
/// dropped along with the receiver).
pub fn spawn_readers(child: &mut Child, output_tx: mpsc::Sender<Bytes>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        handles.push(tokio::spawn(read_output_stream(stdout, output_tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        handles.push(tokio::spawn(read_output_stream(stderr, output_tx)));
    }
    handles
}

/// Read from an async reader and forward chunks until EOF or until nobody
/// is listening any more.
async fn read_output_stream<R>(mut reader: R, output_tx: mpsc::Sender<Bytes>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(buf.get(..n).unwrap_or_default());
                if output_tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::debug!(%error, "output pipe read failed");
                break;
            }
        }
    }
}
