//! Interactive consumer of the execution API.
//!
//! [`Console`] turns keystrokes into launches, writes each execution's
//! output verbatim to a [`DisplaySurface`] and redraws the prompt after
//! every terminal event. One command runs at a time; while it runs, only
//! the stop key is honoured.

mod backend;
mod line_editor;
pub mod terminal;

pub use backend::{ChunkStream, ExecBackend, HttpBackend, LaunchHandle, LocalBackend};
pub use line_editor::{EditEcho, LineEditor};

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use deskexec_runner::{CommandRequest, ExecutionId};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use thiserror::Error;

pub const DEFAULT_PROMPT: &str = "$ ";

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The server refused the command before starting it.
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl From<reqwest::Error> for ConsoleError {
    fn from(error: reqwest::Error) -> Self {
        ConsoleError::Transport(error.to_string())
    }
}

/// Where console output goes.
pub trait DisplaySurface: Send {
    /// Write bytes produced by a command, unmodified.
    fn write_output(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Write console chrome: prompt, echo, notices.
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_output(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Input understood by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKey {
    Char(char),
    Backspace,
    Enter,
    /// Cancel the running command, or abandon a pending launch.
    Stop,
    /// Leave the console when the line is empty.
    Eof,
}

enum Current {
    Idle,
    Launching(BoxFuture<'static, Result<LaunchHandle, ConsoleError>>),
    Streaming { id: ExecutionId, stream: ChunkStream },
}

enum Event {
    Key(Option<ConsoleKey>),
    Launched(Result<LaunchHandle, ConsoleError>),
    Chunk(Option<Result<Bytes, ConsoleError>>),
}

pub struct Console<B, D> {
    backend: Arc<B>,
    display: D,
    editor: LineEditor,
    prompt: String,
    cwd: Option<String>,
    current: Current,
    keys_open: bool,
}

impl<B, D> Console<B, D>
where
    B: ExecBackend + 'static,
    D: DisplaySurface,
{
    pub fn new(backend: B, display: D) -> Self {
        Self {
            backend: Arc::new(backend),
            display,
            editor: LineEditor::new(),
            prompt: DEFAULT_PROMPT.to_owned(),
            cwd: None,
            current: Current::Idle,
            keys_open: true,
        }
    }

    /// Working directory sent with every launch, relative to the project root.
    pub fn with_cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Id of the command whose output is streaming, if any.
    pub fn current_id(&self) -> Option<&ExecutionId> {
        match &self.current {
            Current::Streaming { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.current, Current::Idle)
    }

    /// Drive the console until `Eof` on an empty line, or until `keys` ends
    /// and the running command (if any) has finished.
    pub async fn run<S>(&mut self, mut keys: S) -> Result<(), ConsoleError>
    where
        S: Stream<Item = ConsoleKey> + Unpin,
    {
        self.redraw_prompt()?;
        loop {
            let keys_open = self.keys_open;
            let event = match &mut self.current {
                Current::Idle if !keys_open => break,
                Current::Idle => Event::Key(keys.next().await),
                Current::Launching(launch) => tokio::select! {
                    key = keys.next(), if keys_open => Event::Key(key),
                    result = launch => Event::Launched(result),
                },
                Current::Streaming { stream, .. } => tokio::select! {
                    key = keys.next(), if keys_open => Event::Key(key),
                    chunk = stream.next() => Event::Chunk(chunk),
                },
            };

            let keep_going = match event {
                Event::Key(Some(key)) => self.handle_key(key).await?,
                Event::Key(None) => {
                    tracing::debug!("console input closed");
                    self.keys_open = false;
                    true
                }
                Event::Launched(result) => {
                    self.handle_launched(result)?;
                    true
                }
                Event::Chunk(chunk) => {
                    self.handle_chunk(chunk)?;
                    true
                }
            };
            if !keep_going {
                break;
            }
        }
        self.display.flush()?;
        Ok(())
    }

    /// Returns `false` when the console should exit.
    async fn handle_key(&mut self, key: ConsoleKey) -> Result<bool, ConsoleError> {
        if key == ConsoleKey::Stop {
            self.stop().await?;
            return Ok(true);
        }
        if self.is_busy() {
            return Ok(true);
        }

        match key {
            ConsoleKey::Char(ch) => {
                let echo = self.editor.insert(ch);
                self.echo(&echo)?;
            }
            ConsoleKey::Backspace => {
                let echo = self.editor.backspace();
                self.echo(&echo)?;
            }
            ConsoleKey::Enter => {
                self.display.write_text("\n")?;
                match self.editor.submit() {
                    Some(line) => self.start(line),
                    None => self.redraw_prompt()?,
                }
            }
            ConsoleKey::Eof if self.editor.is_empty() => {
                self.display.write_text("\n")?;
                return Ok(false);
            }
            ConsoleKey::Eof | ConsoleKey::Stop => {}
        }
        self.display.flush()?;
        Ok(true)
    }

    fn start(&mut self, line: String) {
        tracing::debug!(command = %line, "submitting command");
        let request = CommandRequest {
            command: line,
            cwd: self.cwd.clone(),
        };
        let backend = Arc::clone(&self.backend);
        self.current = Current::Launching(Box::pin(async move { backend.launch(request).await }));
    }

    async fn stop(&mut self) -> Result<(), ConsoleError> {
        match std::mem::replace(&mut self.current, Current::Idle) {
            Current::Idle => {
                self.editor.clear();
                self.display.write_text("^C\n")?;
                self.redraw_prompt()?;
            }
            Current::Launching(pending) => {
                drop(pending);
                tracing::debug!("abandoned pending launch");
                self.display.write_text("^C\n")?;
                self.redraw_prompt()?;
            }
            Current::Streaming { id, stream } => {
                // The stream ends with the cancellation trailer.
                match self.backend.cancel(&id).await {
                    Ok(()) => tracing::debug!(execution_id = %id, "cancel requested"),
                    Err(error) => {
                        tracing::debug!(execution_id = %id, %error, "cancel did not apply");
                    }
                }
                self.current = Current::Streaming { id, stream };
            }
        }
        Ok(())
    }

    fn handle_launched(
        &mut self,
        result: Result<LaunchHandle, ConsoleError>,
    ) -> Result<(), ConsoleError> {
        match result {
            Ok(LaunchHandle { id, stream }) => {
                tracing::debug!(execution_id = %id, "streaming command output");
                self.current = Current::Streaming { id, stream };
            }
            Err(error) => {
                self.current = Current::Idle;
                self.display.write_text(&format!("Error: {error}\n"))?;
                self.redraw_prompt()?;
            }
        }
        Ok(())
    }

    fn handle_chunk(
        &mut self,
        chunk: Option<Result<Bytes, ConsoleError>>,
    ) -> Result<(), ConsoleError> {
        match chunk {
            Some(Ok(bytes)) => {
                self.display.write_output(&bytes)?;
                self.display.flush()?;
            }
            Some(Err(error)) => {
                self.current = Current::Idle;
                self.display.write_text(&format!("\nError: {error}\n"))?;
                self.redraw_prompt()?;
            }
            None => {
                self.current = Current::Idle;
                self.redraw_prompt()?;
            }
        }
        Ok(())
    }

    fn echo(&mut self, echo: &EditEcho) -> io::Result<()> {
        self.display.write_text(echo.as_str())
    }

    fn redraw_prompt(&mut self) -> io::Result<()> {
        self.display.write_text(&self.prompt)?;
        self.display.write_text(self.editor.as_str())?;
        self.display.flush()
    }
}

/// In-memory surface, useful for scripted sessions and tests.
#[derive(Debug, Clone, Default)]
pub struct BufferSurface {
    buffer: Arc<parking_lot::Mutex<Vec<u8>>>,
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

impl DisplaySurface for BufferSurface {
    fn write_output(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buffer.lock().extend_from_slice(chunk);
        Ok(())
    }
}
