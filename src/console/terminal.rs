//! Raw-mode terminal driver for the console.

use std::io::{self, Write};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::{Stream, StreamExt};

use super::{Console, ConsoleError, ConsoleKey, DisplaySurface, ExecBackend};

/// Writes to a terminal in raw mode, where a bare `\n` does not return the
/// cursor to column zero.
#[derive(Debug)]
pub struct TerminalSurface<W: Write> {
    out: W,
    last_was_cr: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_was_cr: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplaySurface for TerminalSurface<W> {
    fn write_output(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut previous_cr = self.last_was_cr;
        let mut start = 0;
        for (index, &byte) in chunk.iter().enumerate() {
            if byte == b'\n' && !previous_cr {
                self.out.write_all(chunk.get(start..index).unwrap_or_default())?;
                self.out.write_all(b"\r\n")?;
                start = index + 1;
            }
            previous_cr = byte == b'\r';
        }
        self.out.write_all(chunk.get(start..).unwrap_or_default())?;
        self.last_was_cr = previous_cr;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Keeps the terminal in raw mode for as long as it lives.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(error) = disable_raw_mode() {
            tracing::warn!(%error, "failed to restore terminal mode");
        }
    }
}

/// Map a terminal event onto console input. Releases and unsupported keys
/// yield `None`.
pub fn key_from_event(event: &Event) -> Option<ConsoleKey> {
    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return None;
    };
    if *kind == KeyEventKind::Release {
        return None;
    }

    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Some(ConsoleKey::Stop),
            KeyCode::Char('d') => Some(ConsoleKey::Eof),
            KeyCode::Char('h') => Some(ConsoleKey::Backspace),
            _ => None,
        };
    }

    match code {
        KeyCode::Char(ch) => Some(ConsoleKey::Char(*ch)),
        KeyCode::Backspace => Some(ConsoleKey::Backspace),
        KeyCode::Enter => Some(ConsoleKey::Enter),
        KeyCode::Esc => Some(ConsoleKey::Stop),
        _ => None,
    }
}

/// Console keystrokes from the terminal's event stream.
pub fn key_stream() -> impl Stream<Item = ConsoleKey> {
    EventStream::new().filter_map(|event| {
        futures::future::ready(match event {
            Ok(event) => key_from_event(&event),
            Err(error) => {
                tracing::warn!(%error, "failed to read terminal event");
                None
            }
        })
    })
}

/// Run an interactive console on the controlling terminal.
pub async fn run_interactive<B>(backend: B, cwd: Option<String>) -> Result<(), ConsoleError>
where
    B: ExecBackend + 'static,
{
    let _raw_mode = RawModeGuard::enable()?;
    let mut console = Console::new(backend, TerminalSurface::new(io::stdout())).with_cwd(cwd);
    console
        .display_mut()
        .write_text("deskexec console. Ctrl+C stops a command, Ctrl+D exits.\n")?;
    console.run(Box::pin(key_stream())).await
}
