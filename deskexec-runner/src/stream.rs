//! Per-execution output stream: ordered chunks followed by exactly one
//! trailer.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

/// Lifecycle of one execution's output.
///
/// `Running` moves to exactly one terminal state, which moves to `Closed`
/// once the trailer has been handed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Exited,
    Errored,
    Cancelled,
    /// The consumer went away before the process finished.
    Detached,
    Closed,
}

impl ExecutionState {
    pub fn is_running(self) -> bool {
        self == ExecutionState::Running
    }

    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Running, Exited | Errored | Cancelled | Detached)
                | (Exited | Errored | Cancelled | Detached, Closed)
        )
    }
}

/// Synthetic final chunk describing how an execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trailer {
    Exited(i32),
    Cancelled,
    Error(String),
}

impl Trailer {
    pub fn state(&self) -> ExecutionState {
        match self {
            Trailer::Exited(_) => ExecutionState::Exited,
            Trailer::Cancelled => ExecutionState::Cancelled,
            Trailer::Error(_) => ExecutionState::Errored,
        }
    }

    pub fn to_chunk(&self) -> Bytes {
        Bytes::from(format!("\n{self}\n"))
    }
}

impl fmt::Display for Trailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trailer::Exited(code) => write!(f, "Process exited with code {code}"),
            Trailer::Cancelled => write!(f, "Command cancelled"),
            Trailer::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

#[derive(Debug)]
enum StreamItem {
    Chunk(Bytes),
    Trailer(Bytes),
}

/// Writer half of an execution's output, owned by its supervisor.
#[derive(Debug)]
pub struct ChunkSink {
    tx: Option<mpsc::Sender<StreamItem>>,
    state: ExecutionState,
}

/// Create a connected sink/stream pair holding at most `capacity` chunks.
pub fn output_channel(capacity: usize) -> (ChunkSink, OutputStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChunkSink {
            tx: Some(tx),
            state: ExecutionState::Running,
        },
        OutputStream { rx, done: false },
    )
}

impl ChunkSink {
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Forward a chunk while running. Data arriving after a terminal event
    /// is dropped. Errors only when the consumer has gone away.
    pub async fn push(&mut self, chunk: Bytes) -> Result<(), ConsumerGone> {
        if !self.state.is_running() || chunk.is_empty() {
            return Ok(());
        }
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        tx.send(StreamItem::Chunk(chunk))
            .await
            .map_err(|_| ConsumerGone)
    }

    /// Move to the trailer's terminal state, emit it and close.
    ///
    /// Returns `false` without side effects when the sink has already left
    /// `Running`.
    pub async fn close(&mut self, trailer: &Trailer) -> bool {
        let terminal = trailer.state();
        if !self.state.can_transition_to(terminal) {
            return false;
        }
        self.state = terminal;
        if let Some(tx) = self.tx.take()
            && tx
                .send(StreamItem::Trailer(trailer.to_chunk()))
                .await
                .is_err()
        {
            tracing::trace!("consumer gone before trailer; closing anyway");
        }
        self.state = ExecutionState::Closed;
        true
    }

    /// Close without a trailer because the consumer is gone.
    pub fn detach(&mut self) -> bool {
        if !self.state.can_transition_to(ExecutionState::Detached) {
            return false;
        }
        self.state = ExecutionState::Closed;
        self.tx = None;
        true
    }

    /// Resolves once the consumer has dropped its [`OutputStream`].
    pub fn consumer_gone(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move {
            match tx {
                Some(tx) => tx.closed().await,
                None => std::future::pending().await,
            }
        }
    }
}

/// The consumer of an execution's output has dropped its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerGone;

/// Lazy, single-subscriber stream of an execution's output.
///
/// Yields process output in arrival order, then the trailer, then ends.
#[derive(Debug)]
pub struct OutputStream {
    rx: mpsc::Receiver<StreamItem>,
    done: bool,
}

impl OutputStream {
    /// Drain the whole stream into one buffer.
    pub async fn collect_bytes(mut self) -> Vec<u8> {
        use futures::StreamExt;

        let mut collected = Vec::new();
        while let Some(chunk) = self.next().await {
            collected.extend_from_slice(&chunk);
        }
        collected
    }
}

impl Stream for OutputStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(StreamItem::Chunk(chunk))) => Poll::Ready(Some(chunk)),
            Poll::Ready(Some(StreamItem::Trailer(chunk))) => {
                self.done = true;
                self.rx.close();
                Poll::Ready(Some(chunk))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
