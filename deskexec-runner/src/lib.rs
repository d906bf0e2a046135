//! Allow-listed, directory-confined command execution with streamed output.
//!
//! A [`Launcher`] validates a command line against a [`CommandPolicy`],
//! resolves its working directory inside a [`ProjectRoot`], spawns it in its
//! own process group without a shell and registers it in a
//! [`ProcessRegistry`]. The caller receives an [`OutputStream`] that yields
//! stdout and stderr as they arrive followed by exactly one trailer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskexec_runner::{AllowListPolicy, CommandRequest, Launcher, ProjectRoot};
//!
//! # async fn demo() -> Result<(), deskexec_runner::ExecError> {
//! let launcher = Launcher::new(
//!     Arc::new(AllowListPolicy::new(["ls", "pwd"])),
//!     ProjectRoot::new("/srv/project"),
//! );
//! let launched = launcher.launch(&CommandRequest::new("ls -la")).await?;
//! let output = launched.stream.collect_bytes().await;
//! print!("{}", String::from_utf8_lossy(&output));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod launcher;
pub mod path_env;
pub mod pipe;
pub mod policy;
pub mod process;
pub mod process_group;
pub mod registry;
pub mod stream;
pub mod workspace;

pub use error::{ExecError, ExecResult, NOT_FOUND_MESSAGE};
pub use launcher::{CommandRequest, ExecutionCleanup, Launched, Launcher, Outcome};
pub use path_env::{augmented_path, merge_path_env};
pub use pipe::ExecutionContext;
pub use policy::{AllowAllPolicy, AllowListPolicy, CommandPolicy, ValidatedCommand};
pub use process::{ChildTerminator, ProcessGroupTerminator};
pub use process_group::{KillSignal, ProcessGroup};
pub use registry::{ExecutionId, ExecutionInfo, ExecutionRecord, ProcessRegistry};
pub use stream::{ChunkSink, ConsumerGone, ExecutionState, OutputStream, Trailer, output_channel};
pub use workspace::ProjectRoot;
