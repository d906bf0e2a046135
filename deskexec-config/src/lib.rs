//! Configuration for the deskexec command streaming service.
//!
//! Settings live in `deskexec.toml`; every section and field is optional and
//! falls back to the defaults in [`constants`].

pub mod commands;
pub mod constants;
pub mod debug;
pub mod loader;
pub mod server;
pub mod timeouts;
pub mod workspace;

pub use commands::CommandsConfig;
pub use debug::DebugConfig;
pub use loader::{ConfigManager, DeskexecConfig};
pub use server::ServerConfig;
pub use timeouts::TimeoutsConfig;
pub use workspace::WorkspaceConfig;
