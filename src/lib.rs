//! deskexec: run allow-listed commands inside a project directory and stream
//! their output over HTTP.
//!
//! - [`server`] exposes launch, cancel and listing endpoints via axum
//! - [`console`] is an interactive terminal client for those endpoints, or
//!   for an in-process launcher
//!
//! Process handling lives in [`deskexec_runner`] and configuration in
//! [`deskexec_config`].

pub mod console;
pub mod server;

pub use deskexec_config as config;
pub use deskexec_runner as runner;
