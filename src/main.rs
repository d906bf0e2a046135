//! deskexec binary: serve the execution API, open a console, or check a
//! command line against the sandbox rules.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use deskexec::console::terminal::run_interactive;
use deskexec::console::{HttpBackend, LocalBackend};
use deskexec::server;
use deskexec_config::ConfigManager;
use deskexec_runner::{CommandRequest, Launcher};

mod cli;
mod main_helpers;

use cli::{Cli, Commands};
use main_helpers::{LogSink, absolute_from_cwd, initialize_tracing, load_config, server_url};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let mut manager = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Serve {
            bind,
            root,
            timeout,
        } => {
            apply_root_override(&mut manager, root.as_deref())?;
            if let Some(bind) = bind {
                manager.config_mut().server.bind_address = bind;
            }
            if let Some(timeout) = timeout {
                manager.config_mut().timeouts.execution_timeout_seconds = timeout;
            }
            manager.validate()?;
            initialize_tracing(&manager.config().debug, &LogSink::Stderr)?;

            let addr = manager.config().server.socket_addr()?;
            let launcher = Launcher::from_config(manager.config(), manager.project_root());
            server::run(launcher, addr).await
        }
        Commands::Console {
            url,
            local,
            cwd,
            root,
        } => {
            apply_root_override(&mut manager, root.as_deref())?;
            let log_path = manager.config().debug.console_log_path();
            initialize_tracing(&manager.config().debug, &LogSink::File(log_path))?;

            if local {
                manager.validate()?;
                let launcher = Launcher::from_config(manager.config(), manager.project_root());
                run_interactive(LocalBackend::new(launcher), cwd).await?;
            } else {
                let url = url.unwrap_or_else(|| server_url(&manager.config().server.bind_address));
                tracing::info!(%url, "console connecting");
                run_interactive(HttpBackend::new(&url), cwd).await?;
            }
            Ok(())
        }
        Commands::Check { cwd, root, command } => {
            apply_root_override(&mut manager, root.as_deref())?;
            manager.validate()?;
            initialize_tracing(&manager.config().debug, &LogSink::Stderr)?;

            let launcher = Launcher::from_config(manager.config(), manager.project_root());
            let request = CommandRequest {
                command: command.join(" "),
                cwd,
            };
            let context = launcher
                .prepare(&request)
                .with_context(|| format!("`{}` would be rejected", request.command))?;
            println!("command: {}", context.command_line());
            println!("cwd: {}", context.working_dir.display());
            Ok(())
        }
    }
}

fn apply_root_override(manager: &mut ConfigManager, root: Option<&Path>) -> Result<()> {
    if let Some(root) = root {
        let root = absolute_from_cwd(root)?;
        manager.config_mut().workspace.project_root = Some(root);
    }
    Ok(())
}
