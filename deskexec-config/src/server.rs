use std::net::SocketAddr;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::server as server_constants;

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the launch/cancel endpoints listen on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Number of output chunks buffered per execution before the pipe
    /// readers are back-pressured
    #[serde(default = "default_output_buffer_chunks")]
    pub output_buffer_chunks: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            output_buffer_chunks: default_output_buffer_chunks(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("invalid server.bind_address `{}`", self.bind_address))
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        ensure!(
            self.output_buffer_chunks > 0,
            "server.output_buffer_chunks must be at least 1"
        );
        Ok(())
    }
}

fn default_bind_address() -> String {
    server_constants::DEFAULT_BIND_ADDRESS.into()
}

const fn default_output_buffer_chunks() -> usize {
    server_constants::DEFAULT_OUTPUT_BUFFER_CHUNKS
}
