use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use deskexec_config::constants::server::EXECUTION_ID_HEADER;
use deskexec_runner::{CommandRequest, ExecError, ExecutionId, Launcher};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::StatusCode;

use super::ConsoleError;
use crate::server::ErrorBody;

/// Output of one launch as seen by the console.
pub type ChunkStream = BoxStream<'static, Result<Bytes, ConsoleError>>;

pub struct LaunchHandle {
    pub id: ExecutionId,
    pub stream: ChunkStream,
}

impl std::fmt::Debug for LaunchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Something that can start and cancel commands for the console.
#[async_trait]
pub trait ExecBackend: Send + Sync {
    async fn launch(&self, request: CommandRequest) -> Result<LaunchHandle, ConsoleError>;

    async fn cancel(&self, id: &ExecutionId) -> Result<(), ConsoleError>;
}

/// Talks to a running `deskexec serve` instance.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/exec", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => format!("HTTP {status}"),
        }
    }
}

#[async_trait]
impl ExecBackend for HttpBackend {
    async fn launch(&self, request: CommandRequest) -> Result<LaunchHandle, ConsoleError> {
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(ConsoleError::Rejected(Self::error_message(response).await));
        }
        if !status.is_success() {
            let message = Self::error_message(response).await;
            return Err(ConsoleError::Transport(format!("{status}: {message}")));
        }

        let id = response
            .headers()
            .get(EXECUTION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ExecutionId::from)
            .ok_or_else(|| {
                ConsoleError::Transport(format!("response is missing the {EXECUTION_ID_HEADER} header"))
            })?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ConsoleError::from))
            .boxed();
        Ok(LaunchHandle { id, stream })
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<(), ConsoleError> {
        let response = self
            .client
            .delete(&self.endpoint)
            .query(&[("id", id.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ConsoleError::NotFound(
                Self::error_message(response).await,
            )),
            status => {
                let message = Self::error_message(response).await;
                Err(ConsoleError::Transport(format!("{status}: {message}")))
            }
        }
    }
}

/// Runs commands in-process through a [`Launcher`], without a server.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    launcher: Arc<Launcher>,
}

impl LocalBackend {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher: Arc::new(launcher),
        }
    }

    pub fn launcher(&self) -> &Launcher {
        &self.launcher
    }
}

#[async_trait]
impl ExecBackend for LocalBackend {
    async fn launch(&self, request: CommandRequest) -> Result<LaunchHandle, ConsoleError> {
        let launched = self.launcher.launch(&request).await.map_err(|error| {
            if error.is_rejection() {
                ConsoleError::Rejected(error.to_string())
            } else {
                ConsoleError::Transport(error.to_string())
            }
        })?;
        Ok(LaunchHandle {
            id: launched.id,
            stream: launched.stream.map(Ok).boxed(),
        })
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<(), ConsoleError> {
        match self.launcher.registry().cancel(id) {
            Ok(_) => Ok(()),
            Err(error @ ExecError::NotFound(_)) => Err(ConsoleError::NotFound(error.to_string())),
            Err(error) => Err(ConsoleError::Transport(error.to_string())),
        }
    }
}
