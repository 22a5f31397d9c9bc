// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use tokio::net::UnixStream;
use tracing::debug;

use crate::gfx::GfxTask;
use crate::network::{ProtocolReader, ProtocolWriter};
use crate::protocol::{Command, NewGfxResponse, ProtocolCodec, Response, SupportFormatsResponse};
use crate::request::ProcessorConfig;
use crate::{AppError, AppResult};

/// Talks to a running gfx worker, one connection per call.
#[derive(Debug, Clone)]
pub struct GfxClient {
    socket_path: PathBuf,
    config: ProcessorConfig,
}

impl GfxClient {
    pub fn new(socket_path: impl AsRef<Path>, config: ProcessorConfig) -> Self {
        GfxClient {
            socket_path: socket_path.as_ref().to_path_buf(),
            config,
        }
    }

    pub async fn hello(&self) -> AppResult<()> {
        match self.call(&Command::Hello).await? {
            Response::Hello => Ok(()),
            other => Err(unexpected(&Command::Hello, &other)),
        }
    }

    /// Asks the worker to stop. It answers before it stops; queued commands
    /// of other clients are still answered.
    pub async fn shutdown(&self) -> AppResult<()> {
        match self.call(&Command::Shutdown).await? {
            Response::Shutdown => Ok(()),
            other => Err(unexpected(&Command::Shutdown, &other)),
        }
    }

    pub async fn support_formats(&self) -> AppResult<SupportFormatsResponse> {
        match self.call(&Command::SupportFormats).await? {
            Response::SupportFormats(response) => Ok(response),
            other => Err(unexpected(&Command::SupportFormats, &other)),
        }
    }

    /// Returns one image per requested dimension, in request order. A task the
    /// worker could not render comes back as a response with a non-zero
    /// `error_code`, not as an `Err`.
    pub async fn generate(&self, task: GfxTask) -> AppResult<NewGfxResponse> {
        let command = Command::NewGfx(task);
        match self.call(&command).await? {
            Response::NewGfx(response) => Ok(response),
            other => Err(unexpected(&command, &other)),
        }
    }

    async fn call(&self, command: &Command) -> AppResult<Response> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|err| {
                AppError::DetailedIoError(format!(
                    "failed to connect to {}: {}",
                    self.socket_path.display(),
                    err
                ))
            })?;
        debug!("sending {} to {}", command.command_type(), self.socket_path.display());

        ProtocolWriter::new(&mut stream)
            .write_command(command, self.config.write_timeout)
            .await?;
        ProtocolReader::new(&mut stream, self.config.max_frame_size)
            .read_command(self.config.read_timeout)
            .await
    }
}

fn unexpected(command: &Command, response: &Response) -> AppError {
    AppError::IllegalStateError(format!(
        "worker answered {} with {}",
        command.command_type(),
        response.command_type()
    ))
}
