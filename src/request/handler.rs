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

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tracing::{debug, error};

use crate::gfx::{GfxProcessor, GfxTaskResult, ImageProvider};
use crate::network::{Endpoint, ProtocolWriter};
use crate::protocol::{Command, ProtocolCodec, Response, SupportFormatsResponse};
use crate::utils::PoolHandler;

use super::RequestTask;

/// Runs on a pool worker: builds the response for one command and writes it
/// back on the connection the command came from.
pub struct CommandHandler<P: ImageProvider> {
    gfx: Arc<GfxProcessor<P>>,
    write_timeout: Duration,
}

impl<P: ImageProvider> Clone for CommandHandler<P> {
    fn clone(&self) -> Self {
        CommandHandler {
            gfx: self.gfx.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

impl<P: ImageProvider> CommandHandler<P> {
    pub fn new(gfx: Arc<GfxProcessor<P>>, write_timeout: Duration) -> Self {
        CommandHandler { gfx, write_timeout }
    }

    /// Hello and Shutdown are plain acks; the shutdown itself is driven by
    /// whoever called the request processor.
    async fn respond(gfx: Arc<GfxProcessor<P>>, command: Command) -> Response {
        match command {
            Command::Hello => Response::Hello,
            Command::Shutdown => Response::Shutdown,
            Command::NewGfx(gfx_task) => {
                let image_count = gfx_task.dimensions.len();
                let result = match task::spawn_blocking(move || gfx.process(&gfx_task)).await {
                    Ok(result) => result,
                    Err(err) => {
                        error!("rendering {} sizes aborted: {}", image_count, err);
                        GfxTaskResult::error(image_count)
                    }
                };
                Response::NewGfx(result.into())
            }
            Command::SupportFormats => Response::SupportFormats(SupportFormatsResponse {
                formats: gfx.supported_formats(),
                video_formats: gfx.supported_video_formats(),
            }),
        }
    }
}

impl<E: Endpoint, P: ImageProvider> PoolHandler<RequestTask<E>> for CommandHandler<P> {
    fn handle(&self, task: RequestTask<E>) -> impl Future<Output = ()> + Send {
        let gfx = self.gfx.clone();
        let write_timeout = self.write_timeout;
        async move {
            let RequestTask {
                mut endpoint,
                command,
            } = task;
            let command_type = command.command_type();

            let response = Self::respond(gfx, command).await;
            match ProtocolWriter::new(&mut endpoint)
                .write_command(&response, write_timeout)
                .await
            {
                Ok(()) => debug!("answered {} with {}", command_type, response.command_type()),
                Err(err) => error!("failed to answer {}: {}", command_type, err),
            }
        }
    }
}
