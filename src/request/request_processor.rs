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

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

use crate::gfx::{GfxProcessor, ImageProvider};
use crate::network::{Endpoint, ProtocolReader};
use crate::protocol::{Command, ProtocolCodec};
use crate::utils::{WorkerPool, WorkerPoolConfig};

use super::CommandHandler;

/// Deadlines and limits of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            read_timeout: Duration::from_millis(5000),
            write_timeout: Duration::from_millis(5000),
            max_frame_size: 64 * 1024 * 1024,
        }
    }
}

/// A decoded command and the connection its response goes to, owned by the
/// pool task that answers it.
#[derive(Debug)]
pub struct RequestTask<E> {
    pub endpoint: E,
    pub command: Command,
}

/// Reads one command per connection and queues its handling on the pool.
pub struct RequestProcessor<E: Endpoint> {
    config: ProcessorConfig,
    pool: WorkerPool<RequestTask<E>>,
}

impl<E: Endpoint> RequestProcessor<E> {
    pub fn new<P: ImageProvider>(
        config: ProcessorConfig,
        gfx: Arc<GfxProcessor<P>>,
        pool_config: WorkerPoolConfig,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
    ) -> Self {
        let handler = CommandHandler::new(gfx, config.write_timeout);
        let pool = WorkerPool::new(notify_shutdown, shutdown_complete_tx, handler, pool_config);
        RequestProcessor { config, pool }
    }

    /// Reads the command on the caller's task, then returns as soon as its
    /// handling is queued.
    ///
    /// Returns whether a shutdown command was accepted and queued. It says
    /// nothing about the ack having been written; wait for the pool to drain
    /// for that.
    ///
    /// A connection that fails to deliver a complete frame in time is dropped
    /// without a response and never reaches the pool.
    pub async fn process(&self, mut endpoint: E) -> bool {
        let command = match ProtocolReader::new(&mut endpoint, self.config.max_frame_size)
            .read_command::<Command>(self.config.read_timeout)
            .await
        {
            Ok(command) => command,
            Err(err) => {
                error!("dropping connection, failed to read command: {}", err);
                return false;
            }
        };

        let is_shutdown = command.is_shutdown();
        let command_type = command.command_type();
        info!("dispatching {}", command_type);

        match self.pool.push(RequestTask { endpoint, command }).await {
            Ok(()) => is_shutdown,
            Err(err) => {
                error!("dropping {} connection: {}", command_type, err);
                false
            }
        }
    }

    /// Stops taking commands; the queued ones are still answered.
    pub fn close(&self) {
        self.pool.close();
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &WorkerPool<RequestTask<E>> {
        &self.pool
    }
}
