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

use std::fs;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info};

use crate::gfx::{GfxProcessor, ImageProvider};
use crate::request::{ProcessorConfig, RequestProcessor};
use crate::utils::WorkerPoolConfig;

use super::{AppError, AppResult};

/// Accept loop of the worker process, listening on a Unix domain socket.
///
/// Connections are taken one at a time: the command of a connection is read
/// before the next one is accepted, so a client that stalls mid-frame holds up
/// everybody else for up to the read timeout.
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    processor: RequestProcessor<UnixStream>,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
}

impl Server {
    /// Binds the socket and starts the worker pool. Must be called from within
    /// a tokio runtime.
    ///
    /// A socket file left behind by an earlier run is replaced; any other kind
    /// of file at `socket_path` is an error.
    pub fn bind<P: ImageProvider>(
        socket_path: impl AsRef<Path>,
        gfx: Arc<GfxProcessor<P>>,
        processor_config: ProcessorConfig,
        pool_config: WorkerPoolConfig,
    ) -> AppResult<Server> {
        let socket_path = socket_path.as_ref().to_path_buf();
        remove_stale_socket(&socket_path)?;

        let listener = UnixListener::bind(&socket_path).map_err(|err| {
            let error_msg = format!(
                "Failed to bind server to {} - Error: {}",
                socket_path.display(),
                err
            );
            error!(error_msg);
            AppError::IllegalStateError(error_msg)
        })?;
        fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600))?;
        info!("gfx worker listening on {}", socket_path.display());

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);
        let processor = RequestProcessor::new(
            processor_config,
            gfx,
            pool_config,
            notify_shutdown.clone(),
            shutdown_complete_tx,
        );

        Ok(Server {
            socket_path,
            listener,
            processor,
            notify_shutdown,
            shutdown_complete_rx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serves connections until a shutdown command is accepted or Ctrl-C
    /// arrives, then waits for every queued command to be answered.
    ///
    /// Graceful shutdown sequence:
    /// 1. The accept loop stops, no new connection is read.
    /// 2. The pool is closed; queued commands, the shutdown ack among them,
    ///    are still answered.
    /// 3. Workers exit once the queue is empty and the monitor exits on the
    ///    shutdown signal, each dropping its `shutdown_complete_tx`.
    /// 4. `run` returns once the last sender is gone.
    pub async fn run(self) -> AppResult<()> {
        let result = tokio::select! {
            res = self.serve() => {
                if let Err(err) = &res {
                    error!(cause = %err, "failed to accept");
                }
                res
            }
            _ = signal::ctrl_c() => {
                info!("get shutdown signal");
                Ok(())
            }
        };

        self.drain().await;
        result
    }

    async fn serve(&self) -> AppResult<()> {
        loop {
            let stream = self.accept().await?;
            debug!("accept new connection");

            if self.processor.process(stream).await {
                info!("shutdown command accepted, stop accepting connections");
                return Ok(());
            }
        }
    }

    async fn accept(&self) -> AppResult<UnixStream> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => return Ok(stream),
                Err(err) => {
                    if backoff > 64 {
                        return Err(AppError::DetailedIoError(format!(
                            "accept unix socket error: {}",
                            err
                        )));
                    }
                    error!("accept failed, retrying in {}s: {}", backoff, err);
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }

    async fn drain(self) {
        let Server {
            socket_path,
            listener,
            processor,
            notify_shutdown,
            mut shutdown_complete_rx,
        } = self;
        drop(listener);

        processor.close();
        let _ = notify_shutdown.send(());
        drop(processor);
        shutdown_complete_rx.recv().await;
        debug!("worker pool drained");

        if let Err(err) = fs::remove_file(&socket_path) {
            debug!("failed to remove {}: {}", socket_path.display(), err);
        }
    }
}

fn remove_stale_socket(socket_path: &Path) -> AppResult<()> {
    match fs::symlink_metadata(socket_path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!("removing stale socket {}", socket_path.display());
            fs::remove_file(socket_path)?;
            Ok(())
        }
        Ok(_) => Err(AppError::IllegalStateError(format!(
            "{} exists and is not a socket",
            socket_path.display()
        ))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use crate::gfx::RecordingProvider;

    use super::*;

    fn bind(path: &Path) -> AppResult<Server> {
        Server::bind(
            path,
            Arc::new(GfxProcessor::new(RecordingProvider::default())),
            ProcessorConfig::default(),
            WorkerPoolConfig {
                thread_count: 1,
                max_queue_size: 4,
                monitor_interval: Duration::from_millis(100),
            },
        )
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.sock");
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);

        let server = bind(&path).unwrap();
        assert_eq!(server.socket_path(), path);
    }

    #[tokio::test]
    async fn test_regular_file_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.sock");
        fs::write(&path, b"keep me").unwrap();

        assert!(matches!(bind(&path), Err(AppError::IllegalStateError(_))));
        assert_eq!(fs::read(&path).unwrap(), b"keep me");
    }
}
