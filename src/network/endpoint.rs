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

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

use crate::{AppError, AppResult};

/// One connection's byte channel.
///
/// Both calls either transfer the whole buffer before `deadline` or fail; a
/// peer closing early is a failure too. The connection is torn down when the
/// endpoint is dropped.
pub trait Endpoint: Send + 'static {
    fn read_bytes(
        &mut self,
        buffer: &mut [u8],
        deadline: Instant,
    ) -> impl Future<Output = AppResult<()>> + Send;

    fn write_bytes(
        &mut self,
        buffer: &[u8],
        deadline: Instant,
    ) -> impl Future<Output = AppResult<()>> + Send;
}

impl<S> Endpoint for S
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_bytes(&mut self, buffer: &mut [u8], deadline: Instant) -> AppResult<()> {
        let len = buffer.len();
        match time::timeout_at(deadline, self.read_exact(buffer)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(AppError::Timeout(format!("reading {} bytes", len))),
        }
    }

    async fn write_bytes(&mut self, buffer: &[u8], deadline: Instant) -> AppResult<()> {
        let len = buffer.len();
        let write = async {
            self.write_all(buffer).await?;
            self.flush().await
        };
        match time::timeout_at(deadline, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AppError::Timeout(format!("writing {} bytes", len))),
        }
    }
}
