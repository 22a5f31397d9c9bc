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

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;
use tracing::trace;

use crate::protocol::ProtocolCodec;
use crate::AppResult;

use super::{encode_frame, Endpoint, FrameHeader};

/// Reads one whole frame from an endpoint and decodes it.
pub struct ProtocolReader<'a, E: Endpoint> {
    endpoint: &'a mut E,
    max_frame_size: usize,
}

impl<'a, E: Endpoint> ProtocolReader<'a, E> {
    pub fn new(endpoint: &'a mut E, max_frame_size: usize) -> Self {
        ProtocolReader {
            endpoint,
            max_frame_size,
        }
    }

    /// The whole frame, header and payload, must arrive within `timeout`.
    ///
    /// A short read, a malformed frame, an unsupported version and an expired
    /// timeout are all errors and none is retried.
    pub async fn read_command<T: ProtocolCodec>(&mut self, timeout: Duration) -> AppResult<T> {
        let deadline = Instant::now() + timeout;

        let mut header = [0u8; FrameHeader::SIZE];
        self.endpoint.read_bytes(&mut header, deadline).await?;
        let header = FrameHeader::parse(&header, self.max_frame_size)?;
        trace!("read frame header {:?}", header);

        let mut payload = BytesMut::zeroed(header.payload_len);
        if header.payload_len > 0 {
            self.endpoint.read_bytes(&mut payload, deadline).await?;
        }
        T::decode_payload(header.command_type, header.version, &mut payload)
    }
}

/// Encodes one message and writes the whole frame to an endpoint.
pub struct ProtocolWriter<'a, E: Endpoint> {
    endpoint: &'a mut E,
}

impl<'a, E: Endpoint> ProtocolWriter<'a, E> {
    pub fn new(endpoint: &'a mut E) -> Self {
        ProtocolWriter { endpoint }
    }

    /// Writes the frame fully within `timeout`. Nothing is recovered after a
    /// failure, the connection is abandoned by the caller.
    pub async fn write_command<T: ProtocolCodec>(
        &mut self,
        message: &T,
        timeout: Duration,
    ) -> AppResult<()> {
        let deadline = Instant::now() + timeout;
        let frame = encode_frame(message);
        trace!(
            "write {} frame of {} bytes",
            message.command_type(),
            frame.len()
        );
        self.endpoint.write_bytes(&frame, deadline).await
    }
}
