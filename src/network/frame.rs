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

use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::{CommandType, FrameVersion, ProtocolCodec};
use crate::{AppError, AppResult};

/// Fixed size head of every frame: version, command type and payload length,
/// all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: FrameVersion,
    pub command_type: CommandType,
    pub payload_len: usize,
}

impl FrameHeader {
    pub const SIZE: usize = 2 + 2 + 4;

    /// The version is checked before anything else, a newer peer may have laid
    /// out the rest differently.
    pub fn parse(mut bytes: &[u8], max_frame_size: usize) -> AppResult<FrameHeader> {
        if bytes.remaining() < Self::SIZE {
            return Err(AppError::MalformedProtocol(format!(
                "frame header needs {} bytes, got {}",
                Self::SIZE,
                bytes.remaining()
            )));
        }
        let version = FrameVersion::try_from(bytes.get_u16())?;
        let command_type = CommandType::try_from(bytes.get_u16())?;
        let payload_len = bytes.get_u32() as usize;
        if payload_len > max_frame_size {
            return Err(AppError::FrameTooLarge(payload_len));
        }
        Ok(FrameHeader {
            version,
            command_type,
            payload_len,
        })
    }

    pub fn write_to(&self, writer: &mut BytesMut) {
        writer.put_u16(self.version.as_u16());
        writer.put_u16(self.command_type.as_u16());
        writer.put_u32(self.payload_len as u32);
    }
}

/// Serializes `message` into a complete frame at the latest version.
pub fn encode_frame<T: ProtocolCodec>(message: &T) -> BytesMut {
    let mut payload = BytesMut::new();
    message.encode_payload(&mut payload);

    let header = FrameHeader {
        version: FrameVersion::LATEST,
        command_type: message.command_type(),
        payload_len: payload.len(),
    };
    let mut frame = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
    header.write_to(&mut frame);
    frame.unsplit(payload);
    frame
}
