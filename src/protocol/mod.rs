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

use std::fmt;

use bytes::BytesMut;

use crate::{AppError, AppResult};

pub use command::{Command, NewGfxResponse, Response, SupportFormatsResponse};
pub use primary_types::PrimaryType;

mod command;
mod primary_types;

/// Frame format version. Decoding refuses anything newer than [`FrameVersion::LATEST`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum FrameVersion {
    V1 = 1,
}

impl FrameVersion {
    pub const LATEST: FrameVersion = FrameVersion::V1;

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl TryFrom<u16> for FrameVersion {
    type Error = AppError;

    fn try_from(value: u16) -> AppResult<Self> {
        match value {
            0 => Err(AppError::MalformedProtocol("frame version 0".to_string())),
            1 => Ok(FrameVersion::V1),
            v => Err(AppError::UnsupportedVersion(v)),
        }
    }
}

/// Wire values are stable across frame versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandType {
    Hello = 1,
    HelloResponse = 2,
    Shutdown = 3,
    ShutdownResponse = 4,
    NewGfx = 5,
    NewGfxResponse = 6,
    SupportFormats = 7,
    SupportFormatsResponse = 8,
}

impl CommandType {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Hello => "HELLO",
            CommandType::HelloResponse => "HELLO_RESPONSE",
            CommandType::Shutdown => "SHUTDOWN",
            CommandType::ShutdownResponse => "SHUTDOWN_RESPONSE",
            CommandType::NewGfx => "NEW_GFX",
            CommandType::NewGfxResponse => "NEW_GFX_RESPONSE",
            CommandType::SupportFormats => "SUPPORT_FORMATS",
            CommandType::SupportFormatsResponse => "SUPPORT_FORMATS_RESPONSE",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.as_u16(), self.name())
    }
}

impl TryFrom<u16> for CommandType {
    type Error = AppError;

    fn try_from(value: u16) -> AppResult<Self> {
        let command_type = match value {
            1 => CommandType::Hello,
            2 => CommandType::HelloResponse,
            3 => CommandType::Shutdown,
            4 => CommandType::ShutdownResponse,
            5 => CommandType::NewGfx,
            6 => CommandType::NewGfxResponse,
            7 => CommandType::SupportFormats,
            8 => CommandType::SupportFormatsResponse,
            v => return Err(AppError::UnknownCommandType(v)),
        };
        Ok(command_type)
    }
}

/// A message that travels as the payload of one frame.
///
/// Requests and responses share this codec so the worker and its client use
/// the same reader and writer.
pub trait ProtocolCodec: Sized {
    fn command_type(&self) -> CommandType;

    /// Writes the payload only; the frame header is written by the caller.
    fn encode_payload(&self, writer: &mut BytesMut);

    /// Decodes a whole payload. Bytes left over after decoding are an error.
    fn decode_payload(
        command_type: CommandType,
        version: FrameVersion,
        payload: &mut BytesMut,
    ) -> AppResult<Self>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(2, false)]
    #[case(u16::MAX, false)]
    fn test_frame_version(#[case] raw: u16, #[case] supported: bool) {
        let version = FrameVersion::try_from(raw);
        assert_eq!(version.is_ok(), supported);
        if raw > FrameVersion::LATEST.as_u16() {
            assert!(matches!(version, Err(AppError::UnsupportedVersion(v)) if v == raw));
        }
    }

    #[test]
    fn test_command_type_values() {
        for raw in 1..=8u16 {
            let command_type = CommandType::try_from(raw).unwrap();
            assert_eq!(command_type.as_u16(), raw);
        }
        assert!(matches!(
            CommandType::try_from(9),
            Err(AppError::UnknownCommandType(9))
        ));
        assert_eq!(CommandType::NewGfx.to_string(), "5/NEW_GFX");
    }
}
