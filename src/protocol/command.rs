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

use std::path::PathBuf;

use bytes::{Bytes, BytesMut};

use crate::gfx::{Dimension, GfxTask, GfxTaskResult};
use crate::{AppError, AppResult};

use super::{CommandType, FrameVersion, PrimaryType, ProtocolCodec};

/// A request, exactly one per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello,
    Shutdown,
    NewGfx(GfxTask),
    SupportFormats,
}

/// The answer to a [`Command`], one variant per command kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Hello,
    Shutdown,
    NewGfx(NewGfxResponse),
    SupportFormats(SupportFormatsResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGfxResponse {
    pub error_code: u32,
    pub error_text: String,
    pub images: Vec<Bytes>,
}

impl From<GfxTaskResult> for NewGfxResponse {
    fn from(result: GfxTaskResult) -> Self {
        NewGfxResponse {
            error_code: result.status.error_code(),
            error_text: result.status.error_text().to_string(),
            images: result.images,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupportFormatsResponse {
    pub formats: String,
    pub video_formats: String,
}

fn unexpected(command_type: CommandType, side: &str) -> AppError {
    AppError::MalformedProtocol(format!("{} is not a {}", command_type, side))
}

fn ensure_consumed(payload: &BytesMut, command_type: CommandType) -> AppResult<()> {
    if !payload.is_empty() {
        return Err(AppError::MalformedProtocol(format!(
            "{} trailing bytes after {} payload",
            payload.len(),
            command_type
        )));
    }
    Ok(())
}

impl Command {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Command::Shutdown)
    }
}

impl ProtocolCodec for Command {
    fn command_type(&self) -> CommandType {
        match self {
            Command::Hello => CommandType::Hello,
            Command::Shutdown => CommandType::Shutdown,
            Command::NewGfx(_) => CommandType::NewGfx,
            Command::SupportFormats => CommandType::SupportFormats,
        }
    }

    fn encode_payload(&self, writer: &mut BytesMut) {
        if let Command::NewGfx(task) = self {
            task.path.encode(writer);
            task.dimensions.encode(writer);
        }
    }

    fn decode_payload(
        command_type: CommandType,
        version: FrameVersion,
        payload: &mut BytesMut,
    ) -> AppResult<Self> {
        let command = match version {
            FrameVersion::V1 => match command_type {
                CommandType::Hello => Command::Hello,
                CommandType::Shutdown => Command::Shutdown,
                CommandType::SupportFormats => Command::SupportFormats,
                CommandType::NewGfx => {
                    let path = PathBuf::decode(payload)?;
                    let dimensions = Vec::<Dimension>::decode(payload)?;
                    Command::NewGfx(GfxTask { path, dimensions })
                }
                CommandType::HelloResponse
                | CommandType::ShutdownResponse
                | CommandType::NewGfxResponse
                | CommandType::SupportFormatsResponse => {
                    return Err(unexpected(command_type, "request"))
                }
            },
        };
        ensure_consumed(payload, command_type)?;
        Ok(command)
    }
}

impl ProtocolCodec for Response {
    fn command_type(&self) -> CommandType {
        match self {
            Response::Hello => CommandType::HelloResponse,
            Response::Shutdown => CommandType::ShutdownResponse,
            Response::NewGfx(_) => CommandType::NewGfxResponse,
            Response::SupportFormats(_) => CommandType::SupportFormatsResponse,
        }
    }

    fn encode_payload(&self, writer: &mut BytesMut) {
        match self {
            Response::Hello | Response::Shutdown => {}
            Response::NewGfx(response) => {
                response.error_code.encode(writer);
                response.error_text.encode(writer);
                response.images.encode(writer);
            }
            Response::SupportFormats(response) => {
                response.formats.encode(writer);
                response.video_formats.encode(writer);
            }
        }
    }

    fn decode_payload(
        command_type: CommandType,
        version: FrameVersion,
        payload: &mut BytesMut,
    ) -> AppResult<Self> {
        let response = match version {
            FrameVersion::V1 => match command_type {
                CommandType::HelloResponse => Response::Hello,
                CommandType::ShutdownResponse => Response::Shutdown,
                CommandType::NewGfxResponse => Response::NewGfx(NewGfxResponse {
                    error_code: u32::decode(payload)?,
                    error_text: String::decode(payload)?,
                    images: Vec::<Bytes>::decode(payload)?,
                }),
                CommandType::SupportFormatsResponse => {
                    Response::SupportFormats(SupportFormatsResponse {
                        formats: String::decode(payload)?,
                        video_formats: String::decode(payload)?,
                    })
                }
                CommandType::Hello
                | CommandType::Shutdown
                | CommandType::NewGfx
                | CommandType::SupportFormats => return Err(unexpected(command_type, "response")),
            },
        };
        ensure_consumed(payload, command_type)?;
        Ok(response)
    }
}
