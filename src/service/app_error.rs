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

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    DetailedIoError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// protocol errors, the connection is dropped without a response
    #[error("malformed protocol: {0}")]
    MalformedProtocol(String),

    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u16),

    #[error("unknown command type: {0}")]
    UnknownCommandType(u16),

    #[error("frame of length {0} is too large")]
    FrameTooLarge(usize),

    #[error("timed out: {0}")]
    Timeout(String),

    /// image provider errors
    #[error("image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
}
