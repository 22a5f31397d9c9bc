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

//! Network Module Implementation
//!
//! Moves one framed message per call over a connection, bounded by a deadline.
//!
//! # Components
//!
//! - `Endpoint`: a connection's byte channel, implemented for every tokio
//!   stream (Unix sockets in production, in-memory pipes in tests)
//! - `FrameHeader`: version, command type and payload length of a frame
//! - `ProtocolReader` / `ProtocolWriter`: read or write exactly one complete
//!   frame within a timeout
//!
//! # Frame layout
//!
//! ```text
//! +---------+--------------+-------------+-----------------+
//! | version | command type | payload len | payload ...     |
//! |   u16   |     u16      |     u32     | payload len     |
//! +---------+--------------+-------------+-----------------+
//! ```

pub use endpoint::Endpoint;
pub use frame::{encode_frame, FrameHeader};
pub use protocol_io::{ProtocolReader, ProtocolWriter};

mod endpoint;
mod frame;
mod protocol_io;
