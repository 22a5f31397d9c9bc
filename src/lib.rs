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

//! Out-of-process graphics worker.
//!
//! Image decoders crash on malformed input, so rendering lives in its own
//! process. Every connection to the worker carries exactly one framed command
//! and gets back at most one framed response.

#[cfg(unix)]
mod client;
pub mod gfx;
pub mod network;
pub mod protocol;
pub mod request;
pub mod service;
pub mod utils;

#[cfg(unix)]
pub use client::GfxClient;
#[cfg(unix)]
pub use service::Server;
pub use service::{setup_local_tracing, setup_tracing, AppError, AppResult, WorkerConfig};
