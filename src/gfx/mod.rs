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

//! Thumbnail rendering.
//!
//! - `GfxProcessor`: orders the sizes of a task widest first, calls the image
//!   provider once and restores the caller's order.
//! - `ImageProvider` / `FileAccess`: the decoding collaborator and the file
//!   handle it reads through. Decoders crash on malformed input, which is the
//!   reason the whole worker runs out of process.
//! - `ImageCrateProvider`: the provider used by the binary.

pub use image_provider::{ImageConfig, ImageCrateProvider};
pub use processor::{GfxProcessor, WORKER_EXTRA_FORMATS};
pub use provider::{FileAccess, ImageProvider, LocalFileAccess};
pub use task::{Dimension, GfxTask, GfxTaskResult, GfxTaskStatus};

mod image_provider;
mod processor;
mod provider;
mod task;

#[cfg(test)]
pub(crate) use processor::tests::RecordingProvider;
