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

use std::path::Path;

use bytes::Bytes;

use crate::AppResult;

use super::Dimension;

/// Read access to source files, handed through to the image provider.
pub trait FileAccess: Send + Sync {
    fn read(&self, path: &Path) -> AppResult<Vec<u8>>;
}

/// Plain local filesystem access.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileAccess;

impl FileAccess for LocalFileAccess {
    fn read(&self, path: &Path) -> AppResult<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }
}

/// Decodes a source image and renders it at the requested sizes.
///
/// One provider instance is shared by every pool worker and is called
/// concurrently, so implementations must keep no mutable decode state between
/// calls (or synchronize it internally).
pub trait ImageProvider: Send + Sync + 'static {
    /// Renders `dimensions` in the given order and returns one encoded image per
    /// dimension, in that same order.
    ///
    /// Callers pass the dimensions widest first so the first rendition can serve
    /// as the basis for the smaller ones.
    fn generate_images(
        &self,
        file_access: &dyn FileAccess,
        path: &Path,
        dimensions: &[Dimension],
    ) -> AppResult<Vec<Bytes>>;

    /// Still image extensions, e.g. `.jpg.png`; `None` if there is no filter.
    fn supported_formats(&self) -> Option<&str>;

    /// Video extensions; `None` if there is no filter.
    fn supported_video_formats(&self) -> Option<&str>;
}
