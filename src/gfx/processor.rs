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

use bytes::Bytes;
use tracing::{debug, error};

use super::{Dimension, FileAccess, GfxTask, GfxTaskResult, ImageProvider, LocalFileAccess};

/// Formats the worker accepts on top of the provider's own list because they
/// are known to crash the decoder, which is why they go to the isolated process.
///
/// A short extension must come before the longer ones starting with it (`.tif`
/// before `.tiff`): a lookup that only checks the first occurrence of `.tif`
/// would otherwise land inside `.tiff` and miss.
pub const WORKER_EXTRA_FORMATS: &str = ".tif.exr.pic.pct.tiff.pict";

/// Renders every size of a gfx task, widest first, and hands the images back in
/// the caller's order.
pub struct GfxProcessor<P: ImageProvider> {
    provider: P,
    file_access: Box<dyn FileAccess>,
}

impl<P: ImageProvider> GfxProcessor<P> {
    pub fn new(provider: P) -> Self {
        Self::with_file_access(provider, Box::new(LocalFileAccess))
    }

    pub fn with_file_access(provider: P, file_access: Box<dyn FileAccess>) -> Self {
        GfxProcessor {
            provider,
            file_access,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Any provider failure, or a provider answer with the wrong number of
    /// images, fails the whole task.
    pub fn process(&self, task: &GfxTask) -> GfxTaskResult {
        let path = task.path.display();
        if task.dimensions.is_empty() {
            error!("received empty dimensions for {}", path);
            return GfxTaskResult::error(0);
        }

        let order = widest_first_order(&task.dimensions);
        let sorted: Vec<Dimension> = order.iter().map(|&i| task.dimensions[i]).collect();

        debug!("generate {} images for {}", sorted.len(), path);
        let images =
            match self
                .provider
                .generate_images(self.file_access.as_ref(), &task.path, &sorted)
            {
                Ok(images) => images,
                Err(e) => {
                    error!("generate images for {} failed: {}", path, e);
                    return GfxTaskResult::error(task.dimensions.len());
                }
            };

        if images.len() != sorted.len() {
            error!(
                "provider returned {} images for {} sizes of {}",
                images.len(),
                sorted.len(),
                path
            );
            return GfxTaskResult::error(task.dimensions.len());
        }

        // scatter back to the requested order
        let mut output = vec![Bytes::new(); task.dimensions.len()];
        for (image, &index) in images.into_iter().zip(order.iter()) {
            output[index] = image;
        }

        GfxTaskResult::success(output)
    }

    /// Provider formats followed by [`WORKER_EXTRA_FORMATS`], or an empty string
    /// when the provider has no list.
    pub fn supported_formats(&self) -> String {
        match self.provider.supported_formats() {
            Some(formats) if !formats.is_empty() => format!("{}{}", formats, WORKER_EXTRA_FORMATS),
            _ => String::new(),
        }
    }

    pub fn supported_video_formats(&self) -> String {
        self.provider
            .supported_video_formats()
            .map(str::to_string)
            .unwrap_or_default()
    }
}

/// Indices of `dimensions` ordered by width, widest first. Equal widths keep
/// their request order so the processing order is reproducible.
fn widest_first_order(dimensions: &[Dimension]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..dimensions.len()).collect();
    order.sort_by(|&a, &b| dimensions[b].width.cmp(&dimensions[a].width));
    order
}
