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

//! Image provider backed by the `image` crate.
//!
//! Sizes are rendered in the order given. A width of 0 asks for a square: the
//! largest centered square for landscape images, and for portrait images a
//! square whose centre sits 1/6 of the height above the image centre (faces
//! tend to be there). Any other size is a bounding box the image is scaled
//! down to fit; images already inside the box are left at their size.
//!
//! Bounding box renditions are derived from the previous one whenever it is
//! still large enough, which is why callers pass the widest size first.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use tracing::{debug, trace};

use crate::{AppError, AppResult};

use super::{Dimension, FileAccess, ImageProvider};

const SUPPORTED_FORMATS: &str = ".jpg.jpeg.png.gif.bmp.ico.webp.tga.qoi";

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Sources with more pixels than this are refused before full decode.
    pub max_decoded_pixels: u64,
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            max_decoded_pixels: 100_000_000,
            jpeg_quality: 85,
        }
    }
}

/// Stateless between calls, safe to share across pool workers.
#[derive(Debug, Default, Clone)]
pub struct ImageCrateProvider {
    config: ImageConfig,
}

impl ImageCrateProvider {
    pub fn new(config: ImageConfig) -> Self {
        ImageCrateProvider { config }
    }

    fn decode(&self, bytes: &[u8]) -> AppResult<DynamicImage> {
        // header first, so oversized sources are refused cheaply
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        self.validate_pixel_limits(width, height)?;

        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Ok(image)
    }

    fn validate_pixel_limits(&self, width: u32, height: u32) -> AppResult<()> {
        let pixels = width as u64 * height as u64;
        if pixels > self.config.max_decoded_pixels {
            return Err(AppError::ResourceLimit(format!(
                "image of {}x{} has {} pixels (limit: {})",
                width, height, pixels, self.config.max_decoded_pixels
            )));
        }
        Ok(())
    }

    fn square_crop(source: &DynamicImage, edge: u32) -> DynamicImage {
        let (width, height) = source.dimensions();
        let side = width.min(height);
        let (x, y) = if width >= height {
            ((width - side) / 2, 0)
        } else {
            let centre = height / 2 - height / 6;
            let top = centre.saturating_sub(side / 2).min(height - side);
            (0, top)
        };
        source
            .crop_imm(x, y, side, side)
            .resize_exact(edge, edge, FilterType::Lanczos3)
    }

    fn fit_inside(source: &DynamicImage, dimension: Dimension) -> DynamicImage {
        let (width, height) = source.dimensions();
        if width <= dimension.width && height <= dimension.height {
            return source.clone();
        }
        source.resize(dimension.width, dimension.height, FilterType::Lanczos3)
    }

    fn encode_jpeg(&self, image: &DynamicImage) -> AppResult<Bytes> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
        DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
        Ok(Bytes::from(buffer))
    }
}

/// Size of `original` once scaled down to fit `dimension`.
fn fitted_size(original: (u32, u32), dimension: Dimension) -> (u32, u32) {
    let (width, height) = original;
    let scale = (dimension.width as f64 / width as f64)
        .min(dimension.height as f64 / height as f64)
        .min(1.0);
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

impl ImageProvider for ImageCrateProvider {
    fn generate_images(
        &self,
        file_access: &dyn FileAccess,
        path: &Path,
        dimensions: &[Dimension],
    ) -> AppResult<Vec<Bytes>> {
        if let Some(bad) = dimensions.iter().find(|d| d.height == 0) {
            return Err(AppError::InvalidValue(format!("dimension {} has no height", bad)));
        }
        // crops are scaled to any requested edge; bounding boxes never exceed the source
        for dimension in dimensions.iter().filter(|d| d.is_square_crop()) {
            self.validate_pixel_limits(dimension.height, dimension.height)?;
        }

        let bytes = file_access.read(path)?;
        let decoded = self.decode(&bytes)?;
        let original = decoded.dimensions();
        debug!(
            "decoded {} at {}x{}",
            path.display(),
            original.0,
            original.1
        );

        let mut basis: Option<DynamicImage> = None;
        let mut images = Vec::with_capacity(dimensions.len());
        for &dimension in dimensions {
            let rendition = if dimension.is_square_crop() {
                Self::square_crop(&decoded, dimension.height)
            } else {
                let (target_width, target_height) = fitted_size(original, dimension);
                let source = match &basis {
                    Some(previous)
                        if previous.width() >= target_width
                            && previous.height() >= target_height =>
                    {
                        trace!("derive {} from {}x{}", dimension, previous.width(), previous.height());
                        previous
                    }
                    _ => &decoded,
                };
                let rendition = Self::fit_inside(source, dimension);
                basis = Some(rendition.clone());
                rendition
            };
            images.push(self.encode_jpeg(&rendition)?);
        }
        Ok(images)
    }

    fn supported_formats(&self) -> Option<&str> {
        Some(SUPPORTED_FORMATS)
    }

    fn supported_video_formats(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    use crate::gfx::LocalFileAccess;

    use super::*;

    fn write_source(dir: &TempDir, width: u32, height: u32) -> std::path::PathBuf {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let path = dir.path().join("source.png");
        image.save(&path).unwrap();
        path
    }

    fn sizes(images: &[Bytes]) -> Vec<(u32, u32)> {
        images
            .iter()
            .map(|bytes| image::load_from_memory(bytes).unwrap().dimensions())
            .collect()
    }

    #[test]
    fn test_renders_each_size_in_given_order() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 400, 200);
        let provider = ImageCrateProvider::default();

        let images = provider
            .generate_images(
                &LocalFileAccess,
                &path,
                &[
                    Dimension::new(1000, 1000),
                    Dimension::new(200, 200),
                    Dimension::new(100, 100),
                    Dimension::new(0, 60),
                ],
            )
            .unwrap();

        assert_eq!(sizes(&images), vec![(400, 200), (200, 100), (100, 50), (60, 60)]);
    }

    #[test]
    fn test_portrait_square_crop() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 90, 300);
        let provider = ImageCrateProvider::default();

        let images = provider
            .generate_images(&LocalFileAccess, &path, &[Dimension::new(0, 45)])
            .unwrap();

        assert_eq!(sizes(&images), vec![(45, 45)]);
    }

    #[test]
    fn test_pixel_limit_refuses_source() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 64, 64);
        let provider = ImageCrateProvider::new(ImageConfig {
            max_decoded_pixels: 1000,
            ..Default::default()
        });

        let result = provider.generate_images(&LocalFileAccess, &path, &[Dimension::new(10, 10)]);

        assert!(matches!(result, Err(AppError::ResourceLimit(_))));
    }

    #[test]
    fn test_pixel_limit_refuses_oversized_crop() {
        let dir = TempDir::new().unwrap();
        let path = write_source(&dir, 8, 8);
        let provider = ImageCrateProvider::new(ImageConfig {
            max_decoded_pixels: 1000,
            ..Default::default()
        });

        let result = provider.generate_images(
            &LocalFileAccess,
            &path,
            &[Dimension::new(8, 8), Dimension::new(0, 400_000)],
        );
        assert!(matches!(result, Err(AppError::ResourceLimit(_))));

        // a huge bounding box is fine, the source is never upscaled
        let images = provider
            .generate_images(&LocalFileAccess, &path, &[Dimension::new(400_000, 400_000)])
            .unwrap();
        assert_eq!(sizes(&images), vec![(8, 8)]);
    }

    #[test]
    fn test_garbage_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();
        let provider = ImageCrateProvider::default();

        let result = provider.generate_images(&LocalFileAccess, &path, &[Dimension::new(10, 10)]);

        assert!(result.is_err());
    }

    #[test]
    fn test_zero_height_is_refused() {
        let provider = ImageCrateProvider::default();

        let result = provider.generate_images(
            &LocalFileAccess,
            Path::new("/does/not/matter.png"),
            &[Dimension::new(120, 0)],
        );

        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }

    #[test]
    fn test_fitted_size() {
        assert_eq!(fitted_size((400, 200), Dimension::new(100, 100)), (100, 50));
        assert_eq!(fitted_size((400, 200), Dimension::new(1000, 1000)), (400, 200));
        assert_eq!(fitted_size((200, 400), Dimension::new(100, 100)), (50, 100));
    }

    #[test]
    fn test_formats() {
        let provider = ImageCrateProvider::default();
        assert_eq!(provider.supported_formats(), Some(SUPPORTED_FORMATS));
        assert_eq!(provider.supported_video_formats(), None);
    }
}
