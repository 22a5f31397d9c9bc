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
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;

use crate::{AppError, AppResult};

/// One requested output size.
///
/// A width of 0 asks the provider for its square crop policy, the height then
/// being the edge of the square.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Dimension { width, height }
    }

    pub fn is_square_crop(&self) -> bool {
        self.width == 0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Dimension {
    type Err = AppError;

    /// Parses `WxH`, e.g. `120x0` or `1000x1000`.
    fn from_str(s: &str) -> AppResult<Self> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| AppError::InvalidValue(format!("dimension {:?} is not WxH", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| AppError::InvalidValue(format!("dimension {:?}: {}", s, e)))
        };
        Ok(Dimension::new(parse(w)?, parse(h)?))
    }
}

/// A request to render one source image at a set of sizes.
///
/// The order of `dimensions` is significant and duplicates are honored.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GfxTask {
    pub path: PathBuf,
    pub dimensions: Vec<Dimension>,
}

impl GfxTask {
    pub fn new(path: impl Into<PathBuf>, dimensions: Vec<Dimension>) -> Self {
        GfxTask {
            path: path.into(),
            dimensions,
        }
    }
}

/// Task level outcome, the wire error code is the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GfxTaskStatus {
    Success = 0,
    Err = 1,
}

impl GfxTaskStatus {
    pub fn error_code(&self) -> u32 {
        *self as u32
    }

    pub fn error_text(&self) -> &'static str {
        match self {
            GfxTaskStatus::Success => "OK",
            GfxTaskStatus::Err => "ERROR",
        }
    }
}

/// `images[i]` is the rendition of the task's `dimensions[i]`; an empty image
/// means nothing was produced for that size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GfxTaskResult {
    pub status: GfxTaskStatus,
    pub images: Vec<Bytes>,
}

impl GfxTaskResult {
    pub fn success(images: Vec<Bytes>) -> Self {
        GfxTaskResult {
            status: GfxTaskStatus::Success,
            images,
        }
    }

    /// A failed task still carries one (empty) image per requested size.
    pub fn error(image_count: usize) -> Self {
        GfxTaskResult {
            status: GfxTaskStatus::Err,
            images: vec![Bytes::new(); image_count],
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("120x0", Dimension::new(120, 0))]
    #[case("0x250", Dimension::new(0, 250))]
    #[case("1000X1000", Dimension::new(1000, 1000))]
    fn test_parse_dimension(#[case] input: &str, #[case] expected: Dimension) {
        assert_eq!(input.parse::<Dimension>().unwrap(), expected);
        assert_eq!(expected.to_string().parse::<Dimension>().unwrap(), expected);
    }

    #[rstest]
    #[case("120")]
    #[case("ax10")]
    #[case("10x-1")]
    #[case("")]
    fn test_parse_dimension_rejects(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Dimension>(),
            Err(AppError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(GfxTaskStatus::Success.error_code(), 0);
        assert_eq!(GfxTaskStatus::Success.error_text(), "OK");
        assert_eq!(GfxTaskStatus::Err.error_code(), 1);
        assert_eq!(GfxTaskStatus::Err.error_text(), "ERROR");
    }

    #[test]
    fn test_error_result_keeps_one_slot_per_size() {
        let result = GfxTaskResult::error(3);
        assert_eq!(result.status, GfxTaskStatus::Err);
        assert_eq!(result.images.len(), 3);
        assert!(result.images.iter().all(|image| image.is_empty()));
    }
}
