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

extern crate config as _;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gfx::ImageConfig;
use crate::request::ProcessorConfig;
use crate::utils::WorkerPoolConfig;

use super::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub socket_path: String,
    pub max_frame_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            socket_path: "/tmp/gfxworker.sock".to_string(),
            max_frame_size: 64 * 1024 * 1024,
        }
    }
}

/// Read/write deadlines of one connection, in milliseconds.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProtocolConfig {
    pub read_timeout: u64,
    pub write_timeout: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            read_timeout: 5000,
            write_timeout: 5000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerPoolSection {
    /// 0 means one worker per cpu
    pub thread_count: usize,
    pub max_queue_size: usize,
    pub monitor_interval: u64,
}

impl Default for WorkerPoolSection {
    fn default() -> Self {
        WorkerPoolSection {
            thread_count: 0,
            max_queue_size: 64,
            monitor_interval: 5000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ImageSection {
    pub max_decoded_pixels: u64,
    pub jpeg_quality: u8,
}

impl Default for ImageSection {
    fn default() -> Self {
        ImageSection {
            max_decoded_pixels: 100_000_000,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub worker_pool: WorkerPoolSection,
    pub image: ImageSection,
}

impl WorkerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<WorkerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str).required(false))
            .add_source(config::Environment::with_prefix("GFXWORKER").separator("__"))
            .build()?;

        let worker_config: WorkerConfig = config.try_deserialize()?;
        worker_config.validate()?;

        Ok(worker_config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.worker_pool.max_queue_size == 0 {
            return Err(AppError::InvalidValue(
                "worker_pool.max_queue_size must be greater than 0".to_string(),
            ));
        }
        if self.network.max_frame_size < crate::network::FrameHeader::SIZE {
            return Err(AppError::InvalidValue(format!(
                "network.max_frame_size {} is too small",
                self.network.max_frame_size
            )));
        }
        if self.image.jpeg_quality == 0 || self.image.jpeg_quality > 100 {
            return Err(AppError::InvalidValue(format!(
                "image.jpeg_quality {} not in 1..=100",
                self.image.jpeg_quality
            )));
        }
        Ok(())
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            read_timeout: Duration::from_millis(self.protocol.read_timeout),
            write_timeout: Duration::from_millis(self.protocol.write_timeout),
            max_frame_size: self.network.max_frame_size,
        }
    }

    pub fn pool_config(&self) -> WorkerPoolConfig {
        let thread_count = match self.worker_pool.thread_count {
            0 => num_cpus::get(),
            n => n,
        };
        WorkerPoolConfig {
            thread_count,
            max_queue_size: self.worker_pool.max_queue_size,
            monitor_interval: Duration::from_millis(self.worker_pool.monitor_interval),
        }
    }

    pub fn image_config(&self) -> ImageConfig {
        ImageConfig {
            max_decoded_pixels: self.image.max_decoded_pixels,
            jpeg_quality: self.image.jpeg_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::set_up_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.protocol.read_timeout, 5000);
        assert_eq!(config.protocol.write_timeout, 5000);
        assert!(config.pool_config().thread_count >= 1);
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[protocol]\nread_timeout = 250\n\n[worker_pool]\nthread_count = 3\nmax_queue_size = 7"
        )
        .unwrap();

        let config = WorkerConfig::set_up_config(file.path()).unwrap();
        let processor = config.processor_config();
        assert_eq!(processor.read_timeout, Duration::from_millis(250));
        assert_eq!(processor.write_timeout, Duration::from_millis(5000));

        let pool = config.pool_config();
        assert_eq!(pool.thread_count, 3);
        assert_eq!(pool.max_queue_size, 7);
    }

    #[test]
    fn test_zero_queue_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[worker_pool]\nmax_queue_size = 0").unwrap();

        let result = WorkerConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }
}
