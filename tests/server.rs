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

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gfxworker::gfx::{Dimension, GfxProcessor, GfxTask, ImageConfig, ImageCrateProvider};
use gfxworker::request::ProcessorConfig;
use gfxworker::utils::WorkerPoolConfig;
use gfxworker::{AppError, GfxClient, Server};
use image::{GenericImageView, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time;

fn write_source(dir: &TempDir, width: u32, height: u32) -> PathBuf {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let path = dir.path().join("source.png");
    image.save(&path).unwrap();
    path
}

fn start_worker(socket_path: &Path, read_timeout: Duration) -> JoinHandle<gfxworker::AppResult<()>> {
    let gfx = Arc::new(GfxProcessor::new(ImageCrateProvider::new(
        ImageConfig::default(),
    )));
    let server = Server::bind(
        socket_path,
        gfx,
        ProcessorConfig {
            read_timeout,
            ..ProcessorConfig::default()
        },
        WorkerPoolConfig {
            thread_count: 2,
            max_queue_size: 8,
            monitor_interval: Duration::from_millis(100),
        },
    )
    .unwrap();
    tokio::spawn(server.run())
}

fn decoded_sizes(images: &[bytes::Bytes]) -> Vec<(u32, u32)> {
    images
        .iter()
        .map(|bytes| image::load_from_memory(bytes).unwrap().dimensions())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_serves_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("gfxworker.sock");
    let source = write_source(&dir, 400, 300);
    let worker = start_worker(&socket_path, Duration::from_secs(5));
    let client = GfxClient::new(&socket_path, ProcessorConfig::default());

    client.hello().await.unwrap();

    let formats = client.support_formats().await.unwrap();
    assert_eq!(
        formats.formats,
        ".jpg.jpeg.png.gif.bmp.ico.webp.tga.qoi.tif.exr.pic.pct.tiff.pict"
    );
    assert_eq!(formats.video_formats, "");

    let response = client
        .generate(GfxTask::new(
            &source,
            vec![
                Dimension::new(100, 100),
                Dimension::new(0, 50),
                Dimension::new(300, 300),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.error_code, 0);
    assert_eq!(response.error_text, "OK");
    assert_eq!(
        decoded_sizes(&response.images),
        vec![(100, 75), (50, 50), (300, 225)]
    );

    client.shutdown().await.unwrap();
    time::timeout(Duration::from_secs(10), worker)
        .await
        .expect("worker stops after shutdown")
        .unwrap()
        .unwrap();
    assert!(!socket_path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreadable_source_is_an_error_response() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("gfxworker.sock");
    let worker = start_worker(&socket_path, Duration::from_secs(5));
    let client = GfxClient::new(&socket_path, ProcessorConfig::default());

    let response = client
        .generate(GfxTask::new(
            dir.path().join("missing.png"),
            vec![Dimension::new(64, 64), Dimension::new(32, 32)],
        ))
        .await
        .unwrap();
    assert_eq!(response.error_code, 1);
    assert_eq!(response.error_text, "ERROR");
    assert_eq!(response.images.len(), 2);
    assert!(response.images.iter().all(|image| image.is_empty()));

    let response = client
        .generate(GfxTask::new(dir.path().join("missing.png"), vec![]))
        .await
        .unwrap();
    assert_eq!(response.error_code, 1);
    assert!(response.images.is_empty());

    client.shutdown().await.unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbage_connection_does_not_stop_the_worker() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("gfxworker.sock");
    let worker = start_worker(&socket_path, Duration::from_millis(200));
    let client = GfxClient::new(&socket_path, ProcessorConfig::default());

    // unknown command type, dropped without an answer
    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    stream
        .write_all(&[0, 1, 0, 99, 0, 0, 0, 0])
        .await
        .unwrap();
    drop(stream);

    // a client that never finishes its frame times out on the worker side
    let mut stalled = UnixStream::connect(&socket_path).await.unwrap();
    stalled.write_all(&[0, 1]).await.unwrap();

    client.hello().await.unwrap();
    drop(stalled);

    client.shutdown().await.unwrap();
    worker.await.unwrap().unwrap();

    assert!(matches!(
        client.hello().await,
        Err(AppError::DetailedIoError(_))
    ));
}
