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

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use gfxworker::gfx::{Dimension, GfxProcessor, GfxTask, ImageCrateProvider};
use gfxworker::service::{setup_local_tracing, setup_tracing, verbosity_level};
use gfxworker::{AppError, AppResult, GfxClient, Server, WorkerConfig};
use tokio::runtime;
use tracing::info;

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// directory of the rolling log file written by `serve`
    #[arg(long, default_value = "./log")]
    pub log_dir: String,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the worker until a client sends shutdown (default)
    Serve,
    /// Print the effective configuration and exit
    PrintConfig,
    /// Check that a worker answers
    Hello,
    /// Ask the running worker to stop
    Shutdown,
    /// Print the formats the worker accepts
    Formats,
    /// Render an image at one or more sizes
    Gfx {
        /// absolute path of the source image
        #[arg(long)]
        path: PathBuf,
        /// WxH, a width of 0 asks for a square crop of height H
        #[arg(long = "size", required = true)]
        sizes: Vec<Dimension>,
        /// directory the rendered images are written to
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let worker_config = WorkerConfig::set_up_config(config_path)?;
    let level = verbosity_level(commandline.verbose);

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    match commandline.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let _tracing_guard = setup_tracing(&commandline.log_dir, level)?;
            rt.block_on(serve(worker_config))
        }
        Command::PrintConfig => {
            println!("{:#?}", worker_config);
            Ok(())
        }
        command => {
            setup_local_tracing(level)?;
            let client = GfxClient::new(
                &worker_config.network.socket_path,
                worker_config.processor_config(),
            );
            rt.block_on(run_client(&client, command))
        }
    }
}

async fn serve(config: WorkerConfig) -> AppResult<()> {
    let provider = ImageCrateProvider::new(config.image_config());
    let gfx = Arc::new(GfxProcessor::new(provider));
    let pool_config = config.pool_config();
    info!(
        "starting gfx worker with {} workers and a queue of {}",
        pool_config.thread_count, pool_config.max_queue_size
    );

    let server = Server::bind(
        &config.network.socket_path,
        gfx,
        config.processor_config(),
        pool_config,
    )?;
    server.run().await?;
    info!("gfx worker stopped");
    Ok(())
}

async fn run_client(client: &GfxClient, command: Command) -> AppResult<()> {
    match command {
        Command::Hello => {
            client.hello().await?;
            println!("worker is alive");
        }
        Command::Shutdown => {
            client.shutdown().await?;
            println!("worker is shutting down");
        }
        Command::Formats => {
            let formats = client.support_formats().await?;
            println!("formats: {}", formats.formats);
            println!("video formats: {}", formats.video_formats);
        }
        Command::Gfx { path, sizes, out } => {
            let task = GfxTask::new(path, sizes.clone());
            let response = client.generate(task).await?;
            println!("{} {}", response.error_code, response.error_text);
            if response.error_code != 0 {
                return Err(AppError::IllegalStateError(format!(
                    "worker failed to render: {}",
                    response.error_text
                )));
            }
            for (index, (size, image)) in sizes.iter().zip(&response.images).enumerate() {
                match &out {
                    Some(dir) => {
                        let file = dir.join(format!("{}_{}.jpg", index, size));
                        fs::write(&file, image)?;
                        println!("{} -> {}", size, file.display());
                    }
                    None => println!("{}: {} bytes", size, image.len()),
                }
            }
        }
        Command::Serve | Command::PrintConfig => {}
    }
    Ok(())
}
