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

//! Request handling
//!
//! One connection carries one command: [`RequestProcessor::process`] reads it,
//! and a pool worker running [`CommandHandler`] answers it.

pub use handler::CommandHandler;
pub use request_processor::{ProcessorConfig, RequestProcessor, RequestTask};

mod handler;
mod request_processor;
