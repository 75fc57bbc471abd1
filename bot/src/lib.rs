//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! A poll-running chat bot on the confab reactor
//!
//! Drives a single outbound connection: logs in, answers PING, and runs one
//! room poll at a time (`!poll start`, `vote <n>`, `!poll close`).

mod bot;
mod config;
mod message;

pub use bot::PollBot;
pub use config::BotConfig;
pub use message::ServerMessage;
