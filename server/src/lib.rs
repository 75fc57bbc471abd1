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

//! A line-oriented chat server on the confab reactor
//!
//! Clients register with PASS (when a password is configured), NICK and
//! USER; a completed registration draws the 001 welcome. JOIN and PART
//! manage channel membership, PRIVMSG delivers to a channel's members or a
//! single nick, PING keeps the connection alive and QUIT leaves politely.

mod chat;
mod config;
mod session;

pub use chat::ChatServer;
pub use config::ServerConfig;
pub use session::ClientSession;
