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

//! Bot identity and connection settings

/// Where the bot connects and who it claims to be.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Server address, `host:port`.
    pub server_addr: String,

    /// Connection password sent as PASS before NICK/USER, when set.
    pub password: Option<String>,

    /// Nickname.
    pub nick: String,

    /// Username for the USER command.
    pub username: String,

    /// Real name for the USER command.
    pub realname: String,

    /// Room the bot announces polls in.
    pub channel: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            password: None,
            nick: "pollbot".to_string(),
            username: "pollbot".to_string(),
            realname: "Poll Bot".to_string(),
            channel: "#lobby".to_string(),
        }
    }
}

impl BotConfig {
    /// Set the server address.
    pub fn with_server_addr(mut self, addr: impl Into<String>) -> Self {
        self.server_addr = addr.into();
        self
    }

    /// Set the connection password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the nickname.
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = nick.into();
        self
    }

    /// Set the room.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}
