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

//! Per-connection registration state

/// What one connection has told us so far.
///
/// Registration completes once a nickname and username are both set and
/// the password gate, when configured, has been passed.
#[derive(Debug, Default)]
pub struct ClientSession {
    /// Nickname claimed via NICK, unique among live connections.
    pub nick: Option<String>,
    /// Username supplied via USER.
    pub username: Option<String>,
    /// Real name supplied via USER.
    pub realname: Option<String>,
    /// The PASS gate was passed (or no password is configured).
    pub pass_accepted: bool,
    /// Registration completed; chat commands are available.
    pub registered: bool,
}

impl ClientSession {
    /// Create a session; `pass_accepted` starts true when no password is
    /// required.
    pub fn new(password_required: bool) -> Self {
        Self {
            pass_accepted: !password_required,
            ..Self::default()
        }
    }

    /// Whether everything needed for registration is present.
    pub fn ready_to_register(&self) -> bool {
        !self.registered && self.pass_accepted && self.nick.is_some() && self.username.is_some()
    }

    /// The display name for message sources: the nick once claimed,
    /// `*` before that.
    pub fn display_nick(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }
}
