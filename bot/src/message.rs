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

//! Parsing of server-originated lines

/// One parsed line from the server.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerMessage {
    /// Nick part of the source prefix, when the line carried one.
    pub source_nick: Option<String>,
    /// Uppercased command or numeric.
    pub command: String,
    /// Parameters; a `:`-introduced trailing parameter keeps its spaces.
    pub params: Vec<String>,
}

impl ServerMessage {
    /// Parse `[:prefix] <command> [params] [:trailing]`.
    ///
    /// Returns `None` for blank lines or a prefix with no command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_start();
        let source_nick = if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, tail) = prefixed.split_once(' ')?;
            rest = tail.trim_start();
            // "nick!user@host" or bare server name; the nick is what we use.
            let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
            Some(nick.to_string())
        } else {
            None
        };
        if rest.is_empty() {
            return None;
        }
        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, tail)) => (cmd, tail.trim_start()),
            None => (rest, ""),
        };
        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((word, tail)) => {
                    params.push(word.to_string());
                    rest = tail.trim_start();
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }
        Some(Self {
            source_nick,
            command: command.to_ascii_uppercase(),
            params,
        })
    }
}
