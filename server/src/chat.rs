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

//! The chat protocol handler: registration gate, channels, lifecycle

use crate::config::ServerConfig;
use crate::session::ClientSession;
use confab_reactor::{ConnId, ReactorApi, ReactorHandler};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// The chat server over the reactor.
///
/// Clients register with PASS (when a password is configured), NICK and
/// USER, then JOIN channels. PRIVMSG delivers to a channel's other members
/// or to a single nick; PING is answered, QUIT and PART leave politely,
/// anything else draws a numeric.
pub struct ChatServer {
    config: ServerConfig,
    /// Claimed nicknames, registered or not. Frees on close.
    nicks: HashMap<ConnId, String>,
    /// Connections that completed registration.
    registered: HashSet<ConnId>,
    /// Channel membership. A channel exists while it has members.
    channels: HashMap<String, HashSet<ConnId>>,
}

impl ChatServer {
    /// Create a handler for the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            nicks: HashMap::new(),
            registered: HashSet::new(),
            channels: HashMap::new(),
        }
    }

    fn numeric(&self, api: &mut dyn ReactorApi, id: ConnId, code: &str, tail: &str) {
        api.send_line(id, &format!(":{} {} {}", self.config.server_name, code, tail));
    }

    fn send_channel(
        &self,
        api: &mut dyn ReactorApi,
        channel: &str,
        exclude: Option<ConnId>,
        line: &str,
    ) {
        let Some(members) = self.channels.get(channel) else {
            return;
        };
        for &id in members {
            if Some(id) != exclude {
                api.send_line(id, line);
            }
        }
    }

    /// Everyone sharing at least one channel with `of`, excluding `of`.
    fn channel_peers(&self, of: ConnId) -> HashSet<ConnId> {
        let mut peers = HashSet::new();
        for members in self.channels.values() {
            if members.contains(&of) {
                peers.extend(members.iter().copied());
            }
        }
        peers.remove(&of);
        peers
    }

    fn leave_all(&mut self, id: ConnId) {
        self.channels.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }

    fn is_member(&self, id: ConnId, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|members| members.contains(&id))
    }

    fn try_register(&mut self, api: &mut dyn ReactorApi, id: ConnId, session: &mut ClientSession) {
        if !session.ready_to_register() {
            return;
        }
        session.registered = true;
        self.registered.insert(id);
        let nick = session.display_nick().to_string();
        info!(%id, nick = %nick, "registered");
        self.numeric(
            api,
            id,
            "001",
            &format!("{nick} :Welcome to the confab chat, {nick}"),
        );
    }

    fn cmd_pass(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &mut ClientSession,
        params: &[String],
    ) {
        if session.registered {
            return;
        }
        let Some(required) = self.config.password.as_deref() else {
            return;
        };
        if params.first().map(String::as_str) == Some(required) {
            session.pass_accepted = true;
            self.try_register(api, id, session);
        } else {
            debug!(%id, "password mismatch");
            self.numeric(
                api,
                id,
                "464",
                &format!("{} :Password incorrect", session.display_nick()),
            );
        }
    }

    fn cmd_nick(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &mut ClientSession,
        params: &[String],
    ) {
        let Some(nick) = params.first() else {
            return;
        };
        let in_use = self
            .nicks
            .iter()
            .any(|(&other, taken)| other != id && taken.eq_ignore_ascii_case(nick));
        if in_use {
            self.numeric(
                api,
                id,
                "433",
                &format!("{} {nick} :Nickname is already in use", session.display_nick()),
            );
            return;
        }
        session.nick = Some(nick.clone());
        self.nicks.insert(id, nick.clone());
        self.try_register(api, id, session);
    }

    fn cmd_user(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &mut ClientSession,
        params: &[String],
    ) {
        if session.registered || params.len() < 4 {
            return;
        }
        session.username = Some(params[0].clone());
        session.realname = Some(params[3].clone());
        self.try_register(api, id, session);
    }

    fn cmd_join(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &ClientSession,
        params: &[String],
    ) {
        if !session.registered {
            self.not_registered(api, id, session);
            return;
        }
        let Some(name) = params.first() else {
            return;
        };
        if !name.starts_with('#') {
            self.numeric(
                api,
                id,
                "403",
                &format!("{} {name} :No such channel", session.display_nick()),
            );
            return;
        }
        if !self.channels.entry(name.clone()).or_default().insert(id) {
            return; // already a member
        }
        info!(%id, channel = %name, nick = session.display_nick(), "joined");
        let notice = format!(":{} JOIN {name}", session.display_nick());
        self.send_channel(api, name, None, &notice);
    }

    fn cmd_part(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &ClientSession,
        params: &[String],
    ) {
        if !session.registered {
            self.not_registered(api, id, session);
            return;
        }
        let Some(name) = params.first() else {
            return;
        };
        if !self.is_member(id, name) {
            self.numeric(
                api,
                id,
                "442",
                &format!("{} {name} :You're not on that channel", session.display_nick()),
            );
            return;
        }
        let reason = params.get(1).map(String::as_str).unwrap_or("Leaving");
        info!(%id, channel = %name, nick = session.display_nick(), reason, "parted");
        let notice = format!(":{} PART {name} :{reason}", session.display_nick());
        self.send_channel(api, name, None, &notice);
        let emptied = self.channels.get_mut(name).is_some_and(|members| {
            members.remove(&id);
            members.is_empty()
        });
        if emptied {
            self.channels.remove(name);
        }
    }

    fn cmd_privmsg(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &ClientSession,
        params: &[String],
    ) {
        if !session.registered {
            self.not_registered(api, id, session);
            return;
        }
        let (Some(target), Some(text)) = (params.first(), params.get(1)) else {
            return;
        };
        let line = format!(":{} PRIVMSG {target} :{text}", session.display_nick());
        if target.starts_with('#') {
            if self.is_member(id, target) {
                self.send_channel(api, target, Some(id), &line);
            } else {
                self.numeric(
                    api,
                    id,
                    "404",
                    &format!("{} {target} :Cannot send to channel", session.display_nick()),
                );
            }
            return;
        }
        let recipient = self
            .nicks
            .iter()
            .find(|&(&other, nick)| {
                self.registered.contains(&other) && nick.eq_ignore_ascii_case(target)
            })
            .map(|(&other, _)| other);
        match recipient {
            Some(other) => api.send_line(other, &line),
            None => self.numeric(
                api,
                id,
                "401",
                &format!("{} {target} :No such nick", session.display_nick()),
            ),
        }
    }

    fn cmd_quit(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &ClientSession,
        params: &[String],
    ) {
        let reason = params.first().map(String::as_str).unwrap_or("Client quit");
        info!(%id, nick = session.display_nick(), reason, "quit");
        if self.registered.remove(&id) {
            let notice = format!(":{} QUIT :{reason}", session.display_nick());
            for peer in self.channel_peers(id) {
                api.send_line(peer, &notice);
            }
        }
        self.leave_all(id);
        self.nicks.remove(&id);
        api.send_line(id, "ERROR :Closing link");
        api.request_close(id);
    }

    fn not_registered(&self, api: &mut dyn ReactorApi, id: ConnId, session: &ClientSession) {
        self.numeric(
            api,
            id,
            "451",
            &format!("{} :You have not registered", session.display_nick()),
        );
    }
}

impl ReactorHandler for ChatServer {
    type Session = ClientSession;

    fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) -> ClientSession {
        match api.peer_addr(id) {
            Some(peer) => info!(%id, %peer, "client connected"),
            None => info!(%id, "client connected"),
        }
        ClientSession::new(self.config.password.is_some())
    }

    fn on_line(
        &mut self,
        api: &mut dyn ReactorApi,
        id: ConnId,
        session: &mut ClientSession,
        line: &str,
    ) {
        let Some((cmd, params)) = parse(line) else {
            return;
        };
        debug!(%id, command = %cmd, "dispatch");
        match cmd.as_str() {
            "PASS" => self.cmd_pass(api, id, session, &params),
            "NICK" => self.cmd_nick(api, id, session, &params),
            "USER" => self.cmd_user(api, id, session, &params),
            "JOIN" => self.cmd_join(api, id, session, &params),
            "PART" => self.cmd_part(api, id, session, &params),
            "PRIVMSG" => self.cmd_privmsg(api, id, session, &params),
            "QUIT" => self.cmd_quit(api, id, session, &params),
            "PING" => {
                let token = params.first().map(String::as_str).unwrap_or("");
                api.send_line(id, &format!("PONG :{token}"));
            }
            other => {
                if session.registered {
                    self.numeric(
                        api,
                        id,
                        "421",
                        &format!("{} {other} :Unknown command", session.display_nick()),
                    );
                } else {
                    self.not_registered(api, id, session);
                }
            }
        }
    }

    fn on_closed(&mut self, api: &mut dyn ReactorApi, id: ConnId, session: ClientSession) {
        info!(%id, nick = session.display_nick(), "client disconnected");
        if self.registered.remove(&id) {
            let notice = format!(":{} QUIT :Connection closed", session.display_nick());
            for peer in self.channel_peers(id) {
                api.send_line(peer, &notice);
            }
        }
        self.leave_all(id);
        self.nicks.remove(&id);
    }

    fn on_shutdown(&mut self, api: &mut dyn ReactorApi) {
        info!("notifying clients of shutdown");
        for id in api.connection_ids() {
            api.send_line(id, "ERROR :server shutting down");
        }
    }
}

/// Split a line into an uppercased command and its parameters.
///
/// Parameters are space separated; a parameter introduced by `:` runs to
/// the end of the line. Blank lines parse to `None`.
fn parse(line: &str) -> Option<(String, Vec<String>)> {
    let line = line.trim_start();
    if line.is_empty() {
        return None;
    }
    let (cmd, mut rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line, ""),
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
    Some((cmd.to_ascii_uppercase(), params))
}
