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

//! The poll bot: login, keepalive, and a simple room poll

use crate::config::BotConfig;
use crate::message::ServerMessage;
use confab_reactor::{ConnId, ReactorApi, ReactorHandler};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// The room's current poll. Present means open.
#[derive(Debug)]
struct Poll {
    question: String,
    options: Vec<String>,
    /// Latest vote per nick; a revote replaces the previous one.
    votes_by_nick: HashMap<String, usize>,
}

impl Poll {
    /// Votes per option, 1-based like the announced numbering.
    fn tally(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.options.len() + 1];
        for &choice in self.votes_by_nick.values() {
            if choice < counts.len() {
                counts[choice] += 1;
            }
        }
        counts
    }
}

/// Chat bot driving one outbound connection.
///
/// Logs in on connect, joins its channel once welcomed, answers PING, and
/// runs at most one poll at a time:
/// `!poll start <question> | <opt1> | <opt2> [| <optN>]` opens it,
/// `vote <n>` records or replaces a nick's vote, `!poll close` announces
/// the results.
pub struct PollBot {
    config: BotConfig,
    poll: Option<Poll>,
}

impl PollBot {
    /// Create a bot for the given configuration.
    pub fn new(config: BotConfig) -> Self {
        Self { config, poll: None }
    }

    fn say(&self, api: &mut dyn ReactorApi, id: ConnId, text: &str) {
        api.send_line(id, &format!("PRIVMSG {} :{text}", self.config.channel));
    }

    fn handle_privmsg(&mut self, api: &mut dyn ReactorApi, id: ConnId, from: &str, text: &str) {
        if let Some(rest) = text.strip_prefix("!poll ") {
            let rest = rest.trim_start();
            if let Some(spec) = rest.strip_prefix("start") {
                self.cmd_start(api, id, spec.trim_start());
            } else if rest.starts_with("close") {
                self.cmd_close(api, id);
            }
        } else if let Some(choice) = text
            .to_ascii_lowercase()
            .strip_prefix("vote ")
            .map(str::trim)
            .map(str::to_string)
        {
            self.cmd_vote(api, id, from, &choice);
        }
    }

    fn cmd_start(&mut self, api: &mut dyn ReactorApi, id: ConnId, spec: &str) {
        if self.poll.is_some() {
            self.say(
                api,
                id,
                "There's already an open poll. Close it with !poll close.",
            );
            return;
        }
        let parts: Vec<&str> = spec.split('|').map(str::trim).collect();
        if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
            self.say(
                api,
                id,
                "Usage: !poll start <question> | <opt1> | <opt2> [| <optN>]",
            );
            return;
        }
        let poll = Poll {
            question: parts[0].to_string(),
            options: parts[1..].iter().map(|s| s.to_string()).collect(),
            votes_by_nick: HashMap::new(),
        };
        info!(question = %poll.question, options = poll.options.len(), "poll opened");
        self.say(api, id, &format!("New poll: {}", poll.question));
        for (i, option) in poll.options.iter().enumerate() {
            self.say(api, id, &format!("{}) {option}", i + 1));
        }
        self.say(api, id, "Vote by saying: vote <number>");
        self.poll = Some(poll);
    }

    fn cmd_close(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
        match self.poll.take() {
            Some(poll) => {
                info!(question = %poll.question, votes = poll.votes_by_nick.len(), "poll closed");
                self.announce_results(api, id, &poll);
            }
            None => self.say(api, id, "No open poll."),
        }
    }

    fn cmd_vote(&mut self, api: &mut dyn ReactorApi, id: ConnId, from: &str, choice: &str) {
        let Some(poll) = self.poll.as_mut() else {
            self.say(api, id, "No open poll.");
            return;
        };
        let valid = choice
            .parse::<usize>()
            .ok()
            .filter(|&n| n >= 1 && n <= poll.options.len());
        let Some(n) = valid else {
            self.say(api, id, &format!("{from}: Please send a valid option number."));
            return;
        };
        poll.votes_by_nick.insert(from.to_string(), n);
        debug!(nick = from, choice = n, "vote recorded");
        self.say(api, id, &format!("{from}: Your vote has been recorded."));
    }

    fn announce_results(&self, api: &mut dyn ReactorApi, id: ConnId, poll: &Poll) {
        let tally = poll.tally();
        self.say(api, id, "Poll closed. Results:");
        for (i, option) in poll.options.iter().enumerate() {
            self.say(
                api,
                id,
                &format!("{}) {option} - {} vote(s)", i + 1, tally[i + 1]),
            );
        }
    }

    fn announce_help(&self, api: &mut dyn ReactorApi, id: ConnId) {
        self.say(api, id, "Hi! I can run simple polls.");
        self.say(
            api,
            id,
            "Start: !poll start <question> | <opt1> | <opt2> [| <optN>]",
        );
        self.say(api, id, "Close: !poll close");
        self.say(api, id, "Vote: vote <number>");
    }
}

impl ReactorHandler for PollBot {
    type Session = ();

    fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
        warn!(%id, "unexpected inbound connection");
        api.request_close(id);
    }

    fn on_connected(&mut self, api: &mut dyn ReactorApi, id: ConnId, _session: &mut ()) {
        info!(%id, "connected, logging in");
        if let Some(password) = &self.config.password {
            api.send_line(id, &format!("PASS {password}"));
        }
        api.send_line(id, &format!("NICK {}", self.config.nick));
        api.send_line(
            id,
            &format!("USER {} 0 * :{}", self.config.username, self.config.realname),
        );
    }

    fn on_connect_failed(&mut self, _api: &mut dyn ReactorApi, id: ConnId, error: std::io::Error) {
        warn!(%id, %error, "connect failed");
    }

    fn on_line(&mut self, api: &mut dyn ReactorApi, id: ConnId, _session: &mut (), line: &str) {
        let Some(msg) = ServerMessage::parse(line) else {
            return;
        };
        match msg.command.as_str() {
            "PING" => {
                let token = msg.params.first().map(String::as_str).unwrap_or("");
                api.send_line(id, &format!("PONG :{token}"));
            }
            "001" => {
                info!(channel = %self.config.channel, "registered, joining");
                api.send_line(id, &format!("JOIN {}", self.config.channel));
                self.announce_help(api, id);
            }
            "PRIVMSG" => {
                let Some(from) = msg.source_nick.as_deref() else {
                    return;
                };
                if let Some(text) = msg.params.get(1) {
                    self.handle_privmsg(api, id, from, text);
                }
            }
            "ERROR" => {
                info!(reason = msg.params.first().map(String::as_str).unwrap_or(""),
                    "server closed the session");
            }
            _ => {}
        }
    }

    fn on_closed(&mut self, _api: &mut dyn ReactorApi, id: ConnId, _session: ()) {
        info!(%id, "disconnected");
    }

    fn on_shutdown(&mut self, api: &mut dyn ReactorApi) {
        info!("shutting down");
        let ids = api.connection_ids();
        if let Some(&id) = ids.first() {
            if let Some(poll) = self.poll.take() {
                self.announce_results(api, id, &poll);
            }
            api.send_line(id, "QUIT :shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    struct FakeApi {
        sent: Vec<(ConnId, String)>,
        closed: Vec<ConnId>,
        ids: Vec<ConnId>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                closed: Vec::new(),
                ids: vec![ConnId::new(1)],
            }
        }

        fn lines(&self) -> Vec<&str> {
            self.sent.iter().map(|(_, line)| line.trim_end()).collect()
        }
    }

    impl ReactorApi for FakeApi {
        fn send(&mut self, id: ConnId, bytes: &[u8]) {
            self.sent
                .push((id, String::from_utf8_lossy(bytes).into_owned()));
        }

        fn request_close(&mut self, id: ConnId) {
            self.closed.push(id);
        }

        fn request_shutdown(&mut self) {}

        fn peer_addr(&mut self, _id: ConnId) -> Option<SocketAddr> {
            None
        }

        fn connection_ids(&self) -> Vec<ConnId> {
            self.ids.clone()
        }
    }

    fn bot() -> PollBot {
        PollBot::new(BotConfig::default())
    }

    fn privmsg(bot: &mut PollBot, api: &mut FakeApi, from: &str, text: &str) {
        bot.on_line(
            api,
            ConnId::new(1),
            &mut (),
            &format!(":{from}!u@h PRIVMSG #lobby :{text}"),
        );
    }

    #[test]
    fn test_login_with_password() {
        let mut bot = PollBot::new(BotConfig::default().with_password("sesame"));
        let mut api = FakeApi::new();
        bot.on_connected(&mut api, ConnId::new(1), &mut ());
        assert_eq!(
            api.lines(),
            vec!["PASS sesame", "NICK pollbot", "USER pollbot 0 * :Poll Bot"]
        );
    }

    #[test]
    fn test_login_without_password() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        bot.on_connected(&mut api, ConnId::new(1), &mut ());
        assert_eq!(api.lines(), vec!["NICK pollbot", "USER pollbot 0 * :Poll Bot"]);
    }

    #[test]
    fn test_ping_pong() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        bot.on_line(&mut api, ConnId::new(1), &mut (), "PING :abc123");
        assert_eq!(api.lines(), vec!["PONG :abc123"]);
    }

    #[test]
    fn test_welcome_joins_channel_then_announces_help() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        bot.on_line(&mut api, ConnId::new(1), &mut (), ":confab 001 pollbot :Welcome");
        let lines = api.lines();
        assert_eq!(lines[0], "JOIN #lobby");
        assert_eq!(lines[1], "PRIVMSG #lobby :Hi! I can run simple polls.");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_poll_start_announces_options() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start Lunch? | pizza | sushi");
        assert_eq!(
            api.lines(),
            vec![
                "PRIVMSG #lobby :New poll: Lunch?",
                "PRIVMSG #lobby :1) pizza",
                "PRIVMSG #lobby :2) sushi",
                "PRIVMSG #lobby :Vote by saying: vote <number>",
            ]
        );
    }

    #[test]
    fn test_poll_start_requires_two_options() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start Lunch? | pizza");
        assert_eq!(
            api.lines(),
            vec!["PRIVMSG #lobby :Usage: !poll start <question> | <opt1> | <opt2> [| <optN>]"]
        );
        assert!(bot.poll.is_none());
    }

    #[test]
    fn test_second_poll_rejected_while_open() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start A? | x | y");
        api.sent.clear();
        privmsg(&mut bot, &mut api, "bob", "!poll start B? | x | y");
        assert_eq!(
            api.lines(),
            vec!["PRIVMSG #lobby :There's already an open poll. Close it with !poll close."]
        );
    }

    #[test]
    fn test_votes_are_per_nick_and_replaceable() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start Lunch? | pizza | sushi");
        privmsg(&mut bot, &mut api, "bob", "vote 1");
        privmsg(&mut bot, &mut api, "carol", "vote 2");
        // bob changes his mind; only his latest vote counts
        privmsg(&mut bot, &mut api, "bob", "vote 2");
        api.sent.clear();
        privmsg(&mut bot, &mut api, "alice", "!poll close");
        assert_eq!(
            api.lines(),
            vec![
                "PRIVMSG #lobby :Poll closed. Results:",
                "PRIVMSG #lobby :1) pizza - 0 vote(s)",
                "PRIVMSG #lobby :2) sushi - 2 vote(s)",
            ]
        );
        assert!(bot.poll.is_none());
    }

    #[test]
    fn test_invalid_vote_rejected() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start Lunch? | pizza | sushi");
        api.sent.clear();
        privmsg(&mut bot, &mut api, "bob", "vote 7");
        privmsg(&mut bot, &mut api, "bob", "vote zero");
        assert_eq!(
            api.lines(),
            vec![
                "PRIVMSG #lobby :bob: Please send a valid option number.",
                "PRIVMSG #lobby :bob: Please send a valid option number.",
            ]
        );
    }

    #[test]
    fn test_vote_without_poll() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "bob", "vote 1");
        assert_eq!(api.lines(), vec!["PRIVMSG #lobby :No open poll."]);
    }

    #[test]
    fn test_close_without_poll() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll close");
        assert_eq!(api.lines(), vec!["PRIVMSG #lobby :No open poll."]);
    }

    #[test]
    fn test_shutdown_announces_open_poll_and_quits() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        privmsg(&mut bot, &mut api, "alice", "!poll start Lunch? | pizza | sushi");
        privmsg(&mut bot, &mut api, "bob", "vote 1");
        api.sent.clear();
        bot.on_shutdown(&mut api);
        let lines = api.lines();
        assert_eq!(lines[0], "PRIVMSG #lobby :Poll closed. Results:");
        assert_eq!(lines[1], "PRIVMSG #lobby :1) pizza - 1 vote(s)");
        assert_eq!(lines.last().unwrap(), &"QUIT :shutting down");
    }

    #[test]
    fn test_inbound_connections_are_refused() {
        let mut bot = bot();
        let mut api = FakeApi::new();
        bot.on_accepted(&mut api, ConnId::new(9));
        assert_eq!(api.closed, vec![ConnId::new(9)]);
    }
}
