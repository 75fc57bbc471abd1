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

//! confab-bot binary: `confab-bot [<server-addr>] [<password>] [<nick>]`

use confab_bot::{BotConfig, PollBot};
use confab_reactor::{Reactor, ReactorConfig};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = BotConfig::default();
    if let Some(addr) = args.next() {
        config = config.with_server_addr(addr);
    }
    if let Some(password) = args.next() {
        config = config.with_password(password);
    }
    if let Some(nick) = args.next() {
        config = config.with_nick(nick);
    }

    match drive(config) {
        Ok(()) => {
            info!("bot stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "bot failed");
            ExitCode::FAILURE
        }
    }
}

fn drive(config: BotConfig) -> confab_reactor::Result<()> {
    let mut reactor = Reactor::new(ReactorConfig::default())?;

    let flag = reactor.shutdown_flag();
    signal_hook::flag::register(SIGINT, flag.as_arc())?;
    signal_hook::flag::register(SIGTERM, flag.as_arc())?;

    let addr = config.server_addr.clone();
    let mut handler = PollBot::new(config);
    reactor.connect(&addr, ())?;
    reactor.run(&mut handler)
}
