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

//! Single-threaded non-blocking connection reactor
//!
//! One `poll`-driven loop multiplexes a listener and any number of TCP
//! connections on the calling thread. Applications implement
//! [`ReactorHandler`] and get line-oriented callbacks; the reactor owns the
//! sockets, the newline framing and the outbound backlog:
//!
//! - Sends are fire-and-forget. Bytes the kernel does not accept
//!   immediately are queued per connection and drained on writability.
//! - A connection whose backlog exceeds the configured cap is dropped.
//! - Closes are deferred: already-queued bytes flush first, reads stop
//!   immediately, and the handler sees `on_closed` exactly once per
//!   connection no matter how it went away.
//!
//! The same loop serves both sides of the wire: a server listens, a client
//! drives a single outbound connection.
//!
//! # Example
//!
//! ```no_run
//! use confab_reactor::{ConnId, Reactor, ReactorApi, ReactorConfig, ReactorHandler};
//!
//! struct Echo;
//!
//! impl ReactorHandler for Echo {
//!     type Session = ();
//!
//!     fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) {
//!         api.send_line(id, "hello");
//!     }
//!
//!     fn on_line(&mut self, api: &mut dyn ReactorApi, id: ConnId, _s: &mut (), line: &str) {
//!         api.send_line(id, line);
//!     }
//! }
//!
//! fn main() -> confab_reactor::Result<()> {
//!     let mut reactor = Reactor::new(ReactorConfig::default())?;
//!     reactor.listen("127.0.0.1:6667")?;
//!     reactor.run(&mut Echo)
//! }
//! ```

mod config;
mod conn;
mod error;
mod framing;
mod handler;
mod queue;
mod reactor;
mod sendq;
mod shutdown;

pub use config::ReactorConfig;
pub use conn::{ConnId, ConnState, Connection, ConnectionTable};
pub use error::{ReactorError, Result};
pub use framing::{LineBuffer, Lines};
pub use handler::{ReactorApi, ReactorHandler};
pub use queue::SendQueue;
pub use reactor::Reactor;
pub use sendq::SendQueueManager;
pub use shutdown::ShutdownFlag;
