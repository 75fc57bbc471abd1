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

//! The single-threaded event loop driving sockets, queues and callbacks

use crate::config::ReactorConfig;
use crate::conn::{ConnId, ConnState, Connection, ConnectionTable};
use crate::error::{ReactorError, Result};
use crate::handler::{ReactorApi, ReactorHandler};
use crate::sendq::SendQueueManager;
use crate::shutdown::ShutdownFlag;
use metrics::{counter, gauge};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const LISTENER: Token = Token(0);
const FIRST_CONN_TOKEN: usize = 1;

/// Single-threaded reactor multiplexing a listener and any number of
/// connections over one `poll` loop.
///
/// Serves both roles: a server calls [`listen`](Self::listen) and accepts
/// inbound connections; a client calls [`connect`](Self::connect) for an
/// outbound one. Either way, [`run`](Self::run) blocks the calling thread
/// and drives the [`ReactorHandler`] until shutdown is requested or, when
/// there is no listener, until the last connection closes.
///
/// Each loop cycle, in order: recompute per-connection poll interest, poll
/// with a bounded timeout, complete in-progress connects, advance pending
/// closes, drain writable backlogs, finalize errored sockets, read and
/// dispatch lines, accept, sweep connections declared dead by the write
/// path, then sample the stop flag.
pub struct Reactor<H: ReactorHandler> {
    config: ReactorConfig,
    poll: Poll,
    listener: Option<TcpListener>,
    table: ConnectionTable,
    sendq: SendQueueManager,
    sessions: HashMap<ConnId, H::Session>,
    stop: ShutdownFlag,
}

impl<H: ReactorHandler> Reactor<H> {
    /// Create a reactor with the given configuration.
    pub fn new(config: ReactorConfig) -> Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            listener: None,
            table: ConnectionTable::new(FIRST_CONN_TOKEN),
            sendq: SendQueueManager::new(config.max_backlog_bytes),
            sessions: HashMap::new(),
            stop: ShutdownFlag::new(),
            config,
        })
    }

    /// The stop flag sampled once per cycle.
    ///
    /// Clone it and hand it to a signal handler or another thread; setting
    /// it triggers the graceful-shutdown sequence within one poll timeout.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.stop.clone()
    }

    /// Bind a listener and start accepting on the next [`run`](Self::run).
    ///
    /// Returns the bound local address, useful with port 0.
    pub fn listen(&mut self, addr: &str) -> Result<SocketAddr> {
        let sockaddr = resolve(addr)?;
        let mut listener = TcpListener::bind(sockaddr)?;
        if let Some(mut old) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut old);
        }
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let local = listener.local_addr()?;
        info!(%local, "listening");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Start a non-blocking outbound connect.
    ///
    /// `session` is the connection's application state; the handler's
    /// `on_connected` fires once the connect completes, `on_connect_failed`
    /// if it does not. Bytes sent before completion are queued.
    pub fn connect(&mut self, addr: &str, session: H::Session) -> Result<ConnId> {
        let sockaddr = resolve(addr)?;
        let stream = TcpStream::connect(sockaddr)?;
        let id = self.table.insert(
            self.poll.registry(),
            stream,
            ConnState::Connecting,
            Interest::WRITABLE,
        )?;
        self.sessions.insert(id, session);
        debug!(%id, peer = %sockaddr, "outbound connect started");
        Ok(id)
    }

    /// Drive the loop until shutdown, or until the last connection closes
    /// when no listener is bound.
    pub fn run(&mut self, handler: &mut H) -> Result<()> {
        if self.listener.is_none() && self.table.is_empty() {
            return Err(ReactorError::NothingToDrive);
        }
        let mut events = Events::with_capacity(self.config.events_capacity);
        let mut shutdown = false;
        info!("reactor running");

        loop {
            self.merge_interest()?;
            if let Err(e) = self.poll.poll(&mut events, Some(self.config.poll_timeout)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            let mut readable = Vec::new();
            let mut writable = Vec::new();
            let mut failed = Vec::new();
            let mut listener_ready = false;
            for event in events.iter() {
                if event.token() == LISTENER {
                    listener_ready = true;
                    continue;
                }
                let id = ConnId::from(event.token());
                if event.is_error() {
                    failed.push(id);
                    continue;
                }
                if event.is_writable() {
                    writable.push(id);
                }
                if event.is_readable() || event.is_read_closed() {
                    readable.push(id);
                }
            }

            for &id in &writable {
                self.connect_ready(handler, id, &mut shutdown);
            }
            self.advance_pending_closes(handler, &mut shutdown);
            for &id in &writable {
                if let Some(conn) = self.table.get_mut(id)
                    && conn.state() != ConnState::Connecting
                {
                    self.sendq.drain(id, conn.stream());
                }
            }
            for id in failed {
                // An error on a socket still connecting is a connect
                // failure, not a close.
                if self.table.get(id).map(Connection::state) == Some(ConnState::Connecting) {
                    self.connect_ready(handler, id, &mut shutdown);
                    continue;
                }
                debug!(%id, "socket error reported by poller");
                self.finalize_close(handler, id, &mut shutdown);
            }
            for &id in &readable {
                self.read_ready(handler, id, &mut shutdown);
            }
            if listener_ready {
                self.accept_ready(handler, &mut shutdown)?;
            }
            for id in self.sendq.take_dead() {
                self.finalize_close(handler, id, &mut shutdown);
            }

            if shutdown || self.stop.is_set() {
                return self.graceful_shutdown(handler, &mut events, &mut shutdown);
            }
            if self.listener.is_none() && self.table.is_empty() {
                info!("last connection closed, loop done");
                return Ok(());
            }
        }
    }

    /// Recompute poll interest per connection and reregister on change.
    ///
    /// Open connections want reads, plus writes while backlog exists;
    /// connecting and closing connections want writes only.
    fn merge_interest(&mut self) -> Result<()> {
        for id in self.table.ids() {
            let Some(conn) = self.table.get(id) else {
                continue;
            };
            let interest = match conn.state() {
                ConnState::Connecting => Interest::WRITABLE,
                ConnState::Open => {
                    if self.sendq.has_backlog(id) {
                        Interest::READABLE | Interest::WRITABLE
                    } else {
                        Interest::READABLE
                    }
                }
                ConnState::PendingClose { .. } => Interest::WRITABLE,
            };
            self.table.set_interest(self.poll.registry(), id, interest)?;
        }
        Ok(())
    }

    /// Resolve a writable event on a connection still in `Connecting`.
    fn connect_ready(&mut self, handler: &mut H, id: ConnId, shutdown: &mut bool) {
        let Some(conn) = self.table.get_mut(id) else {
            return;
        };
        if conn.state() != ConnState::Connecting {
            return;
        }
        let outcome = match conn.stream().take_error() {
            Ok(Some(e)) | Err(e) => Err(e),
            Ok(None) => match conn.stream().peer_addr() {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotConnected => return,
                Err(e) => Err(e),
            },
        };
        match outcome {
            Ok(()) => {
                conn.mark_open();
                debug!(%id, "outbound connect completed");
                counter!("confab.reactor.connects").increment(1);
                if let Some(mut session) = self.sessions.remove(&id) {
                    let mut ctx = Ctx {
                        table: &mut self.table,
                        sendq: &mut self.sendq,
                        shutdown,
                        close_budget: self.config.close_retry_budget,
                    };
                    handler.on_connected(&mut ctx, id, &mut session);
                    self.sessions.insert(id, session);
                }
                // Flush anything queued while the connect was in flight.
                if let Some(conn) = self.table.get_mut(id) {
                    self.sendq.drain(id, conn.stream());
                }
            }
            Err(e) => {
                debug!(%id, error = %e, "outbound connect failed");
                counter!("confab.reactor.connect_failures").increment(1);
                self.table.remove(self.poll.registry(), id);
                self.sendq.discard(id);
                self.sessions.remove(&id);
                let mut ctx = Ctx {
                    table: &mut self.table,
                    sendq: &mut self.sendq,
                    shutdown,
                    close_budget: self.config.close_retry_budget,
                };
                handler.on_connect_failed(&mut ctx, id, e);
            }
        }
    }

    /// Move connections in `PendingClose` toward the actual close.
    ///
    /// A connection with nothing left to flush closes now; otherwise one
    /// drain attempt is made and one cycle of budget is spent. Exhausting
    /// the budget closes the socket with bytes still queued.
    fn advance_pending_closes(&mut self, handler: &mut H, shutdown: &mut bool) {
        for id in self.table.ids() {
            let Some(conn) = self.table.get_mut(id) else {
                continue;
            };
            if !conn.is_pending_close() {
                continue;
            }
            if self.sendq.has_backlog(id) {
                self.sendq.drain(id, conn.stream());
            }
            let Some(conn) = self.table.get_mut(id) else {
                continue;
            };
            if !self.sendq.has_backlog(id) {
                self.finalize_close(handler, id, shutdown);
            } else if conn.tick_close() {
                warn!(%id, "close budget exhausted with backlog remaining");
                self.finalize_close(handler, id, shutdown);
            }
        }
    }

    /// Read until the socket would block and dispatch complete lines.
    ///
    /// A hangup or fatal error ends the reads but does not suppress lines
    /// that arrived in the same batch: a peer may send its last command and
    /// close in one segment, and that command still dispatches.
    fn read_ready(&mut self, handler: &mut H, id: ConnId, shutdown: &mut bool) {
        let mut buf = vec![0u8; self.config.read_chunk_size];
        let mut dead = false;
        loop {
            let Some(conn) = self.table.get_mut(id) else {
                return;
            };
            if !conn.is_open() {
                return;
            }
            match conn.stream().read(&mut buf) {
                Ok(0) => {
                    trace!(%id, "peer closed");
                    dead = true;
                    break;
                }
                Ok(n) => {
                    counter!("confab.reactor.bytes_read").increment(n as u64);
                    conn.buffer_input(&buf[..n]);
                    if conn.pending_input() > self.config.max_line_bytes {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(%id, error = %e, "read failed");
                    dead = true;
                    break;
                }
            }
        }
        self.dispatch_lines(handler, id, shutdown);
        // Whatever is left after extraction has no terminator; a peer
        // streaming an unbounded line is dropped like a slow consumer.
        if let Some(conn) = self.table.get(id)
            && conn.is_open()
            && conn.pending_input() > self.config.max_line_bytes
        {
            warn!(
                %id,
                pending = conn.pending_input(),
                cap = self.config.max_line_bytes,
                "unterminated input exceeds cap, dropping connection"
            );
            dead = true;
        }
        if dead {
            self.sendq.mark_dead(id);
        }
    }

    /// Deliver buffered complete lines in order.
    ///
    /// Dispatch stops as soon as the connection leaves `Open`, so a
    /// mid-batch close request suppresses the remaining lines.
    fn dispatch_lines(&mut self, handler: &mut H, id: ConnId, shutdown: &mut bool) {
        let lines = match self.table.get_mut(id) {
            Some(conn) => conn.take_lines(),
            None => return,
        };
        for line in lines {
            let still_open = self.table.get(id).is_some_and(|c| c.is_open());
            if !still_open {
                break;
            }
            let Some(mut session) = self.sessions.remove(&id) else {
                break;
            };
            counter!("confab.reactor.lines").increment(1);
            let mut ctx = Ctx {
                table: &mut self.table,
                sendq: &mut self.sendq,
                shutdown,
                close_budget: self.config.close_retry_budget,
            };
            handler.on_line(&mut ctx, id, &mut session, &line);
            self.sessions.insert(id, session);
        }
    }

    /// Accept until the listener would block.
    fn accept_ready(&mut self, handler: &mut H, shutdown: &mut bool) -> Result<()> {
        loop {
            let Some(listener) = self.listener.as_ref() else {
                return Ok(());
            };
            match listener.accept() {
                Ok((stream, addr)) => {
                    let id = self.table.insert(
                        self.poll.registry(),
                        stream,
                        ConnState::Open,
                        Interest::READABLE,
                    )?;
                    debug!(%id, peer = %addr, "accepted");
                    counter!("confab.reactor.accepted").increment(1);
                    gauge!("confab.reactor.connections").set(self.table.len() as f64);
                    let mut ctx = Ctx {
                        table: &mut self.table,
                        sendq: &mut self.sendq,
                        shutdown,
                        close_budget: self.config.close_retry_budget,
                    };
                    let session = handler.on_accepted(&mut ctx, id);
                    self.sessions.insert(id, session);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return Ok(());
                }
            }
        }
    }

    /// Remove a connection from the table, queues and session map in
    /// lockstep, then notify the handler exactly once.
    fn finalize_close(&mut self, handler: &mut H, id: ConnId, shutdown: &mut bool) {
        let removed = self.table.remove(self.poll.registry(), id).is_some();
        self.sendq.discard(id);
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        if removed {
            counter!("confab.reactor.closed").increment(1);
            gauge!("confab.reactor.connections").set(self.table.len() as f64);
            trace!(%id, "closed");
        }
        let mut ctx = Ctx {
            table: &mut self.table,
            sendq: &mut self.sendq,
            shutdown,
            close_budget: self.config.close_retry_budget,
        };
        handler.on_closed(&mut ctx, id, session);
    }

    /// Farewell callback, bounded flush of remaining backlogs, then close
    /// every connection.
    fn graceful_shutdown(
        &mut self,
        handler: &mut H,
        events: &mut Events,
        shutdown: &mut bool,
    ) -> Result<()> {
        info!("shutting down");
        {
            let mut ctx = Ctx {
                table: &mut self.table,
                sendq: &mut self.sendq,
                shutdown,
                close_budget: self.config.close_retry_budget,
            };
            handler.on_shutdown(&mut ctx);
        }

        let flush_timeout = self.config.poll_timeout.min(Duration::from_millis(100));
        let mut budget = self.config.close_retry_budget;
        while budget > 0 {
            for id in self.table.ids() {
                if !self.sendq.has_backlog(id) {
                    continue;
                }
                if let Some(conn) = self.table.get_mut(id) {
                    self.sendq.drain(id, conn.stream());
                }
            }
            if !self.sendq.has_any_backlog() {
                break;
            }
            budget -= 1;
            for id in self.table.ids() {
                if self.sendq.has_backlog(id) {
                    self.table
                        .set_interest(self.poll.registry(), id, Interest::WRITABLE)?;
                }
            }
            match self.poll.poll(events, Some(flush_timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            for event in events.iter() {
                if event.token() == LISTENER || !event.is_writable() {
                    continue;
                }
                let id = ConnId::from(event.token());
                if let Some(conn) = self.table.get_mut(id) {
                    self.sendq.drain(id, conn.stream());
                }
            }
            // Peers that die during the flush must not stall it.
            let _ = self.sendq.take_dead();
        }

        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }
        for id in self.table.ids() {
            self.finalize_close(handler, id, shutdown);
        }
        info!("shutdown complete");
        Ok(())
    }
}

/// The [`ReactorApi`] handed to handler callbacks.
///
/// Borrows the table and queues disjointly from the loop for the duration
/// of one callback. Close requests only flip connection state; the loop
/// acts on them at its next pending-close step.
struct Ctx<'a> {
    table: &'a mut ConnectionTable,
    sendq: &'a mut SendQueueManager,
    shutdown: &'a mut bool,
    close_budget: u32,
}

impl ReactorApi for Ctx<'_> {
    fn send(&mut self, id: ConnId, bytes: &[u8]) {
        let Some(conn) = self.table.get_mut(id) else {
            return;
        };
        match conn.state() {
            ConnState::Connecting => self.sendq.queue(id, bytes),
            ConnState::Open => self.sendq.send(id, conn.stream(), bytes),
            // Only bytes queued before the close request are flushed.
            ConnState::PendingClose { .. } => {}
        }
    }

    fn request_close(&mut self, id: ConnId) {
        if let Some(conn) = self.table.get_mut(id) {
            conn.begin_close(self.close_budget);
        }
    }

    fn request_shutdown(&mut self) {
        *self.shutdown = true;
    }

    fn peer_addr(&mut self, id: ConnId) -> Option<SocketAddr> {
        self.table.get_mut(id).and_then(|c| c.peer_addr())
    }

    fn connection_ids(&self) -> Vec<ConnId> {
        self.table.ids()
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|_| ReactorError::NoAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| ReactorError::NoAddress(addr.to_string()))
}
