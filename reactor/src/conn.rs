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

//! Connection identity, lifecycle state and the registered-socket table

use crate::framing::LineBuffer;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::trace;

/// Stable identity of one connection for the lifetime of its socket.
///
/// Wraps the poll registration token. Ids are allocated monotonically and
/// never reused for a live connection, so a stale id held across a close
/// can never alias a newer socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(usize);

impl ConnId {
    /// Wrap a raw token value.
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    /// The poll registration token for this connection.
    pub fn token(self) -> Token {
        Token(self.0)
    }
}

impl From<Token> for ConnId {
    fn from(token: Token) -> Self {
        Self(token.0)
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection between registration and removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Outbound connect issued, completion not yet observed.
    Connecting,
    /// Fully established; reads are dispatched.
    Open,
    /// Close requested; no further reads, flush then close.
    ///
    /// `budget` is the number of remaining loop cycles the flush may take
    /// before the socket is closed with bytes still queued.
    PendingClose { budget: u32 },
}

/// One registered socket with its framing buffer and lifecycle state.
///
/// The single authoritative handle for the socket: dropping the
/// `Connection` (after deregistration) closes the fd.
#[derive(Debug)]
pub struct Connection {
    id: ConnId,
    stream: TcpStream,
    peer: Option<SocketAddr>,
    state: ConnState,
    interest: Interest,
    rx: LineBuffer,
}

impl Connection {
    fn new(id: ConnId, stream: TcpStream, state: ConnState, interest: Interest) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            id,
            stream,
            peer,
            state,
            interest,
            rx: LineBuffer::new(),
        }
    }

    /// This connection's id.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The underlying non-blocking stream.
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Remote address, captured at registration when available.
    ///
    /// For an in-progress outbound connect the kernel may not report it
    /// until completion, so it is re-read lazily.
    pub fn peer_addr(&mut self) -> Option<SocketAddr> {
        if self.peer.is_none() {
            self.peer = self.stream.peer_addr().ok();
        }
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Whether reads should still be dispatched.
    pub fn is_open(&self) -> bool {
        self.state == ConnState::Open
    }

    /// Whether the connection is flushing toward a close.
    pub fn is_pending_close(&self) -> bool {
        matches!(self.state, ConnState::PendingClose { .. })
    }

    /// Mark an in-progress connect as completed.
    pub fn mark_open(&mut self) {
        debug_assert_eq!(self.state, ConnState::Connecting);
        self.state = ConnState::Open;
    }

    /// Enter the deferred-close state with the given cycle budget.
    ///
    /// Idempotent: a connection already pending close keeps its original
    /// budget.
    pub fn begin_close(&mut self, budget: u32) {
        if !self.is_pending_close() {
            trace!(conn = %self.id, budget, "close requested");
            self.state = ConnState::PendingClose { budget };
        }
    }

    /// Spend one cycle of the close budget.
    ///
    /// Returns `true` when the budget is exhausted and the socket must be
    /// closed even if bytes remain queued.
    pub fn tick_close(&mut self) -> bool {
        match self.state {
            ConnState::PendingClose { budget: 0 } => true,
            ConnState::PendingClose { budget } => {
                self.state = ConnState::PendingClose { budget: budget - 1 };
                false
            }
            _ => false,
        }
    }

    /// Append one raw read chunk to the framing buffer.
    pub fn buffer_input(&mut self, chunk: &[u8]) {
        self.rx.extend(chunk);
    }

    /// Drain the complete lines buffered so far.
    pub fn take_lines(&mut self) -> Vec<String> {
        self.rx.lines().collect()
    }

    /// Inbound bytes buffered without a line terminator yet.
    pub fn pending_input(&self) -> usize {
        self.rx.pending_bytes()
    }
}

/// All live connections, keyed by id, kept in lockstep with the poller.
///
/// Registration and deregistration go through this table so a socket is
/// never polled without a table entry or vice versa.
#[derive(Debug)]
pub struct ConnectionTable {
    conns: HashMap<ConnId, Connection>,
    next_token: usize,
}

impl ConnectionTable {
    /// Create an empty table. Token values start after `first_token`,
    /// leaving lower values for listener registrations.
    pub fn new(first_token: usize) -> Self {
        Self {
            conns: HashMap::new(),
            next_token: first_token,
        }
    }

    /// Register a socket with the poller and track it.
    pub fn insert(
        &mut self,
        registry: &Registry,
        mut stream: TcpStream,
        state: ConnState,
        interest: Interest,
    ) -> std::io::Result<ConnId> {
        let id = ConnId::new(self.next_token);
        self.next_token += 1;
        registry.register(&mut stream, id.token(), interest)?;
        self.conns.insert(id, Connection::new(id, stream, state, interest));
        Ok(id)
    }

    /// Deregister and remove a connection, returning it for final use.
    ///
    /// The socket closes when the returned value is dropped.
    pub fn remove(&mut self, registry: &Registry, id: ConnId) -> Option<Connection> {
        let mut conn = self.conns.remove(&id)?;
        // Deregistration failure means the fd is already gone; the entry
        // must still come out of the table.
        let _ = registry.deregister(&mut conn.stream);
        Some(conn)
    }

    /// Reregister a connection if `interest` differs from what the poller
    /// currently has.
    pub fn set_interest(
        &mut self,
        registry: &Registry,
        id: ConnId,
        interest: Interest,
    ) -> std::io::Result<()> {
        if let Some(conn) = self.conns.get_mut(&id)
            && conn.interest != interest
        {
            registry.reregister(&mut conn.stream, id.token(), interest)?;
            conn.interest = interest;
        }
        Ok(())
    }

    /// Look up a connection.
    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    /// Look up a connection mutably.
    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(&id)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: ConnId) -> bool {
        self.conns.contains_key(&id)
    }

    /// Snapshot of all live ids, in ascending order.
    pub fn ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<ConnId> = self.conns.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
