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

//! Per-connection outbound backlog management and non-blocking writes

use crate::conn::ConnId;
use crate::queue::SendQueue;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use tracing::{debug, trace, warn};

/// Owns one [`SendQueue`] per connection that currently has backlog and
/// performs the actual non-blocking writes.
///
/// Invariant held by construction: a connection is tracked here if and only
/// if its queue is non-empty. An emptied queue is removed immediately, so
/// "has backlog" and "is tracked" are synonymous and the write-interest
/// merge needs no separate dirty flag.
///
/// The manager never owns a socket. Write entry points are generic over
/// [`std::io::Write`] so the event loop hands in the stream it owns and
/// tests can script would-block, partial-write and fatal outcomes.
#[derive(Debug)]
pub struct SendQueueManager {
    queues: BTreeMap<ConnId, SendQueue>,
    dead: Vec<ConnId>,
    max_backlog: usize,
}

impl SendQueueManager {
    /// Create a manager with the given per-connection backlog cap in bytes.
    pub fn new(max_backlog: usize) -> Self {
        Self {
            queues: BTreeMap::new(),
            dead: Vec::new(),
            max_backlog,
        }
    }

    /// Queue `bytes` for delivery to `conn`, attempting an immediate
    /// one-shot write first when no backlog exists.
    ///
    /// Fire and forget: callers must not rely on delivery confirmation.
    ///
    /// - If `conn` is already marked dead, the call is a silent no-op.
    /// - With existing backlog the payload is appended behind it (FIFO).
    /// - Otherwise a single non-blocking write is attempted, retrying
    ///   exactly once on interruption. A partial write queues the
    ///   remainder; a would-block queues the whole payload; a fatal error
    ///   marks the connection dead and queues nothing.
    /// - If queuing pushes the backlog past the cap, the connection is
    ///   declared dead and its queue dropped whole — the surrounding
    ///   protocol has no way to signal partial loss to the peer.
    pub fn send<W: Write>(&mut self, conn: ConnId, sock: &mut W, bytes: &[u8]) {
        if bytes.is_empty() || self.is_dead(conn) {
            return;
        }
        if self.queues.contains_key(&conn) {
            self.enqueue(conn, Bytes::copy_from_slice(bytes));
            return;
        }
        match write_once(sock, bytes) {
            Ok(n) if n == bytes.len() => {
                trace!(%conn, len = n, "sent without queuing");
            }
            Ok(0) => {
                // Kernel accepted nothing; same as would-block.
                self.enqueue(conn, Bytes::copy_from_slice(bytes));
            }
            Ok(n) => {
                trace!(%conn, sent = n, queued = bytes.len() - n, "partial send");
                self.enqueue(conn, Bytes::copy_from_slice(&bytes[n..]));
            }
            Err(e) if is_transient(&e) => {
                self.enqueue(conn, Bytes::copy_from_slice(bytes));
            }
            Err(e) => {
                debug!(%conn, error = %e, "fatal send error, marking dead");
                self.dead.push(conn);
            }
        }
    }

    /// Queue `bytes` without attempting a write.
    ///
    /// For sockets known not to be writable yet, such as an outbound
    /// connect still in progress. The backlog cap applies as in
    /// [`send`](Self::send).
    pub fn queue(&mut self, conn: ConnId, bytes: &[u8]) {
        if bytes.is_empty() || self.is_dead(conn) {
            return;
        }
        self.enqueue(conn, Bytes::copy_from_slice(bytes));
    }

    /// Drain the backlog for `conn` while the socket keeps accepting bytes.
    ///
    /// Called by the event loop when the socket signaled writability.
    /// Tolerates connections it is not tracking (no-op). The entry is
    /// removed the moment its queue empties; a fatal write error marks the
    /// connection dead and untracks it.
    pub fn drain<W: Write>(&mut self, conn: ConnId, sock: &mut W) {
        loop {
            let Some(queue) = self.queues.get_mut(&conn) else {
                return;
            };
            let Some(front) = queue.front() else {
                break;
            };
            match write_once(sock, front) {
                Ok(0) => return, // would block now, retry next cycle
                Ok(n) => queue.trim_front(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(%conn, error = %e, "fatal drain error, marking dead");
                    self.queues.remove(&conn);
                    self.dead.push(conn);
                    return;
                }
            }
        }
        self.queues.remove(&conn);
        trace!(%conn, "backlog drained");
    }

    /// Declare `conn` dead (poll reported an error/hangup) and untrack it.
    pub fn mark_dead(&mut self, conn: ConnId) {
        self.queues.remove(&conn);
        if !self.is_dead(conn) {
            self.dead.push(conn);
        }
    }

    /// Whether `conn` still owes bytes to its peer.
    ///
    /// Tracked and non-empty are the same thing, so this doubles as the
    /// write-interest merge the event loop applies when building its
    /// readiness query.
    pub fn has_backlog(&self, conn: ConnId) -> bool {
        self.queues.contains_key(&conn)
    }

    /// Whether any connection has backlog.
    pub fn has_any_backlog(&self) -> bool {
        !self.queues.is_empty()
    }

    /// Bytes currently queued for `conn`.
    pub fn backlog_bytes(&self, conn: ConnId) -> usize {
        self.queues.get(&conn).map_or(0, SendQueue::total_bytes)
    }

    /// Drop tracking and queued bytes for `conn` without marking it dead.
    ///
    /// Used when the owner is closing the socket through a different path
    /// and no longer cares about delivery.
    pub fn discard(&mut self, conn: ConnId) {
        if self.queues.remove(&conn).is_some() {
            trace!(%conn, "discarded backlog");
        }
    }

    /// Atomically take and clear the accumulated dead set.
    ///
    /// Entries are not retained: the caller must act on every one
    /// (close and notify) once per loop iteration.
    pub fn take_dead(&mut self) -> Vec<ConnId> {
        std::mem::take(&mut self.dead)
    }

    /// Whether any connection died since the last [`take_dead`](Self::take_dead).
    pub fn has_dead(&self) -> bool {
        !self.dead.is_empty()
    }

    /// Whether `conn` is in the dead set awaiting cleanup.
    pub fn is_dead(&self, conn: ConnId) -> bool {
        self.dead.contains(&conn)
    }

    fn enqueue(&mut self, conn: ConnId, chunk: Bytes) {
        let queue = self.queues.entry(conn).or_default();
        queue.append(chunk);
        if queue.total_bytes() > self.max_backlog {
            warn!(
                %conn,
                backlog = queue.total_bytes(),
                cap = self.max_backlog,
                "backlog overflow, dropping connection"
            );
            self.queues.remove(&conn);
            self.dead.push(conn);
        }
    }
}

/// One non-blocking write, retried exactly once on interruption.
fn write_once<W: Write>(sock: &mut W, buf: &[u8]) -> std::io::Result<usize> {
    match sock.write(buf) {
        Err(e) if e.kind() == ErrorKind::Interrupted => sock.write(buf),
        other => other,
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}
