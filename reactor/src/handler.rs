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

//! Handler trait and the reactor-side surface exposed to callbacks

use crate::conn::ConnId;
use std::net::SocketAddr;

/// Application callbacks driven by the event loop.
///
/// One handler instance serves every connection. Per-connection state lives
/// in the associated `Session` type, created in [`on_accepted`] or
/// [`on_connected`] and handed back to each callback for that connection;
/// the reactor owns it between callbacks and returns it to [`on_closed`]
/// exactly once when the connection goes away for any reason.
///
/// All methods have default implementations that do nothing, so a handler
/// implements only the events it cares about.
///
/// [`on_accepted`]: Self::on_accepted
/// [`on_connected`]: Self::on_connected
/// [`on_closed`]: Self::on_closed
pub trait ReactorHandler {
    /// Per-connection application state.
    type Session;

    /// An inbound connection was accepted.
    ///
    /// Returns the session for the new connection. Writes issued through
    /// `api` here are the greeting path.
    fn on_accepted(&mut self, api: &mut dyn ReactorApi, id: ConnId) -> Self::Session;

    /// An outbound connect completed successfully.
    fn on_connected(&mut self, _api: &mut dyn ReactorApi, _id: ConnId, _session: &mut Self::Session) {
    }

    /// An outbound connect failed before establishing.
    ///
    /// The session supplied at connect time is dropped; `on_closed` will
    /// not fire for this id.
    fn on_connect_failed(&mut self, _api: &mut dyn ReactorApi, _id: ConnId, _error: std::io::Error) {
    }

    /// A complete line arrived, terminator stripped.
    ///
    /// Called once per line in arrival order. Not called for a connection
    /// whose close has been requested, even for lines already buffered.
    fn on_line(
        &mut self,
        _api: &mut dyn ReactorApi,
        _id: ConnId,
        _session: &mut Self::Session,
        _line: &str,
    ) {
    }

    /// The connection is gone: peer hangup, fatal error, backlog overflow
    /// or a completed deferred close. The session is returned by value;
    /// the id is no longer usable with the api.
    fn on_closed(&mut self, _api: &mut dyn ReactorApi, _id: ConnId, _session: Self::Session) {}

    /// The loop observed the stop flag and is about to flush and exit.
    ///
    /// Last chance to queue farewell bytes; connections are closed after
    /// the flush pass that follows.
    fn on_shutdown(&mut self, _api: &mut dyn ReactorApi) {}
}

/// Operations a handler may invoke on the reactor from inside a callback.
///
/// Implemented by the event loop and passed to every [`ReactorHandler`]
/// method. Connection ids that have already been closed are tolerated by
/// every method (silent no-op), since a callback batch may outlive a peer.
pub trait ReactorApi {
    /// Queue `bytes` for delivery to `id`, fire-and-forget.
    ///
    /// Delivery is attempted immediately when possible; otherwise the bytes
    /// join the connection's backlog. Exceeding the backlog cap drops the
    /// connection.
    fn send(&mut self, id: ConnId, bytes: &[u8]);

    /// Queue `line` followed by a `\n` terminator.
    fn send_line(&mut self, id: ConnId, line: &str) {
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        self.send(id, &framed);
    }

    /// Request an orderly close of `id`: already-queued bytes are flushed,
    /// no further reads are dispatched, then the socket closes. Idempotent.
    fn request_close(&mut self, id: ConnId);

    /// Ask the loop to stop after the current cycle, equivalent to the
    /// external stop flag.
    fn request_shutdown(&mut self);

    /// Remote address of `id`, if still connected.
    fn peer_addr(&mut self, id: ConnId) -> Option<SocketAddr>;

    /// Ids of all live connections, including the one being called back.
    fn connection_ids(&self) -> Vec<ConnId>;
}
