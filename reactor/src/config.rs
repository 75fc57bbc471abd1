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

//! Reactor configuration

use std::time::Duration;

/// Tuning knobs for the event loop.
///
/// # Example
///
/// ```
/// use confab_reactor::ReactorConfig;
/// use std::time::Duration;
///
/// let config = ReactorConfig::default()
///     .with_max_backlog_bytes(64 * 1024)
///     .with_poll_timeout(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Per-connection outbound backlog cap in bytes. A connection whose
    /// backlog would exceed this is dropped.
    pub max_backlog_bytes: usize,

    /// Upper bound on one blocking poll, so the stop flag is sampled at
    /// least this often even when nothing is ready.
    pub poll_timeout: Duration,

    /// Capacity of the readiness event buffer per poll.
    pub events_capacity: usize,

    /// Size of the stack buffer used per read call.
    pub read_chunk_size: usize,

    /// Cap on buffered inbound bytes awaiting a line terminator. A peer
    /// whose unterminated input exceeds this is dropped, mirroring the
    /// outbound backlog cap.
    pub max_line_bytes: usize,

    /// Loop cycles a closing connection may spend flushing its backlog
    /// before the socket is closed regardless.
    pub close_retry_budget: u32,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_backlog_bytes: 32 * 1024,
            poll_timeout: Duration::from_secs(1),
            events_capacity: 256,
            read_chunk_size: 4096,
            max_line_bytes: 32 * 1024,
            close_retry_budget: 8,
        }
    }
}

impl ReactorConfig {
    /// Set the per-connection backlog cap.
    pub fn with_max_backlog_bytes(mut self, bytes: usize) -> Self {
        self.max_backlog_bytes = bytes;
        self
    }

    /// Set the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the readiness event buffer capacity.
    pub fn with_events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity;
        self
    }

    /// Set the per-read buffer size.
    pub fn with_read_chunk_size(mut self, bytes: usize) -> Self {
        self.read_chunk_size = bytes;
        self
    }

    /// Set the unterminated-input cap.
    pub fn with_max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }

    /// Set the deferred-close cycle budget.
    pub fn with_close_retry_budget(mut self, cycles: u32) -> Self {
        self.close_retry_budget = cycles;
        self
    }
}
