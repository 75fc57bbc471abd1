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

//! Ordered, size-tracked storage for bytes not yet accepted by the kernel

use bytes::{Buf, Bytes};
use std::collections::VecDeque;

/// FIFO sequence of pending byte chunks for one socket.
///
/// Pure bookkeeping: the queue never touches a socket. Chunks are appended
/// at the tail and trimmed from the logical front as the kernel accepts
/// bytes, crossing chunk boundaries as needed. The running total is kept
/// alongside so size queries are O(1).
#[derive(Debug, Default)]
pub struct SendQueue {
    chunks: VecDeque<Bytes>,
    total_bytes: usize,
}

impl SendQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk at the tail.
    pub fn append(&mut self, chunk: Bytes) {
        self.total_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// The front-most unsent bytes, if any.
    pub fn front(&self) -> Option<&[u8]> {
        self.chunks.front().map(|c| c.as_ref())
    }

    /// Remove `n` bytes from the logical front.
    ///
    /// Caller contract: `n` must not exceed [`total_bytes`](Self::total_bytes).
    /// Violating it is a programming error, not a runtime condition.
    pub fn trim_front(&mut self, n: usize) {
        debug_assert!(
            n <= self.total_bytes,
            "trim_front({n}) exceeds queued total {}",
            self.total_bytes
        );
        let mut remaining = n.min(self.total_bytes);
        while remaining > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if remaining >= front.len() {
                remaining -= front.len();
                self.total_bytes -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(remaining);
                self.total_bytes -= remaining;
                remaining = 0;
            }
        }
    }

    /// Total bytes currently queued.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }
}
