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

//! Error types for the reactor

use thiserror::Error;

/// Result type for reactor operations
pub type Result<T> = std::result::Result<T, ReactorError>;

/// Reactor error types
#[derive(Debug, Error)]
pub enum ReactorError {
    /// I/O error from the poller or a socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Address string did not resolve to a usable socket address
    #[error("No usable address for '{0}'")]
    NoAddress(String),

    /// `run` called without a listener or an outbound connection
    #[error("Nothing to drive: no listener and no connections")]
    NothingToDrive,
}
