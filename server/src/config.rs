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

//! Chat server configuration

/// Server identity and access settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,

    /// Connection password. `None` disables the PASS gate.
    pub password: Option<String>,

    /// Name used as the source of server-originated replies.
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:6667".to_string(),
            password: None,
            server_name: "confab".to_string(),
        }
    }
}

impl ServerConfig {
    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Require a connection password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the server name.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:6667");
        assert!(config.password.is_none());
        assert_eq!(config.server_name, "confab");
    }

    #[test]
    fn test_builder_methods() {
        let config = ServerConfig::default()
            .with_bind_addr("0.0.0.0:7000")
            .with_password("hunter2")
            .with_server_name("testnet");
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.server_name, "testnet");
    }
}
