//! Server configuration types
//!
//! Defines the root configuration and the listener, SOCKS and relay sections.

use super::TcpConfig;
use crate::socks::relay::{DEFAULT_HIGH_WATER_MARK, DEFAULT_LOW_WATER_MARK, DEFAULT_READ_BUFFER_SIZE};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// SOCKS5 protocol configuration
    #[serde(default)]
    pub socks: SocksConfig,

    /// Relay buffering configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// TCP socket options for client and remote sockets
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.socks.validate()?;
        self.relay.validate()
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_backlog() -> u32 {
    1024
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to listen on (host:port)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            backlog: default_backlog(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }
        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    5
}

/// SOCKS5 protocol configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Remote connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Reject connection requests whose length does not match the address type
    #[serde(default)]
    pub strict_request_length: bool,

    /// Map refused / network unreachable failures to their own reply codes
    #[serde(default)]
    pub refine_reply_codes: bool,

    /// Report the remote socket's local address in the success reply
    #[serde(default)]
    pub report_bind_addr: bool,
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            connect_timeout: default_connect_timeout(),
            strict_request_length: false,
            refine_reply_codes: false,
            report_bind_addr: false,
        }
    }
}

impl SocksConfig {
    fn validate(&self) -> Result<(), String> {
        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_high_water_mark() -> usize {
    DEFAULT_HIGH_WATER_MARK
}

fn default_low_water_mark() -> usize {
    DEFAULT_LOW_WATER_MARK
}

/// Relay buffering configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    /// Bytes read from a socket at a time
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Queued bytes above which the peer is paused
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Queued bytes at which the peer is resumed
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            read_buffer_size: default_read_buffer_size(),
            high_water_mark: default_high_water_mark(),
            low_water_mark: default_low_water_mark(),
        }
    }
}

impl RelayConfig {
    fn validate(&self) -> Result<(), String> {
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than zero".to_string());
        }
        if self.low_water_mark > self.high_water_mark {
            return Err(format!(
                "low_water_mark ({}) must not exceed high_water_mark ({})",
                self.low_water_mark, self.high_water_mark
            ));
        }
        Ok(())
    }
}
