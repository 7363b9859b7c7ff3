//! # Socksrelay - SOCKS5 Proxy Server
//!
//! Socksrelay accepts SOCKS5 clients, negotiates the no-authentication
//! method, opens the requested TCP connection and relays bytes both ways
//! until either side closes.
//!
//! ## Features
//!
//! - **CONNECT over IPv4, IPv6 and domain names** (RFC 1928 subset)
//! - **One task per connection**: each session is a single-owner state machine fed by an ordered event channel
//! - **Backpressure**: a congested endpoint pauses reads on its peer until it drains
//! - **Bounded connect**: the remote connect attempt is cut off after a configurable timeout
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksrelay::config::load_config;
//! use socksrelay::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Server -> ClientSession -> RemoteConnector -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{CodecError, ConnectError, ServerError};
pub use server::{run_server, Server};

/// Version of the Socksrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "socksrelay");
    }
}
