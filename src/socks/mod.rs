//! SOCKS5 module for Socksrelay
//!
//! Wire codec, relay endpoints, the remote connector seam and the
//! per-connection session state machine.

pub mod auth;
pub mod command;
pub mod connector;
pub mod consts;
pub mod relay;
pub mod session;
pub mod types;

pub use auth::{choose_method, parse_method_negotiation, serialize_method_reply, MethodRequest};
pub use command::{
    parse_connection_reply, parse_connection_request, parse_connection_request_exact,
    serialize_connection_reply, serialize_connection_request, ConnectionRequest, Reply,
};
pub use connector::{connect_remote, RemoteConnector, RemoteStream};
pub use relay::{EndpointEvent, RelayEndpoint, RelayOptions, Side, WriteStatus};
pub use session::{ClientSession, SessionOptions, SessionState, Traffic};
pub use types::{AddrType, AuthMethod, Command, ReplyCode, TargetAddr};
