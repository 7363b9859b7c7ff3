//! SOCKS5 command parsing module
//!
//! Parses connection requests and builds replies. Pure functions over byte
//! buffers; nothing here touches a socket.

mod parser;
mod reply;

pub use parser::{
    parse_connection_request, parse_connection_request_exact, serialize_connection_request,
    ConnectionRequest,
};
pub use reply::{parse_connection_reply, serialize_connection_reply, Reply};
