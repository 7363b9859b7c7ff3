//! SOCKS5 connection request parser
//!
//! Parses the request that follows method negotiation.

use crate::error::CodecError;
use crate::socks::consts::*;
use crate::socks::types::{AddrType, Command, TargetAddr};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Offset of DST.ADDR in a request
const ADDR_OFFSET: usize = 4;

/// A parsed connection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Requested command
    pub command: Command,
    /// Address type tag of the destination
    pub addr_type: AddrType,
    /// Destination host and port
    pub target: TargetAddr,
}

/// Parse a connection request
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The port is always taken from the final two bytes of `buf`. Trailing
/// bytes between the address and the port are not rejected; use
/// [`parse_connection_request_exact`] for that.
pub fn parse_connection_request(buf: &[u8]) -> Result<ConnectionRequest, CodecError> {
    parse_request(buf, false)
}

/// Parse a connection request whose length must match its address type
pub fn parse_connection_request_exact(buf: &[u8]) -> Result<ConnectionRequest, CodecError> {
    parse_request(buf, true)
}

fn parse_request(buf: &[u8], exact: bool) -> Result<ConnectionRequest, CodecError> {
    if buf.len() < MIN_CONNECT_REQUEST_LEN {
        return Err(CodecError::TooShort(buf.len()));
    }

    let version = buf[0];
    if version != SOCKS5_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    // Only CONNECT is served; any other command is answered before the
    // address is looked at.
    let atyp = buf[3];
    let command = match Command::from_byte(buf[1]) {
        Some(Command::Connect) => Command::Connect,
        _ => {
            return Err(CodecError::UnsupportedCommand {
                command: buf[1],
                addr_type: atyp,
            })
        }
    };
    let addr_type = AddrType::from_byte(atyp).ok_or(CodecError::AddressTypeNotSupported(atyp))?;

    let needed = match addr_type {
        AddrType::Ipv4 => ADDR_OFFSET + 4 + 2,
        AddrType::Ipv6 => ADDR_OFFSET + 16 + 2,
        AddrType::Domain => ADDR_OFFSET + 1 + buf[ADDR_OFFSET] as usize + 2,
    };
    if buf.len() < needed {
        return Err(CodecError::TruncatedAddress {
            needed,
            actual: buf.len(),
        });
    }
    if exact && buf.len() != needed {
        return Err(CodecError::LengthMismatch {
            expected: needed,
            actual: buf.len(),
        });
    }

    let port = u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]);

    let target = match addr_type {
        AddrType::Ipv4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[ADDR_OFFSET..ADDR_OFFSET + 4]);
            TargetAddr::ipv4(Ipv4Addr::from(octets), port)
        }
        AddrType::Ipv6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[ADDR_OFFSET..ADDR_OFFSET + 16]);
            TargetAddr::ipv6(Ipv6Addr::from(octets), port)
        }
        AddrType::Domain => {
            // An empty name is passed on; resolving it fails like any other
            // unreachable host.
            let len = buf[ADDR_OFFSET] as usize;
            let name = &buf[ADDR_OFFSET + 1..ADDR_OFFSET + 1 + len];
            let domain = std::str::from_utf8(name).map_err(|_| CodecError::InvalidDomain)?;
            TargetAddr::domain(domain, port)
        }
    };

    Ok(ConnectionRequest {
        command,
        addr_type,
        target,
    })
}

/// Encode a connection request (client side)
pub fn serialize_connection_request(command: Command, target: &TargetAddr) -> Vec<u8> {
    let mut buf = vec![SOCKS5_VERSION, command.to_byte(), SOCKS5_RESERVED];
    target.write_to(&mut buf);
    buf
}
