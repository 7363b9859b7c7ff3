//! SOCKS5 reply builder
//!
//! Constructs and parses SOCKS5 reply messages.

use crate::error::CodecError;
use crate::socks::consts::*;
use crate::socks::types::{AddrType, ReplyCode, TargetAddr};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A connection reply: status code plus bound address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply status
    pub code: ReplyCode,
    /// BND.ADDR / BND.PORT
    pub bound: TargetAddr,
}

impl Reply {
    /// Reply with a zero-filled bound address of the given type
    pub fn unspecified(code: ReplyCode, addr_type: AddrType) -> Self {
        Reply {
            code,
            bound: TargetAddr::unspecified(addr_type),
        }
    }

    /// Encode this reply
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize_connection_reply(self.code, &self.bound)
    }
}

/// Encode a connection reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn serialize_connection_reply(code: ReplyCode, bound: &TargetAddr) -> Vec<u8> {
    let mut reply = vec![SOCKS5_VERSION, code.into(), SOCKS5_RESERVED];
    bound.write_to(&mut reply);
    reply
}

/// Parse a connection reply (client side)
pub fn parse_connection_reply(buf: &[u8]) -> Result<Reply, CodecError> {
    if buf.len() < 4 {
        return Err(CodecError::TooShort(buf.len()));
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(CodecError::UnsupportedVersion(buf[0]));
    }
    let code = ReplyCode::try_from(buf[1])?;
    let addr_type = AddrType::from_byte(buf[3]).ok_or(CodecError::AddressTypeNotSupported(buf[3]))?;

    let addr = &buf[4..];
    let (addr_len, name_offset) = match addr_type {
        AddrType::Ipv4 => (4, 0),
        AddrType::Ipv6 => (16, 0),
        AddrType::Domain => match addr.first() {
            Some(len) => (1 + *len as usize, 1),
            None => return Err(CodecError::TooShort(buf.len())),
        },
    };
    let needed = 4 + addr_len + 2;
    if buf.len() != needed {
        return Err(CodecError::LengthMismatch {
            expected: needed,
            actual: buf.len(),
        });
    }

    let port = u16::from_be_bytes([addr[addr_len], addr[addr_len + 1]]);
    let bound = match addr_type {
        AddrType::Ipv4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&addr[..4]);
            TargetAddr::ipv4(Ipv4Addr::from(octets), port)
        }
        AddrType::Ipv6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr[..16]);
            TargetAddr::ipv6(Ipv6Addr::from(octets), port)
        }
        AddrType::Domain => {
            let name = std::str::from_utf8(&addr[name_offset..addr_len])
                .map_err(|_| CodecError::InvalidDomain)?;
            TargetAddr::domain(name, port)
        }
    };

    Ok(Reply { code, bound })
}
