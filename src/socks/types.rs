//! SOCKS5 type definitions
//!
//! Closed enumerations for every byte-coded field of the protocol, plus the
//! address type shared by requests and replies.

use super::consts::*;
use crate::error::CodecError;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Authentication methods offered during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    NoAuth,
    /// GSSAPI
    Gssapi,
    /// Username/password
    Password,
}

impl AuthMethod {
    /// Parse from SOCKS5 method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_AUTH_METHOD_NONE => Some(AuthMethod::NoAuth),
            SOCKS5_AUTH_METHOD_GSSAPI => Some(AuthMethod::Gssapi),
            SOCKS5_AUTH_METHOD_PASSWORD => Some(AuthMethod::Password),
            _ => None,
        }
    }

    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::NoAuth => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Gssapi => SOCKS5_AUTH_METHOD_GSSAPI,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }

    /// Whether a sub-negotiation follows the method reply
    pub fn requires_challenge(self) -> bool {
        !matches!(self, AuthMethod::NoAuth)
    }
}

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay (not implemented)
    UdpAssociate,
}

impl Command {
    /// Parse a command byte into Command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(Command::Connect),
            SOCKS5_CMD_TCP_BIND => Some(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(Command::UdpAssociate),
            _ => None,
        }
    }

    /// Convert Command to byte
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => SOCKS5_CMD_TCP_CONNECT,
            Command::Bind => SOCKS5_CMD_TCP_BIND,
            Command::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Address type tag (ATYP)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    /// 4-byte IPv4 address
    Ipv4,
    /// Length-prefixed domain name
    Domain,
    /// 16-byte IPv6 address
    Ipv6,
}

impl AddrType {
    /// Parse an ATYP byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Some(AddrType::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Some(AddrType::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Some(AddrType::Ipv6),
            _ => None,
        }
    }

    /// Convert to ATYP byte
    pub fn to_byte(self) -> u8 {
        match self {
            AddrType::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddrType::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
            AddrType::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = SOCKS5_REPLY_SUCCEEDED,
    /// General SOCKS server failure
    GeneralFailure = SOCKS5_REPLY_GENERAL_FAILURE,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
    /// Network unreachable
    NetworkUnreachable = SOCKS5_REPLY_NETWORK_UNREACHABLE,
    /// Host unreachable
    HostUnreachable = SOCKS5_REPLY_HOST_UNREACHABLE,
    /// Connection refused
    ConnectionRefused = SOCKS5_REPLY_CONNECTION_REFUSED,
    /// TTL expired
    TtlExpired = SOCKS5_REPLY_TTL_EXPIRED,
    /// Command not supported
    CommandNotSupported = SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
    /// Address type not supported
    AddressTypeNotSupported = SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            SOCKS5_REPLY_SUCCEEDED => Ok(ReplyCode::Succeeded),
            SOCKS5_REPLY_GENERAL_FAILURE => Ok(ReplyCode::GeneralFailure),
            SOCKS5_REPLY_CONNECTION_NOT_ALLOWED => Ok(ReplyCode::ConnectionNotAllowed),
            SOCKS5_REPLY_NETWORK_UNREACHABLE => Ok(ReplyCode::NetworkUnreachable),
            SOCKS5_REPLY_HOST_UNREACHABLE => Ok(ReplyCode::HostUnreachable),
            SOCKS5_REPLY_CONNECTION_REFUSED => Ok(ReplyCode::ConnectionRefused),
            SOCKS5_REPLY_TTL_EXPIRED => Ok(ReplyCode::TtlExpired),
            SOCKS5_REPLY_COMMAND_NOT_SUPPORTED => Ok(ReplyCode::CommandNotSupported),
            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED => Ok(ReplyCode::AddressTypeNotSupported),
            other => Err(CodecError::UnknownReplyCode(other)),
        }
    }
}

/// Destination or bound address of a SOCKS5 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        TargetAddr::Domain(domain.into(), port)
    }

    /// Zero-filled address of the given type, used in failure replies
    pub fn unspecified(addr_type: AddrType) -> Self {
        match addr_type {
            AddrType::Ipv4 => TargetAddr::ipv4(Ipv4Addr::UNSPECIFIED, 0),
            AddrType::Ipv6 => TargetAddr::ipv6(Ipv6Addr::UNSPECIFIED, 0),
            AddrType::Domain => TargetAddr::Domain(String::new(), 0),
        }
    }

    /// Host part as a string (domain name or formatted IP address)
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ip(addr) => addr.ip().to_string(),
            TargetAddr::Domain(domain, _) => domain.clone(),
        }
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address type of this address
    pub fn addr_type(&self) -> AddrType {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => AddrType::Ipv4,
            TargetAddr::Ip(SocketAddr::V6(_)) => AddrType::Ipv6,
            TargetAddr::Domain(_, _) => AddrType::Domain,
        }
    }

    /// Resolve the address to a SocketAddr
    ///
    /// For IP addresses, this returns immediately.
    /// For domain names, this performs DNS resolution and takes the first result.
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, _) if domain.is_empty() => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Empty domain name",
            )),
            TargetAddr::Domain(domain, port) => tokio::net::lookup_host((domain.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("No addresses found for domain: {}", domain),
                    )
                }),
        }
    }

    /// Append `ATYP ADDR PORT` to `buf`
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.addr_type().to_byte());
        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => buf.extend_from_slice(&addr.ip().octets()),
            TargetAddr::Ip(SocketAddr::V6(addr)) => buf.extend_from_slice(&addr.ip().octets()),
            TargetAddr::Domain(domain, _) => {
                // Names are capped at 255 bytes on the wire
                let name = &domain.as_bytes()[..domain.len().min(MAX_DOMAIN_LEN)];
                buf.push(name.len() as u8);
                buf.extend_from_slice(name);
            }
        }
        buf.extend_from_slice(&self.port().to_be_bytes());
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl Default for TargetAddr {
    fn default() -> Self {
        TargetAddr::unspecified(AddrType::Ipv4)
    }
}
