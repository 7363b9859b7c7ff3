//! Error types for Socksrelay
//!
//! This module defines all custom error types used throughout the application.

use crate::socks::ReplyCode;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top-level error for server setup
#[derive(Error, Debug)]
pub enum ServerError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// SOCKS5 wire format errors
///
/// Everything except [`CodecError::UnsupportedCommand`] is a malformed
/// message: the connection is closed without a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Buffer shorter than the message minimum
    #[error("Message too short: {0} bytes")]
    TooShort(usize),

    /// Buffer longer than the message maximum
    #[error("Message too long: {0} bytes")]
    TooLong(usize),

    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Method negotiation offered no methods
    #[error("Zero authentication methods")]
    NoMethods,

    /// Declared method count differs from the bytes that follow
    #[error("Expecting {expected} methods, got {actual}")]
    MethodCountMismatch {
        /// NMETHODS from the header
        expected: usize,
        /// Method bytes actually present
        actual: usize,
    },

    /// Command byte not defined by the protocol
    #[error("Command not supported: {command}")]
    UnsupportedCommand {
        /// Raw CMD byte
        command: u8,
        /// Raw ATYP byte of the same request
        addr_type: u8,
    },

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Address bytes run past the end of the buffer
    #[error("Truncated address: need {needed} bytes, got {actual}")]
    TruncatedAddress {
        /// Bytes required for header, address and port
        needed: usize,
        /// Buffer length
        actual: usize,
    },

    /// Domain name empty or not valid UTF-8
    #[error("Invalid domain name")]
    InvalidDomain,

    /// Request length does not match its address type
    #[error("Request length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length implied by ATYP
        expected: usize,
        /// Buffer length
        actual: usize,
    },

    /// Reply code outside the RFC 1928 range
    #[error("Unknown reply code: {0}")]
    UnknownReplyCode(u8),
}

impl CodecError {
    /// Whether this is a wire-format violation rather than a valid but
    /// unsupported request
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CodecError::UnsupportedCommand { .. })
    }
}

/// Outbound connection failures
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The attempt did not finish within the bound
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// Resolution or connect failed
    #[error("Connection failed: {0}")]
    Io(#[from] io::Error),
}

impl ConnectError {
    /// Reply code that best describes the failure
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            ConnectError::Timeout(_) => ReplyCode::HostUnreachable,
            ConnectError::Io(err) => ReplyCode::from(err),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
            _ => ReplyCode::HostUnreachable,
        }
    }
}
