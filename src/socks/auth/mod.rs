//! SOCKS5 authentication method negotiation
//!
//! Parses the client's method list, selects a method and encodes the
//! two-byte reply. Only [`AuthMethod::NoAuth`] is supported.

use super::consts::*;
use super::types::AuthMethod;
use crate::error::CodecError;

/// Methods this server can complete, in no particular order
pub const SUPPORTED_METHODS: &[AuthMethod] = &[AuthMethod::NoAuth];

/// Parsed method negotiation request
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRequest {
    /// Protocol version (always 5 once parsed)
    pub version: u8,
    /// Raw method bytes in client-offered order
    pub methods: Vec<u8>,
}

/// Parse a complete method negotiation request
pub fn parse_method_negotiation(buf: &[u8]) -> Result<MethodRequest, CodecError> {
    if buf.len() < MIN_METHOD_REQUEST_LEN {
        return Err(CodecError::TooShort(buf.len()));
    }
    if buf.len() > MAX_METHOD_REQUEST_LEN {
        return Err(CodecError::TooLong(buf.len()));
    }

    let version = buf[0];
    if version != SOCKS5_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let num_methods = buf[1] as usize;
    if num_methods == 0 {
        return Err(CodecError::NoMethods);
    }

    let methods = &buf[2..];
    if methods.len() != num_methods {
        return Err(CodecError::MethodCountMismatch {
            expected: num_methods,
            actual: methods.len(),
        });
    }

    Ok(MethodRequest {
        version,
        methods: methods.to_vec(),
    })
}

/// Select the first offered method that is also supported
pub fn choose_method(methods: &[u8], supported: &[AuthMethod]) -> Option<AuthMethod> {
    methods
        .iter()
        .filter_map(|byte| AuthMethod::from_byte(*byte))
        .find(|method| supported.contains(method))
}

/// Encode the method selection reply; `None` encodes "no acceptable method"
pub fn serialize_method_reply(method: Option<AuthMethod>) -> [u8; 2] {
    [
        SOCKS5_VERSION,
        method
            .map(AuthMethod::to_byte)
            .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
    ]
}

/// Encode a method negotiation request (client side)
pub fn serialize_method_request(methods: &[u8]) -> Vec<u8> {
    let methods = &methods[..methods.len().min(u8::MAX as usize)];
    let mut buf = Vec::with_capacity(2 + methods.len());
    buf.push(SOCKS5_VERSION);
    buf.push(methods.len() as u8);
    buf.extend_from_slice(methods);
    buf
}
