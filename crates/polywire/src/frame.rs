//! # Protocol Frames
//!
//! Defines the structure of the call envelope and its reply.
//!
//! A request is `<method name> ':' <argument tuple>`, where the tuple is the codec's
//! encoding of the arguments in declaration order. A reply is a status plus a body: the
//! encoded return value on success, a UTF-8 message otherwise.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Unambiguous Split**: method names never contain the separator, so the first
//!   separator byte always ends the name.

use std::borrow::Cow;

use polyschema::TypeReference;

use crate::codec::Codec;
use crate::error::Error;
use crate::error::Result;
use crate::value::Value;

/// Byte between the method name and the argument payload.
pub const SEPARATOR: u8 = polyschema::METHOD_SEPARATOR as u8;

/// An outbound call: method name plus positional arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct Rpc {
    method: String,
    args: Vec<Value>,
}

impl Rpc {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        let method = method.into();
        if method.as_bytes().contains(&SEPARATOR) {
            return Err(Error::InvalidMethodName(method));
        }
        Ok(Self { method, args })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Frames the call, encoding the arguments with their declared types.
    pub fn to_bytes(&self, codec: &Codec, types: &[TypeReference]) -> Result<Vec<u8>> {
        let payload = codec.encode_tuple(types, &self.args)?;
        let mut out = Vec::with_capacity(self.method.len() + 1 + payload.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(SEPARATOR);
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Decodes an inbound call frame.
///
/// **Invariant**: `args` still holds the encoded tuple; decode it with `decode_args`
/// once the method signature is known.
#[derive(Clone, Copy, Debug)]
pub struct CallDecoder<'a> {
    pub method: &'a str,
    pub args: &'a [u8],
}

impl<'a> CallDecoder<'a> {
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let split = bytes
            .iter()
            .position(|b| *b == SEPARATOR)
            .ok_or_else(|| Error::ProtocolViolation("missing method separator".into()))?;
        let method = std::str::from_utf8(&bytes[..split])
            .map_err(|_| Error::ProtocolViolation("method name is not valid UTF-8".into()))?;
        Ok(Self { method, args: &bytes[split + 1..] })
    }

    pub fn decode_args(&self, codec: &Codec, types: &[TypeReference]) -> Result<Vec<Value>> {
        codec.decode_tuple(types, self.args)
    }
}

/// Application-level status of a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyStatus {
    Success,
    /// The request could not be decoded or named an unknown method.
    InvalidRequest,
    /// The handler failed.
    InternalError,
}

impl ReplyStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::InvalidRequest => 400,
            Self::InternalError => 500,
        }
    }

    /// `None` for any code outside the protocol; callers treat those as transport failures.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(Self::Success),
            400 => Some(Self::InvalidRequest),
            500 => Some(Self::InternalError),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: ReplyStatus,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn success(body: Vec<u8>) -> Self {
        Self { status: ReplyStatus::Success, body }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self { status: ReplyStatus::InvalidRequest, body: message.into().into_bytes() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self { status: ReplyStatus::InternalError, body: message.into().into_bytes() }
    }

    pub fn code(&self) -> u16 {
        self.status.code()
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// The body read as an error message.
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
