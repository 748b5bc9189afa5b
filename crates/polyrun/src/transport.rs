//! # Transport Abstraction
//!
//! Minimal async seams for moving bytes between a client and a server.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: transports know nothing about frames, values or schemas.
//!   They move opaque buffers plus a status code.
//! - **Two Channels**: a request/response call channel, and one persistent control
//!   channel per client session carrying subscription traffic in both directions.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use polywire::Reply;
use uuid::Uuid;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The operation timed out before a response was received.
    Timeout,
    /// The peer answered with a status outside the protocol.
    UnexpectedStatus(u16),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::UnexpectedStatus(code) => write!(f, "Unexpected status code {}", code),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Raw answer of the call channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub body: Vec<u8>,
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Self { code: reply.code(), body: reply.body }
    }
}

/// Sends a framed request and waits for the response.
///
/// This trait is designed to be object-safe (`Arc<dyn CallTransport>`).
#[async_trait::async_trait]
pub trait CallTransport: Send + Sync + 'static {
    /// # Invariants
    /// - Must return `Ok(response)` for every answer the server produced, whatever its code.
    /// - Must return `Err` only if the exchange itself failed.
    async fn call(&self, request: &[u8]) -> Result<Response>;
}

/// Client side of the control channel.
#[async_trait::async_trait]
pub trait EventSender: Send + Sync + 'static {
    async fn send(&self, message: &[u8]) -> Result<()>;
}

/// Server side of one client's control channel.
#[async_trait::async_trait]
pub trait ConnectionSink: Send + Sync + 'static {
    /// An `Err` means the session is gone; it is never retried.
    async fn push(&self, message: &[u8]) -> Result<()>;
}

/// Strong type for connection identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live client session as seen by the server: an identity plus a way to push to it.
///
/// Equality and hashing use the id only.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn ConnectionSink>,
}

impl Connection {
    pub fn new(sink: Arc<dyn ConnectionSink>) -> Self {
        Self::with_id(ConnectionId::random(), sink)
    }

    pub fn with_id(id: ConnectionId, sink: Arc<dyn ConnectionSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn push(&self, message: &[u8]) -> Result<()> {
        self.sink.push(message).await
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Connection").field(&self.id).finish()
    }
}
