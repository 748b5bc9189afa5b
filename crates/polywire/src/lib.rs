//! # PolyWire
//!
//! Schema-driven serialization and framing for polyrpc.
//!
//! ## Architecture
//!
//! Values are translated to a canonical document tree by the `Codec`, using only the
//! schema's type references and the serializer descriptors derived from its models.
//! A pluggable `Format` turns trees into bytes. Frames wrap those bytes for the call
//! channel (`Rpc`, `CallDecoder`, `Reply`) and the control channel (`ClientMessage`,
//! `ServerMessage`).

pub mod codec;
pub mod control;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod frame;
pub mod value;


pub use codec::Codec;
pub use codec::MAX_RECURSION_DEPTH;
pub use control::ClientMessage;
pub use control::ServerMessage;
pub use descriptor::Descriptors;
pub use descriptor::SerialDescriptor;
pub use error::Error;
pub use error::Result;
pub use format::Format;
pub use format::JsonFormat;
pub use frame::CallDecoder;
pub use frame::Reply;
pub use frame::ReplyStatus;
pub use frame::Rpc;
pub use frame::SEPARATOR;
pub use value::Value;
