//! Wire contract for burrow RPC.
//!
//! Every call on the wire is a length-delimited [`RequestHeader`] followed by
//! the request body, answered by a length-delimited [`ResponseHeader`]
//! followed by the response body. Messages are MessagePack with named fields.
//!
//! - [`codec`]: delimited read/write and body encode/decode
//! - [`Guid`]: 128-bit ids for messages, sessions and transfers
//! - [`CallContext`] / [`ContextDelta`]: the round-tripped call context
//! - [`MultiPartRequest`] / [`MultiPartResponse`]: chunked transfer messages
//! - [`ExceptionInfo`]: portable captured errors

pub mod codec;
pub mod context;
pub mod exception;
pub mod header;
pub mod ids;
pub mod multipart;
pub mod ping;

pub use context::{CallContext, ContextDelta, Extensions};
pub use exception::{DetailLevel, ExceptionField, ExceptionInfo, FieldType, TypeResolution};
pub use header::{
    is_reserved, RequestHeader, ResponseHeader, METHOD_CLOSE, METHOD_MULTI, METHOD_PING,
    PROTOCOL_VERSION,
};
pub use ids::Guid;
pub use multipart::{MessageStatus, MultiPartRequest, MultiPartResponse};
pub use ping::{PingRequest, PingResponse};

pub use rmpv::Value;
