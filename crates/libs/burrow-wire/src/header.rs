use serde::{Deserialize, Serialize};

use crate::context::{CallContext, ContextDelta};
use crate::exception::ExceptionInfo;
use crate::ids::Guid;

pub const PROTOCOL_VERSION: u32 = 1;

/// Invokes every registered ping handler and merges their responses.
pub const METHOD_PING: &str = ".ping";
/// Evicts the caller's session.
pub const METHOD_CLOSE: &str = ".close";
/// Carries one chunk of a multi-part transfer.
pub const METHOD_MULTI: &str = ".multi";

/// Application method names must not collide with these.
pub fn is_reserved(method: &str) -> bool {
    matches!(method, METHOD_PING | METHOD_CLOSE | METHOD_MULTI)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub version: u32,
    pub message_id: Guid,
    pub method: String,
    #[serde(default)]
    pub call_context: CallContext,
}

impl RequestHeader {
    pub fn new(message_id: Guid, method: impl Into<String>, call_context: CallContext) -> Self {
        Self { version: PROTOCOL_VERSION, message_id, method: method.into(), call_context }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub message_id: Guid,
    pub success: bool,
    #[serde(default)]
    pub exception: Option<ExceptionInfo>,
    #[serde(default)]
    pub call_context: Option<ContextDelta>,
}

impl ResponseHeader {
    pub fn success(message_id: Guid) -> Self {
        Self { message_id, success: true, exception: None, call_context: None }
    }

    pub fn failure(message_id: Guid, exception: ExceptionInfo) -> Self {
        Self { message_id, success: false, exception: Some(exception), call_context: None }
    }
}
