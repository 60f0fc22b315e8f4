use std::fmt;
use std::sync::{Arc, Mutex};

use burrow_wire::codec::{encode_body, read_delimited, write_delimited};
use burrow_wire::{
    is_reserved, CallContext, Guid, PingRequest, PingResponse, RequestHeader, ResponseHeader,
    TypeResolution, METHOD_CLOSE, METHOD_PING,
};

use crate::config::{ClientConfig, MIN_MULTI_PART_THRESHOLD};
use crate::dispatch::CallDispatch;
use crate::error::RpcError;
use crate::exception::{reconstruct, ExceptionRegistry};
use crate::multipart::MultiPartClient;
use crate::transport::ClientTransport;

/// Issues calls over a [`ClientTransport`] and keeps the running call
/// context between them.
pub struct RpcClient<T: ClientTransport> {
    transport: T,
    context: Mutex<CallContext>,
    type_resolution: TypeResolution,
    registry: Arc<ExceptionRegistry>,
    multi_part_threshold: Option<usize>,
}

impl<T: ClientTransport> fmt::Debug for RpcClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("type_resolution", &self.type_resolution)
            .field("context", &self.call_context())
            .finish_non_exhaustive()
    }
}

impl<T: ClientTransport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            context: Mutex::new(CallContext::new()),
            type_resolution: TypeResolution::default(),
            registry: Arc::new(ExceptionRegistry::new()),
            multi_part_threshold: None,
        }
    }

    pub fn with_config(transport: T, config: &ClientConfig) -> Result<Self, RpcError> {
        if let Some(threshold) = config.multi_part_threshold {
            if threshold < MIN_MULTI_PART_THRESHOLD {
                return Err(RpcError::configuration(format!(
                    "multi_part_threshold must be at least {MIN_MULTI_PART_THRESHOLD}, \
                     got {threshold}"
                )));
            }
        }
        let mut client = Self::new(transport).with_type_resolution(config.type_resolution);
        client.multi_part_threshold = config.multi_part_threshold;
        Ok(client)
    }

    pub fn with_type_resolution(mut self, type_resolution: TypeResolution) -> Self {
        self.type_resolution = type_resolution;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ExceptionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn type_resolution(&self) -> TypeResolution {
        self.type_resolution
    }

    pub fn registry(&self) -> &Arc<ExceptionRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Requests of at least this many bytes are sent in chunks by
    /// [`CallDispatch::call_raw`].
    pub fn multi_part_threshold(&self) -> Option<usize> {
        self.multi_part_threshold
    }

    pub fn call_context(&self) -> CallContext {
        self.context.lock().expect("call context mutex poisoned").clone()
    }

    pub fn set_call_context(&self, context: CallContext) {
        *self.context.lock().expect("call context mutex poisoned") = context;
    }

    /// Wraps the client so requests of at least `threshold` bytes are sent
    /// in chunks.
    pub fn enable_multi_part(self, threshold: usize) -> Result<MultiPartClient<Self>, RpcError> {
        MultiPartClient::new(self, threshold)
    }

    pub fn ping(&self) -> Result<PingResponse, RpcError> {
        self.ping_with(&PingRequest::default())
    }

    pub fn ping_with(&self, request: &PingRequest) -> Result<PingResponse, RpcError> {
        self.call(METHOD_PING, request)
    }

    /// Ends the server-side session, if one was assigned. Failures are
    /// logged; the session id is cleared locally either way.
    pub fn close(&self) {
        let Some(session_id) = self.call_context().session_id else {
            return;
        };
        let result = encode_body(&())
            .map_err(|err| RpcError::protocol(err.to_string()))
            .and_then(|body| self.call_raw(METHOD_CLOSE, &body));
        if let Err(err) = result {
            log::warn!("rpc: failed to close session {session_id}: {err}");
        }
        self.context.lock().expect("call context mutex poisoned").session_id = None;
    }

    /// One request/response exchange over the transport.
    fn send(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        let message_id = Guid::new_random();
        let header = RequestHeader::new(message_id, method, self.call_context());

        let mut bytes = Vec::with_capacity(request.len() + 128);
        write_delimited(&mut bytes, &header)
            .map_err(|err| RpcError::protocol(format!("failed to encode request header: {err}")))?;
        bytes.extend_from_slice(request);

        log::trace!("rpc {message_id}: calling {method} with {} bytes", request.len());
        let response = self.transport.execute(&bytes)?;

        let (reply, body): (ResponseHeader, &[u8]) = read_delimited(&response)
            .map_err(|err| RpcError::protocol(format!("malformed response header: {err}")))?;
        if reply.message_id != message_id {
            return Err(RpcError::protocol(format!(
                "response message id {} does not match request {message_id}",
                reply.message_id
            )));
        }

        if let Some(delta) = &reply.call_context {
            self.context.lock().expect("call context mutex poisoned").apply_delta(delta);
        }
        if let Some(info) = &reply.exception {
            log::trace!("rpc {message_id}: {method} failed remotely");
            return Err(reconstruct(info, self.type_resolution, &self.registry).into());
        }
        if !reply.success {
            return Err(RpcError::protocol("call failed without exception details"));
        }
        if body.is_empty() {
            return Err(RpcError::protocol("successful response has no body"));
        }
        Ok(body.to_vec())
    }
}

/// The client without its configured chunking, so chunks go out as single
/// exchanges.
struct Direct<'a, T: ClientTransport>(&'a RpcClient<T>);

impl<T: ClientTransport> CallDispatch for Direct<'_, T> {
    fn call_raw(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        self.0.send(method, request)
    }
}

impl<T: ClientTransport> CallDispatch for RpcClient<T> {
    fn call_raw(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, RpcError> {
        match self.multi_part_threshold {
            Some(threshold) if request.len() >= threshold && !is_reserved(method) => {
                MultiPartClient::new(Direct(self), threshold)?.call_raw(method, request)
            }
            _ => self.send(method, request),
        }
    }
}

impl<T: ClientTransport> Drop for RpcClient<T> {
    fn drop(&mut self) {
        self.close();
    }
}
