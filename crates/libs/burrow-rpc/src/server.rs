use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use burrow_wire::codec::{read_delimited, write_delimited};
use burrow_wire::{
    DetailLevel, ExceptionInfo, Guid, PingRequest, PingResponse, RequestHeader, ResponseHeader,
    METHOD_CLOSE, METHOD_PING, PROTOCOL_VERSION,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ambient::{self, AmbientScope, CallFrame};
use crate::config::RpcConfig;
use crate::dispatch::{decode_request, encode_response, Dispatch};
use crate::exception::{capture, Fault, InvalidDataError, InvalidOperationError};
use crate::identity::ClientIdentity;
use crate::multipart::MultiPartServer;
use crate::session::SessionStore;

pub type PingHandler = Arc<dyn Fn(&PingRequest) -> Result<PingResponse, Fault> + Send + Sync>;

/// Turns request bytes into response bytes for whatever transport accepted
/// the call.
pub struct RpcServer {
    dispatch: Arc<dyn Dispatch>,
    detail_level: DetailLevel,
    sessions: Arc<SessionStore>,
    ping_handlers: RwLock<Vec<PingHandler>>,
    multi_part: bool,
    max_multi_part_bytes: u64,
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("detail_level", &self.detail_level)
            .field("sessions", &self.sessions.len())
            .field("multi_part", &self.multi_part)
            .finish_non_exhaustive()
    }
}

impl RpcServer {
    pub fn new(dispatch: impl Dispatch + 'static) -> Self {
        Self {
            dispatch: Arc::new(dispatch),
            detail_level: DetailLevel::FullDetails,
            sessions: Arc::new(SessionStore::default()),
            ping_handlers: RwLock::new(Vec::new()),
            multi_part: false,
            max_multi_part_bytes: crate::config::DEFAULT_MAX_MULTI_PART_BYTES,
        }
    }

    pub fn from_config(dispatch: impl Dispatch + 'static, config: &RpcConfig) -> Self {
        let server = Self::new(dispatch)
            .with_detail_level(config.server.exception_detail)
            .with_sessions(Arc::new(SessionStore::new(config.sessions.clone())));
        let server = Self { max_multi_part_bytes: config.server.max_multi_part_bytes, ..server };
        if config.server.multi_part {
            server.enable_multi_part()
        } else {
            server
        }
    }

    pub fn with_detail_level(mut self, detail_level: DetailLevel) -> Self {
        self.detail_level = detail_level;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Accepts `.multi` transfers. Enabling twice has no further effect.
    pub fn enable_multi_part(mut self) -> Self {
        if !self.multi_part {
            let filter = MultiPartServer::from_arc(Arc::clone(&self.dispatch))
                .with_max_message_bytes(self.max_multi_part_bytes);
            self.dispatch = Arc::new(filter);
            self.multi_part = true;
        }
        self
    }

    /// Handlers run in registration order; their responses are merged field
    /// by field, later handlers winning.
    pub fn add_ping_handler<F>(&self, handler: F)
    where
        F: Fn(&PingRequest) -> Result<PingResponse, Fault> + Send + Sync + 'static,
    {
        self.ping_handlers.write().expect("ping handlers rwlock poisoned").push(Arc::new(handler));
    }

    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn is_multi_part_enabled(&self) -> bool {
        self.multi_part
    }

    /// Starts the idle-session sweeper at the configured interval.
    pub fn spawn_session_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = self.sessions.config().sweep_interval();
        self.sessions.spawn_sweeper(interval, cancel)
    }

    /// Handles one call. Never fails: every error becomes a response with
    /// `success == false`.
    pub fn handle(&self, identity: Arc<dyn ClientIdentity>, request: &[u8]) -> Vec<u8> {
        let (header, body) = match read_delimited::<RequestHeader>(request) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::trace!("rpc: malformed request header: {err}");
                let error = InvalidDataError::new(format!("malformed request header: {err}"));
                let info = capture(&error, self.detail_level);
                return self.respond(ResponseHeader::failure(Guid::NIL, info), &[]);
            }
        };
        let message_id = header.message_id;
        if header.version != PROTOCOL_VERSION {
            let error = InvalidDataError::new(format!(
                "unsupported protocol version {}, expected {PROTOCOL_VERSION}",
                header.version
            ));
            let info = capture(&error, self.detail_level);
            return self.respond(ResponseHeader::failure(message_id, info), &[]);
        }
        log::trace!("rpc {message_id}: dispatching {}", header.method);

        let original = header.call_context.clone();
        let scope = AmbientScope::enter(CallFrame {
            context: header.call_context,
            identity,
            sessions: Arc::clone(&self.sessions),
        });
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&header.method, body)));
        let context = scope.finish();
        let outcome = outcome.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            log::warn!("rpc {message_id}: {} panicked: {message}", header.method);
            Err(InvalidOperationError::new(message).into())
        });

        match outcome {
            Ok(response) => {
                let mut reply = ResponseHeader::success(message_id);
                reply.call_context = context.delta_from(&original);
                self.respond(reply, &response)
            }
            Err(fault) => {
                log::trace!("rpc {message_id}: {} failed: {fault}", header.method);
                let info = capture(fault.as_ref(), self.detail_level);
                self.respond(ResponseHeader::failure(message_id, info), &[])
            }
        }
    }

    fn execute(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, Fault> {
        match method {
            METHOD_PING => {
                let request: PingRequest = decode_request(method, body)?;
                let response = self.ping(&request)?;
                encode_response(method, &response)
            }
            METHOD_CLOSE => {
                if let Some(session) = ambient::existing_session()? {
                    self.sessions.kill(session.id());
                }
                ambient::update(|context| context.session_id = None)?;
                encode_response(method, &())
            }
            _ => self.dispatch.call_method(method, body),
        }
    }

    fn ping(&self, request: &PingRequest) -> Result<PingResponse, Fault> {
        let handlers = self.ping_handlers.read().expect("ping handlers rwlock poisoned").clone();
        let mut response = PingResponse::default();
        for handler in handlers {
            response.merge_from(&handler(request)?);
        }
        Ok(response)
    }

    fn respond(&self, header: ResponseHeader, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 64);
        if let Err(err) = write_delimited(&mut out, &header) {
            log::error!("rpc {}: failed to encode response header: {err}", header.message_id);
            out.clear();
            let fallback = ResponseHeader::failure(header.message_id, ExceptionInfo::default());
            if write_delimited(&mut out, &fallback).is_err() {
                out.clear();
            }
            return out;
        }
        out.extend_from_slice(body);
        log::trace!("rpc {}: wrote {} byte response", header.message_id, out.len());
        out
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}
