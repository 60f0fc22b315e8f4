use std::collections::HashMap;
use std::fmt;

use burrow_wire::codec::{decode_body, encode_body};
use burrow_wire::is_reserved;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RpcError;
use crate::exception::{Fault, InvalidDataError, MissingMethodError};

/// Client side of a call: named method, encoded request in, encoded response
/// out. Filters implement it by wrapping another `CallDispatch`.
pub trait CallDispatch {
    fn call_raw(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, RpcError>;

    fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Self: Sized,
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = encode_body(request)
            .map_err(|err| RpcError::protocol(format!("failed to encode request: {err}")))?;
        let response = self.call_raw(method, &body)?;
        decode_body(&response)
            .map_err(|err| RpcError::protocol(format!("failed to decode response: {err}")))
    }
}

/// Server side of a call: the stub that resolves a method name to a handler.
pub trait Dispatch: Send + Sync {
    fn call_method(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, Fault>;
}

impl<F> Dispatch for F
where
    F: Fn(&str, &[u8]) -> Result<Vec<u8>, Fault> + Send + Sync,
{
    fn call_method(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, Fault> {
        self(method, request)
    }
}

pub(crate) fn decode_request<T: DeserializeOwned>(method: &str, body: &[u8]) -> Result<T, Fault> {
    decode_body(body).map_err(|err| {
        InvalidDataError::new(format!("malformed request for {method:?}: {err}")).into()
    })
}

pub(crate) fn encode_response<T: Serialize>(method: &str, value: &T) -> Result<Vec<u8>, Fault> {
    encode_body(value).map_err(|err| {
        InvalidDataError::new(format!("failed to encode response for {method:?}: {err}")).into()
    })
}

type Handler = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, Fault> + Send + Sync>;

/// Name to typed-handler table.
#[derive(Default)]
pub struct ServiceRouter {
    handlers: HashMap<String, Handler>,
}

impl fmt::Debug for ServiceRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRouter").field("methods", &self.methods()).finish()
    }
}

impl ServiceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `method` to `handler`, decoding its request and encoding its
    /// response. Reserved names are never routed.
    pub fn route<Req, Resp, F>(self, method: &str, handler: F) -> Self
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        F: Fn(Req) -> Result<Resp, Fault> + Send + Sync + 'static,
    {
        let name = method.to_string();
        self.route_raw(method, move |body| {
            let request: Req = decode_request(&name, body)?;
            let response = handler(request)?;
            encode_response(&name, &response)
        })
    }

    pub fn route_raw<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Vec<u8>, Fault> + Send + Sync + 'static,
    {
        if is_reserved(method) {
            log::warn!("service router: ignoring reserved method name {method:?}");
            return self;
        }
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl Dispatch for ServiceRouter {
    fn call_method(&self, method: &str, request: &[u8]) -> Result<Vec<u8>, Fault> {
        match self.handlers.get(method) {
            Some(handler) => handler(request),
            None => Err(MissingMethodError::for_method(method).into()),
        }
    }
}
