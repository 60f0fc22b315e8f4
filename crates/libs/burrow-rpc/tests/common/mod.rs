#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use burrow_rpc::wire::codec::{decode_body, read_delimited};
use burrow_rpc::wire::{MultiPartRequest, RequestHeader, METHOD_MULTI};
use burrow_rpc::{
    ambient, ArgumentError, ClientTransport, Fault, InprocIdentity, InprocTransport, RpcClient,
    RpcServer, ServiceRouter, TransportError,
};
use serde::{Deserialize, Serialize};

pub const RESULT_URL: &str = "http://whatever.com";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ResultItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub name: String,
    pub url: String,
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn search(request: SearchRequest) -> Result<SearchResponse, Fault> {
    if request.criteria.is_empty() {
        return Err(ArgumentError::new("at least one criterion is required")
            .with_param_name("criteria")
            .into());
    }
    let results = request
        .criteria
        .into_iter()
        .map(|name| ResultItem { name, url: RESULT_URL.to_string() })
        .collect();
    Ok(SearchResponse { results })
}

/// Search plus a handful of methods exercising the ambient context.
pub fn search_router() -> ServiceRouter {
    ServiceRouter::new()
        .route("Search", search)
        .route("WhoAmI", |_: ()| -> Result<Option<String>, Fault> {
            Ok(ambient::client()?.user().map(str::to_owned))
        })
        .route("Remember", |value: String| -> Result<(), Fault> {
            ambient::session()?.insert("remembered", value)?;
            Ok(())
        })
        .route("Recall", |_: ()| -> Result<Option<String>, Fault> {
            let session = ambient::existing_session()?;
            Ok(session.and_then(|session| session.try_get::<String>("remembered")))
        })
        .route_raw("Digest", |body: &[u8]| -> Result<Vec<u8>, Fault> {
            let sum = body
                .iter()
                .fold(0u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(*byte)));
            burrow_rpc::wire::codec::encode_body(&(body.len() as u64, sum))
                .map_err(|err| burrow_rpc::InvalidDataError::new(err.to_string()).into())
        })
}

pub fn search_server() -> Arc<RpcServer> {
    Arc::new(RpcServer::new(search_router()))
}

pub fn client_for(server: &Arc<RpcServer>, user: &str) -> RpcClient<InprocTransport> {
    RpcClient::new(InprocTransport::with_identity(
        Arc::clone(server),
        Arc::new(InprocIdentity::new(user)),
    ))
}

/// Forwards to a server in-process and records every `.multi` chunk on the
/// way in; optionally fails the n-th chunk before it reaches the server.
pub struct ObservingTransport {
    inner: InprocTransport,
    pub chunks: Mutex<Vec<MultiPartRequest>>,
    pub methods: Mutex<Vec<String>>,
    fail_on_chunk: Option<usize>,
}

impl ObservingTransport {
    pub fn new(server: &Arc<RpcServer>) -> Self {
        Self {
            inner: InprocTransport::new(Arc::clone(server)),
            chunks: Mutex::new(Vec::new()),
            methods: Mutex::new(Vec::new()),
            fail_on_chunk: None,
        }
    }

    pub fn failing_on_chunk(server: &Arc<RpcServer>, chunk: usize) -> Self {
        Self { fail_on_chunk: Some(chunk), ..Self::new(server) }
    }

    pub fn multi_calls(&self) -> usize {
        self.chunks.lock().expect("chunks mutex poisoned").len()
    }
}

impl ClientTransport for ObservingTransport {
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let (header, body): (RequestHeader, _) =
            read_delimited(request).expect("client sends a well-formed header");
        self.methods.lock().expect("methods mutex poisoned").push(header.method.clone());
        if header.method == METHOD_MULTI {
            let chunk: MultiPartRequest = decode_body(body).expect("well-formed chunk");
            let mut chunks = self.chunks.lock().expect("chunks mutex poisoned");
            chunks.push(chunk);
            if Some(chunks.len()) == self.fail_on_chunk {
                return Err(TransportError::new(std::io::ErrorKind::ConnectionAborted, "aborted"));
            }
        }
        self.inner.execute(request)
    }
}
