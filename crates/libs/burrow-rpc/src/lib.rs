//! Transport-independent RPC runtime.
//!
//! A [`RpcClient`] turns typed calls into request bytes for a
//! [`ClientTransport`]; an [`RpcServer`] turns request bytes back into calls
//! on a [`Dispatch`] stub and answers with response bytes. Between the two
//! travel the call context, session affinity, chunked transfers and captured
//! errors.
//!
//! ```no_run
//! use std::sync::Arc;
//! use burrow_rpc::{CallDispatch, Fault, InprocTransport, RpcClient, RpcServer, ServiceRouter};
//!
//! let router = ServiceRouter::new().route("Add", |(a, b): (u64, u64)| Ok::<_, Fault>(a + b));
//! let server = Arc::new(RpcServer::new(router));
//! let client = RpcClient::new(InprocTransport::new(server));
//! let sum: u64 = client.call("Add", &(2u64, 3u64)).expect("call");
//! assert_eq!(sum, 5);
//! ```

pub mod ambient;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exception;
pub mod identity;
pub mod multipart;
pub mod server;
pub mod session;
pub mod transport;

pub use ambient::{AmbientScope, CallFrame};
pub use client::RpcClient;
pub use config::{ClientConfig, RpcConfig, ServerConfig, SessionConfig};
pub use dispatch::{CallDispatch, Dispatch, ServiceRouter};
pub use error::{RpcError, SessionError, TransportError};
pub use exception::{
    capture, reconstruct, ApplicationError, ArgumentError, ArgumentNullError, AssemblyName,
    AssemblyState, Exception, ExceptionDetails, ExceptionParts, ExceptionRegistry, Fault,
    FieldValue, InvalidDataError, InvalidOperationError, KeyNotFoundError, MissingMethodError,
    NotSupportedError, RemoteError, ReplayError, ReplayException, UnauthorizedAccessError,
};
pub use identity::{ClientIdentity, Impersonation, InprocIdentity};
pub use multipart::{MultiPartClient, MultiPartServer};
pub use server::RpcServer;
pub use session::{Session, SessionStore};
pub use transport::{ClientTransport, InprocTransport};

pub use burrow_wire as wire;
pub use burrow_wire::{CallContext, DetailLevel, Guid, PingRequest, PingResponse, TypeResolution};
