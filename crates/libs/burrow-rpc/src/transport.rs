use std::sync::Arc;

use crate::error::TransportError;
use crate::identity::{ClientIdentity, InprocIdentity};
use crate::server::RpcServer;

/// Request bytes in, response bytes out.
pub trait ClientTransport: Send + Sync {
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<F> ClientTransport for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self(request)
    }
}

/// Binds a client straight to a server in the same process.
#[derive(Clone)]
pub struct InprocTransport {
    server: Arc<RpcServer>,
    identity: Arc<dyn ClientIdentity>,
}

impl InprocTransport {
    /// Calls arrive as an anonymous local caller.
    pub fn new(server: Arc<RpcServer>) -> Self {
        Self::with_identity(server, Arc::new(InprocIdentity::anonymous()))
    }

    pub fn with_identity(server: Arc<RpcServer>, identity: Arc<dyn ClientIdentity>) -> Self {
        Self { server, identity }
    }

    pub fn server(&self) -> &Arc<RpcServer> {
        &self.server
    }
}

impl ClientTransport for InprocTransport {
    fn execute(&self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        Ok(self.server.handle(Arc::clone(&self.identity), request))
    }
}
