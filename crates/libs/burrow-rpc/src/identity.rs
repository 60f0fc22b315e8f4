use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::RpcError;

/// The caller of a server-side call, as reported by the transport.
///
/// Never read off the wire; only the transport that accepted the call can
/// vouch for who made it.
pub trait ClientIdentity: Send + Sync {
    fn is_local(&self) -> bool;

    fn is_authenticated(&self) -> bool;

    /// Raw transport address of the caller; empty when there is none.
    fn address(&self) -> &[u8];

    fn process_id(&self) -> Option<u32>;

    fn is_impersonating(&self) -> bool {
        false
    }

    /// Acts as the caller until the returned guard is dropped.
    fn impersonate(&self) -> Result<Impersonation, RpcError>;

    fn user(&self) -> Option<&str>;
}

impl fmt::Debug for dyn ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("user", &self.user())
            .field("local", &self.is_local())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Reverts an impersonation when dropped.
#[must_use = "impersonation ends when the guard is dropped"]
pub struct Impersonation {
    revert: Option<Box<dyn FnOnce() + Send>>,
}

impl Impersonation {
    pub fn new(revert: impl FnOnce() + Send + 'static) -> Self {
        Self { revert: Some(Box::new(revert)) }
    }

    pub fn noop() -> Self {
        Self { revert: None }
    }

    pub fn revert(mut self) {
        if let Some(revert) = self.revert.take() {
            revert();
        }
    }
}

impl Drop for Impersonation {
    fn drop(&mut self) {
        if let Some(revert) = self.revert.take() {
            revert();
        }
    }
}

/// Identity of an in-process caller.
#[derive(Debug, Clone)]
pub struct InprocIdentity {
    user: Option<String>,
    process_id: u32,
    authenticated: bool,
    impersonating: Arc<AtomicBool>,
}

impl InprocIdentity {
    /// The current process acting as `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            process_id: std::process::id(),
            authenticated: true,
            impersonating: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user: None,
            process_id: std::process::id(),
            authenticated: false,
            impersonating: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ClientIdentity for InprocIdentity {
    fn is_local(&self) -> bool {
        true
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn address(&self) -> &[u8] {
        &[]
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.process_id)
    }

    fn is_impersonating(&self) -> bool {
        self.impersonating.load(Ordering::SeqCst)
    }

    fn impersonate(&self) -> Result<Impersonation, RpcError> {
        if !self.authenticated {
            return Err(RpcError::invalid_operation("cannot impersonate an anonymous caller"));
        }
        if self.impersonating.swap(true, Ordering::SeqCst) {
            return Err(RpcError::invalid_operation("caller is already being impersonated"));
        }
        let flag = Arc::clone(&self.impersonating);
        Ok(Impersonation::new(move || flag.store(false, Ordering::SeqCst)))
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientIdentity, InprocIdentity};

    #[test]
    fn impersonation_reverts_on_drop() {
        let identity = InprocIdentity::new("alice");
        assert_eq!(identity.user(), Some("alice"));
        assert_eq!(identity.process_id(), Some(std::process::id()));
        {
            let _guard = identity.impersonate().expect("impersonate");
            assert!(identity.is_impersonating());
            assert!(identity.impersonate().is_err());
        }
        assert!(!identity.is_impersonating());

        let guard = identity.impersonate().expect("again");
        guard.revert();
        assert!(!identity.is_impersonating());
    }

    #[test]
    fn anonymous_callers_cannot_be_impersonated() {
        let identity = InprocIdentity::anonymous();
        assert!(!identity.is_authenticated());
        assert!(identity.is_local());
        assert!(identity.address().is_empty());
        assert!(identity.impersonate().is_err());
    }
}
