//! The call context visible to code running inside a server-side call.
//!
//! Each thread keeps a stack of frames. The server pushes a frame for the
//! duration of a call and pops it afterwards, so a handler that acts as a
//! client of another server on the same thread sees its own context again
//! once the nested call returns.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use burrow_wire::{CallContext, Guid};

use crate::error::{RpcError, SessionError};
use crate::identity::ClientIdentity;
use crate::session::{Session, SessionStore};

/// Everything installed for one call.
pub struct CallFrame {
    pub context: CallContext,
    pub identity: Arc<dyn ClientIdentity>,
    pub sessions: Arc<SessionStore>,
}

thread_local! {
    static FRAMES: RefCell<Vec<CallFrame>> = const { RefCell::new(Vec::new()) };
}

/// Keeps a frame installed until finished or dropped.
#[must_use = "the frame is removed when the scope is dropped"]
pub struct AmbientScope {
    depth: usize,
    active: bool,
    // Frames live on the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl AmbientScope {
    pub fn enter(frame: CallFrame) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(frame);
            frames.len()
        });
        Self { depth, active: true, _not_send: PhantomData }
    }

    /// Removes the frame and returns the context as the call left it.
    pub fn finish(mut self) -> CallContext {
        self.active = false;
        self.pop().map(|frame| frame.context).unwrap_or_default()
    }

    fn pop(&self) -> Option<CallFrame> {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            // Frames above ours belong to scopes leaked by a nested call.
            if frames.len() > self.depth {
                frames.truncate(self.depth);
            }
            if frames.len() == self.depth {
                frames.pop()
            } else {
                None
            }
        })
    }
}

impl Drop for AmbientScope {
    fn drop(&mut self) {
        if self.active {
            self.active = false;
            let _ = self.pop();
        }
    }
}

fn with_frame<R>(f: impl FnOnce(&mut CallFrame) -> R) -> Result<R, RpcError> {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(frame) => Ok(f(frame)),
            None => Err(RpcError::invalid_operation("no call context outside of a call")),
        }
    })
}

pub fn is_in_call() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Snapshot of the current call's context.
pub fn current() -> Result<CallContext, RpcError> {
    with_frame(|frame| frame.context.clone())
}

/// Replaces the current call's context. The caller identity is unaffected.
pub fn set_current(context: CallContext) -> Result<(), RpcError> {
    with_frame(|frame| frame.context = context)
}

/// Edits the current context. `f` runs on a copy, so it may itself use the
/// functions of this module.
pub fn update<R>(f: impl FnOnce(&mut CallContext) -> R) -> Result<R, RpcError> {
    let mut context = current()?;
    let result = f(&mut context);
    set_current(context)?;
    Ok(result)
}

/// The caller of the current call, as reported by the transport.
pub fn client() -> Result<Arc<dyn ClientIdentity>, RpcError> {
    with_frame(|frame| Arc::clone(&frame.identity))
}

/// The current caller's session, assigning a new session id on first use.
pub fn session() -> Result<Arc<Session>, RpcError> {
    let (id, store) = with_frame(|frame| {
        if !frame.sessions.is_enabled() {
            return Err(SessionError::Disabled);
        }
        let id = *frame.context.session_id.get_or_insert_with(Guid::new_random);
        Ok((id, Arc::clone(&frame.sessions)))
    })??;
    Ok(store.get_or_create(id)?)
}

/// The current caller's session if one is already assigned and alive.
pub fn existing_session() -> Result<Option<Arc<Session>>, RpcError> {
    let (id, store) =
        with_frame(|frame| (frame.context.session_id, Arc::clone(&frame.sessions)))?;
    Ok(id.and_then(|id| store.get(id)))
}

#[cfg(test)]
mod tests {
    use super::{
        client, current, existing_session, is_in_call, session, set_current, update, AmbientScope,
        CallFrame,
    };
    use crate::error::{RpcError, SessionError};
    use crate::identity::InprocIdentity;
    use crate::session::SessionStore;
    use burrow_wire::CallContext;
    use std::sync::Arc;

    fn frame(context: CallContext, sessions: Arc<SessionStore>) -> CallFrame {
        CallFrame { context, identity: Arc::new(InprocIdentity::new("alice")), sessions }
    }

    #[test]
    fn outside_a_call_nothing_is_available() {
        assert!(!is_in_call());
        assert!(matches!(current(), Err(RpcError::InvalidOperation { .. })));
        assert!(client().is_err());
    }

    #[test]
    fn nested_scopes_restore_the_enclosing_context() {
        let store = Arc::new(SessionStore::default());
        let outer = AmbientScope::enter(frame(
            CallContext::new().with_extension("level", "outer"),
            store.clone(),
        ));
        {
            let inner = AmbientScope::enter(frame(
                CallContext::new().with_extension("level", "inner"),
                store.clone(),
            ));
            update(|ctx| {
                ctx.extensions.set("touched", true);
            })
            .expect("update");
            let finished = inner.finish();
            assert_eq!(finished.extensions.get_str("level"), Some("inner"));
            assert!(finished.extensions.contains_key("touched"));
        }
        let ctx = current().expect("outer context");
        assert_eq!(ctx.extensions.get_str("level"), Some("outer"));
        assert!(!ctx.extensions.contains_key("touched"));
        assert_eq!(client().expect("client").user(), Some("alice"));
        drop(outer);
        assert!(!is_in_call());
    }

    #[test]
    fn session_assigns_an_id_lazily() {
        let store = Arc::new(SessionStore::default());
        let scope = AmbientScope::enter(frame(CallContext::new(), store.clone()));
        let first = session().expect("session");
        let again = session().expect("same session");
        assert_eq!(first.id(), again.id());
        set_current(CallContext::new()).expect("reset");
        let finished = scope.finish();
        assert!(finished.session_id.is_none());
        assert!(store.contains(first.id()));
    }

    #[test]
    fn existing_session_never_creates_one() {
        let store = Arc::new(SessionStore::default());
        let scope = AmbientScope::enter(frame(CallContext::new(), store.clone()));
        assert!(existing_session().expect("in call").is_none());
        assert!(current().expect("in call").session_id.is_none());
        assert!(store.is_empty());

        let created = session().expect("session");
        let found = existing_session().expect("in call").expect("assigned");
        assert_eq!(found.id(), created.id());

        store.kill(created.id());
        assert!(existing_session().expect("in call").is_none());
        drop(scope);
        assert!(store.is_empty());
        assert!(matches!(existing_session(), Err(RpcError::InvalidOperation { .. })));
    }

    #[test]
    fn disabled_sessions_leave_the_context_alone() {
        let store = Arc::new(SessionStore::disabled());
        let scope = AmbientScope::enter(frame(CallContext::new(), store));
        assert!(matches!(session(), Err(RpcError::Session(SessionError::Disabled))));
        assert!(scope.finish().session_id.is_none());
    }

    #[test]
    fn panics_inside_a_scope_unwind_the_frame() {
        let store = Arc::new(SessionStore::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = AmbientScope::enter(frame(CallContext::new(), store.clone()));
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert!(!is_in_call());
    }
}
