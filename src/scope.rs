//! Execution-scoped request context.
//!
//! Worker threads are pooled and reused. Code deep inside an action (a
//! repository, a logger) can reach the current request through
//! [`current`] without it being threaded down explicitly. The dispatcher
//! installs the request with [`enter`] and the returned guard clears the slot
//! on drop, including during unwinding, so the next request on the same
//! thread never observes a stale context.

use std::cell::RefCell;
use std::sync::Arc;

use crate::request::Request;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Request>>> = const { RefCell::new(None) };
}

/// The request being processed on this thread, if any.
pub fn current() -> Option<Arc<Request>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Clears the scope when dropped.
#[must_use = "the scope is cleared as soon as the guard is dropped"]
pub struct ScopeGuard {
    // Tied to the installing thread.
    _not_send: std::marker::PhantomData<*const ()>,
}

/// Installs `request` as this thread's current request.
pub fn enter(request: Arc<Request>) -> ScopeGuard {
    CURRENT.with(|slot| *slot.borrow_mut() = Some(request));
    ScopeGuard { _not_send: std::marker::PhantomData }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| slot.borrow_mut().take());
    }
}
