//! Interceptors: code that runs before or around an action.
//!
//! Two capabilities:
//!
//! - [`Before`] runs in order ahead of the action. A failure (or a
//!   render-finished signal) skips the remaining before-interceptors and
//!   the action.
//! - [`Around`] wraps the action. Each receives a [`Next`] that runs the rest
//!   of the chain, ending in the action itself. Not calling `next.run(ex)`
//!   short-circuits everything inside, which is how an auth interceptor
//!   rejects a request:
//!
//! ```rust
//! use http::StatusCode;
//! use trellis::middleware::{around_fn, Filters};
//! use trellis::Error;
//!
//! let filters = Filters::new().around(around_fn(|ex, next| {
//!     if ex.request().header("authorization").is_none() {
//!         return Err(Error::http(StatusCode::UNAUTHORIZED, "login required").into());
//!     }
//!     next.run(ex)
//! }));
//! assert_eq!(filters.plan_for("any").around_len(), 1);
//! ```
//!
//! Controllers declare their interceptors with [`Filters`]. The resulting
//! per-action [`FilterPlan`] is computed once per (controller, action) and
//! cached for the life of the process.

mod chain;
mod plan;

pub use chain::Phase;
pub(crate) use chain::execute;
pub use plan::{FilterCache, FilterPlan, Filters};

use std::sync::Arc;

use crate::error::ActionResult;
use crate::exchange::Exchange;

/// Runs ahead of the action.
pub trait Before: Send + Sync + 'static {
    fn before(&self, ex: &mut Exchange) -> ActionResult;
}

/// Wraps the action (and any interceptors nested inside this one).
pub trait Around: Send + Sync + 'static {
    fn around(&self, ex: &mut Exchange, next: Next<'_>) -> ActionResult;
}

/// The rest of an around-chain.
///
/// Consumed by [`run`](Next::run), so the nested chain can run at most once
/// per interceptor.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Around>],
    action: &'a mut (dyn FnMut(&mut Exchange) -> ActionResult + 'a),
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Around>],
        action: &'a mut (dyn FnMut(&mut Exchange) -> ActionResult + 'a),
    ) -> Self {
        Self { chain, action }
    }

    /// Runs the next interceptor, or the action when none are left.
    pub fn run(self, ex: &mut Exchange) -> ActionResult {
        match self.chain.split_first() {
            Some((head, rest)) => head.around(ex, Next { chain: rest, action: self.action }),
            None => (self.action)(ex),
        }
    }
}

// ── Closure adapters ──────────────────────────────────────────────────────────

/// Newtype that lets a plain function act as a [`Before`] interceptor.
pub struct FnBefore<F>(F);

impl<F> Before for FnBefore<F>
where
    F: Fn(&mut Exchange) -> ActionResult + Send + Sync + 'static,
{
    fn before(&self, ex: &mut Exchange) -> ActionResult {
        (self.0)(ex)
    }
}

/// Newtype that lets a plain function act as an [`Around`] interceptor.
pub struct FnAround<F>(F);

impl<F> Around for FnAround<F>
where
    F: Fn(&mut Exchange, Next<'_>) -> ActionResult + Send + Sync + 'static,
{
    fn around(&self, ex: &mut Exchange, next: Next<'_>) -> ActionResult {
        (self.0)(ex, next)
    }
}

/// Wraps a closure as a [`Before`] interceptor.
pub fn before_fn<F>(f: F) -> FnBefore<F>
where
    F: Fn(&mut Exchange) -> ActionResult + Send + Sync + 'static,
{
    FnBefore(f)
}

/// Wraps a closure as an [`Around`] interceptor.
pub fn around_fn<F>(f: F) -> FnAround<F>
where
    F: Fn(&mut Exchange, Next<'_>) -> ActionResult + Send + Sync + 'static,
{
    FnAround(f)
}
