//! Transactional resource seam.
//!
//! The dispatcher does not own a database. When an action fails it asks the
//! configured [`TransactionManager`] to roll back, provided a transaction is
//! active on the current thread, the action is not exempt and rollback is not
//! disabled in configuration. A failing rollback is logged and swallowed.

use crate::error::BoxError;

/// The transactional resource an application plugs in.
///
/// Methods are called on the worker thread that processed the request, so
/// implementations backed by thread-bound connections can inspect their own
/// thread-local state.
pub trait TransactionManager: Send + Sync {
    /// Whether a transaction is open for the current request.
    fn is_active(&self) -> bool;

    /// Reverts pending changes. `force` discards the transaction even if the
    /// resource would normally refuse.
    fn rollback(&self, force: bool) -> Result<(), BoxError>;
}
