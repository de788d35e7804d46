//! Request lifecycle coordinator.
//!
//! One call to [`Dispatcher::handle`] takes a request from resolution to the
//! flushed response:
//!
//! ```text
//! resolve ─▶ enter scope ─▶ start hooks ─▶ dispatch ─┬─────────────────────┐
//!                                                    │ failure             │
//!                                                    ▼                     │
//!                                    rollback ─▶ reset ─▶ error handler    │
//!                                                    │                     │
//!                                                    ▼                     ▼
//!                              send (exactly once) ─▶ finish hooks ─▶ leave scope
//! ```
//!
//! `handle` is synchronous and runs on whichever worker thread called it; the
//! scope and any thread-bound transaction live on that thread for the whole
//! request. Nothing escapes it: failures, panics and hook errors all end up
//! either in the response or in the log.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::Settings;
use crate::controller::ControllerFactory;
use crate::error::{panic_message, Error, Halt};
use crate::exchange::Exchange;
use crate::hooks::{FinishHook, ProcessInfo, RequestStats, StartHook, StatsSnapshot, TraceHooks};
use crate::middleware::{self, FilterCache, Phase};
use crate::request::Request;
use crate::router::{HandlerRef, RouteTable};
use crate::scope;
use crate::sink::{ResponseSink, ResponseWriter};
use crate::transaction::TransactionManager;

/// Coordinates routing, interceptors, actions, recovery and hooks.
///
/// Shared by all worker threads behind an `Arc`; every field is read-only
/// after [`build`](DispatcherBuilder::build) except the filter plan cache.
pub struct Dispatcher {
    routes: RouteTable,
    controllers: Arc<dyn ControllerFactory>,
    filters: FilterCache,
    default_handler: Option<HandlerRef>,
    error_handler: Option<HandlerRef>,
    transactions: Option<Arc<dyn TransactionManager>>,
    rollback_disabled: bool,
    start_hooks: Vec<Arc<dyn StartHook>>,
    finish_hooks: Vec<Arc<dyn FinishHook>>,
    stats: Arc<RequestStats>,
}

/// Builder for [`Dispatcher`].
///
/// ```rust
/// use trellis::{ActionResult, Controller, ControllerRegistry, Dispatcher, Exchange, HandlerRef, Router};
///
/// #[derive(Default)]
/// struct Pages;
///
/// impl Controller for Pages {
///     fn call(&mut self, _action: &str, ex: &mut Exchange) -> ActionResult {
///         ex.render("home")
///     }
/// }
///
/// # fn main() -> Result<(), trellis::Error> {
/// let routes = Router::new().get("/", HandlerRef::new("pages", "home")).freeze()?;
/// let dispatcher = Dispatcher::builder(routes, ControllerRegistry::new().register("pages", Pages::default))
///     .default_handler(HandlerRef::new("pages", "missing"))
///     .build();
/// assert_eq!(dispatcher.stats().started, 0);
/// # Ok(())
/// # }
/// ```
pub struct DispatcherBuilder {
    routes: RouteTable,
    controllers: Arc<dyn ControllerFactory>,
    default_handler: Option<HandlerRef>,
    error_handler: Option<HandlerRef>,
    transactions: Option<Arc<dyn TransactionManager>>,
    rollback_disabled: bool,
    trace: bool,
    start_hooks: Vec<Arc<dyn StartHook>>,
    finish_hooks: Vec<Arc<dyn FinishHook>>,
}

impl DispatcherBuilder {
    /// Serves requests no route matches, bypassing all interceptors.
    pub fn default_handler(mut self, handler: HandlerRef) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// Handles failures; its controller's [`rescue`](crate::Controller::rescue)
    /// receives the error.
    pub fn error_handler(mut self, handler: HandlerRef) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn transactions(mut self, manager: impl TransactionManager + 'static) -> Self {
        self.transactions = Some(Arc::new(manager));
        self
    }

    pub fn disable_rollback(mut self, disabled: bool) -> Self {
        self.rollback_disabled = disabled;
        self
    }

    /// Registers the trace hooks ahead of any user hooks.
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Applies the `[trace]` and `[transaction]` knobs.
    pub fn settings(self, settings: &Settings) -> Self {
        self.trace(settings.trace.enable)
            .disable_rollback(settings.transaction.disable)
    }

    pub fn on_start(mut self, hook: impl StartHook) -> Self {
        self.start_hooks.push(Arc::new(hook));
        self
    }

    pub fn on_finish(mut self, hook: impl FinishHook) -> Self {
        self.finish_hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Dispatcher {
        let stats = Arc::new(RequestStats::new());
        let mut start_hooks: Vec<Arc<dyn StartHook>> = Vec::new();
        let mut finish_hooks: Vec<Arc<dyn FinishHook>> = Vec::new();
        start_hooks.push(stats.clone());
        finish_hooks.push(stats.clone());
        if self.trace {
            let trace = Arc::new(TraceHooks);
            start_hooks.push(trace.clone());
            finish_hooks.push(trace);
        }
        start_hooks.extend(self.start_hooks);
        finish_hooks.extend(self.finish_hooks);

        Dispatcher {
            routes: self.routes,
            controllers: self.controllers,
            filters: FilterCache::new(),
            default_handler: self.default_handler,
            error_handler: self.error_handler,
            transactions: self.transactions,
            rollback_disabled: self.rollback_disabled,
            start_hooks,
            finish_hooks,
            stats,
        }
    }
}

impl Dispatcher {
    pub fn builder(routes: RouteTable, controllers: impl ControllerFactory + 'static) -> DispatcherBuilder {
        DispatcherBuilder {
            routes,
            controllers: Arc::new(controllers),
            default_handler: None,
            error_handler: None,
            transactions: None,
            rollback_disabled: false,
            trace: false,
            start_hooks: Vec::new(),
            finish_hooks: Vec::new(),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn filter_cache(&self) -> &FilterCache {
        &self.filters
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Processes one request and flushes exactly one response to `writer`.
    ///
    /// Returns the metadata the finish hooks saw.
    pub fn handle(&self, mut request: Request, writer: impl ResponseWriter + 'static) -> ProcessInfo {
        let mut info = ProcessInfo::new();
        let route = self.routes.resolve(&mut request).map(|r| r.handler.clone());
        info.action = route.clone();
        request.set_handler(route.clone());

        let request = Arc::new(request);
        let _scope = scope::enter(Arc::clone(&request));
        let mut ex = Exchange::new(request, ResponseSink::new(writer));

        for hook in &self.start_hooks {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.on_start(ex.request(), ex.response(), &info)));
            log_hook_outcome("start", outcome);
        }

        let phase = Cell::new(Phase::Resolving);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(route.as_ref(), &mut ex, &phase)))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload))));

        if let Err(err) = outcome {
            info.failed_at = Some(phase.get());
            self.recover(err, &info, &mut ex);
        }

        if let Err(err) = ex.response_mut().send() {
            warn!(error = %err, path = ex.request().path(), "flushing response failed");
        }
        info.status = Some(ex.response().status());

        for hook in &self.finish_hooks {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.on_finish(ex.request(), ex.response(), &info)));
            log_hook_outcome("finish", outcome);
        }
        info
    }

    fn dispatch(&self, route: Option<&HandlerRef>, ex: &mut Exchange, phase: &Cell<Phase>) -> Result<(), Error> {
        if let Some(handler) = route {
            let mut controller = self.controllers.new_instance(handler.controller())?;
            let plan = self.filters.plan_for(handler, controller.as_ref());
            return middleware::execute(&plan, controller.as_mut(), handler.action(), ex, phase);
        }

        let Some(handler) = &self.default_handler else {
            return Err(Error::RouteNotFound { path: ex.request().path().to_owned() });
        };
        let mut controller = self.controllers.new_instance(handler.controller())?;
        phase.set(Phase::Action);
        match controller.call(handler.action(), ex) {
            Ok(()) | Err(Halt::Rendered) => {
                phase.set(Phase::Completed);
                Ok(())
            }
            Err(Halt::Failed(err)) => Err(err),
        }
    }

    fn recover(&self, err: Error, info: &ProcessInfo, ex: &mut Exchange) {
        match &err {
            Error::RouteNotFound { path } => debug!(path = %path, "no route"),
            other => error!(
                error = %other,
                action = info.action.as_ref().map(tracing::field::display),
                phase = info.failed_at.map(tracing::field::display),
                "request failed"
            ),
        }

        if let Some(action) = &info.action {
            self.rollback(action);
        }
        ex.response_mut().reset();

        let Some(handler) = &self.error_handler else {
            ex.response_mut().error(&err);
            return;
        };

        let rescued = catch_unwind(AssertUnwindSafe(|| self.rescue(handler, &err, ex)))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload))));
        if let Err(source) = rescued {
            let secondary = Error::Secondary { source: Box::new(source) };
            error!(error = %secondary, handler = %handler, "error handler failed");
            ex.response_mut().error(&secondary);
        }
    }

    fn rescue(&self, handler: &HandlerRef, err: &Error, ex: &mut Exchange) -> Result<(), Error> {
        let mut controller = self.controllers.new_instance(handler.controller())?;
        match controller.rescue(handler.action(), err, ex) {
            Ok(()) | Err(Halt::Rendered) => Ok(()),
            Err(Halt::Failed(err)) => Err(err),
        }
    }

    /// Forces a rollback when the failed action ran under a transaction.
    fn rollback(&self, action: &HandlerRef) {
        if self.rollback_disabled || !action.is_transactional() {
            return;
        }
        let Some(manager) = &self.transactions else {
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if !manager.is_active() {
                return Ok(false);
            }
            manager.rollback(true).map(|()| true)
        }));
        match outcome {
            Ok(Ok(true)) => debug!(action = %action, "transaction rolled back"),
            Ok(Ok(false)) => {}
            Ok(Err(source)) => {
                let err = Error::Rollback(source);
                warn!(error = %err, action = %action, "ignoring rollback failure");
            }
            Err(payload) => {
                warn!(panic = %panic_message(payload), action = %action, "ignoring rollback panic");
            }
        }
    }
}

fn log_hook_outcome(stage: &'static str, outcome: std::thread::Result<Result<(), Error>>) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(stage, error = %err, "hook failed"),
        Err(payload) => warn!(stage, panic = %panic_message(payload), "hook panicked"),
    }
}
