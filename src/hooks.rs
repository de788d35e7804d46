//! Start/finish hooks and the per-request metadata they observe.
//!
//! Hooks are observers. They run in registration order, start hooks before
//! dispatch and finish hooks after the response status is final. A hook that
//! fails (or panics) is logged and skipped; it never aborts the request or the
//! hooks after it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use http::StatusCode;
use tracing::{debug, info};

use crate::error::Error;
use crate::middleware::Phase;
use crate::request::Request;
use crate::router::HandlerRef;
use crate::sink::ResponseSink;

/// What the dispatcher knows about one request.
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    /// The resolved route's handler. Set before start hooks run; `None` when
    /// no route matched, even if the default handler ends up serving it.
    pub action: Option<HandlerRef>,
    /// Final response status. Set before finish hooks run.
    pub status: Option<StatusCode>,
    /// The phase a genuine failure escaped from, if any.
    pub failed_at: Option<Phase>,
    started: Instant,
}

impl ProcessInfo {
    pub(crate) fn new() -> Self {
        Self {
            action: None,
            status: None,
            failed_at: None,
            started: Instant::now(),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Observes a request before dispatch.
pub trait StartHook: Send + Sync + 'static {
    fn on_start(&self, request: &Request, response: &ResponseSink, info: &ProcessInfo) -> Result<(), Error>;
}

/// Observes a request after its status is final.
pub trait FinishHook: Send + Sync + 'static {
    fn on_finish(&self, request: &Request, response: &ResponseSink, info: &ProcessInfo) -> Result<(), Error>;
}

pub struct FnHook<F>(F);

impl<F> StartHook for FnHook<F>
where
    F: Fn(&Request, &ResponseSink, &ProcessInfo) -> Result<(), Error> + Send + Sync + 'static,
{
    fn on_start(&self, request: &Request, response: &ResponseSink, info: &ProcessInfo) -> Result<(), Error> {
        (self.0)(request, response, info)
    }
}

impl<F> FinishHook for FnHook<F>
where
    F: Fn(&Request, &ResponseSink, &ProcessInfo) -> Result<(), Error> + Send + Sync + 'static,
{
    fn on_finish(&self, request: &Request, response: &ResponseSink, info: &ProcessInfo) -> Result<(), Error> {
        (self.0)(request, response, info)
    }
}

/// Wraps a closure as a start or finish hook.
///
/// ```rust
/// use trellis::hooks::hook_fn;
///
/// let log_status = hook_fn(|req, _res, info| {
///     println!("{} {} -> {:?}", req.method(), req.path(), info.status);
///     Ok(())
/// });
/// # let _ = log_status;
/// ```
pub fn hook_fn<F>(f: F) -> FnHook<F>
where
    F: Fn(&Request, &ResponseSink, &ProcessInfo) -> Result<(), Error> + Send + Sync + 'static,
{
    FnHook(f)
}

// ── Request statistics ────────────────────────────────────────────────────────

/// Request counters, registered on every dispatcher as both a start and a
/// finish hook.
#[derive(Debug, Default)]
pub struct RequestStats {
    started: AtomicU64,
    finished: AtomicU64,
    by_class: [AtomicU64; 5],
}

/// A point-in-time copy of [`RequestStats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    pub started: u64,
    pub finished: u64,
    pub in_flight: u64,
    /// Finished requests per status class: index 0 is 1xx, 4 is 5xx.
    pub by_class: [u64; 5],
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let finished = self.finished.load(Ordering::Relaxed);
        let started = self.started.load(Ordering::Relaxed);
        StatsSnapshot {
            started,
            finished,
            in_flight: started.saturating_sub(finished),
            by_class: std::array::from_fn(|i| self.by_class[i].load(Ordering::Relaxed)),
        }
    }
}

impl StartHook for RequestStats {
    fn on_start(&self, _: &Request, _: &ResponseSink, _: &ProcessInfo) -> Result<(), Error> {
        self.started.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl FinishHook for RequestStats {
    fn on_finish(&self, _: &Request, _: &ResponseSink, info: &ProcessInfo) -> Result<(), Error> {
        self.finished.fetch_add(1, Ordering::Relaxed);
        if let Some(status) = info.status {
            let class = usize::from(status.as_u16() / 100).saturating_sub(1);
            if let Some(counter) = self.by_class.get(class) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

// ── Trace hooks ───────────────────────────────────────────────────────────────

/// Per-request trace logging, enabled by the `trace.enable` setting.
#[derive(Debug, Default)]
pub struct TraceHooks;

impl StartHook for TraceHooks {
    fn on_start(&self, request: &Request, _: &ResponseSink, info: &ProcessInfo) -> Result<(), Error> {
        debug!(
            method = %request.method(),
            path = request.path(),
            action = info.action.as_ref().map(tracing::field::display),
            "request started"
        );
        Ok(())
    }
}

impl FinishHook for TraceHooks {
    fn on_finish(&self, request: &Request, _: &ResponseSink, info: &ProcessInfo) -> Result<(), Error> {
        info!(
            method = %request.method(),
            path = request.path(),
            action = info.action.as_ref().map(tracing::field::display),
            status = info.status.map(|s| s.as_u16()),
            failed_at = info.failed_at.map(tracing::field::display),
            elapsed_ms = info.elapsed().as_secs_f64() * 1000.0,
            "request finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::method::Method;
    use crate::response::Response;

    fn sink() -> ResponseSink {
        ResponseSink::new(|_resp: Response| -> std::io::Result<()> { Ok(()) })
    }

    #[test]
    fn stats_count_by_status_class() {
        let stats = RequestStats::new();
        let req = Request::new(Method::Get, "/");
        let mut info = ProcessInfo::new();

        stats.on_start(&req, &sink(), &info).unwrap();
        stats.on_start(&req, &sink(), &info).unwrap();
        assert_eq!(stats.snapshot().in_flight, 2);

        info.status = Some(StatusCode::OK);
        stats.on_finish(&req, &sink(), &info).unwrap();
        info.status = Some(StatusCode::NOT_FOUND);
        stats.on_finish(&req, &sink(), &info).unwrap();

        let snap = stats.snapshot();
        assert_eq!((snap.started, snap.finished, snap.in_flight), (2, 2, 0));
        assert_eq!(snap.by_class, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn closure_hooks_see_metadata() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let hook = hook_fn(move |_req, _res, info| {
            *slot.lock().unwrap() = info.action.clone();
            Ok(())
        });

        let mut info = ProcessInfo::new();
        info.action = Some(HandlerRef::new("users", "show"));
        FinishHook::on_finish(&hook, &Request::new(Method::Get, "/"), &sink(), &info).unwrap();
        assert_eq!(seen.lock().unwrap().as_ref().map(HandlerRef::action), Some("show"));
    }
}
