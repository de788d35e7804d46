//! HTTP transport and graceful shutdown.
//!
//! Connections are accepted and parsed on tokio's async workers. Each request
//! is then handed to the blocking pool, where [`Dispatcher::handle`] runs it
//! start to finish on one thread. The response comes back over a oneshot
//! channel as soon as it is flushed; finish hooks keep running on the worker
//! without holding up the connection.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::{Settings, ThreadSettings};
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::sink::OneshotWriter;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    threads: ThreadSettings,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    ///
    /// ```rust
    /// use trellis::Server;
    ///
    /// assert!(Server::bind("127.0.0.1:3000").is_ok());
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let mut settings = Settings::default();
        settings.http.bind_address = addr.to_owned();
        Self::from_settings(&settings)
    }

    /// Takes the listen address and worker pool bounds from `[http]`.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        Ok(Self {
            addr: settings.bind_address()?,
            threads: settings.http.threads.clone(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Builds a runtime sized by the configured pool bounds and serves until
    /// shutdown.
    ///
    /// `threads.min` async workers handle connection I/O; at most
    /// `threads.max` blocking workers run requests concurrently. Requests
    /// beyond that queue until a worker frees up.
    pub fn run(self, dispatcher: Arc<Dispatcher>) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.threads.min.max(1))
            .max_blocking_threads(self.threads.max.max(1))
            .thread_name("trellis-worker")
            .enable_all()
            .build()?;
        runtime.block_on(self.serve(dispatcher))
    }

    /// Serves on the current runtime until SIGTERM or Ctrl-C.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), Error> {
        self.serve_with_shutdown(dispatcher, shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve_with_shutdown(
        self,
        dispatcher: Arc<Dispatcher>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_on(listener, dispatcher, shutdown).await
    }
}

/// Accepts connections from an already-bound `listener` until `shutdown`
/// resolves, then drains in-flight connections.
pub async fn serve_on(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let addr = listener.local_addr()?;
    info!(%addr, routes = dispatcher.routes().len(), "trellis listening");

    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Shutdown wins over queued connections.
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let dispatcher = Arc::clone(&dispatcher);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    let svc = service_fn(move |req| dispatch(Arc::clone(&dispatcher), req));
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("trellis stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Converts one hyper request, runs it on the blocking pool and waits for
/// the flushed response. Every failure becomes a status code; hyper never
/// sees an error.
async fn dispatch(
    dispatcher: Arc<Dispatcher>,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_http());
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("reading request body failed: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_http());
        }
    };
    let request = Request::from_parts(method, parts, body);

    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        dispatcher.handle(request, OneshotWriter(tx));
    });

    let response = match rx.await {
        Ok(response) => response,
        Err(_) => {
            error!("worker finished without flushing a response");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. A signal that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
