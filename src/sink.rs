//! Response sink: staged output plus the exactly-once flush to the transport.

use std::io;

use http::StatusCode;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Error;
use crate::response::Response;

/// The transport end of a request: receives the final response once.
///
/// `write` consumes the writer, so a writer can never be asked to write
/// twice.
pub trait ResponseWriter: Send {
    fn write(self: Box<Self>, response: Response) -> io::Result<()>;
}

impl<F> ResponseWriter for F
where
    F: FnOnce(Response) -> io::Result<()> + Send,
{
    fn write(self: Box<Self>, response: Response) -> io::Result<()> {
        (*self)(response)
    }
}

/// Hands the response back to the async connection task that is waiting on
/// the receiving half.
pub(crate) struct OneshotWriter(pub(crate) oneshot::Sender<Response>);

impl ResponseWriter for OneshotWriter {
    fn write(self: Box<Self>, response: Response) -> io::Result<()> {
        self.0
            .send(response)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection task went away"))
    }
}

/// Buffers status, headers and body until the dispatcher flushes them.
///
/// Only the first [`send`](ResponseSink::send) reaches the writer. After
/// that the sink is closed and staging calls are ignored.
pub struct ResponseSink {
    staged: Response,
    writer: Option<Box<dyn ResponseWriter>>,
    sent: Option<StatusCode>,
}

impl ResponseSink {
    pub fn new(writer: impl ResponseWriter + 'static) -> Self {
        Self {
            staged: Response::default(),
            writer: Some(Box::new(writer)),
            sent: None,
        }
    }

    /// Replaces whatever was staged before.
    pub fn stage(&mut self, response: Response) {
        if self.is_sent() {
            debug!("ignoring response staged after send");
            return;
        }
        self.staged = response;
    }

    pub fn staged(&self) -> &Response {
        &self.staged
    }

    /// Status of the flushed response, or of the staged one before the flush.
    pub fn status(&self) -> StatusCode {
        self.sent.unwrap_or(self.staged.status)
    }

    pub fn is_sent(&self) -> bool {
        self.sent.is_some()
    }

    /// Discards staged output, back to an empty `200 OK`.
    pub fn reset(&mut self) {
        self.stage(Response::default());
    }

    /// Stages the generic failure rendering of `err`.
    pub fn error(&mut self, err: &Error) {
        self.stage(Response::failure(err));
    }

    /// Flushes the staged response to the transport.
    ///
    /// A second call returns [`Error::AlreadySent`] and writes nothing.
    pub fn send(&mut self) -> Result<(), Error> {
        let writer = self.writer.take().ok_or(Error::AlreadySent)?;
        self.sent = Some(self.staged.status);
        writer.write(std::mem::take(&mut self.staged))?;
        Ok(())
    }
}

impl std::fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSink")
            .field("staged", &self.staged)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording() -> (ResponseSink, Arc<Mutex<Vec<Response>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&written);
        let sink = ResponseSink::new(move |resp: Response| -> io::Result<()> {
            log.lock().unwrap().push(resp);
            Ok(())
        });
        (sink, written)
    }

    #[test]
    fn sends_exactly_once() {
        let (mut sink, written) = recording();
        sink.stage(Response::text("first"));
        sink.send().unwrap();
        assert!(matches!(sink.send(), Err(Error::AlreadySent)));

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].body(), b"first");
    }

    #[test]
    fn staging_after_send_is_ignored() {
        let (mut sink, _) = recording();
        sink.stage(Response::status(StatusCode::ACCEPTED));
        sink.send().unwrap();
        sink.error(&Error::action("late"));
        assert_eq!(sink.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn error_replaces_staged_output() {
        let (mut sink, written) = recording();
        sink.stage(Response::text("partial"));
        sink.error(&Error::RouteNotFound { path: "/gone".into() });
        assert_eq!(sink.status(), StatusCode::NOT_FOUND);
        sink.send().unwrap();
        assert_eq!(written.lock().unwrap()[0].body(), b"no route for [/gone]");
    }

    #[test]
    fn broken_transport_still_counts_as_sent() {
        let mut sink = ResponseSink::new(|_resp: Response| -> io::Result<()> {
            Err(io::Error::other("peer reset"))
        });
        assert!(matches!(sink.send(), Err(Error::Io(_))));
        assert!(sink.is_sent());
        assert!(matches!(sink.send(), Err(Error::AlreadySent)));
    }

    #[test]
    fn oneshot_writer_delivers() {
        let (tx, mut rx) = oneshot::channel();
        let mut sink = ResponseSink::new(OneshotWriter(tx));
        sink.stage(Response::text("over the wire"));
        sink.send().unwrap();
        assert_eq!(rx.try_recv().unwrap().body(), b"over the wire");
    }
}
