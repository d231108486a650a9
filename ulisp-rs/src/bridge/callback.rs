//! Host callbacks during evaluation.
//!
//! When a script calls a `defjs` primitive, the interpreter thread stops and
//! asks the host for the result.  This is a two-phase exchange:
//!
//! ```text
//!   interpreter thread                    async bridge task
//!   ──────────────────                    ─────────────────
//!   port.suspend("dread 3") ──request──►  handler.handle("dread 3").await
//!        (blocked)                        write answer into answer buffer
//!   resumes with addr      ◄──wake-up──   suspension.resume(answer_addr)
//! ```
//!
//! Requests are tokens separated by whitespace, first token is the
//! operation.  Handler failures never cross back into the interpreter: the
//! bridge answers `()` instead.
//!
//! There is no timeout.  A handler that never completes stalls the
//! evaluation, and with it the single evaluation slot.

use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc as std_mpsc;

use tokio::sync::mpsc;

use super::module::BufferAddr;
use crate::types::FALSE_LITERAL;

/// Boxed error a handler may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`HostHandler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<String, HandlerError>> + Send>>;

/// Resolves callback requests from a running script.
///
/// Implemented for any `Fn(String) -> impl Future<Output = Result<String,
/// HandlerError>>`, so an `async move` closure works directly.
pub trait HostHandler: Send + Sync {
    fn handle(&self, request: String) -> HandlerFuture;
}

impl<F, Fut> HostHandler for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, HandlerError>> + Send + 'static,
{
    fn handle(&self, request: String) -> HandlerFuture {
        Box::pin(self(request))
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A tokenized callback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub op: String,
    pub args: Vec<String>,
}

impl CallbackRequest {
    /// Split on whitespace.  An empty request has an empty `op`.
    pub fn parse(request: &str) -> Self {
        let mut tokens = request.split_whitespace().map(str::to_owned);
        let op = tokens.next().unwrap_or_default();
        Self { op, args: tokens.collect() }
    }

    /// The request token at `index`, counting the operation as token 0.
    pub fn token(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(self.op.as_str()),
            n => self.args.get(n - 1).map(String::as_str),
        }
    }
}

/// Answer `task` requests with their fourth token; everything else with
/// `()`.
pub fn minimal_answer(request: &str) -> String {
    let req = CallbackRequest::parse(request);
    match req.op.as_str() {
        "task" => req.token(3).unwrap_or(FALSE_LITERAL).to_owned(),
        _ => FALSE_LITERAL.to_owned(),
    }
}

/// [`HostHandler`] wrapper around [`minimal_answer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalHandler;

impl HostHandler for MinimalHandler {
    fn handle(&self, request: String) -> HandlerFuture {
        let answer = minimal_answer(&request);
        Box::pin(async move { Ok(answer) })
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// The channel behind the port has closed: the evaluation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("host callback channel closed")]
pub struct ChannelClosed;

/// One suspended interpreter call waiting for an answer.
#[derive(Debug)]
pub struct Suspension {
    pub request: String,
    wake: std_mpsc::SyncSender<BufferAddr>,
}

impl Suspension {
    /// Wake the interpreter; it reads its answer from `answer`.
    pub fn resume(self, answer: BufferAddr) {
        // The interpreter side only drops its receiver after giving up on
        // the evaluation, in which case nobody is waiting for this.
        let _ = self.wake.send(answer);
    }
}

/// Interpreter-side end of the callback channel.
///
/// Cloned into the module's callback slot for the duration of one
/// evaluation.
#[derive(Debug, Clone)]
pub struct CallbackPort {
    tx: mpsc::UnboundedSender<Suspension>,
}

impl CallbackPort {
    /// Send `request` to the host and block until it is answered.
    ///
    /// Must be called from a blocking thread, never from async code.
    /// Returns the address of the answer buffer.
    pub fn suspend(&self, request: impl Into<String>) -> Result<BufferAddr, ChannelClosed> {
        let (wake, woken) = std_mpsc::sync_channel(1);
        self.tx
            .send(Suspension { request: request.into(), wake })
            .map_err(|_| ChannelClosed)?;
        woken.recv().map_err(|_| ChannelClosed)
    }
}

/// Create a connected port / request-stream pair.
pub fn channel() -> (CallbackPort, mpsc::UnboundedReceiver<Suspension>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CallbackPort { tx }, rx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request() {
        let r = CallbackRequest::parse("  dwrite   3 #t ");
        assert_eq!(r.op, "dwrite");
        assert_eq!(r.args, ["3", "#t"]);
        assert_eq!(r.token(0), Some("dwrite"));
        assert_eq!(r.token(2), Some("#t"));
        assert_eq!(r.token(3), None);
        assert_eq!(CallbackRequest::parse("").op, "");
    }

    #[test]
    fn minimal_answers() {
        assert_eq!(minimal_answer("task 0 1 42"), "42");
        assert_eq!(minimal_answer("task 0 1"), "()");
        assert_eq!(minimal_answer("dread 3"), "()");
        assert_eq!(minimal_answer(""), "()");
    }

    #[tokio::test]
    async fn minimal_handler_is_a_host_handler() {
        let answer = MinimalHandler.handle("task a b 1".into()).await.unwrap();
        assert_eq!(answer, "1");
    }

    #[tokio::test]
    async fn closures_are_host_handlers() {
        let handler = |req: String| async move { Ok::<_, HandlerError>(req.to_uppercase()) };
        assert_eq!(handler.handle("abc".into()).await.unwrap(), "ABC");
    }

    #[tokio::test]
    async fn suspend_and_resume() {
        let (port, mut rx) = channel();
        let worker = tokio::task::spawn_blocking(move || port.suspend("dread 3"));
        let suspension = rx.recv().await.unwrap();
        assert_eq!(suspension.request, "dread 3");
        suspension.resume(BufferAddr(64));
        assert_eq!(worker.await.unwrap(), Ok(BufferAddr(64)));
    }

    #[tokio::test]
    async fn suspend_fails_when_host_gone() {
        let (port, rx) = channel();
        drop(rx);
        let result = tokio::task::spawn_blocking(move || port.suspend("dread 3")).await.unwrap();
        assert_eq!(result, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn suspend_fails_when_suspension_dropped() {
        let (port, mut rx) = channel();
        let worker = tokio::task::spawn_blocking(move || port.suspend("x"));
        drop(rx.recv().await.unwrap());
        assert_eq!(worker.await.unwrap(), Err(ChannelClosed));
    }
}
