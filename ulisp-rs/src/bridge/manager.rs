//! Script execution against an installed interpreter module.
//!
//! [`ExecutionManager`] is created once at startup and shared by reference.
//! It holds the interpreter handle (installed once, when the module has
//! finished loading) and the single evaluation slot.
//!
//! ## One evaluation
//!
//! ```text
//!   Idle ─► Allocating ─► Evaluating ─► Decoding ─► Idle
//!             │               │
//!             └ busy / no     └ module error ─► Idle
//!               module ─► Idle
//! ```
//!
//! The session (scratch buffers, callback registration, slot claim) lives
//! on the blocking worker that runs `evaluate`, so it is released when the
//! interpreter returns, on every path, even if the caller stops awaiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::buffer::ScratchBuffer;
use super::callback::{self, CallbackPort, HostHandler, Suspension};
use super::module::{BufferAddr, EvalArgs, InterpreterModule, ModuleError};
use crate::config::BridgeConfig;
use crate::library;
use crate::types::FALSE_LITERAL;

// ── Results & errors ──────────────────────────────────────────────────────────

/// Outcome of [`ExecutionManager::execute`].
///
/// Serializes as `{"output": …}` or `{"error": "…"}`; `NotRun` serializes
/// as `{"output": null}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The decoded output document.
    Output(serde_json::Value),
    /// No module is installed yet, or another evaluation is in flight.
    /// Try again later.
    NotRun,
    Error(String),
}

impl ExecutionResult {
    pub fn output(&self) -> Option<&serde_json::Value> {
        match self {
            ExecutionResult::Output(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionResult::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_not_run(&self) -> bool {
        matches!(self, ExecutionResult::NotRun)
    }
}

impl Serialize for ExecutionResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            ExecutionResult::Output(v) => map.serialize_entry("output", v)?,
            ExecutionResult::NotRun => map.serialize_entry("output", &serde_json::Value::Null)?,
            ExecutionResult::Error(e) => map.serialize_entry("error", e)?,
        }
        map.end()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("output is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("interpreter worker panicked")]
    WorkerPanicked,
}

// ── Slot claim ────────────────────────────────────────────────────────────────

/// Claim on the single evaluation slot, released on drop.
struct SlotClaim(Arc<AtomicBool>);

impl SlotClaim {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotClaim(Arc::clone(flag)))
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Keeps the module's callback slot set for one session; clears it on drop.
struct CallbackRegistration(Arc<dyn InterpreterModule>);

impl CallbackRegistration {
    fn install(module: &Arc<dyn InterpreterModule>, port: Option<CallbackPort>) -> Self {
        module.set_callback(port);
        CallbackRegistration(Arc::clone(module))
    }
}

impl Drop for CallbackRegistration {
    fn drop(&mut self) {
        self.0.set_callback(None);
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Everything one evaluation owns.  Field order is drop order: the callback
/// slot is cleared, then buffers are freed, then the evaluation slot is
/// released.
struct Session {
    module: Arc<dyn InterpreterModule>,
    _registration: CallbackRegistration,
    input: ScratchBuffer,
    library: ScratchBuffer,
    output: ScratchBuffer,
    _answer: ScratchBuffer,
    _claim: SlotClaim,
}

impl Session {
    /// Run the interpreter and return the raw output text.  Consumes the
    /// session, so everything is released when this returns.
    fn run(self, max_heap: u32, task_limit: u32) -> Result<String, ModuleError> {
        let args = EvalArgs {
            max_heap,
            library: self.library.addr(),
            input: self.input.addr(),
            output: self.output.addr(),
            task_limit,
        };
        let status = self.module.evaluate(args)?;
        debug!(status, "evaluation finished");
        self.output.read()
    }
}

// ── ExecutionManager ──────────────────────────────────────────────────────────

pub struct ExecutionManager {
    module: OnceLock<Arc<dyn InterpreterModule>>,
    evaluating: Arc<AtomicBool>,
    config: BridgeConfig,
}

impl Default for ExecutionManager {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl ExecutionManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            module: OnceLock::new(),
            evaluating: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Install the interpreter once it has finished loading.
    ///
    /// Only the first call has any effect; returns `false` if a module was
    /// already installed.
    pub fn install(&self, module: Arc<dyn InterpreterModule>) -> bool {
        let version = module.version();
        let installed = self.module.set(module).is_ok();
        if installed {
            info!(version, "interpreter module installed");
        }
        installed
    }

    pub fn is_ready(&self) -> bool {
        self.module.get().is_some()
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::Acquire)
    }

    pub fn version(&self) -> Option<u32> {
        self.module.get().map(|m| m.version())
    }

    /// Ask a running evaluation to stop.  Best effort: the module decides
    /// when (and whether) `evaluate` returns.
    pub fn terminate(&self) {
        if let Some(module) = self.module.get() {
            module.terminate();
        }
    }

    /// Run `script` with the predefined library plus the script's own
    /// user-library block.
    ///
    /// `handler` answers primitive calls; without one, scripts cannot reach
    /// the host.  `task_limit` defaults to the configured limit.
    pub async fn execute(
        &self,
        script: &str,
        handler: Option<Arc<dyn HostHandler>>,
        task_limit: Option<u32>,
    ) -> ExecutionResult {
        let library = library::build_library(script);
        let task_limit = task_limit.unwrap_or(self.config.task_limit);
        match self.evaluate(script, &library, handler, task_limit).await {
            Ok(Some(output)) => ExecutionResult::Output(output),
            Ok(None) => ExecutionResult::NotRun,
            Err(e) => ExecutionResult::Error(e.to_string()),
        }
    }

    /// Evaluate `script` against an explicit wire-form `library`.
    ///
    /// `Ok(None)` means the call was turned away (no module or busy).
    pub async fn evaluate(
        &self,
        script: &str,
        library: &str,
        handler: Option<Arc<dyn HostHandler>>,
        task_limit: u32,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        let Some(module) = self.module.get() else {
            debug!("no interpreter module installed");
            return Ok(None);
        };
        let Some(claim) = SlotClaim::acquire(&self.evaluating) else {
            debug!("evaluation already in flight");
            return Ok(None);
        };

        let answer = ScratchBuffer::alloc(module, self.config.answer_capacity)?;
        let answer_addr = answer.addr();
        let output = ScratchBuffer::alloc(module, self.config.output_capacity)?;
        let input = ScratchBuffer::with_string(module, script)?;
        let library_buf = ScratchBuffer::with_string(module, library)?;

        let (port, mut requests) = callback::channel();
        let registration = CallbackRegistration::install(module, handler.is_some().then_some(port));

        let session = Session {
            module: Arc::clone(module),
            _registration: registration,
            input,
            library: library_buf,
            output,
            _answer: answer,
            _claim: claim,
        };

        debug!(
            script_len = script.len(),
            library_len = library.len(),
            task_limit,
            "evaluation started"
        );
        let max_heap = self.config.max_heap;
        let mut worker = tokio::task::spawn_blocking(move || session.run(max_heap, task_limit));

        let raw = loop {
            tokio::select! {
                joined = &mut worker => break joined,
                Some(suspension) = requests.recv() => {
                    self.serve(module, handler.as_deref(), suspension, answer_addr).await;
                }
            }
        };

        let text = raw.map_err(|_| BridgeError::WorkerPanicked)??;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Resolve one suspended primitive call and wake the interpreter.
    async fn serve(
        &self,
        module: &Arc<dyn InterpreterModule>,
        handler: Option<&dyn HostHandler>,
        suspension: Suspension,
        answer_addr: BufferAddr,
    ) {
        let answer = match handler {
            Some(handler) => self.ask(handler, &suspension.request).await,
            None => FALSE_LITERAL.to_owned(),
        };
        trace!(request = %suspension.request, %answer, "callback answered");
        if let Err(e) = module.write_ascii(answer_addr, &answer) {
            warn!(error = %e, "cannot write callback answer");
            // FALSE_LITERAL always fits the answer buffer.
            let _ = module.write_ascii(answer_addr, FALSE_LITERAL);
        }
        suspension.resume(answer_addr);
    }

    /// Run the handler, turning failures and unusable answers into `()`.
    async fn ask(&self, handler: &dyn HostHandler, request: &str) -> String {
        // Spawned so that a panicking handler is contained by the join.
        let answer = match tokio::spawn(handler.handle(request.to_owned())).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(request, error = %e, "host handler failed");
                return FALSE_LITERAL.to_owned();
            }
            Err(e) => {
                warn!(request, error = %e, "host handler panicked");
                return FALSE_LITERAL.to_owned();
            }
        };
        if !answer.is_ascii() || answer.len() + 1 > self.config.answer_capacity {
            warn!(
                request,
                len = answer.len(),
                capacity = self.config.answer_capacity,
                "host answer is not ASCII or does not fit the answer buffer"
            );
            return FALSE_LITERAL.to_owned();
        }
        answer
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_like_the_ui_expects() {
        let out = ExecutionResult::Output(serde_json::json!(3));
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"output":3}"#);
        let err = ExecutionResult::Error("boom".into());
        assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"error":"boom"}"#);
        assert_eq!(serde_json::to_string(&ExecutionResult::NotRun).unwrap(), r#"{"output":null}"#);
    }

    #[test]
    fn slot_claim_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = SlotClaim::acquire(&flag).unwrap();
        assert!(SlotClaim::acquire(&flag).is_none());
        drop(first);
        assert!(SlotClaim::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn without_module_nothing_runs() {
        let mgr = ExecutionManager::default();
        assert!(!mgr.is_ready());
        assert_eq!(mgr.version(), None);
        assert!(mgr.execute("(+ 1 2)", None, None).await.is_not_run());
        mgr.terminate();
    }
}
