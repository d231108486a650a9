//! The execution bridge between host code and a sandboxed uLisp
//! interpreter module.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ulisp::bridge::{ExecutionManager, MinimalHandler};
//!
//! let manager = ExecutionManager::default();
//! manager.install(Arc::new(my_module));
//! let result = manager.execute("(+ 1 2)", Some(Arc::new(MinimalHandler)), None).await;
//! assert_eq!(result.output(), Some(&serde_json::json!(3)));
//! ```

pub mod buffer;
pub mod callback;
pub mod manager;
pub mod module;

pub use callback::{
    minimal_answer, CallbackPort, CallbackRequest, ChannelClosed, HandlerError, HandlerFuture,
    HostHandler, MinimalHandler,
};
pub use manager::{BridgeError, ExecutionManager, ExecutionResult};
pub use module::{BufferAddr, EvalArgs, InterpreterModule, ModuleError};
