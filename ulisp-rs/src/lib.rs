//! uLisp scripting bridge.
//!
//! Host-side plumbing for running uLisp scripts inside a sandboxed
//! interpreter module:
//!
//! - [`types`]: the primitive type codes and host/wire value conversion.
//! - [`primitive`] and [`library`]: descriptors for host-provided
//!   primitives and the `defjs` library passed to the interpreter.
//! - [`bridge`]: single-flight execution and the host callback channel.
//! - [`format`]: pretty-printing and minification of script text.
//! - [`emulator`]: an emulated device answering the predefined primitives.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod emulator;
pub mod format;
pub mod library;
pub mod primitive;
pub mod types;

pub use bridge::{ExecutionManager, ExecutionResult, HostHandler, InterpreterModule};
pub use config::BridgeConfig;
pub use library::LibraryEntry;
pub use primitive::Primitive;
pub use types::{HostValue, LispType};
