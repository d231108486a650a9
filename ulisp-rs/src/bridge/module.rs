//! The contract between the bridge and a compiled interpreter module.
//!
//! The interpreter itself is opaque.  The bridge only needs a linear memory
//! it can allocate in and read/write NUL-terminated ASCII strings from, an
//! `evaluate` entry point, and a callback slot the module consults when a
//! script calls a `defjs` primitive.

use std::fmt;

use super::callback::CallbackPort;

/// An address in the module's linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferAddr(pub u32);

impl fmt::Display for BufferAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Arguments to [`InterpreterModule::evaluate`], in entry-point order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalArgs {
    pub max_heap: u32,
    pub library: BufferAddr,
    pub input: BufferAddr,
    pub output: BufferAddr,
    pub task_limit: u32,
}

/// Failures reported by an interpreter module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("out of module memory allocating {0} bytes")]
    OutOfMemory(usize),
    #[error("invalid buffer address {0}")]
    BadAddress(BufferAddr),
    #[error("string of {len} bytes does not fit buffer {addr}")]
    Overflow { addr: BufferAddr, len: usize },
    #[error("string is not ASCII")]
    NotAscii,
    #[error("evaluation failed: {0}")]
    Evaluation(String),
    #[error("evaluation terminated")]
    Terminated,
}

/// A loaded interpreter module.
///
/// All methods take `&self`: the bridge writes callback answers from the
/// async side while `evaluate` is blocked on another thread.
/// Implementations must therefore never hold an internal lock across
/// [`CallbackPort::suspend`].
pub trait InterpreterModule: Send + Sync + 'static {
    /// Module build version.
    fn version(&self) -> u32;

    fn alloc(&self, size: usize) -> Result<BufferAddr, ModuleError>;

    fn free(&self, addr: BufferAddr);

    /// Copy `s` to `addr` followed by a NUL byte.
    fn write_ascii(&self, addr: BufferAddr, s: &str) -> Result<(), ModuleError>;

    /// Read the NUL-terminated string at `addr`.
    fn read_ascii(&self, addr: BufferAddr) -> Result<String, ModuleError>;

    /// Install or clear the host callback the module calls for `defjs`
    /// primitives.  `None` means scripts cannot reach the host.
    fn set_callback(&self, port: Option<CallbackPort>);

    /// Run the script at `args.input` against the library at
    /// `args.library`, writing a JSON document to `args.output`.
    ///
    /// Blocks until the script finishes, including every callback round
    /// trip it makes.
    fn evaluate(&self, args: EvalArgs) -> Result<i32, ModuleError>;

    /// Ask a running evaluation to stop.  Best effort.
    fn terminate(&self);
}
