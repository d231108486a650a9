//! Scoped scratch buffers in interpreter memory.

use std::sync::Arc;

use super::module::{BufferAddr, InterpreterModule, ModuleError};

/// A block of module memory that is freed when dropped.
pub struct ScratchBuffer {
    module: Arc<dyn InterpreterModule>,
    addr: BufferAddr,
    capacity: usize,
}

impl ScratchBuffer {
    pub fn alloc(module: &Arc<dyn InterpreterModule>, capacity: usize) -> Result<Self, ModuleError> {
        let addr = module.alloc(capacity)?;
        Ok(Self { module: Arc::clone(module), addr, capacity })
    }

    /// A buffer just large enough for `s` and its terminator, filled with `s`.
    pub fn with_string(module: &Arc<dyn InterpreterModule>, s: &str) -> Result<Self, ModuleError> {
        let buf = Self::alloc(module, s.len() + 1)?;
        buf.write(s)?;
        Ok(buf)
    }

    pub fn addr(&self) -> BufferAddr {
        self.addr
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write `s` plus a NUL terminator.
    pub fn write(&self, s: &str) -> Result<(), ModuleError> {
        if !s.is_ascii() {
            return Err(ModuleError::NotAscii);
        }
        if s.len() + 1 > self.capacity {
            return Err(ModuleError::Overflow { addr: self.addr, len: s.len() });
        }
        self.module.write_ascii(self.addr, s)
    }

    pub fn read(&self) -> Result<String, ModuleError> {
        self.module.read_ascii(self.addr)
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        self.module.free(self.addr);
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("addr", &self.addr)
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
