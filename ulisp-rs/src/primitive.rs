//! Native primitives a script may call.
//!
//! A [`Primitive`] is the host-side description of one `defjs` function:
//! its name, parameter types, optional return type, and the register ids a
//! UI has bound to it (one per emulated pin, for example).  Register ids are
//! plain back-references; a primitive owns no device state.

use std::any::Any;
use std::fmt;

use crate::library::{LibraryEntry, Params};
use crate::types::LispType;

/// Raised when [`Primitive::is_dyn`] is handed something that is neither a
/// primitive nor a primitive name.  Always a bug at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    #[error(
        "invalid argument: expected a Primitive or a primitive name, but received {type_name}"
    )]
    InvalidArgument { type_name: &'static str },
}

/// What [`Primitive::is`] compares against.
#[derive(Debug, Clone, Copy)]
pub enum PrimitiveRef<'a> {
    Instance(&'a Primitive),
    Name(&'a str),
}

impl<'a> From<&'a Primitive> for PrimitiveRef<'a> {
    fn from(p: &'a Primitive) -> Self {
        PrimitiveRef::Instance(p)
    }
}

impl<'a> From<&'a str> for PrimitiveRef<'a> {
    fn from(s: &'a str) -> Self {
        PrimitiveRef::Name(s)
    }
}

impl<'a> From<&'a String> for PrimitiveRef<'a> {
    fn from(s: &'a String) -> Self {
        PrimitiveRef::Name(s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    name: String,
    param_types: Vec<LispType>,
    return_type: Option<LispType>,
    register_ids: Vec<u32>,
}

impl Primitive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_types: Vec::new(),
            return_type: None,
            register_ids: Vec::new(),
        }
    }

    /// Builder form used by the emulator and tests.
    pub fn with_params(mut self, types: impl IntoIterator<Item = LispType>) -> Self {
        self.param_types = types.into_iter().collect();
        self
    }

    pub fn with_return(mut self, ty: LispType) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_registers(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.register_ids = ids.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.param_types.len()
    }

    // ── Parameter types ───────────────────────────────────────────────────

    pub fn param_types(&self) -> &[LispType] {
        &self.param_types
    }

    pub fn set_param_types(&mut self, types: Vec<LispType>) {
        self.param_types = types;
    }

    pub fn param_type(&self, index: usize) -> Option<LispType> {
        self.param_types.get(index).copied()
    }

    /// Set the type of parameter `index`, growing the list with
    /// [`LispType::Unknown`] if `index` is past the end.
    pub fn set_param_type(&mut self, index: usize, ty: LispType) {
        if index >= self.param_types.len() {
            self.param_types.resize(index + 1, LispType::Unknown);
        }
        self.param_types[index] = ty;
    }

    // ── Return type ───────────────────────────────────────────────────────

    pub fn return_type(&self) -> Option<LispType> {
        self.return_type
    }

    pub fn set_return_type(&mut self, ty: Option<LispType>) {
        self.return_type = ty;
    }

    // ── Registers ─────────────────────────────────────────────────────────

    pub fn add_register(&mut self, id: u32) {
        self.register_ids.push(id);
    }

    pub fn register_ids(&self) -> &[u32] {
        &self.register_ids
    }

    // ── Identity ──────────────────────────────────────────────────────────

    /// True if `other` is this very instance, or a name equal to ours.
    ///
    /// A distinct but equal-looking instance is *not* the same primitive.
    pub fn is<'a>(&self, other: impl Into<PrimitiveRef<'a>>) -> bool {
        match other.into() {
            PrimitiveRef::Instance(p) => std::ptr::eq(self, p),
            PrimitiveRef::Name(n) => self.name == n,
        }
    }

    /// [`is`](Self::is) for dynamically typed callers.
    ///
    /// Accepts `Primitive`, `String` and `&str`; anything else
    /// is rejected rather than silently compared as unequal.
    pub fn is_dyn(&self, other: &dyn Any) -> Result<bool, PrimitiveError> {
        if let Some(p) = other.downcast_ref::<Primitive>() {
            Ok(self.is(p))
        } else if let Some(s) = other.downcast_ref::<String>() {
            Ok(self.is(s))
        } else if let Some(s) = other.downcast_ref::<&str>() {
            Ok(self.is(*s))
        } else {
            Err(PrimitiveError::InvalidArgument { type_name: describe(other) })
        }
    }
}

/// Best-effort name for common argument types in error messages.
fn describe(value: &dyn Any) -> &'static str {
    if value.is::<i32>() || value.is::<i64>() || value.is::<u32>() || value.is::<f64>() {
        "number"
    } else if value.is::<bool>() {
        "boolean"
    } else if value.is::<()>() {
        "unit"
    } else {
        "an unsupported type"
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, ty) in self.param_types.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(")")?;
        if let Some(ret) = self.return_type {
            write!(f, " -> {ret}")?;
        }
        Ok(())
    }
}

// ── Declaration conversion ────────────────────────────────────────────────────

impl From<&LibraryEntry> for Primitive {
    /// Parameter types are unknown from a declaration alone, so every
    /// parameter is typed `Any`.
    fn from(entry: &LibraryEntry) -> Self {
        Primitive::new(entry.name()).with_params(vec![LispType::Any; entry.arity()])
    }
}

impl From<&Primitive> for LibraryEntry {
    fn from(p: &Primitive) -> Self {
        LibraryEntry::new(p.name(), Params::Count(p.arity()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dwrite() -> Primitive {
        Primitive::new("dwrite")
            .with_params([LispType::Int, LispType::Bool])
            .with_registers([0, 1, 2])
    }

    #[test]
    fn accessors() {
        let mut p = dwrite();
        assert_eq!(p.name(), "dwrite");
        assert_eq!(p.arity(), 2);
        assert_eq!(p.param_type(1), Some(LispType::Bool));
        assert_eq!(p.param_type(2), None);
        p.set_param_type(0, LispType::BoolInt);
        assert_eq!(p.param_types(), &[LispType::BoolInt, LispType::Bool]);
        p.add_register(7);
        assert_eq!(p.register_ids(), &[0, 1, 2, 7]);
        assert_eq!(p.return_type(), None);
        p.set_return_type(Some(LispType::Bool));
        assert_eq!(p.to_string(), "dwrite(BoolInt Bool) -> Bool");
    }

    #[test]
    fn set_param_type_past_end_grows() {
        let mut p = Primitive::new("f");
        p.set_param_type(2, LispType::Int);
        assert_eq!(p.param_types(), &[LispType::Unknown, LispType::Unknown, LispType::Int]);
    }

    #[test]
    fn is_by_instance_and_name() {
        let p = dwrite();
        let twin = dwrite();
        assert!(p.is(&p));
        assert!(!p.is(&twin));
        assert!(p.is("dwrite"));
        assert!(!p.is("dread"));
        assert!(p.is(&"dwrite".to_owned()));
    }

    #[test]
    fn is_dyn_accepts_names_and_instances() {
        let p = dwrite();
        assert_eq!(p.is_dyn(&"dwrite"), Ok(true));
        assert_eq!(p.is_dyn(&"other".to_owned()), Ok(false));
        assert_eq!(p.is_dyn(&dwrite()), Ok(false));
    }

    #[test]
    fn is_dyn_rejects_other_types() {
        let p = dwrite();
        let err = p.is_dyn(&42i32).unwrap_err();
        assert_eq!(err, PrimitiveError::InvalidArgument { type_name: "number" });
        assert!(err.to_string().contains("received number"));
        assert!(p.is_dyn(&vec![1u8]).is_err());
    }

    #[test]
    fn converts_to_and_from_declarations() {
        let entry = LibraryEntry::new("blink", Params::Count(3));
        let p = Primitive::from(&entry);
        assert_eq!(p.param_types(), &[LispType::Any; 3]);
        let back = LibraryEntry::from(&p);
        assert_eq!(back.params(), ["_0", "_1", "_2"]);
    }
}
