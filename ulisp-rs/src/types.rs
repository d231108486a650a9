//! uLisp value types and host/wire value conversion.
//!
//! The interpreter speaks a textual wire format: `#t` and `()` are the two
//! boolean literals, numbers are written in decimal, and anything else is a
//! symbol.  Host code works with [`HostValue`] instead.
//!
//! | Wire text | Host value                  |
//! |-----------|-----------------------------|
//! | `#t`      | `HostValue::Bool(true)`     |
//! | `()`      | `HostValue::Bool(false)`    |
//! | `42`      | `HostValue::Number(42.0)`   |
//! | `led`     | `HostValue::Symbol("led")`  |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Wire literal for boolean true.
pub const TRUE_LITERAL: &str = "#t";
/// Wire literal for boolean false (and the empty list).
pub const FALSE_LITERAL: &str = "()";

// ── LispType ──────────────────────────────────────────────────────────────────

/// The value types the interpreter knows about.
///
/// The discriminant is the type code used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LispType {
    Unknown = 0,
    Int     = 1,
    Bool    = 2,
    BoolInt = 3,
    Symbol  = 4,
    Cell    = 5,
    Any     = 6,
}

/// Returned when a type code or type name does not name a [`LispType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeParseError {
    #[error("unknown type code {0}")]
    Code(u8),
    #[error("unknown type name '{0}'")]
    Name(String),
}

impl LispType {
    /// Every type in code order.
    pub const ALL: [LispType; 7] = [
        LispType::Unknown,
        LispType::Int,
        LispType::Bool,
        LispType::BoolInt,
        LispType::Symbol,
        LispType::Cell,
        LispType::Any,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Canonical name, e.g. `"BoolInt"`.
    pub fn name(self) -> &'static str {
        match self {
            LispType::Unknown => "Unknown",
            LispType::Int     => "Int",
            LispType::Bool    => "Bool",
            LispType::BoolInt => "BoolInt",
            LispType::Symbol  => "Symbol",
            LispType::Cell    => "Cell",
            LispType::Any     => "Any",
        }
    }

    pub fn from_code(code: u8) -> Result<Self, TypeParseError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(TypeParseError::Code(code))
    }
}

impl TryFrom<u8> for LispType {
    type Error = TypeParseError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<LispType> for u8 {
    fn from(t: LispType) -> u8 {
        t.code()
    }
}

impl FromStr for LispType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| TypeParseError::Name(s.to_owned()))
    }
}

impl fmt::Display for LispType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Host and wire values ──────────────────────────────────────────────────────

/// A value as seen by host code (handlers, emulator state, UI).
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Bool(bool),
    Number(f64),
    Symbol(String),
}

/// A value ready to be handed to the interpreter.
///
/// Numbers stay numeric so callers can tell them apart from symbols; use
/// `to_string()` for the actual wire text.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Number(n) => write_number(f, *n),
            HostValue::Symbol(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Number(n) => write_number(f, *n),
            WireValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Symbol(s.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Symbol(s)
    }
}

/// Integral values print without a fractional part (`3`, not `3.0`).
fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

/// Parse `s` as a finite number, ignoring surrounding whitespace.
///
/// Accepts decimal notation plus unsigned `0x`, `0o` and `0b` integer
/// literals.  Empty input and the special float spellings (`inf`, `NaN`)
/// are not numbers.
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(n) = parse_radix(t) {
        return Some(n);
    }
    t.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_radix(t: &str) -> Option<f64> {
    let (prefix, digits) = (t.get(..2)?, t.get(2..)?);
    let radix = match prefix {
        "0x" | "0X" => 16,
        "0o" | "0O" => 8,
        "0b" | "0B" => 2,
        _ => return None,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u128::from_str_radix(digits, radix).ok().map(|n| n as f64)
}

fn bool_literal(wire: &str) -> Option<bool> {
    match wire {
        TRUE_LITERAL => Some(true),
        FALSE_LITERAL => Some(false),
        _ => None,
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

/// Decode wire text: boolean literal, then number, then symbol.
pub fn to_host_value(wire: &str) -> HostValue {
    if let Some(b) = bool_literal(wire) {
        HostValue::Bool(b)
    } else if let Some(n) = parse_number(wire) {
        HostValue::Number(n)
    } else {
        HostValue::Symbol(wire.to_owned())
    }
}

/// Encode a host value for the interpreter.  `None` encodes as false.
pub fn to_wire_value(value: Option<&HostValue>) -> WireValue {
    match value {
        None | Some(HostValue::Bool(false)) => WireValue::Text(FALSE_LITERAL.to_owned()),
        Some(HostValue::Bool(true)) => WireValue::Text(TRUE_LITERAL.to_owned()),
        Some(HostValue::Number(n)) => WireValue::Number(*n),
        Some(HostValue::Symbol(s)) => match parse_number(s) {
            Some(n) => WireValue::Number(n),
            None => WireValue::Text(s.clone()),
        },
    }
}

/// Classify wire text.  Only ever yields `Bool`, `Int` or `Symbol`.
pub fn type_code_of_wire(wire: &str) -> LispType {
    if bool_literal(wire).is_some() {
        LispType::Bool
    } else if parse_number(wire).is_some() {
        LispType::Int
    } else {
        LispType::Symbol
    }
}

/// Classify a host value.  Only ever yields `Bool`, `Int` or `Symbol`.
pub fn type_code_of_host(value: &HostValue) -> LispType {
    match value {
        HostValue::Bool(_) => LispType::Bool,
        HostValue::Number(_) => LispType::Int,
        HostValue::Symbol(_) => LispType::Symbol,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
