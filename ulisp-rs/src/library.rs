//! Library descriptors: which `defjs` primitives a script may call.
//!
//! The full library handed to the interpreter is the fixed
//! [`PREDEFINED_LIBRARY`] followed by any primitives the user declared inside
//! the script itself, in a comment block like this:
//!
//! ```text
//! ;;; begin-user-library
//! ;; This block describes the library of user functions.
//! ;; So the editor knows that your device implements it.
//! ;
//! ; (defjs blink (pin times))
//! ; (defjs reset ())
//! ;
//! ;;; end-user-library
//! ```
//!
//! The block is inert as code.  [`render_block`] writes it and
//! [`parse_block`] reads it back; the two round-trip.  [`build_library`]
//! produces the single-line wire form the interpreter consumes.
//!
//! # Declaration grammar
//!
//! ```text
//! decl  := "(defjs" WS name WS? "(" WS? (param (WS param)*)? WS? ")" WS? ")"
//! name  := [A-Za-z0-9_]+
//! param := [A-Za-z0-9_]+
//! ```
//!
//! A declaration may appear anywhere on a line (normally after `; `).
//! Lines inside the block that do not match are skipped.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

pub const BEGIN_SENTINEL: &str = "begin-user-library";
pub const END_SENTINEL: &str = "end-user-library";

// ── Params / LibraryEntry ─────────────────────────────────────────────────────

/// How a declaration specifies its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    /// Explicit parameter names.
    Named(Vec<String>),
    /// Only the arity is known; names are synthesized as `_0`, `_1`, …
    Count(usize),
}

impl Params {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Params::Named(names.into_iter().map(Into::into).collect())
    }

    fn into_names(self) -> Vec<String> {
        match self {
            Params::Named(names) => names,
            Params::Count(n) => (0..n).map(|i| format!("_{i}")).collect(),
        }
    }
}

/// One `defjs` declaration with its parameter names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    name: String,
    params: Vec<String>,
}

impl LibraryEntry {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self { name: name.into(), params: params.into_names() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `(defjs NAME (p1 p2 …))`, or `(defjs NAME ())` when nullary.
    pub fn declaration(&self) -> String {
        format!("(defjs {} ({}))", self.name, self.params.join(" "))
    }
}

impl fmt::Display for LibraryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration())
    }
}

/// Error from [`LibraryEntry::from_str`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid declaration '{0}': expected name(a b …), name/N, or (defjs name (a b …))")]
pub struct DeclarationError(pub String);

impl FromStr for LibraryEntry {
    type Err = DeclarationError;

    /// Accepts a full `(defjs …)` form, the short `name(a b)` form, or
    /// `name/N` for an arity-only declaration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let err = || DeclarationError(t.to_owned());

        if t.starts_with('(') {
            return match declaration_regex().find(t) {
                Some(m) if m.start() == 0 && m.end() == t.len() => {
                    match_declaration(t).ok_or_else(err)
                }
                _ => Err(err()),
            };
        }
        if let Some((name, count)) = t.split_once('/') {
            let n = count.trim().parse::<usize>().map_err(|_| err())?;
            let name = name.trim();
            return if is_ident(name) {
                Ok(LibraryEntry::new(name, Params::Count(n)))
            } else {
                Err(err())
            };
        }
        let (name, rest) = t.split_once('(').ok_or_else(err)?;
        let inner = rest.strip_suffix(')').ok_or_else(err)?;
        let name = name.trim();
        let params: Vec<&str> = inner.split_whitespace().collect();
        if !is_ident(name) || !params.iter().all(|p| is_ident(p)) {
            return Err(err());
        }
        Ok(LibraryEntry::new(name, Params::named(params)))
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Predefined library ────────────────────────────────────────────────────────

/// Device I/O and event-queue primitives every device implements, in order.
pub const PREDEFINED_LIBRARY: &[(&str, &[&str])] = &[
    ("dwrite",     &["pin", "state"]),
    ("dread",      &["pin"]),
    ("awrite",     &["pin", "value"]),
    ("aread",      &["pin"]),
    ("bclicked",   &["button_id"]),
    ("is_event",   &["event"]),
    ("pop_event",  &["event"]),
    ("push_event", &["event", "value"]),
];

/// [`PREDEFINED_LIBRARY`] as entries.
pub fn predefined() -> Vec<LibraryEntry> {
    PREDEFINED_LIBRARY
        .iter()
        .map(|(name, params)| LibraryEntry::new(*name, Params::named(params.iter().copied())))
        .collect()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render the source-embedded comment block.  An empty list renders as `""`.
pub fn render_block(entries: &[LibraryEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    out.push_str(";;; begin-user-library\n");
    out.push_str(";; This block describes the library of user functions.\n");
    out.push_str(";; So the editor knows that your device implements it.\n");
    out.push_str(";\n");
    for entry in entries {
        out.push_str("; ");
        out.push_str(&entry.declaration());
        out.push('\n');
    }
    out.push_str(";\n");
    out.push_str(";;; end-user-library\n\n");
    out
}

/// Render `entries` as the space-joined wire form.
pub fn render_wire(entries: &[LibraryEntry]) -> String {
    entries
        .iter()
        .map(LibraryEntry::declaration)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Parsing ───────────────────────────────────────────────────────────────────

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(defjs\s+([A-Za-z0-9_]+)\s*\(\s*((?:[A-Za-z0-9_]+\s*)*)\)\s*\)")
            .expect("declaration regex is valid")
    })
}

fn match_declaration(line: &str) -> Option<LibraryEntry> {
    let caps = declaration_regex().captures(line)?;
    let params = caps[2].split_whitespace();
    Some(LibraryEntry::new(&caps[1], Params::named(params)))
}

/// Extract the user-declared primitives from script source.
///
/// Returns an empty list if there is no block, or if a block is opened but
/// never closed.
pub fn parse_block(source: &str) -> Vec<LibraryEntry> {
    let mut entries = Vec::new();
    let mut inside = false;
    for line in source.lines() {
        if line.contains(BEGIN_SENTINEL) {
            inside = true;
        } else if line.contains(END_SENTINEL) {
            inside = false;
        } else if inside {
            if let Some(entry) = match_declaration(line) {
                entries.push(entry);
            }
        }
    }
    if inside {
        Vec::new()
    } else {
        entries
    }
}

/// Predefined primitives followed by the script's own declarations.
///
/// Duplicate names are kept; the interpreter sees both.
pub fn full_library(source: &str) -> Vec<LibraryEntry> {
    let mut entries = predefined();
    entries.extend(parse_block(source));
    entries
}

/// The wire-form library for `source`.
pub fn build_library(source: &str) -> String {
    render_wire(&full_library(source))
}

/// Replace the user-library block in `source` with one rendered from
/// `entries`, placed at the top of the script.
///
/// Every closed block is removed.  An unclosed block keeps its lines but
/// loses its opening sentinel, so it cannot swallow the new block.
pub fn embed_block(source: &str, entries: &[LibraryEntry]) -> String {
    let body = strip_block(source);
    let mut out = render_block(entries);
    out.push_str(body.trim_start_matches('\n'));
    out
}

/// `source` without its user-library blocks.
fn strip_block(source: &str) -> String {
    let mut kept = String::with_capacity(source.len());
    let mut open: Option<Vec<&str>> = None;
    for line in source.split_inclusive('\n') {
        if let Some(block) = open.as_mut() {
            if line.contains(END_SENTINEL) {
                open = None;
            } else {
                block.push(line);
            }
        } else if line.contains(BEGIN_SENTINEL) {
            open = Some(Vec::new());
        } else {
            kept.push_str(line);
        }
    }
    if let Some(block) = open {
        kept.extend(block);
    }
    kept
}

// ── Tests ─────────────────────────────────────────────────────────────────────
