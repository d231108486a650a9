//! Source formatting: pretty-printer and minifier.
//!
//! Both are single-pass character scanners that understand just enough of
//! the surface syntax to stay out of string literals (`"…"`, with `\`
//! escapes) and `;` line comments.
//!
//! * [`pretty`] starts every list that is not already at the beginning of a
//!   line on a new line, indented by its nesting depth.  Leading whitespace
//!   on input lines is replaced by that indentation; whitespace inside a line
//!   is kept.
//! * [`minify`] drops comments and collapses the script onto one line, with
//!   no space just inside parentheses or brackets.

/// Indentation and line-break strings for [`pretty_with`].
#[derive(Debug, Clone)]
pub struct PrettyOptions {
    pub indent: String,
    pub newline: String,
}

impl Default for PrettyOptions {
    fn default() -> Self {
        Self { indent: "  ".to_owned(), newline: "\n".to_owned() }
    }
}

/// Pretty-print with two-space indentation.
pub fn pretty(code: &str) -> String {
    pretty_with(code, &PrettyOptions::default())
}

pub fn pretty_with(code: &str, opts: &PrettyOptions) -> String {
    let mut out = String::with_capacity(code.len() + code.len() / 4);
    let mut depth: usize = 0;
    let mut at_line_start = true;
    let mut in_comment = false;
    let mut in_string = false;
    let mut escaped = false;

    for ch in code.chars() {
        if in_comment {
            if ch == '\n' || ch == '\r' {
                in_comment = false;
                at_line_start = true;
            }
            out.push(ch);
            continue;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        match ch {
            _ if escaped => {
                escaped = false;
                out.push(ch);
                at_line_start = false;
            }
            '\\' => {
                escaped = true;
                out.push(ch);
                at_line_start = false;
            }
            '(' => {
                if !at_line_start {
                    out.push_str(&opts.newline);
                }
                for _ in 0..depth {
                    out.push_str(&opts.indent);
                }
                out.push(ch);
                depth += 1;
                at_line_start = false;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(ch);
                at_line_start = false;
            }
            '\n' | '\r' => {
                out.push(ch);
                at_line_start = true;
            }
            ' ' | '\t' => {
                if !at_line_start {
                    out.push(ch);
                }
            }
            ';' => {
                in_comment = true;
                out.push(ch);
            }
            '"' => {
                in_string = true;
                out.push(ch);
                at_line_start = false;
            }
            _ => {
                out.push(ch);
                at_line_start = false;
            }
        }
    }
    out
}

/// Strip comments and squeeze the script onto a single line.
pub fn minify(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut in_comment = false;
    let mut in_string = false;
    let mut escaped = false;
    // Whitespace seen since the last emitted character.
    let mut pending_space = false;

    for ch in code.chars() {
        if in_comment {
            if ch == '\n' || ch == '\r' {
                in_comment = false;
                pending_space = true;
            }
            continue;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if escaped {
            escaped = false;
            flush_space(&mut out, &mut pending_space, ch);
            out.push(ch);
            continue;
        }
        match ch {
            ';' => in_comment = true,
            c if c.is_whitespace() => pending_space = true,
            c => {
                flush_space(&mut out, &mut pending_space, c);
                match c {
                    '"' => in_string = true,
                    '\\' => escaped = true,
                    _ => {}
                }
                out.push(c);
            }
        }
    }
    out
}

/// Emit a single pending space before `next`, unless it would sit at the
/// start of the output, just after an opening bracket, or just before a
/// closing one.
fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if std::mem::take(pending)
        && !out.is_empty()
        && !out.ends_with(['(', '['])
        && !matches!(next, ')' | ']')
    {
        out.push(' ');
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
