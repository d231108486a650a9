//! A fake interpreter module for driving the bridge in tests.
//!
//! Memory is an allocation table of byte blocks.  The "interpreter" reads
//! integers, `#t`, `()` and bare symbols, and understands:
//!
//! - `(+ …)`, `(- …)`, `(* …)` on integers
//! - `(fail)`: evaluation error
//! - `(spin)`: loop until terminated
//! - `(raw)`: write output that is not JSON
//! - any name declared in the library: a host callback
//!
//! The value of the last top-level form is written to the output buffer
//! as JSON (`()` becomes `null`).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ulisp::bridge::{BufferAddr, CallbackPort, EvalArgs, InterpreterModule, ModuleError};

pub const VERSION: u32 = 42;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Atom(String),
    List(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(i64),
    T,
    Nil,
    Sym(String),
    Raw,
}

impl Value {
    fn wire(&self) -> String {
        match self {
            Value::Num(n) => n.to_string(),
            Value::T => "#t".to_owned(),
            Value::Nil => "()".to_owned(),
            Value::Sym(s) => s.clone(),
            Value::Raw => "raw".to_owned(),
        }
    }

    fn json(&self) -> serde_json::Value {
        match self {
            Value::Num(n) => serde_json::json!(n),
            Value::T => serde_json::json!(true),
            Value::Nil | Value::Raw => serde_json::Value::Null,
            Value::Sym(s) => serde_json::json!(s),
        }
    }
}

fn read_atom(token: &str) -> Value {
    match token {
        "#t" => Value::T,
        "()" | "nil" => Value::Nil,
        _ => token.parse().map(Value::Num).unwrap_or_else(|_| Value::Sym(token.to_owned())),
    }
}

fn tokenize(src: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in src.lines() {
        let code = line.split(';').next().unwrap_or("");
        let spaced = code.replace('(', " ( ").replace(')', " ) ");
        tokens.extend(spaced.split_whitespace().map(str::to_owned));
    }
    tokens
}

fn parse(tokens: &[String], pos: &mut usize) -> Result<Expr, ModuleError> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| ModuleError::Evaluation("unexpected end of input".into()))?;
    *pos += 1;
    match tok.as_str() {
        "(" => {
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos).map(String::as_str) {
                    Some(")") => {
                        *pos += 1;
                        return Ok(Expr::List(items));
                    }
                    Some(_) => items.push(parse(tokens, pos)?),
                    None => return Err(ModuleError::Evaluation("unbalanced parens".into())),
                }
            }
        }
        ")" => Err(ModuleError::Evaluation("unexpected )".into())),
        atom => Ok(Expr::Atom(atom.to_owned())),
    }
}

/// Names declared with `(defjs NAME (…))` in a wire library.
fn declared_names(library: &str) -> Vec<String> {
    library
        .split("(defjs ")
        .skip(1)
        .filter_map(|rest| rest.split_whitespace().next())
        .map(|name| name.trim_end_matches('(').to_owned())
        .collect()
}

#[derive(Debug)]
struct Block {
    capacity: usize,
    data: Vec<u8>,
}

#[derive(Default)]
pub struct FakeModule {
    blocks: Mutex<HashMap<u32, Block>>,
    next: AtomicU32,
    memory_limit: Option<usize>,
    callback: Mutex<Option<CallbackPort>>,
    terminated: AtomicBool,
    running: AtomicBool,
    last_library: Mutex<Option<String>>,
    last_args: Mutex<Option<EvalArgs>>,
    requests: Mutex<Vec<String>>,
}

impl FakeModule {
    pub fn new() -> Self {
        Self { next: AtomicU32::new(16), ..Self::default() }
    }

    /// Refuse single allocations larger than `bytes`.
    pub fn with_memory_limit(bytes: usize) -> Self {
        Self { memory_limit: Some(bytes), ..Self::new() }
    }

    pub fn live_buffers(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn callback_installed(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_library(&self) -> Option<String> {
        self.last_library.lock().unwrap().clone()
    }

    pub fn last_args(&self) -> Option<EvalArgs> {
        *self.last_args.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn call(&self, port: Option<&CallbackPort>, name: &str, args: &[Value]) -> Result<Value, ModuleError> {
        let port = port.ok_or_else(|| ModuleError::Evaluation(format!("{name}: no host callback")))?;
        let mut request = name.to_owned();
        for a in args {
            request.push(' ');
            request.push_str(&a.wire());
        }
        self.requests.lock().unwrap().push(request.clone());
        // No lock is held here: the host writes the answer while we wait.
        let addr = port
            .suspend(request)
            .map_err(|e| ModuleError::Evaluation(e.to_string()))?;
        let answer = self.read_ascii(addr)?;
        Ok(read_atom(&answer))
    }

    fn eval(&self, expr: &Expr, port: Option<&CallbackPort>, declared: &[String]) -> Result<Value, ModuleError> {
        let items = match expr {
            Expr::Atom(a) => return Ok(read_atom(a)),
            Expr::List(items) if items.is_empty() => return Ok(Value::Nil),
            Expr::List(items) => items,
        };
        let Expr::Atom(head) = &items[0] else {
            return Err(ModuleError::Evaluation("bad function".into()));
        };
        if head == "spin" {
            while !self.terminated.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
            return Err(ModuleError::Terminated);
        }
        let args = items[1..]
            .iter()
            .map(|e| self.eval(e, port, declared))
            .collect::<Result<Vec<_>, _>>()?;
        let nums = || -> Result<Vec<i64>, ModuleError> {
            args.iter()
                .map(|v| match v {
                    Value::Num(n) => Ok(*n),
                    other => Err(ModuleError::Evaluation(format!("not a number: {}", other.wire()))),
                })
                .collect()
        };
        match head.as_str() {
            "+" => Ok(Value::Num(nums()?.iter().sum())),
            "*" => Ok(Value::Num(nums()?.iter().product())),
            "-" => {
                let n = nums()?;
                match n.split_first() {
                    Some((first, [])) => Ok(Value::Num(-first)),
                    Some((first, rest)) => Ok(Value::Num(first - rest.iter().sum::<i64>())),
                    None => Ok(Value::Num(0)),
                }
            }
            "fail" => Err(ModuleError::Evaluation("fail called".into())),
            "raw" => Ok(Value::Raw),
            name if declared.iter().any(|d| d == name) => self.call(port, name, &args),
            name => Err(ModuleError::Evaluation(format!("undefined function {name}"))),
        }
    }
}

impl InterpreterModule for FakeModule {
    fn version(&self) -> u32 {
        VERSION
    }

    fn alloc(&self, size: usize) -> Result<BufferAddr, ModuleError> {
        if self.memory_limit.is_some_and(|limit| size > limit) {
            return Err(ModuleError::OutOfMemory(size));
        }
        let addr = self.next.fetch_add(size as u32 + 16, Ordering::SeqCst);
        self.blocks
            .lock()
            .unwrap()
            .insert(addr, Block { capacity: size, data: Vec::new() });
        Ok(BufferAddr(addr))
    }

    fn free(&self, addr: BufferAddr) {
        self.blocks.lock().unwrap().remove(&addr.0);
    }

    fn write_ascii(&self, addr: BufferAddr, s: &str) -> Result<(), ModuleError> {
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.get_mut(&addr.0).ok_or(ModuleError::BadAddress(addr))?;
        if s.len() + 1 > block.capacity {
            return Err(ModuleError::Overflow { addr, len: s.len() });
        }
        block.data.clear();
        block.data.extend_from_slice(s.as_bytes());
        block.data.push(0);
        Ok(())
    }

    fn read_ascii(&self, addr: BufferAddr) -> Result<String, ModuleError> {
        let blocks = self.blocks.lock().unwrap();
        let block = blocks.get(&addr.0).ok_or(ModuleError::BadAddress(addr))?;
        let end = block.data.iter().position(|&b| b == 0).unwrap_or(block.data.len());
        String::from_utf8(block.data[..end].to_vec()).map_err(|_| ModuleError::NotAscii)
    }

    fn set_callback(&self, port: Option<CallbackPort>) {
        *self.callback.lock().unwrap() = port;
    }

    fn evaluate(&self, args: EvalArgs) -> Result<i32, ModuleError> {
        self.terminated.store(false, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some(args);
        let library = self.read_ascii(args.library)?;
        let source = self.read_ascii(args.input)?;
        *self.last_library.lock().unwrap() = Some(library.clone());
        let port = self.callback.lock().unwrap().clone();
        let declared = declared_names(&library);

        self.running.store(true, Ordering::SeqCst);
        let result = (|| -> Result<Value, ModuleError> {
            let tokens = tokenize(&source);
            let mut pos = 0;
            let mut last = Value::Nil;
            while pos < tokens.len() {
                let expr = parse(&tokens, &mut pos)?;
                last = self.eval(&expr, port.as_ref(), &declared)?;
            }
            Ok(last)
        })();
        self.running.store(false, Ordering::SeqCst);

        let value = result?;
        let text = match value {
            Value::Raw => "<not json>".to_owned(),
            v => v.json().to_string(),
        };
        self.write_ascii(args.output, &text)?;
        Ok(0)
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
