//! Emulated device I/O for running scripts without hardware.
//!
//! [`EmulatorState`] keeps one pin table per I/O primitive plus a set of
//! named event queues.  Scripts write outputs (`dwrite`, `awrite`), read
//! inputs (`dread`, `aread`, `bclicked`) and exchange events
//! (`push_event`, `is_event`, `pop_event`).  A UI sets the inputs and
//! watches the outputs through the same shared state.
//!
//! [`EmulatorHandler`] plugs the state into the bridge as a
//! [`HostHandler`].
//!
//! | Request                  | Effect                              | Answer          |
//! |--------------------------|-------------------------------------|-----------------|
//! | `dwrite PIN STATE`       | set digital output                  | the new state   |
//! | `dread PIN`              | read digital input                  | `#t` / `()`     |
//! | `awrite PIN VALUE`       | set analog output                   | the new value   |
//! | `aread PIN`              | read analog input                   | number          |
//! | `bclicked BUTTON`        | read and clear a latched click      | `#t` / `()`     |
//! | `push_event EVENT VALUE` | append to the `EVENT` queue         | `#t`            |
//! | `is_event EVENT`         | is the `EVENT` queue non-empty?     | `#t` / `()`     |
//! | `pop_event EVENT`        | take the oldest `EVENT` value       | value or `()`   |
//! | `task …`                 | see [`minimal_answer`]              |                 |

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::bridge::callback::{
    minimal_answer, CallbackRequest, HandlerError, HandlerFuture, HostHandler,
};
use crate::primitive::Primitive;
use crate::types::{to_host_value, to_wire_value, HostValue, LispType, FALSE_LITERAL, TRUE_LITERAL};

// ── Layout ────────────────────────────────────────────────────────────────────

/// I/O primitives backed by a pin table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PinKind {
    DigitalOut,
    DigitalIn,
    AnalogOut,
    AnalogIn,
    Button,
}

impl PinKind {
    pub const ALL: [PinKind; 5] = [
        PinKind::DigitalOut,
        PinKind::DigitalIn,
        PinKind::AnalogOut,
        PinKind::AnalogIn,
        PinKind::Button,
    ];

    /// Name of the primitive that accesses this kind of pin.
    pub fn primitive(self) -> &'static str {
        match self {
            PinKind::DigitalOut => "dwrite",
            PinKind::DigitalIn  => "dread",
            PinKind::AnalogOut  => "awrite",
            PinKind::AnalogIn   => "aread",
            PinKind::Button     => "bclicked",
        }
    }

    pub fn from_primitive(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.primitive() == name)
    }

    fn default_value(self) -> HostValue {
        match self {
            PinKind::AnalogOut | PinKind::AnalogIn => HostValue::Number(0.0),
            _ => HostValue::Bool(false),
        }
    }
}

/// How many pins of each kind the emulated device has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLayout {
    pub d_out: u32,
    pub d_in: u32,
    pub a_out: u32,
    pub a_in: u32,
    pub buttons: u32,
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self { d_out: 3, d_in: 3, a_out: 3, a_in: 1, buttons: 1 }
    }
}

impl DeviceLayout {
    pub fn pins(&self, kind: PinKind) -> u32 {
        match kind {
            PinKind::DigitalOut => self.d_out,
            PinKind::DigitalIn  => self.d_in,
            PinKind::AnalogOut  => self.a_out,
            PinKind::AnalogIn   => self.a_in,
            PinKind::Button     => self.buttons,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmulatorError {
    #[error("{op}: missing argument #{index}")]
    MissingArgument { op: String, index: usize },
    #[error("{op}: '{value}' is not a pin number")]
    BadPin { op: String, value: String },
    #[error("{op}: pin {pin} out of range (device has {count})")]
    PinOutOfRange { op: String, pin: u32, count: u32 },
    #[error("{op}: '{value}' is not a number")]
    NotANumber { op: String, value: String },
    #[error("emulator state lock poisoned")]
    Poisoned,
}

// ── EmulatorState ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EmulatorState {
    layout: DeviceLayout,
    pins: BTreeMap<(PinKind, u32), HostValue>,
    events: HashMap<String, VecDeque<HostValue>>,
}

impl EmulatorState {
    pub fn new(layout: DeviceLayout) -> Self {
        Self { layout, ..Self::default() }
    }

    pub fn layout(&self) -> DeviceLayout {
        self.layout
    }

    /// Current value of a pin; unset pins read as their kind's default.
    pub fn pin(&self, kind: PinKind, pin: u32) -> HostValue {
        self.pins
            .get(&(kind, pin))
            .cloned()
            .unwrap_or_else(|| kind.default_value())
    }

    /// Set a pin directly (the UI side of inputs and button clicks).
    pub fn set_pin(&mut self, kind: PinKind, pin: u32, value: impl Into<HostValue>) {
        self.pins.insert((kind, pin), value.into());
    }

    /// Latch a click on `button` until a script reads it.
    pub fn click(&mut self, button: u32) {
        self.set_pin(PinKind::Button, button, true);
    }

    pub fn push_event(&mut self, event: impl Into<String>, value: HostValue) {
        self.events.entry(event.into()).or_default().push_back(value);
    }

    pub fn pending_events(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, VecDeque::len)
    }

    /// The predefined primitives, typed, with one register per pin.
    pub fn primitives(&self) -> Vec<Primitive> {
        use LispType::*;
        let io = |kind: PinKind, params: &[LispType], ret: LispType| {
            Primitive::new(kind.primitive())
                .with_params(params.iter().copied())
                .with_return(ret)
                .with_registers(0..self.layout.pins(kind))
        };
        vec![
            io(PinKind::DigitalOut, &[Int, Bool], Bool),
            io(PinKind::DigitalIn, &[Int], Bool),
            io(PinKind::AnalogOut, &[Int, Int], Int),
            io(PinKind::AnalogIn, &[Int], Int),
            io(PinKind::Button, &[Int], Bool),
            Primitive::new("is_event").with_params([Symbol]).with_return(Bool),
            Primitive::new("pop_event").with_params([Symbol]).with_return(Any),
            Primitive::new("push_event").with_params([Symbol, Any]).with_return(Bool),
        ]
    }

    /// Execute one callback request and return the wire answer.
    pub fn apply(&mut self, req: &CallbackRequest) -> Result<String, EmulatorError> {
        let op = req.op.as_str();
        match op {
            "dwrite" => {
                let pin = self.pin_arg(req, PinKind::DigitalOut)?;
                let state = truthy(&to_host_value(arg(req, 1)?));
                self.set_pin(PinKind::DigitalOut, pin, state);
                Ok(wire(&HostValue::Bool(state)))
            }
            "awrite" => {
                let pin = self.pin_arg(req, PinKind::AnalogOut)?;
                let raw = arg(req, 1)?;
                let value = match to_host_value(raw) {
                    HostValue::Number(n) => n,
                    _ => {
                        return Err(EmulatorError::NotANumber {
                            op: op.to_owned(),
                            value: raw.to_owned(),
                        })
                    }
                };
                self.set_pin(PinKind::AnalogOut, pin, value);
                Ok(wire(&HostValue::Number(value)))
            }
            "dread" | "aread" => {
                let kind = if op == "dread" { PinKind::DigitalIn } else { PinKind::AnalogIn };
                let pin = self.pin_arg(req, kind)?;
                Ok(wire(&self.pin(kind, pin)))
            }
            "bclicked" => {
                let pin = self.pin_arg(req, PinKind::Button)?;
                let clicked = self
                    .pins
                    .remove(&(PinKind::Button, pin))
                    .is_some_and(|v| truthy(&v));
                Ok(wire(&HostValue::Bool(clicked)))
            }
            "push_event" => {
                let event = arg(req, 0)?.to_owned();
                let value = to_host_value(arg(req, 1)?);
                self.push_event(event, value);
                Ok(TRUE_LITERAL.to_owned())
            }
            "is_event" => {
                let event = arg(req, 0)?;
                Ok(wire(&HostValue::Bool(self.pending_events(event) > 0)))
            }
            "pop_event" => {
                let event = arg(req, 0)?;
                let Some(queue) = self.events.get_mut(event) else {
                    return Ok(wire_opt(None));
                };
                let value = queue.pop_front();
                if queue.is_empty() {
                    self.events.remove(event);
                }
                Ok(wire_opt(value.as_ref()))
            }
            "task" => Ok(minimal_answer(&format!("task {}", req.args.join(" ")))),
            _ => Ok(FALSE_LITERAL.to_owned()),
        }
    }

    fn pin_arg(&self, req: &CallbackRequest, kind: PinKind) -> Result<u32, EmulatorError> {
        let raw = arg(req, 0)?;
        let pin: u32 = raw.parse().map_err(|_| EmulatorError::BadPin {
            op: req.op.clone(),
            value: raw.to_owned(),
        })?;
        let count = self.layout.pins(kind);
        if pin >= count {
            return Err(EmulatorError::PinOutOfRange { op: req.op.clone(), pin, count });
        }
        Ok(pin)
    }
}

fn arg(req: &CallbackRequest, index: usize) -> Result<&str, EmulatorError> {
    req.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| EmulatorError::MissingArgument { op: req.op.clone(), index: index + 1 })
}

/// uLisp truthiness: everything except `()` is true; the device also
/// treats a numeric zero as "off".
fn truthy(v: &HostValue) -> bool {
    match v {
        HostValue::Bool(b) => *b,
        HostValue::Number(n) => *n != 0.0,
        HostValue::Symbol(_) => true,
    }
}

fn wire(v: &HostValue) -> String {
    to_wire_value(Some(v)).to_string()
}

fn wire_opt(v: Option<&HostValue>) -> String {
    to_wire_value(v).to_string()
}

// ── EmulatorHandler ───────────────────────────────────────────────────────────

/// A [`HostHandler`] answering requests from a shared [`EmulatorState`].
#[derive(Debug, Clone, Default)]
pub struct EmulatorHandler {
    state: Arc<Mutex<EmulatorState>>,
}

impl EmulatorHandler {
    pub fn new(state: Arc<Mutex<EmulatorState>>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<Mutex<EmulatorState>> {
        &self.state
    }

    pub fn answer(&self, request: &str) -> Result<String, EmulatorError> {
        let req = CallbackRequest::parse(request);
        let mut state = self.state.lock().map_err(|_| EmulatorError::Poisoned)?;
        state.apply(&req)
    }
}

impl HostHandler for EmulatorHandler {
    fn handle(&self, request: String) -> HandlerFuture {
        let result: Result<String, HandlerError> = self.answer(&request).map_err(Into::into);
        Box::pin(async move { result })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
