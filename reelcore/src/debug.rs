//! Trace and debugger hooks: a synchronous `TraceListener` the VM calls
//! on every instruction/handler boundary, and a `DebugController` layered
//! on top for breakpoints, stepping, and watch expressions.

use crate::{
    value::{Symbol, Value},
    vm::bytecode::Opcode,
};
use std::collections::HashSet;

/// Implementations must be fast (forward to a queue if real work is
/// needed); the VM calls these inline on its hot path.
pub trait TraceListener {
    fn on_instruction(&mut self, offset: u32, opcode: Opcode, arg: i32, stack_depth: usize);
    fn on_handler_enter(&mut self, script_id: u32, handler_name: &Symbol);
    fn on_handler_exit(&mut self, script_id: u32, handler_name: &Symbol, result: &Value);
    fn on_error(&mut self, message: &str);
}

/// A no-op listener, used when no debugger is attached.
pub struct NullTraceListener;

impl TraceListener for NullTraceListener {
    fn on_instruction(&mut self, _offset: u32, _opcode: Opcode, _arg: i32, _stack_depth: usize) {}
    fn on_handler_enter(&mut self, _script_id: u32, _handler_name: &Symbol) {}
    fn on_handler_exit(&mut self, _script_id: u32, _handler_name: &Symbol, _result: &Value) {}
    fn on_error(&mut self, _message: &str) {}
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Breakpoint {
    pub script_id: u32,
    pub byte_offset: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepMode {
    StepIn,
    StepOver,
    StepOut,
    Run,
}

/// Breakpoints, step mode, and watch expressions, keyed per caller-scoped
/// session (e.g. a movie URL). Persistence across sessions is the
/// caller's concern, not this type's.
#[derive(Default)]
pub struct DebugController {
    breakpoints: HashSet<Breakpoint>,
    conditional: Vec<(Breakpoint, String)>,
    log_points: Vec<(Breakpoint, String)>,
    watches: Vec<String>,
    step_mode: Option<StepMode>,
    paused: bool,
}

impl DebugController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_breakpoint(&mut self, script_id: u32, byte_offset: u32) {
        self.breakpoints.insert(Breakpoint { script_id, byte_offset });
    }

    pub fn clear_breakpoint(&mut self, script_id: u32, byte_offset: u32) {
        self.breakpoints.remove(&Breakpoint { script_id, byte_offset });
    }

    pub fn set_conditional_breakpoint(&mut self, script_id: u32, byte_offset: u32, condition: impl Into<String>) {
        self.conditional.push((Breakpoint { script_id, byte_offset }, condition.into()));
    }

    pub fn set_log_point(&mut self, script_id: u32, byte_offset: u32, message: impl Into<String>) {
        self.log_points.push((Breakpoint { script_id, byte_offset }, message.into()));
    }

    pub fn watch(&mut self, expression: impl Into<String>) {
        self.watches.push(expression.into());
    }

    #[must_use]
    pub fn watches(&self) -> &[String] {
        &self.watches
    }

    #[must_use]
    pub fn should_pause(&self, script_id: u32, byte_offset: u32) -> bool {
        self.breakpoints.contains(&Breakpoint { script_id, byte_offset })
    }

    #[must_use]
    pub fn log_message_for(&self, script_id: u32, byte_offset: u32) -> Option<&str> {
        self.log_points
            .iter()
            .find(|(bp, _)| bp.script_id == script_id && bp.byte_offset == byte_offset)
            .map(|(_, msg)| msg.as_str())
    }

    /// The condition expression guarding a conditional breakpoint at this
    /// location, if one was set. A plain (unconditional) breakpoint at the
    /// same location is unaffected by this — the two lists are independent.
    #[must_use]
    pub fn condition_for(&self, script_id: u32, byte_offset: u32) -> Option<&str> {
        self.conditional
            .iter()
            .find(|(bp, _)| bp.script_id == script_id && bp.byte_offset == byte_offset)
            .map(|(_, cond)| cond.as_str())
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        self.step_mode = Some(mode);
    }

    #[must_use]
    pub fn step_mode(&self) -> Option<StepMode> {
        self.step_mode
    }

    /// Parks async execution. The owning scheduler must poll
    /// `is_paused`/call `resume` to continue; the VM itself performs no
    /// blocking.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.step_mode = None;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
