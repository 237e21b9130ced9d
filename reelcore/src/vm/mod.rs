//! The bytecode interpreter: call frames, name resolution, ancestor-chain
//! dispatch, and the synchronous/stepping execution entry points.

pub mod bytecode;

use crate::{
    builtins,
    cast::{Manager, ScriptRef},
    debug::{DebugController, TraceListener},
    error::{Error, Result},
    resources::script::{self, Script},
    value::{PropList, Symbol, Value},
};
use bytecode::{Instruction, Opcode};
use std::rc::Rc;

const MAX_ANCESTOR_DEPTH: u32 = 64;

/// A `script-instance`: the live state created by `new(#script, ...)`.
#[derive(Debug)]
pub struct ScriptInstance {
    pub script: ScriptRef,
    pub properties: PropList,
    pub ancestor: Value,
}

impl ScriptInstance {
    #[must_use]
    pub fn new(script: ScriptRef) -> Self {
        Self { script, properties: PropList::new(), ancestor: Value::Void }
    }
}

struct CallFrame {
    script: ScriptRef,
    script_rc: Rc<Script>,
    handler_index: usize,
    pc: usize,
    operand_stack: Vec<Value>,
    locals: Vec<Value>,
    args: Vec<Value>,
    receiver: Value,
    /// Set for a `new` handler's frame: the value `finish_frame` pushes onto
    /// the caller's stack in place of whatever the handler itself returned.
    return_override: Option<Value>,
}

impl CallFrame {
    fn handler(&self) -> &script::Handler {
        &self.script_rc.handlers[self.handler_index]
    }

    fn current_instruction(&self) -> Option<Instruction> {
        self.handler().instructions.get(self.pc).copied()
    }
}

/// Where a resolved handler lives, used by `find_handler` results and
/// `LOCAL_CALL`/`OBJ_CALL` targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandlerLocation {
    pub script: ScriptRef,
    pub handler_index: usize,
}

/// Outcome of a top-level dispatch: either the handler's return value, or
/// a fatal error that aborted the dispatch (the VM itself remains usable).
pub type DispatchResult = core::result::Result<Value, Error>;

/// Why `step_frame_async` returned without the frame completing. The VM's
/// call stack is untouched in every case, so a later call resumes from
/// exactly the paused instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SuspendReason {
    Breakpoint { script_id: u32, byte_offset: u32 },
    StepLimit,
    DebugPause,
}

/// Outcome of `step_frame_async`.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Returned(Value),
    Suspended(SuspendReason),
}

pub struct Vm {
    pub globals: std::collections::HashMap<Symbol, Value>,
    pub step_limit: u32,
    pub builtins: builtins::Registry,
    pub debug: DebugController,
    trace: Option<Box<dyn TraceListener>>,
    frames: Vec<CallFrame>,
    last_return: Option<Value>,
}

impl Vm {
    #[must_use]
    pub fn new(step_limit: u32) -> Self {
        Self {
            globals: std::collections::HashMap::new(),
            step_limit,
            builtins: builtins::Registry::new(),
            debug: DebugController::new(),
            trace: None,
            frames: Vec::new(),
            last_return: None,
        }
    }

    pub fn set_trace_listener(&mut self, listener: Box<dyn TraceListener>) {
        self.trace = Some(listener);
    }

    fn trace_instruction(&mut self, instr: &Instruction, stack_depth: usize) {
        if let Some(trace) = &mut self.trace {
            trace.on_instruction(instr.byte_offset, instr.opcode, instr.argument, stack_depth);
        }
    }

    fn trace_error(&mut self, message: &str) {
        if let Some(trace) = &mut self.trace {
            trace.on_error(message);
        }
    }

    fn trace_handler_enter(&mut self, cast: &Manager, location: HandlerLocation, name_id: u32) {
        if self.trace.is_none() {
            return;
        }
        let Some(name) = cast.resolve_name(location.script, name_id) else { return };
        if let Some(trace) = &mut self.trace {
            trace.on_handler_enter(location.script.script_id, &name);
        }
    }

    fn trace_handler_exit(&mut self, cast: &Manager, location: HandlerLocation, name_id: u32, result: &Value) {
        if self.trace.is_none() {
            return;
        }
        let Some(name) = cast.resolve_name(location.script, name_id) else { return };
        if let Some(trace) = &mut self.trace {
            trace.on_handler_exit(location.script.script_id, &name, result);
        }
    }

    /// Resolves `EXT_CALL(name_id)`, trying, in order: the built-in
    /// registry, a movie-script handler by name, then a method on the
    /// current receiver's ancestor chain.
    fn resolve_ext_call(&self, cast: &Manager, name: &Symbol, receiver: &Value) -> Option<HandlerLocation> {
        if let Some(location) = cast.find_handler(name) {
            return Some(location);
        }
        if let Value::ScriptInstance(instance) = receiver {
            return self.resolve_ancestor_chain(cast, instance, name).ok().flatten();
        }
        None
    }

    /// Walks a `script-instance`'s ancestor chain looking for `name`,
    /// aborting with `AncestorCycle` past the depth cap.
    pub(crate) fn resolve_ancestor_chain(
        &self,
        cast: &Manager,
        instance: &Rc<std::cell::RefCell<ScriptInstance>>,
        name: &Symbol,
    ) -> Result<Option<HandlerLocation>> {
        let mut current = Rc::clone(instance);
        let mut depth = 0;
        loop {
            let script_ref = current.borrow().script;
            if let Some(index) = cast.find_handler_in_script(script_ref, name) {
                return Ok(Some(HandlerLocation { script: script_ref, handler_index: index }));
            }
            let ancestor = current.borrow().ancestor.clone();
            match ancestor {
                Value::ScriptInstance(next) => {
                    depth += 1;
                    if depth > MAX_ANCESTOR_DEPTH {
                        return Err(Error::AncestorCycle);
                    }
                    current = next;
                }
                _ => return Ok(None),
            }
        }
    }

    /// Runs `handler` to completion on the owning VM context. Recoverable
    /// errors surface as trace events and leave `void` on the stack; fatal
    /// errors abort this dispatch only.
    pub fn execute_handler(
        &mut self,
        cast: &mut Manager,
        location: HandlerLocation,
        args: Vec<Value>,
        receiver: Value,
    ) -> Value {
        let script_rc = match cast.script(location.script) {
            Some(s) => s,
            None => return Value::Void,
        };

        let handler = &script_rc.handlers[location.handler_index];
        let name_id = handler.name_id;
        let mut locals = vec![Value::Void; handler.local_name_ids.len()];
        for (i, value) in args.iter().enumerate() {
            if i < locals.len() {
                locals[i] = value.clone();
            }
        }

        self.frames.push(CallFrame {
            script: location.script,
            script_rc: Rc::clone(&script_rc),
            handler_index: location.handler_index,
            pc: 0,
            operand_stack: Vec::new(),
            locals,
            args,
            receiver,
            return_override: None,
        });

        self.trace_handler_enter(cast, location, name_id);

        match self.run_until_frame_returns(cast) {
            Ok(value) => {
                self.trace_handler_exit(cast, location, name_id, &value);
                value
            }
            Err(err) => {
                self.trace_error(&err.to_string());
                self.frames.pop();
                Value::Void
            }
        }
    }

    /// Runs until the frame just pushed returns, or a suspension/fatal
    /// condition interrupts it. This is the synchronous execution mode;
    /// `step_frame_async` (driven by the owning runtime's scheduler) calls
    /// the same step function but yields at suspension points instead of
    /// looping to completion.
    fn run_until_frame_returns(&mut self, cast: &mut Manager) -> DispatchResult {
        let target_depth = self.frames.len() - 1;
        loop {
            if self.step_limit == 0 {
                return Err(Error::StepLimitExceeded);
            }
            self.step_limit -= 1;

            let done = self.step(cast)?;
            if done && self.frames.len() <= target_depth {
                return Ok(self.last_return.take().unwrap_or(Value::Void));
            }
        }
    }

    /// The debugging-capable counterpart to `run_until_frame_returns`: runs
    /// until the frame just pushed returns, `*step_budget` is exhausted, or
    /// `self.debug` calls a halt. Nothing is popped on suspension, so
    /// calling this again later resumes at the exact paused instruction.
    pub fn step_frame_async(&mut self, cast: &mut Manager, step_budget: &mut u32) -> Result<StepOutcome> {
        let target_depth = self.frames.len().saturating_sub(1);
        loop {
            if self.debug.is_paused() {
                return Ok(StepOutcome::Suspended(SuspendReason::DebugPause));
            }

            if let Some(reason) = self.check_breakpoint(cast) {
                self.debug.pause();
                return Ok(StepOutcome::Suspended(reason));
            }
            self.emit_log_point(cast);

            if *step_budget == 0 {
                return Ok(StepOutcome::Suspended(SuspendReason::StepLimit));
            }
            *step_budget -= 1;

            if self.step_limit == 0 {
                return Err(Error::StepLimitExceeded);
            }
            self.step_limit -= 1;

            let done = self.step(cast)?;
            if done && self.frames.len() <= target_depth {
                return Ok(StepOutcome::Returned(self.last_return.take().unwrap_or(Value::Void)));
            }
        }
    }

    /// Checks the breakpoint and conditional-breakpoint lists against the
    /// instruction the topmost frame is about to execute.
    fn check_breakpoint(&self, cast: &Manager) -> Option<SuspendReason> {
        let frame = self.frames.last()?;
        let instr = frame.current_instruction()?;
        let script_id = frame.script.script_id;
        let byte_offset = instr.byte_offset;

        if self.debug.should_pause(script_id, byte_offset) {
            return Some(SuspendReason::Breakpoint { script_id, byte_offset });
        }
        let condition = self.debug.condition_for(script_id, byte_offset)?.to_string();
        self.evaluate_debug_expression(cast, &condition).as_bool().then_some(SuspendReason::Breakpoint { script_id, byte_offset })
    }

    fn emit_log_point(&mut self, cast: &Manager) {
        let Some(frame) = self.frames.last() else { return };
        let Some(instr) = frame.current_instruction() else { return };
        let script_id = frame.script.script_id;
        let byte_offset = instr.byte_offset;
        if let Some(message) = self.debug.log_message_for(script_id, byte_offset) {
            let message = message.to_string();
            self.trace_error(&format!("log point: {message}"));
        }
        let _ = cast;
    }

    /// Evaluates every registered watch expression against the current
    /// frame, for a caller (e.g. a debugger UI) to display at a suspension
    /// point. Unresolvable names and malformed expressions read as `void`.
    #[must_use]
    pub fn evaluate_watches(&self, cast: &Manager) -> Vec<(String, Value)> {
        self.debug.watches().iter().map(|expr| (expr.clone(), self.evaluate_debug_expression(cast, expr))).collect()
    }

    /// A minimal expression evaluator for conditional breakpoints and watch
    /// expressions: an optional `<lhs> <op> <rhs>` comparison (`==`, `!=`,
    /// `<=`, `>=`, `<`, `>`) over operands that are each resolved as an int
    /// or float literal, a quoted string literal, or a name looked up
    /// against the current frame's locals, arguments, globals, then (for a
    /// `script-instance` receiver) its properties. A bare expression with no
    /// operator is just resolved as one operand.
    fn evaluate_debug_expression(&self, cast: &Manager, expr: &str) -> Value {
        let expr = expr.trim();
        for op in ["==", "!=", "<=", ">=", "<", ">"] {
            if let Some((lhs, rhs)) = expr.split_once(op) {
                let a = self.resolve_debug_operand(cast, lhs.trim());
                let b = self.resolve_debug_operand(cast, rhs.trim());
                let result = match op {
                    "==" => a == b,
                    "!=" => a != b,
                    "<=" => a.as_number().as_f64() <= b.as_number().as_f64(),
                    ">=" => a.as_number().as_f64() >= b.as_number().as_f64(),
                    "<" => a.as_number().as_f64() < b.as_number().as_f64(),
                    ">" => a.as_number().as_f64() > b.as_number().as_f64(),
                    _ => unreachable!(),
                };
                return Value::from(result);
            }
        }
        self.resolve_debug_operand(cast, expr)
    }

    fn resolve_debug_operand(&self, cast: &Manager, token: &str) -> Value {
        if let Ok(i) = token.parse::<i32>() {
            return Value::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Value::Float(f);
        }
        if let Some(literal) = token.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Value::String(literal.to_string());
        }

        let Some(frame) = self.frames.last() else { return Value::Void };
        let handler = frame.handler();

        for (i, &name_id) in handler.local_name_ids.iter().enumerate() {
            if cast.resolve_name(frame.script, name_id).is_some_and(|n| n.as_str().eq_ignore_ascii_case(token)) {
                return frame.locals.get(i).cloned().unwrap_or(Value::Void);
            }
        }
        for (i, &name_id) in handler.argument_name_ids.iter().enumerate() {
            if cast.resolve_name(frame.script, name_id).is_some_and(|n| n.as_str().eq_ignore_ascii_case(token)) {
                return frame.args.get(i).cloned().unwrap_or(Value::Void);
            }
        }
        if let Some(value) = self.globals.get(&Symbol::new(token)) {
            return value.clone();
        }
        if let Value::ScriptInstance(instance) = &frame.receiver {
            if let Some(value) = instance.borrow().properties.get_prop(&Symbol::new(token)) {
                return value.clone();
            }
        }
        self.builtins.get_property(&frame.receiver, &Symbol::new(token)).unwrap_or(Value::Void)
    }

    /// Executes a single instruction on the topmost frame. Returns `true`
    /// once the frame at `target_depth` has returned.
    fn step(&mut self, cast: &mut Manager) -> Result<bool> {
        let frame = self.frames.last().ok_or(Error::StackUnderflow)?;
        let instr = match frame.current_instruction() {
            Some(instr) => instr,
            None => {
                // fell off the end without an explicit RET
                self.finish_frame(Value::Void);
                return Ok(true);
            }
        };

        self.trace_instruction(&instr, frame.operand_stack.len());
        self.frames.last_mut().unwrap().pc += 1;

        match instr.opcode {
            Opcode::PushVoid => self.push(Value::Void),
            Opcode::PushInt => self.push(Value::Int(instr.argument)),
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let v = self.peek()?.clone();
                self.push(v);
            }
            Opcode::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
            }
            Opcode::PushFloat => {
                let literal_idx = instr.argument as usize;
                self.push(self.literal_value(literal_idx));
            }
            Opcode::PushStringLiteral | Opcode::PushConstant => {
                let literal_idx = instr.argument as usize;
                self.push(self.literal_value(literal_idx));
            }
            Opcode::PushSymbol => {
                let name = self.resolve_current_name(cast, instr.argument as u32);
                self.push(name.map_or(Value::Void, Value::Symbol));
            }
            Opcode::GetLocal => {
                let i = instr.argument as usize;
                let v = self.frames.last().unwrap().locals.get(i).cloned().unwrap_or(Value::Void);
                self.push(v);
            }
            Opcode::SetLocal => {
                let v = self.pop()?;
                let i = instr.argument as usize;
                let frame = self.frames.last_mut().unwrap();
                if i < frame.locals.len() {
                    frame.locals[i] = v;
                }
            }
            Opcode::GetArg => {
                let i = instr.argument as usize;
                let v = self.frames.last().unwrap().args.get(i).cloned().unwrap_or(Value::Void);
                self.push(v);
            }
            Opcode::SetArg => {
                let v = self.pop()?;
                let i = instr.argument as usize;
                let frame = self.frames.last_mut().unwrap();
                if i < frame.args.len() {
                    frame.args[i] = v;
                }
            }
            Opcode::GetGlobal => {
                let name = self.resolve_current_name(cast, instr.argument as u32);
                let v = name.and_then(|n| self.globals.get(&n).cloned()).unwrap_or(Value::Void);
                self.push(v);
            }
            Opcode::SetGlobal => {
                let v = self.pop()?;
                if let Some(name) = self.resolve_current_name(cast, instr.argument as u32) {
                    self.globals.insert(name, v);
                }
            }
            Opcode::GetProp => {
                let name = self.resolve_current_name(cast, instr.argument as u32);
                let receiver = self.frames.last().unwrap().receiver.clone();
                let v = name.and_then(|n| self.get_prop(&receiver, &n)).unwrap_or(Value::Void);
                self.push(v);
            }
            Opcode::SetProp => {
                let v = self.pop()?;
                if let Some(name) = self.resolve_current_name(cast, instr.argument as u32) {
                    let receiver = self.frames.last().unwrap().receiver.clone();
                    self.set_prop(&receiver, &name, v);
                }
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Modulo => {
                self.arithmetic(instr.opcode)?;
            }
            Opcode::Negate => {
                let v = self.pop()?;
                let result = match v.as_number() {
                    crate::value::Number::Int(i) => Value::Int(-i),
                    crate::value::Number::Float(f) => Value::Float(-f),
                };
                self.push(result);
            }
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                self.compare(instr.opcode)?;
            }
            Opcode::And => {
                let b = self.pop()?.as_bool();
                let a = self.pop()?.as_bool();
                self.push(Value::from(a && b));
            }
            Opcode::Or => {
                let b = self.pop()?.as_bool();
                let a = self.pop()?.as_bool();
                self.push(Value::from(a || b));
            }
            Opcode::Not => {
                let a = self.pop()?.as_bool();
                self.push(Value::from(!a));
            }
            Opcode::Concat => {
                let b = self.pop()?.to_display_string();
                let a = self.pop()?.to_display_string();
                self.push(Value::String(a + &b));
            }
            Opcode::ConcatSpace => {
                let b = self.pop()?.to_display_string();
                let a = self.pop()?.to_display_string();
                self.push(Value::String(format!("{} {}", a, b)));
            }
            Opcode::Jmp => self.jump(instr.next_offset, instr.argument)?,
            Opcode::JmpIfZero => {
                let cond = self.pop()?.as_bool();
                if !cond {
                    self.jump(instr.next_offset, instr.argument)?;
                }
            }
            Opcode::JmpIfNotZero => {
                let cond = self.pop()?.as_bool();
                if cond {
                    self.jump(instr.next_offset, instr.argument)?;
                }
            }
            Opcode::ListNew => {
                let n = instr.argument as usize;
                let items = self.pop_n(n)?;
                self.push(Value::list(items));
            }
            Opcode::PropListNew => {
                let n = instr.argument as usize;
                let mut props = PropList::new();
                for pair in self.pop_n(n * 2)?.chunks(2) {
                    if let [key, value] = pair {
                        if let Value::Symbol(sym) = key {
                            props.add_prop(sym.clone(), value.clone());
                        }
                    }
                }
                self.push(Value::PropList(Rc::new(std::cell::RefCell::new(props))));
            }
            Opcode::ExtCall => {
                self.dispatch_ext_call(cast, instr)?;
            }
            Opcode::LocalCall => {
                let argc = instr.argc() as usize;
                let handler_index = instr.name_id() as usize;
                let args = self.pop_n(argc)?;
                let script = self.frames.last().unwrap().script;
                let receiver = self.frames.last().unwrap().receiver.clone();
                self.call(cast, HandlerLocation { script, handler_index }, args, receiver, None)?;
            }
            Opcode::ObjCall => {
                let argc = instr.argc() as usize;
                let receiver = self.pop()?;
                let args = self.pop_n(argc)?;
                let name = self.resolve_current_name(cast, instr.name_id());
                match name.and_then(|n| {
                    if let Value::ScriptInstance(inst) = &receiver {
                        self.resolve_ancestor_chain(cast, inst, &n).ok().flatten()
                    } else {
                        None
                    }
                }) {
                    Some(location) => self.call(cast, location, args, receiver, None)?,
                    None => self.push(Value::Void),
                }
            }
            Opcode::New => {
                let argc = instr.argc() as usize;
                let args = self.pop_n(argc)?;
                let script_ref = self.resolve_current_name(cast, instr.name_id())
                    .and_then(|name| cast.script_ref_by_name(&name));
                match script_ref {
                    Some(script_ref) => {
                        let instance = Rc::new(std::cell::RefCell::new(ScriptInstance::new(script_ref)));
                        let receiver = Value::ScriptInstance(Rc::clone(&instance));
                        match cast.find_handler_in_script(script_ref, &Symbol::new("new")) {
                            // The `new` frame's own return value is discarded via
                            // `return_override`: this instruction's result is
                            // always the instance, whether or not the handler
                            // ends with an explicit `return me`.
                            Some(index) => {
                                self.call(
                                    cast,
                                    HandlerLocation { script: script_ref, handler_index: index },
                                    args,
                                    receiver.clone(),
                                    Some(receiver),
                                )?;
                            }
                            None => self.push(receiver),
                        }
                    }
                    None => self.push(Value::Void),
                }
            }
            Opcode::Ret => {
                let value = self.frames.last_mut().unwrap().operand_stack.pop().unwrap_or(Value::Void);
                self.finish_frame(value);
                return Ok(true);
            }
            Opcode::ChunkGet | Opcode::ChunkSet => {
                self.pop()?;
                self.push(Value::Void);
            }
            Opcode::Unknown(byte) => {
                // Tolerated rather than fatal: traced, then execution
                // resumes at the next decoded instruction.
                self.trace_error(&Error::UnknownOpcode(byte, instr.byte_offset).to_string());
            }
        }

        Ok(false)
    }

    /// Pops the topmost frame and hands its result to the caller. A `new`
    /// handler's frame carries a `return_override` (the instance being
    /// constructed) that wins over whatever the handler itself returned, so
    /// `on new me ... return me` and a parent script with no `new` handler
    /// at all both resolve to the same instance.
    fn finish_frame(&mut self, value: Value) {
        let frame = self.frames.pop().unwrap();
        let result = frame.return_override.unwrap_or(value);
        self.last_return = Some(result.clone());
        if let Some(parent) = self.frames.last_mut() {
            parent.operand_stack.push(result);
        }
    }

    fn call(
        &mut self,
        cast: &mut Manager,
        location: HandlerLocation,
        args: Vec<Value>,
        receiver: Value,
        return_override: Option<Value>,
    ) -> Result<()> {
        let script_rc = cast.script(location.script).ok_or(Error::UnresolvedHandler(Symbol::new("?")))?;
        let handler = &script_rc.handlers[location.handler_index];
        let mut locals = vec![Value::Void; handler.local_name_ids.len()];
        for (i, value) in args.iter().enumerate() {
            if i < locals.len() {
                locals[i] = value.clone();
            }
        }
        self.frames.push(CallFrame {
            script: location.script,
            script_rc,
            handler_index: location.handler_index,
            pc: 0,
            operand_stack: Vec::new(),
            locals,
            args,
            receiver,
            return_override,
        });
        Ok(())
    }

    fn dispatch_ext_call(&mut self, cast: &mut Manager, instr: Instruction) -> Result<()> {
        let argc = instr.argc() as usize;
        let name = self.resolve_current_name(cast, instr.name_id());
        let args = self.pop_n(argc)?;
        let receiver = self.frames.last().unwrap().receiver.clone();

        let Some(name) = name else {
            self.push(Value::Void);
            return Ok(());
        };

        let mut registry = std::mem::take(&mut self.builtins);
        let outcome = registry.call(&name, &args, self, cast);
        self.builtins = registry;
        if let Some(value) = outcome {
            self.push(value);
            return Ok(());
        }

        match self.resolve_ext_call(cast, &name, &receiver) {
            Some(location) => self.call(cast, location, args, receiver, None)?,
            None => {
                self.trace_error(&format!("unknown handler: {}", name));
                self.push(Value::Void);
            }
        }
        Ok(())
    }

    fn literal_value(&self, index: usize) -> Value {
        let frame = self.frames.last().unwrap();
        match frame.script_rc.literals.get(index) {
            Some(script::Literal::Int(i)) => Value::Int(*i),
            Some(script::Literal::Float(f)) => Value::Float(*f),
            Some(script::Literal::String(s)) => Value::String(s.clone()),
            None => Value::Void,
        }
    }

    fn resolve_current_name(&self, cast: &Manager, name_id: u32) -> Option<Symbol> {
        let script = self.frames.last()?.script;
        cast.resolve_name(script, name_id)
    }

    fn get_prop(&mut self, receiver: &Value, name: &Symbol) -> Option<Value> {
        match receiver {
            Value::ScriptInstance(instance) => instance.borrow().properties.get_prop(name).cloned(),
            other => self.builtins.get_property(other, name),
        }
    }

    fn set_prop(&mut self, receiver: &Value, name: &Symbol, value: Value) {
        match receiver {
            Value::ScriptInstance(instance) => instance.borrow_mut().properties.set_prop(name.clone(), value),
            other => self.builtins.set_property(other, name, value),
        }
    }

    fn arithmetic(&mut self, op: Opcode) -> Result<()> {
        let b = self.pop()?.as_number();
        let a = self.pop()?.as_number();
        let (a, b, is_float) = crate::value::Number::combine(a, b);
        let result = match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => a / b,
            Opcode::Modulo => a % b,
            _ => unreachable!(),
        };
        self.push(if is_float { Value::Float(result) } else { Value::Int(result as i32) });
        Ok(())
    }

    fn compare(&mut self, op: Opcode) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match op {
            Opcode::Eq => a == b,
            Opcode::Ne => a != b,
            Opcode::Lt => a.as_number().as_f64() < b.as_number().as_f64(),
            Opcode::Le => a.as_number().as_f64() <= b.as_number().as_f64(),
            Opcode::Gt => a.as_number().as_f64() > b.as_number().as_f64(),
            Opcode::Ge => a.as_number().as_f64() >= b.as_number().as_f64(),
            _ => unreachable!(),
        };
        self.push(Value::from(result));
        Ok(())
    }

    fn jump(&mut self, after_offset: u32, delta: i32) -> Result<()> {
        let frame = self.frames.last_mut().unwrap();
        let target_offset = (i64::from(after_offset) + i64::from(delta)) as u32;
        let index = *frame
            .handler()
            .offset_to_index
            .get(&target_offset)
            .ok_or_else(|| Error::CorruptChunk("jump target not on instruction boundary".into()))?;
        frame.pc = index;
        Ok(())
    }

    fn push(&mut self, value: Value) {
        self.frames.last_mut().unwrap().operand_stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.frames.last_mut().unwrap().operand_stack.pop().ok_or(Error::StackUnderflow)
    }

    fn peek(&self) -> Result<&Value> {
        self.frames.last().unwrap().operand_stack.last().ok_or(Error::StackUnderflow)
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop()?);
        }
        values.reverse();
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::script_names::NameTable;
    use std::cell::RefCell;

    fn handler_from(name_id: u32, local_count: usize, code: &[u8]) -> script::Handler {
        let (instructions, offset_to_index) = bytecode::decode_instructions(code);
        script::Handler { name_id, argument_name_ids: Vec::new(), local_name_ids: vec![0; local_count], instructions, offset_to_index }
    }

    fn names(words: &[&str]) -> NameTable {
        NameTable::from_names(words.iter().map(|s| s.to_string()).collect())
    }

    /// Scenario: minimal property-list round trip. `mk()` builds a fresh
    /// prop-list, sets `#a` then `#b`, and returns it.
    #[test]
    fn builds_a_prop_list_in_insertion_order() {
        // names: 0=mk 1=a 2=b 3=setProp
        let code = [
            0x46, 0, // PropListNew 0
            0x42, 0, // SetLocal 0
            0x41, 0, // GetLocal 0
            0x82, 0, 1, // PushSymbol #a
            0x40, 1, // PushInt 1
            0x8b, 3, 3, // ExtCall setProp, argc=3
            0x02, // Pop (discard setProp's void)
            0x41, 0, // GetLocal 0
            0x82, 0, 2, // PushSymbol #b
            0x40, 2, // PushInt 2
            0x8b, 3, 3, // ExtCall setProp, argc=3
            0x02, // Pop
            0x41, 0, // GetLocal 0
            0x16, // Ret
        ];
        let script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, 1, &code)],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["mk", "a", "b", "setProp"]), scripts);

        let mut vm = Vm::new(10_000);
        let location = cast.find_handler(&Symbol::new("mk")).expect("mk handler");
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::Void);

        match result {
            Value::PropList(props) => {
                let props = props.borrow();
                let pairs: Vec<_> = props.iter().map(|(k, v)| (k.as_str().to_string(), v.to_display_string())).collect();
                assert_eq!(pairs, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
                assert_eq!(props.count(), 2);
            }
            other => panic!("expected a prop-list, got {:?}", other),
        }
    }

    /// Scenario: ancestor dispatch. `B` has no `greet` handler; its
    /// instance's `#ancestor` points at an `A` instance that does.
    #[test]
    fn ancestor_chain_resolves_an_inherited_handler() {
        // names: 0=greet
        let script_a = Script {
            kind: script::Kind::Parent,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: vec![script::Literal::String("A".to_string())],
            handlers: vec![handler_from(0, 0, &[0x83, 0, 0, 0x16])], // PushConstant 0; Ret
        };
        let script_b =
            Script { kind: script::Kind::Parent, property_name_ids: Vec::new(), global_name_ids: Vec::new(), literals: Vec::new(), handlers: Vec::new() };

        let mut scripts = std::collections::HashMap::new();
        scripts.insert(10, Rc::new(script_a));
        scripts.insert(20, Rc::new(script_b));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["greet"]), scripts);

        let a_ref = ScriptRef { cast_lib: 1, script_id: 10 };
        let b_ref = ScriptRef { cast_lib: 1, script_id: 20 };
        let a_instance = Rc::new(RefCell::new(ScriptInstance::new(a_ref)));
        let mut b_instance = ScriptInstance::new(b_ref);
        b_instance.ancestor = Value::ScriptInstance(Rc::clone(&a_instance));
        let b_instance = Rc::new(RefCell::new(b_instance));

        let vm = Vm::new(10_000);
        let location = vm
            .resolve_ancestor_chain(&cast, &b_instance, &Symbol::new("greet"))
            .expect("no cycle")
            .expect("handler found on ancestor");
        assert_eq!(location.script, a_ref);

        let mut vm = vm;
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::ScriptInstance(b_instance));
        assert_eq!(result, Value::String("A".to_string()));
    }

    /// Scenario: opcode tolerance. An unknown opcode traces an error and
    /// execution resumes at the next instruction.
    #[test]
    fn unknown_opcode_traces_and_execution_continues() {
        struct CollectingTrace {
            errors: Rc<RefCell<Vec<String>>>,
        }
        impl crate::debug::TraceListener for CollectingTrace {
            fn on_instruction(&mut self, _offset: u32, _opcode: Opcode, _arg: i32, _stack_depth: usize) {}
            fn on_handler_enter(&mut self, _script_id: u32, _handler_name: &Symbol) {}
            fn on_handler_exit(&mut self, _script_id: u32, _handler_name: &Symbol, _result: &Value) {}
            fn on_error(&mut self, message: &str) {
                self.errors.borrow_mut().push(message.to_string());
            }
        }

        // Unknown opcode 0xfe, then PUSH_INT 7, then RET: the bad byte is
        // traced and skipped, and the handler still returns 7.
        let code = [0xfe, 0x40, 7, 0x16];
        let script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, 0, &code)],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["bad"]), scripts);

        let errors = Rc::new(RefCell::new(Vec::new()));
        let mut vm = Vm::new(10_000);
        vm.set_trace_listener(Box::new(CollectingTrace { errors: Rc::clone(&errors) }));

        let location = cast.find_handler(&Symbol::new("bad")).unwrap();
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::Void);

        assert_eq!(result, Value::Int(7));
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].contains("unknown opcode"));
    }

    /// Invariant: a handler dispatched with `step_limit = N` halts after
    /// at most `N` instructions rather than running to completion.
    #[test]
    fn step_limit_halts_before_the_handler_returns() {
        // Five instructions (PushVoid, Pop, PushVoid, Pop, Ret); a limit of
        // two lets only the first two run.
        let code = [0x01, 0x02, 0x01, 0x02, 0x16];
        let script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, 0, &code)],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["loop"]), scripts);

        let mut vm = Vm::new(2);
        let location = cast.find_handler(&Symbol::new("loop")).unwrap();
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::Void);
        assert_eq!(result, Value::Void);
        assert_eq!(vm.step_limit, 0);
    }

    /// Invariant: built-in resolution is case-insensitive for every
    /// casing of the same name.
    #[test]
    fn builtin_dispatch_is_case_insensitive() {
        let mut registry = builtins::Registry::new();
        let mut cast = Manager::new();
        let mut vm = Vm::new(1_000);
        for casing in ["sqrt", "Sqrt", "SQRT", "sQrT"] {
            let result = registry.call(&Symbol::new(casing), &[Value::Float(9.0)], &mut vm, &mut cast);
            assert_eq!(result, Some(Value::Float(3.0)));
        }
    }

    /// Scenario: `new(#ball)` on a parent script that defines its own `new`
    /// handler. The handler sets a property on `me` and returns an
    /// unrelated value (7); the `New` instruction's result must still be
    /// the instance it built, with that property set, not the handler's
    /// own return value.
    #[test]
    fn new_with_handler_returns_the_instance_not_the_handlers_own_return_value() {
        // names: 0=new 1=x 2=Ball
        let new_code = [
            0x40, 42, // PushInt 42
            0x87, 0, 1, // SetProp #x
            0x40, 7, // PushInt 7 (deliberately not `me`)
            0x16, // Ret
        ];
        let ball_script = Script {
            kind: script::Kind::Parent,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, 0, &new_code)],
        };
        let caller_code = [
            0x8d, 2, 0, // New #Ball, argc=0
            0x16, // Ret
        ];
        let caller_script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(99, 0, &caller_code)],
        };

        let mut scripts = std::collections::HashMap::new();
        scripts.insert(5, Rc::new(ball_script));
        scripts.insert(1, Rc::new(caller_script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["new", "x", "Ball"]), scripts);
        cast.install_test_named_member(1, 10, "Ball", 5);

        let mut vm = Vm::new(10_000);
        let location = HandlerLocation { script: ScriptRef { cast_lib: 1, script_id: 1 }, handler_index: 0 };
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::Void);

        match result {
            Value::ScriptInstance(instance) => {
                assert_eq!(instance.borrow().script, ScriptRef { cast_lib: 1, script_id: 5 });
                assert_eq!(instance.borrow().properties.get_prop(&Symbol::new("x")), Some(&Value::Int(42)));
            }
            other => panic!("expected a script instance, got {:?}", other),
        }
    }

    /// Scenario: `new(#ball)` on a parent script with no `new` handler at
    /// all. The instance is still produced, with no frame ever pushed for
    /// a handler that doesn't exist.
    #[test]
    fn new_without_handler_still_produces_an_instance() {
        // names: 0=Ball
        let ball_script =
            Script { kind: script::Kind::Parent, property_name_ids: Vec::new(), global_name_ids: Vec::new(), literals: Vec::new(), handlers: Vec::new() };
        let caller_code = [
            0x8d, 0, 0, // New #Ball, argc=0
            0x16, // Ret
        ];
        let caller_script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(99, 0, &caller_code)],
        };

        let mut scripts = std::collections::HashMap::new();
        scripts.insert(5, Rc::new(ball_script));
        scripts.insert(1, Rc::new(caller_script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["Ball"]), scripts);
        cast.install_test_named_member(1, 10, "Ball", 5);

        let mut vm = Vm::new(10_000);
        let location = HandlerLocation { script: ScriptRef { cast_lib: 1, script_id: 1 }, handler_index: 0 };
        let result = vm.execute_handler(&mut cast, location, Vec::new(), Value::Void);

        match result {
            Value::ScriptInstance(instance) => {
                assert_eq!(instance.borrow().script, ScriptRef { cast_lib: 1, script_id: 5 });
            }
            other => panic!("expected a script instance, got {:?}", other),
        }
    }

    /// Scenario: an unconditional breakpoint on the `Add` instruction parks
    /// `step_frame_async` without popping the frame, and clearing it lets a
    /// later call run the handler to completion.
    #[test]
    fn step_frame_async_suspends_at_a_breakpoint_then_resumes() {
        // names: 0=addOne
        let code = [
            0x40, 1, // offset 0: PushInt 1
            0x40, 2, // offset 2: PushInt 2
            0x05, // offset 4: Add
            0x16, // offset 5: Ret
        ];
        let script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, 0, &code)],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["addOne"]), scripts);

        let mut vm = Vm::new(10_000);
        let location = cast.find_handler(&Symbol::new("addOne")).expect("addOne handler");
        vm.debug.set_breakpoint(location.script.script_id, 4);

        vm.frames.push(CallFrame {
            script: location.script,
            script_rc: cast.script(location.script).unwrap(),
            handler_index: location.handler_index,
            pc: 0,
            operand_stack: Vec::new(),
            locals: Vec::new(),
            args: Vec::new(),
            receiver: Value::Void,
            return_override: None,
        });

        let mut budget = 10_000;
        let outcome = vm.step_frame_async(&mut cast, &mut budget).unwrap();
        assert_eq!(outcome, StepOutcome::Suspended(SuspendReason::Breakpoint { script_id: location.script.script_id, byte_offset: 4 }));
        assert_eq!(vm.frames.len(), 1);
        assert!(vm.debug.is_paused());

        // A paused VM keeps parking even if the breakpoint is still live.
        let outcome = vm.step_frame_async(&mut cast, &mut budget).unwrap();
        assert_eq!(outcome, StepOutcome::Suspended(SuspendReason::DebugPause));

        vm.debug.resume();
        vm.debug.clear_breakpoint(location.script.script_id, 4);
        let outcome = vm.step_frame_async(&mut cast, &mut budget).unwrap();
        assert_eq!(outcome, StepOutcome::Returned(Value::Int(3)));
    }

    /// Scenario: a conditional breakpoint only fires once its expression,
    /// evaluated against the current frame's locals, is true.
    #[test]
    fn conditional_breakpoint_only_pauses_once_its_condition_holds() {
        // names: 0=tick 1=n
        let code = [
            0x41, 0, // offset 0: GetLocal 0 (n)
            0x40, 1, // offset 2: PushInt 1
            0x05, // offset 4: Add
            0x42, 0, // offset 6: SetLocal 0
            0x41, 0, // offset 8: GetLocal 0
            0x16, // offset 10: Ret
        ];
        let (instructions, offset_to_index) = bytecode::decode_instructions(&code);
        let script = Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![script::Handler { name_id: 0, argument_name_ids: Vec::new(), local_name_ids: vec![1], instructions, offset_to_index }],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names(&["tick", "n"]), scripts);

        let mut vm = Vm::new(10_000);
        let location = cast.find_handler(&Symbol::new("tick")).expect("tick handler");
        vm.debug.set_conditional_breakpoint(location.script.script_id, 0, "n == 1");

        vm.frames.push(CallFrame {
            script: location.script,
            script_rc: cast.script(location.script).unwrap(),
            handler_index: location.handler_index,
            pc: 0,
            operand_stack: Vec::new(),
            locals: vec![Value::Int(0)],
            args: Vec::new(),
            receiver: Value::Void,
            return_override: None,
        });

        let mut budget = 10_000;
        // n starts at 0: the condition at offset 0 is false, so this runs
        // to completion without pausing.
        let outcome = vm.step_frame_async(&mut cast, &mut budget).unwrap();
        assert_eq!(outcome, StepOutcome::Returned(Value::Int(1)));

        // Re-run with n already at 1: the same condition now holds, so this
        // time the breakpoint at offset 0 fires before a single instruction
        // of the fresh frame executes.
        vm.frames.push(CallFrame {
            script: location.script,
            script_rc: cast.script(location.script).unwrap(),
            handler_index: location.handler_index,
            pc: 0,
            operand_stack: Vec::new(),
            locals: vec![Value::Int(1)],
            args: Vec::new(),
            receiver: Value::Void,
            return_override: None,
        });
        let outcome = vm.step_frame_async(&mut cast, &mut budget).unwrap();
        assert_eq!(outcome, StepOutcome::Suspended(SuspendReason::Breakpoint { script_id: location.script.script_id, byte_offset: 0 }));
        assert_eq!(vm.frames.len(), 1);
    }
}

