//! The built-in handler registry: math, string, list, symbol/type,
//! cast/member, score/sprite, movie-properties, net I/O, and timeout ops.
//! Each group is a plain function table dispatched by name; state that
//! must persist across calls (movie properties, net tasks) lives on
//! `Registry` itself.

mod list_ops;
mod math_ops;
mod string_ops;

use crate::{
    cast::Manager,
    platform::Rect,
    timeout::TimeoutManager,
    value::{Symbol, Value},
    vm::Vm,
};
use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// Collaborator the runtime wires in for `preloadNetThing`/`getNetText`.
pub trait Fetcher {
    fn start_fetch(&mut self, url: &str) -> u32;
    fn poll(&mut self, task_id: u32) -> NetStatus;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetStatus {
    Pending,
    Done(String),
    Failed(String),
}

/// `go(frame)`/`go(label)`'s effect: the frame dispatcher applies this at
/// the next advance step rather than jumping immediately.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GotoTarget {
    Frame(u32),
    Label(String),
}

#[derive(Default)]
pub struct Registry {
    item_delimiter: String,
    mouse_h: i32,
    mouse_v: i32,
    timer_ms: i64,
    last_key: String,
    key_pressed: String,
    stage_rect: Rect,
    net_tasks: HashMap<u32, NetStatus>,
    next_task_id: u32,
    fetcher: Option<Rc<RefCell<dyn Fetcher>>>,
    timeouts: Option<Rc<RefCell<TimeoutManager>>>,
    external_params: HashMap<String, String>,
    pending_goto: Option<GotoTarget>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.item_delimiter = ".".to_string();
        registry
    }

    pub fn set_fetcher(&mut self, fetcher: Rc<RefCell<dyn Fetcher>>) {
        self.fetcher = Some(fetcher);
    }

    pub fn set_timeouts(&mut self, timeouts: Rc<RefCell<TimeoutManager>>) {
        self.timeouts = Some(timeouts);
    }

    pub fn set_external_params(&mut self, params: HashMap<String, String>) {
        self.external_params = params;
    }

    /// Drains the frame target `go()` queued, if any, so the frame
    /// dispatcher can apply it at the next advance step.
    pub fn take_pending_goto(&mut self) -> Option<GotoTarget> {
        self.pending_goto.take()
    }

    pub fn set_mouse(&mut self, h: i32, v: i32) {
        self.mouse_h = h;
        self.mouse_v = v;
    }

    pub fn set_last_key(&mut self, key: impl Into<String>) {
        self.last_key = key.into();
    }

    pub fn set_key_pressed(&mut self, key: impl Into<String>) {
        self.key_pressed = key.into();
    }

    pub fn set_stage_rect(&mut self, rect: Rect) {
        self.stage_rect = rect;
    }

    pub fn advance_timer(&mut self, delta_ms: i64) {
        self.timer_ms += delta_ms;
    }

    /// Dispatches `name(args)`. Returns `None` if no built-in matches,
    /// so the caller can fall back to script/ancestor resolution.
    pub fn call(&mut self, name: &Symbol, args: &[Value], vm: &mut Vm, cast: &mut Manager) -> Option<Value> {
        let lowercased = name.as_str().to_ascii_lowercase();
        let key = lowercased.as_str();

        if let Some(v) = math_ops::call(key, args) {
            return Some(v);
        }
        if let Some(v) = string_ops::call(key, args, &self.item_delimiter) {
            return Some(v);
        }
        if let Some(v) = list_ops::call(key, args) {
            return Some(v);
        }

        match key {
            "symbol" => Some(Value::Symbol(Symbol::new(args.first()?.to_display_string()))),
            "ilk" => Some(Value::Symbol(args.first()?.type_symbol())),

            "member" => {
                let number = args.first()?.as_number().as_f64() as u16;
                let cast_lib = args.get(1).map_or(1, |v| v.as_number().as_f64() as u16);
                cast.member(cast_lib, number).map(|m| Value::CastMemberRef(crate::value::MemberRef::new(cast_lib, m.number)))
            }
            "castlib" => {
                let number = args.first()?.as_number().as_f64() as u16;
                cast.castlib_by_number(number).map(|_| Value::CastLibRef(number))
            }
            "findempty" => None,

            "go" => {
                self.pending_goto = Some(match args.first()? {
                    Value::Symbol(s) => GotoTarget::Label(s.as_str().to_string()),
                    Value::String(s) => GotoTarget::Label(s.clone()),
                    other => GotoTarget::Frame(other.as_number().as_f64() as u32),
                });
                Some(Value::Void)
            }

            "externalparamvalue" => {
                let name = args.first()?.to_display_string();
                Some(self.external_params.get(&name).cloned().map_or(Value::Void, Value::String))
            }

            "the itemdelimiter" => Some(Value::String(self.item_delimiter.clone())),
            "the mouseh" => Some(Value::Int(self.mouse_h)),
            "the mousev" => Some(Value::Int(self.mouse_v)),
            "the timer" => Some(Value::Int(self.timer_ms as i32)),
            "the lastkey" => Some(Value::String(self.last_key.clone())),

            "preloadnetthing" => {
                let url = args.first()?.to_display_string();
                let fetcher = self.fetcher.clone()?;
                let task_id = fetcher.borrow_mut().start_fetch(&url);
                self.net_tasks.insert(task_id, NetStatus::Pending);
                Some(Value::Int(task_id as i32))
            }
            "netdone" => {
                let task_id = args.first()?.as_number().as_f64() as u32;
                self.poll_task(task_id);
                let done = matches!(self.net_tasks.get(&task_id), Some(NetStatus::Done(_)) | Some(NetStatus::Failed(_)));
                Some(Value::Int(i32::from(done)))
            }
            "neterror" => {
                let task_id = args.first()?.as_number().as_f64() as u32;
                self.poll_task(task_id);
                match self.net_tasks.get(&task_id) {
                    Some(NetStatus::Failed(msg)) => Some(Value::String(msg.clone())),
                    _ => Some(Value::String(String::new())),
                }
            }
            "getnettext" => {
                let task_id = args.first()?.as_number().as_f64() as u32;
                self.poll_task(task_id);
                match self.net_tasks.get(&task_id) {
                    Some(NetStatus::Done(body)) => Some(Value::String(body.clone())),
                    _ => Some(Value::Void),
                }
            }

            "timeoutnew" => {
                let timeouts = self.timeouts.clone()?;
                let name = args.first()?.to_display_string();
                let period_ms = args.get(1)?.as_number().as_f64() as u32;
                let handler = match args.get(2) {
                    Some(Value::Symbol(s)) => s.clone(),
                    _ => return Some(Value::Void),
                };
                let target = args.get(3).cloned().unwrap_or(Value::Void);
                let persistent = args.get(4).map_or(false, Value::as_bool);
                timeouts.borrow_mut().new_timeout(name, period_ms, handler, target, persistent);
                Some(Value::Void)
            }
            "timeoutforget" => {
                let timeouts = self.timeouts.clone()?;
                let name = args.first()?.to_display_string();
                timeouts.borrow_mut().forget(&name);
                Some(Value::Void)
            }
            "the timeoutlist" => {
                let timeouts = self.timeouts.clone()?;
                let names = timeouts.borrow().names();
                Some(Value::list(names.into_iter().map(Value::String).collect()))
            }

            _ => {
                let _ = vm;
                None
            }
        }
    }

    fn poll_task(&mut self, task_id: u32) {
        if let Some(fetcher) = self.fetcher.clone() {
            if matches!(self.net_tasks.get(&task_id), Some(NetStatus::Pending)) {
                let status = fetcher.borrow_mut().poll(task_id);
                self.net_tasks.insert(task_id, status);
            }
        }
    }

    /// Recognized movie-level property names, regardless of what pseudo
    /// receiver (`the stage`, a sprite-ref, a cast-member-ref) `GET_PROP`
    /// was dispatched against — the same backing fields the `"the X"`
    /// arms in `call` read.
    #[must_use]
    pub fn get_property(&self, receiver: &Value, name: &Symbol) -> Option<Value> {
        let _ = receiver;
        match name.as_str().to_ascii_lowercase().as_str() {
            "itemdelimiter" => Some(Value::String(self.item_delimiter.clone())),
            "mouseh" => Some(Value::Int(self.mouse_h)),
            "mousev" => Some(Value::Int(self.mouse_v)),
            "timer" => Some(Value::Int(self.timer_ms as i32)),
            "lastkey" => Some(Value::String(self.last_key.clone())),
            "keypressed" => Some(Value::String(self.key_pressed.clone())),
            "stageleft" => Some(Value::Int(i32::from(self.stage_rect.left))),
            "stagetop" => Some(Value::Int(i32::from(self.stage_rect.top))),
            "stageright" => Some(Value::Int(i32::from(self.stage_rect.right))),
            "stagebottom" => Some(Value::Int(i32::from(self.stage_rect.bottom))),
            _ => None,
        }
    }

    pub fn set_property(&mut self, receiver: &Value, name: &Symbol, value: Value) {
        if matches!(receiver, Value::StageRef) && *name == Symbol::new("itemDelimiter") {
            self.item_delimiter = value.to_display_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_property_reads_movie_level_properties_regardless_of_receiver() {
        let mut registry = Registry::new();
        registry.set_mouse(12, 34);
        registry.advance_timer(500);
        registry.set_last_key("a");
        registry.set_key_pressed("b");
        registry.set_stage_rect(Rect { top: 0, left: 0, bottom: 480, right: 640 });

        for receiver in [Value::StageRef, Value::SpriteRef(1), Value::CastMemberRef(crate::value::MemberRef::new(1, 1)), Value::Void] {
            assert_eq!(registry.get_property(&receiver, &Symbol::new("itemDelimiter")), Some(Value::String(".".to_string())));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("mouseH")), Some(Value::Int(12)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("mouseV")), Some(Value::Int(34)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("timer")), Some(Value::Int(500)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("lastKey")), Some(Value::String("a".to_string())));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("keyPressed")), Some(Value::String("b".to_string())));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("stageLeft")), Some(Value::Int(0)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("stageTop")), Some(Value::Int(0)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("stageRight")), Some(Value::Int(640)));
            assert_eq!(registry.get_property(&receiver, &Symbol::new("stageBottom")), Some(Value::Int(480)));
        }

        assert_eq!(registry.get_property(&Value::StageRef, &Symbol::new("notAThing")), None);
    }
}
