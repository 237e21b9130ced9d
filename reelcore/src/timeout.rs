//! Timeout manager: named, insertion-ordered timers plus system-event
//! fan-out. Firing has no catch-up: a timeout that missed several periods
//! while the movie was paused fires once and resets from `now_ms`.

use crate::value::{Symbol, Value};

#[derive(Clone, Debug)]
pub struct Timeout {
    pub name: String,
    pub period_ms: u32,
    pub handler: Symbol,
    pub target: Value,
    pub persistent: bool,
    next_fire_ms: i64,
}

#[derive(Default)]
pub struct TimeoutManager {
    timeouts: Vec<Timeout>,
}

impl TimeoutManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_timeout(&mut self, name: String, period_ms: u32, handler: Symbol, target: Value, persistent: bool) {
        self.timeouts.retain(|t| t.name != name);
        self.timeouts.push(Timeout { name, period_ms, handler, target, persistent, next_fire_ms: 0 });
    }

    pub fn forget(&mut self, name: &str) {
        self.timeouts.retain(|t| t.name != name);
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.timeouts.iter().map(|t| t.name.clone()).collect()
    }

    /// Returns the timeouts due to fire at `now_ms`, in insertion order,
    /// and advances their `next_fire_ms`. Call sites invoke each
    /// `(handler, target)` pair through the VM; this type has no VM
    /// dependency of its own.
    pub fn due(&mut self, now_ms: i64) -> Vec<(Symbol, Value)> {
        let mut fired = Vec::new();
        for timeout in &mut self.timeouts {
            if timeout.next_fire_ms <= now_ms {
                fired.push((timeout.handler.clone(), timeout.target.clone()));
                timeout.next_fire_ms = now_ms + i64::from(timeout.period_ms);
            }
        }
        fired
    }

    /// Snapshot of `(handler_name, target)` for every timeout whose target
    /// is a `script-instance`, used by `dispatch_system_event`. Dispatch
    /// iterates this snapshot so timeouts added mid-dispatch don't fire.
    #[must_use]
    pub fn snapshot_targets(&self) -> Vec<Value> {
        self.timeouts.iter().map(|t| t.target.clone()).collect()
    }
}
