//! Frame dispatch: the `tick()` loop that drives `PREPARE_FRAME`,
//! `ENTER_FRAME`, exiting behaviors, and sprite begin/end events.

use super::score::RuntimeScore;
use crate::{
    builtins::GotoTarget,
    cast::Manager,
    value::{Symbol, Value},
    vm::Vm,
};

/// What happened during one `tick()`, for callers that want to observe or
/// test frame dispatch without re-deriving it from score state.
#[derive(Clone, Debug, Default)]
pub struct TickReport {
    pub frame: u32,
    pub began: Vec<u16>,
    pub ended: Vec<u16>,
}

pub struct Movie {
    pub cast: Manager,
    pub vm: Vm,
    score: RuntimeScore,
    frame_labels: Vec<(String, u32)>,
    current_frame: u32,
    next_frame_override: Option<u32>,
    base_tempo: u8,
    is_playing: bool,
}

impl Movie {
    #[must_use]
    pub fn new(cast: Manager, vm: Vm, score: RuntimeScore, frame_labels: Vec<(String, u32)>, base_tempo: u8) -> Self {
        Self {
            cast,
            vm,
            score,
            frame_labels,
            current_frame: 1,
            next_frame_override: None,
            base_tempo,
            is_playing: false,
        }
    }

    #[must_use]
    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.score.frame_count()
    }

    /// The members occupying a sprite channel in the current frame, in
    /// channel order; the runtime hands this to the presenter as part of
    /// a frame snapshot.
    #[must_use]
    pub fn active_sprite_members(&self) -> Vec<crate::value::MemberRef> {
        let mut channels: Vec<u16> = self.score.active_channels().collect();
        channels.sort_unstable();
        channels.iter().filter_map(|&ch| self.score.active_sprite(ch)).map(|sprite| sprite.member).collect()
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    #[must_use]
    pub fn tempo(&self) -> u8 {
        self.score.tempo_for(self.current_frame, self.base_tempo)
    }

    pub fn play(&mut self) {
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn resume(&mut self) {
        self.is_playing = true;
    }

    pub fn stop(&mut self) {
        self.is_playing = false;
        self.current_frame = 1;
        self.next_frame_override = None;
    }

    pub fn go_to_frame(&mut self, frame_num: u32) {
        self.next_frame_override = Some(frame_num);
    }

    pub fn go_to_label(&mut self, label: &str) -> bool {
        if let Some((_, frame)) = self.frame_labels.iter().find(|(name, _)| name == label) {
            self.next_frame_override = Some(*frame);
            true
        } else {
            false
        }
    }

    /// One iteration of the frame loop: `PREPARE_FRAME`, `ENTER_FRAME`,
    /// behaviors' `exitFrame`, then advance and fire channel begin/end
    /// events for the frame now entered.
    pub fn tick(&mut self) -> TickReport {
        self.dispatch_movie_event("prepareFrame");
        self.dispatch_enter_frame();
        self.dispatch_exit_frame();

        let next = self.next_frame_override.take().unwrap_or(self.current_frame + 1);
        self.current_frame = if next > self.score.frame_count() as u32 { 1 } else { next };

        let (began, ended) = self.score.enter_frame(self.current_frame);
        for &channel in &ended {
            self.dispatch_sprite_event(channel, "endSprite");
        }
        for &channel in &began {
            self.dispatch_sprite_event(channel, "beginSprite");
        }

        TickReport { frame: self.current_frame, began, ended }
    }

    fn dispatch_enter_frame(&mut self) {
        self.dispatch_movie_event("enterFrame");
        let channels: Vec<u16> = self.score.active_channels().collect();
        for channel in channels {
            self.dispatch_sprite_event(channel, "enterFrame");
        }
    }

    fn dispatch_exit_frame(&mut self) {
        let channels: Vec<u16> = self.score.active_channels().collect();
        for channel in channels {
            self.dispatch_sprite_event(channel, "exitFrame");
        }
    }

    fn dispatch_movie_event(&mut self, name: &str) {
        let name = Symbol::new(name);
        if let Some(location) = self.cast.find_handler(&name) {
            self.vm.execute_handler(&mut self.cast, location, Vec::new(), Value::Void);
            self.apply_pending_goto();
        }
    }

    fn dispatch_sprite_event(&mut self, channel: u16, name: &str) {
        let Some(sprite) = self.score.active_sprite(channel).copied() else { return };
        let name = Symbol::new(name);
        if let Some(location) = self.cast.find_handler_in_script_at(sprite.member.cast_lib, sprite.member.member, &name) {
            self.vm.execute_handler(&mut self.cast, location, vec![Value::SpriteRef(channel)], Value::Void);
            self.apply_pending_goto();
        }
    }

    fn apply_pending_goto(&mut self) {
        match self.vm.builtins.take_pending_goto() {
            Some(GotoTarget::Frame(frame_num)) => self.go_to_frame(frame_num),
            Some(GotoTarget::Label(label)) => {
                self.go_to_label(&label);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::Rect,
        resources::{
            score::{FrameRecord, Score, SpriteKind, SpriteRecord},
            script,
            script_names::NameTable,
        },
        value::MemberRef,
        vm::bytecode,
    };
    use std::rc::Rc;

    fn handler_from(name_id: u32, code: &[u8]) -> script::Handler {
        let (instructions, offset_to_index) = bytecode::decode_instructions(code);
        script::Handler { name_id, argument_name_ids: Vec::new(), local_name_ids: Vec::new(), instructions, offset_to_index }
    }

    fn sprite(member: u16) -> SpriteRecord {
        SpriteRecord { kind: SpriteKind::Bitmap, member: MemberRef::new(1, member), ink: 0, fore_color_index: 0, back_color_index: 0, rect: Rect::default() }
    }

    /// Scenario: a sprite behavior's `enterFrame` calls `go(4)`. The sprite
    /// only becomes active (and so dispatchable) once its channel is
    /// entered, so the first tick merely activates it; the behavior's
    /// `go(4)` then takes effect on the following advance, and holds at 4
    /// as long as the sprite keeps redirecting there.
    #[test]
    fn enter_frame_behavior_redirects_playback_with_go() {
        // names: 0=enterFrame 1=go
        let code = [
            0x40, 4, // PushInt 4
            0x8b, 1, 1, // ExtCall go, argc=1, name_id=1
            0x16, // Ret
        ];
        let script = script::Script {
            kind: script::Kind::Behavior,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, &code)],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(script));

        let mut cast = Manager::new();
        cast.install_test_library(1, NameTable::from_names(vec!["enterFrame".to_string(), "go".to_string()]), scripts);
        cast.install_test_member(1, 10, 1);

        let mut frames = Vec::new();
        for _ in 0..4 {
            let mut frame = FrameRecord::default();
            frame.sprites.insert(1, sprite(10));
            frames.push(frame);
        }
        let score = RuntimeScore::new(Score { frames });

        let mut movie = Movie::new(cast, Vm::new(10_000), score, Vec::new(), 30);

        let report = movie.tick();
        assert_eq!(report.frame, 2);
        assert_eq!(report.began, vec![1]);

        let report = movie.tick();
        assert_eq!(report.frame, 4);

        let report = movie.tick();
        assert_eq!(report.frame, 4);
    }

    struct RecordingTrace {
        log: Rc<std::cell::RefCell<Vec<String>>>,
    }

    impl crate::debug::TraceListener for RecordingTrace {
        fn on_instruction(&mut self, _offset: u32, _opcode: bytecode::Opcode, _arg: i32, _stack_depth: usize) {}

        fn on_handler_enter(&mut self, script_id: u32, handler_name: &Symbol) {
            self.log.borrow_mut().push(format!("{script_id}/{}", handler_name.as_str()));
        }

        fn on_handler_exit(&mut self, _script_id: u32, _handler_name: &Symbol, _result: &Value) {}

        fn on_error(&mut self, _message: &str) {}
    }

    /// Invariant: within one `tick()`, `prepareFrame` and `enterFrame` fire
    /// at the movie level before the current frame's sprites see their own
    /// `enterFrame`, which in turn comes before `exitFrame`; `beginSprite`
    /// only fires for a channel once it's newly active, which (per
    /// `enter_frame_behavior_redirects_playback_with_go` above) is the tick
    /// after the channel was entered, not the one that entered it.
    #[test]
    fn frame_events_dispatch_in_documented_order() {
        // names: 0=prepareFrame 1=enterFrame 2=exitFrame 3=beginSprite
        let names = NameTable::from_names(vec![
            "prepareFrame".to_string(),
            "enterFrame".to_string(),
            "exitFrame".to_string(),
            "beginSprite".to_string(),
        ]);

        let movie_script = script::Script {
            kind: script::Kind::Movie,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(0, &[0x16]), handler_from(1, &[0x16])],
        };
        let sprite_script = script::Script {
            kind: script::Kind::Behavior,
            property_name_ids: Vec::new(),
            global_name_ids: Vec::new(),
            literals: Vec::new(),
            handlers: vec![handler_from(1, &[0x16]), handler_from(2, &[0x16]), handler_from(3, &[0x16])],
        };
        let mut scripts = std::collections::HashMap::new();
        scripts.insert(1, Rc::new(movie_script));
        scripts.insert(2, Rc::new(sprite_script));

        let mut cast = Manager::new();
        cast.install_test_library(1, names, scripts);
        cast.install_test_member(1, 10, 2);
        cast.install_test_member(1, 11, 2);

        let mut frame1 = FrameRecord::default();
        frame1.sprites.insert(1, sprite(10));
        let mut frame2 = FrameRecord::default();
        frame2.sprites.insert(1, sprite(10));
        frame2.sprites.insert(2, sprite(11));
        let score = RuntimeScore::new(Score { frames: vec![frame1, frame2] });

        let mut vm = Vm::new(10_000);
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        vm.set_trace_listener(Box::new(RecordingTrace { log: Rc::clone(&log) }));

        let mut movie = Movie::new(cast, vm, score, Vec::new(), 30);

        let report = movie.tick();
        assert_eq!(report.frame, 2);
        assert_eq!(report.began, vec![1, 2]);

        movie.tick();

        assert_eq!(
            *log.borrow(),
            vec![
                "1/prepareFrame".to_string(),
                "1/enterFrame".to_string(),
                "2/beginSprite".to_string(),
                "2/beginSprite".to_string(),
                "1/prepareFrame".to_string(),
                "1/enterFrame".to_string(),
                "2/enterFrame".to_string(),
                "2/enterFrame".to_string(),
                "2/exitFrame".to_string(),
                "2/exitFrame".to_string(),
            ]
        );
    }
}
