//! The owning runtime: loads a movie from bytes, wires the VM's
//! collaborators (fetcher, presenter, timeouts), and drives the frame
//! loop and system-event fan-out the player/VM pieces don't know about
//! each other.

use crate::{
    builtins::Fetcher,
    cast::Manager,
    container,
    error::{Error, Result},
    platform::OsType,
    player::{Movie, RuntimeScore},
    resources,
    timeout::TimeoutManager,
    value::{MemberRef, Symbol, Value},
    vm::Vm,
};
use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// What the presenter needs to draw one frame: the sprites active in it,
/// plus the stage background color. The core never rasterizes; it only
/// hands this snapshot over.
#[derive(Clone, Debug, Default)]
pub struct FrameSnapshot {
    pub frame: u32,
    pub stage_color_index: u16,
    pub active_members: Vec<MemberRef>,
}

/// Deliberately out of scope per the core: GUI shell, stage rasterizer,
/// and bitmap decoder. Implementations live on the caller's side.
pub trait Presenter {
    fn apply_frame_snapshot(&mut self, snapshot: &FrameSnapshot);
    fn decode_bitmap(&mut self, member: MemberRef) -> Option<Vec<u8>>;
}

/// A headless stub used by tests and the CLI.
#[derive(Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn apply_frame_snapshot(&mut self, _snapshot: &FrameSnapshot) {}
    fn decode_bitmap(&mut self, _member: MemberRef) -> Option<Vec<u8>> {
        None
    }
}

/// External run-time configuration: the one piece of movie-independent
/// state a caller supplies, rather than something read off the movie
/// itself (that's `FileVersion`, via `Config::file_version`).
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub base_url: Option<String>,
    pub external_params: HashMap<String, String>,
    pub step_limit: u32,
}

impl RuntimeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self { base_url: None, external_params: HashMap::new(), step_limit: 1_000_000 }
    }
}

const CONFIG_TAG: OsType = OsType::new(*b"VWCF");
const CAST_LIST_TAG: OsType = OsType::new(*b"MCsL");
const SCORE_TAG: OsType = OsType::new(*b"VWSC");
const LABELS_TAG: OsType = OsType::new(*b"VWLB");

/// Owns the collaborators the VM and cast manager don't own themselves,
/// and provides the `load`/tick control surface described for callers.
pub struct Runtime {
    config: RuntimeConfig,
    timeouts: Rc<RefCell<TimeoutManager>>,
    presenter: Box<dyn Presenter>,
}

impl Runtime {
    #[must_use]
    pub fn new(config: RuntimeConfig, presenter: Box<dyn Presenter>) -> Self {
        Self { config, timeouts: Rc::new(RefCell::new(TimeoutManager::new())), presenter }
    }

    pub fn set_fetcher(&self, vm: &mut Vm, fetcher: Rc<RefCell<dyn Fetcher>>) {
        vm.builtins.set_fetcher(fetcher);
    }

    /// Parses `bytes` as a movie container and builds the ready-to-run
    /// `Movie`: cast manager populated from the internal cast and
    /// declared-but-unfetched externals, score/sprite state, and a VM
    /// wired with this runtime's timeouts and external parameters.
    pub fn load(&self, bytes: &[u8]) -> Result<Movie> {
        let index = container::load(bytes)?;

        let config_bytes = index.first_of_kind(CONFIG_TAG).ok_or(Error::BadFormat)?.bytes()?;
        let config = resources::config::decode(&config_bytes)?;

        let cast_list = match index.first_of_kind(CAST_LIST_TAG) {
            Some(chunk) => resources::cast_list::decode(&chunk.bytes()?)?,
            None => vec![resources::cast_list::CastListEntry {
                name: "Internal".to_string(),
                path: None,
                preload: resources::cast_list::Preload::WhenNeeded,
            }],
        };

        let mut cast = Manager::new();
        cast.install_internal(&index, &cast_list)?;

        let score = match index.first_of_kind(SCORE_TAG) {
            Some(chunk) => resources::score::decode(&chunk.bytes()?)?,
            None => resources::score::Score::default(),
        };

        let frame_labels = match index.first_of_kind(LABELS_TAG) {
            Some(chunk) => resources::frame_labels::decode(&chunk.bytes()?)?,
            None => Vec::new(),
        };

        let mut vm = Vm::new(self.config.step_limit);
        vm.builtins.set_timeouts(Rc::clone(&self.timeouts));
        vm.builtins.set_external_params(self.config.external_params.clone());

        let movie = Movie::new(cast, vm, RuntimeScore::new(score), frame_labels, config.tempo);
        Ok(movie)
    }

    /// Runs one tick and returns the frame snapshot the presenter should
    /// draw. Callers who don't need rendering can ignore the snapshot and
    /// just call `movie.tick()` directly.
    pub fn tick(&mut self, movie: &mut Movie, stage_color_index: u16) -> FrameSnapshot {
        let report = movie.tick();

        let active_members = movie.active_sprite_members();
        let snapshot = FrameSnapshot { frame: report.frame, stage_color_index, active_members };
        self.presenter.apply_frame_snapshot(&snapshot);
        snapshot
    }

    /// Fires every timeout due at `now_ms` through the movie's VM, in
    /// insertion order. This is the composition `TimeoutManager` itself
    /// deliberately avoids owning.
    pub fn dispatch_due_timeouts(&self, movie: &mut Movie, now_ms: i64) {
        let fired = self.timeouts.borrow_mut().due(now_ms);
        for (handler, target) in fired {
            if let Some(location) = self.handler_location_for(movie, &handler, &target) {
                movie.vm.execute_handler(&mut movie.cast, location, Vec::new(), target);
            }
        }
    }

    /// Fans `event_name` out to every registered timeout whose target is a
    /// script-instance, at most once per target, in timeout-registration
    /// order. Targets without the handler on their ancestor chain, and
    /// targets that aren't script-instances, are silently skipped.
    pub fn dispatch_system_event(&self, movie: &mut Movie, event_name: &str) {
        let name = Symbol::new(event_name);
        let targets = self.timeouts.borrow().snapshot_targets();
        for target in targets {
            let location = match &target {
                Value::ScriptInstance(instance) => movie.vm.resolve_ancestor_chain(&movie.cast, instance, &name).ok().flatten(),
                _ => None,
            };
            if let Some(location) = location {
                movie.vm.execute_handler(&mut movie.cast, location, Vec::new(), target);
            }
        }
    }

    fn handler_location_for(&self, movie: &Movie, handler: &Symbol, target: &Value) -> Option<crate::vm::HandlerLocation> {
        if let Value::ScriptInstance(instance) = target {
            let script_ref = instance.borrow().script;
            if let Some(index) = movie.cast.find_handler_in_script(script_ref, handler) {
                return Some(crate::vm::HandlerLocation { script: script_ref, handler_index: index });
            }
        }
        movie.cast.find_handler(handler)
    }

    /// `prepareMovie` → `startMovie`: the two handlers the control surface
    /// fires once at load time, before the first `tick()`.
    pub fn start(&self, movie: &mut Movie) {
        for event in ["prepareMovie", "startMovie"] {
            let name = Symbol::new(event);
            if let Some(location) = movie.cast.find_handler(&name) {
                movie.vm.execute_handler(&mut movie.cast, location, Vec::new(), Value::Void);
            }
        }
    }

    /// `stopMovie`, fired once when the caller is done driving the movie.
    pub fn stop(&self, movie: &mut Movie) {
        let name = Symbol::new("stopMovie");
        if let Some(location) = movie.cast.find_handler(&name) {
            movie.vm.execute_handler(&mut movie.cast, location, Vec::new(), Value::Void);
        }
    }
}
