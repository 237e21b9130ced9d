//! Runtime score state: which sprite channels are active in the current
//! frame, derived by diffing consecutive frame records from the decoded
//! score chunk.

use crate::resources::score::{FrameRecord, Score, SpriteRecord};
use std::collections::HashMap;

pub struct RuntimeScore {
    decoded: Score,
    active: HashMap<u16, SpriteRecord>,
}

impl RuntimeScore {
    #[must_use]
    pub fn new(decoded: Score) -> Self {
        Self { decoded, active: HashMap::new() }
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.decoded.frames.len()
    }

    #[must_use]
    pub fn frame(&self, frame_num: u32) -> Option<&FrameRecord> {
        self.decoded.frames.get(frame_num.checked_sub(1)? as usize)
    }

    #[must_use]
    pub fn tempo_for(&self, frame_num: u32, base_tempo: u8) -> u8 {
        self.frame(frame_num).and_then(|f| f.tempo_override).unwrap_or(base_tempo)
    }

    /// Advances the tracked active-channel set to `frame_num`'s sprites,
    /// returning `(began, ended)` channel numbers in ascending order.
    pub fn enter_frame(&mut self, frame_num: u32) -> (Vec<u16>, Vec<u16>) {
        let sprites = self.frame(frame_num).map(|f| f.sprites.clone()).unwrap_or_default();

        let mut began: Vec<u16> = sprites.keys().filter(|ch| !self.active.contains_key(ch)).copied().collect();
        let mut ended: Vec<u16> = self.active.keys().filter(|ch| !sprites.contains_key(ch)).copied().collect();
        began.sort_unstable();
        ended.sort_unstable();

        self.active = sprites;
        (began, ended)
    }

    #[must_use]
    pub fn active_sprite(&self, channel: u16) -> Option<&SpriteRecord> {
        self.active.get(&channel)
    }

    pub fn active_channels(&self) -> impl Iterator<Item = u16> + '_ {
        self.active.keys().copied()
    }
}
