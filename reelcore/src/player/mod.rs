//! Frame-dispatch and score playback state, built on top of `vm` and
//! `cast`.

pub mod movie;
mod score;

pub use movie::{Movie, TickReport};
pub use score::RuntimeScore;
