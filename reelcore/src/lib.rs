#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::map_err_ignore,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
)]
#![warn(rust_2018_idioms)]

pub mod builtins;
pub mod cast;
pub mod container;
pub mod debug;
pub mod error;
pub mod platform;
pub mod player;
pub mod resources;
pub mod runtime;
pub mod timeout;
pub mod value;
pub mod vm;

pub use error::{Error, Result};
pub use runtime::Runtime;
pub use value::Value;

#[must_use]
pub fn name(with_version: bool) -> String {
    let mut name = "Reel".to_string();
    if with_version {
        name.push(' ');
        name.push_str(&version());
    }
    name
}

#[must_use]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
