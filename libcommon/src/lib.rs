#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::map_err_ignore,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]
#![warn(rust_2018_idioms)]

pub mod convert;
mod error;
pub mod encodings;
pub mod io;
pub mod string;
pub mod vfs;

pub use convert::{UnwrapFrom, UnwrapInto};
pub use error::{flatten_errors, ReasonsExt};
pub use io::*;
pub use string::ReadExt;

pub mod prelude {
    pub use crate::convert::{UnwrapFrom, UnwrapInto};
    pub use crate::io::{SeekExt, TakeSeekExt};
    pub use crate::string::ReadExt;
}
