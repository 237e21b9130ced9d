//! Typed chunk decoders: one pure `decode(bytes, file_version) -> T`
//! function per chunk kind named in the format.

pub mod cast_info;
pub mod cast_list;
pub mod cast_map;
pub mod cast_member;
pub mod config;
pub mod frame_labels;
pub mod key_table;
pub mod score;
pub mod script;
pub mod script_context;
pub mod script_names;

use crate::error::Error;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

pub type Result<T> = core::result::Result<T, Error>;

/// Reads a big-endian length-prefixed (u16 length) UTF-8/Latin-1 string,
/// the on-disk text convention documented for this format.
pub(crate) fn read_str16(reader: &mut Cursor<&[u8]>) -> Result<String> {
    let len = reader.read_u16::<BigEndian>().map_err(Error::Io)?;
    let mut buf = vec![0; len.into()];
    reader.read_exact(&mut buf).map_err(Error::Io)?;
    Ok(libcommon::encodings::decode_lossy(&buf))
}

pub(crate) fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptChunk(message.into())
}
