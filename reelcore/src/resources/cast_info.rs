//! Cast-info chunk: per-cast-library metadata — its display name and,
//! for external casts, the path/URL it should be fetched from.

use super::{read_str16, Result};
use std::io::Cursor;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CastInfo {
    pub name: String,
    pub external_path: Option<String>,
    pub comment: String,
}

pub fn decode(bytes: &[u8]) -> Result<CastInfo> {
    let mut reader = Cursor::new(bytes);
    let name = read_str16(&mut reader)?;
    let external_path = read_str16(&mut reader)?;
    let comment = read_str16(&mut reader)?;

    Ok(CastInfo {
        name,
        external_path: if external_path.is_empty() { None } else { Some(external_path) },
        comment,
    })
}
