//! Cast-list chunk: the ordered table of cast libraries a movie declares,
//! each with its name, optional external path, and preload setting.

use super::{read_str16, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Preload {
    WhenNeeded,
    AfterFrameOne,
    BeforeFrameOne,
}

impl Preload {
    fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::AfterFrameOne,
            2 => Self::BeforeFrameOne,
            _ => Self::WhenNeeded,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CastListEntry {
    pub name: String,
    pub path: Option<String>,
    pub preload: Preload,
}

pub fn decode(bytes: &[u8]) -> Result<Vec<CastListEntry>> {
    let mut reader = Cursor::new(bytes);
    let count = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;

    let mut entries = Vec::with_capacity(count.into());
    for _ in 0..count {
        let name = read_str16(&mut reader)?;
        let path = read_str16(&mut reader)?;
        let preload_raw = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
        entries.push(CastListEntry {
            name,
            path: if path.is_empty() { None } else { Some(path) },
            preload: Preload::from_u16(preload_raw),
        });
    }

    Ok(entries)
}
