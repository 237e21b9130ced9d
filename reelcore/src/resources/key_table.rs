//! Key-table chunk: associations linking a member (the owner) to a child
//! chunk (most importantly, a member to its attached script).

use super::Result;
use crate::platform::{OsType, OsTypeReadExt};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyEntry {
    pub owner_id: u32,
    pub child_id: u32,
    pub kind: OsType,
}

pub fn decode(bytes: &[u8]) -> Result<Vec<KeyEntry>> {
    let mut reader = Cursor::new(bytes);
    let count = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let owner_id = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
        let child_id = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
        let kind = reader.read_os_type().map_err(crate::Error::Io)?;
        entries.push(KeyEntry { owner_id, child_id, kind });
    }

    Ok(entries)
}

/// Returns the first child of `kind` owned by `owner_id`, if any.
#[must_use]
pub fn find_child(entries: &[KeyEntry], owner_id: u32, kind: OsType) -> Option<u32> {
    entries.iter().find(|e| e.owner_id == owner_id && e.kind == kind).map(|e| e.child_id)
}
