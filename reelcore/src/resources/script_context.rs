//! Script-context chunk: the header tying a name table to the set of
//! script chunk ids that share it.

use super::Result;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScriptContext {
    pub name_table_id: u32,
    pub script_ids: Vec<u32>,
}

pub fn decode(bytes: &[u8]) -> Result<ScriptContext> {
    let mut reader = Cursor::new(bytes);
    let name_table_id = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
    let count = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
    let mut script_ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        script_ids.push(reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?);
    }
    Ok(ScriptContext { name_table_id, script_ids })
}
