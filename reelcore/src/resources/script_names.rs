//! Script-names chunk: the name table a script context's `name_id`
//! references resolve against.

use super::{read_str16, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameTable {
    names: Vec<String>,
}

impl NameTable {
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn decode(bytes: &[u8]) -> Result<NameTable> {
    let mut reader = Cursor::new(bytes);
    let count = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        names.push(read_str16(&mut reader)?);
    }
    Ok(NameTable { names })
}

#[cfg(test)]
impl NameTable {
    pub(crate) fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }
}
