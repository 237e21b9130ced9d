//! Cast-map chunk: maps each cast library number to the ordered list of
//! global member ids occupying its member-number slots.

use super::Result;
use byteorder::{BigEndian, ReadBytesExt};
use std::{collections::HashMap, io::Cursor};

pub fn decode(bytes: &[u8]) -> Result<HashMap<u16, Vec<u32>>> {
    let mut reader = Cursor::new(bytes);
    let cast_lib_count = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;

    let mut map = HashMap::with_capacity(cast_lib_count.into());
    for _ in 0..cast_lib_count {
        let cast_lib_number = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
        let member_count = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
        let mut member_ids = Vec::with_capacity(member_count.into());
        for _ in 0..member_count {
            member_ids.push(reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?);
        }
        map.insert(cast_lib_number, member_ids);
    }

    Ok(map)
}
