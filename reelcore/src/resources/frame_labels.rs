//! Frame-labels chunk: an ordered `label → frame_number` table.

use super::{read_str16, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

pub fn decode(bytes: &[u8]) -> Result<Vec<(String, u32)>> {
    let mut reader = Cursor::new(bytes);
    let count = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;

    let mut labels = Vec::with_capacity(count.into());
    for _ in 0..count {
        let frame_number = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
        let label = read_str16(&mut reader)?;
        labels.push((label, frame_number));
    }

    Ok(labels)
}
