//! The uncompressed container: a flat memory-map table immediately
//! followed by the chunk bodies it describes.

use super::{make_record, read_chunk_header, ChunkRecord, ContainerIndex, FileVersion, Result};
use crate::{error::Error, platform::OsTypeReadExt};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::{collections::HashMap, io::Cursor, rc::Rc};

pub fn load(bytes: &[u8], big_endian: bool) -> Result<ContainerIndex> {
    let raw: Rc<[u8]> = bytes.to_vec().into();
    let mut reader = Cursor::new(bytes);
    reader.set_position(4);

    let _total_size = read_u32(&mut reader, big_endian)?;
    let count = read_u32(&mut reader, big_endian)?;

    let mut chunks = HashMap::with_capacity(count as usize);
    let mut order = Vec::with_capacity(count as usize);
    let mut root_kind = None;

    for _ in 0..count {
        let id = read_u32(&mut reader, big_endian)?;
        let (kind, offset_size) = read_chunk_header(&mut reader, big_endian).map_err(Error::Io)?;
        let offset = offset_size;
        let size = read_u32(&mut reader, big_endian)?;

        if root_kind.is_none() {
            root_kind = Some(kind);
        }

        chunks.insert(id, make_record(id, kind, offset, size, &raw));
        order.push(id);
    }

    Ok(ContainerIndex {
        root_kind: root_kind.unwrap_or_else(|| crate::platform::OsType::new(*b"\0\0\0\0")),
        version: FileVersion::default(),
        chunks,
        order,
    })
}

fn read_u32(reader: &mut Cursor<&[u8]>, big_endian: bool) -> Result<u32> {
    (if big_endian { reader.read_u32::<BigEndian>() } else { reader.read_u32::<LittleEndian>() })
        .map_err(Error::Io)
}
