//! The compressed ("afterburner") container: a header table describing
//! each chunk's compression, followed by one concatenated compressed
//! segment.

use super::{ChunkBytes, ChunkRecord, CompressionKind, ContainerIndex, FileVersion, Result};
use crate::{error::Error, platform::{OsType, OsTypeReadExt}};
use byteorder::{BigEndian, ReadBytesExt};
use std::{cell::RefCell, collections::HashMap, io::Cursor, rc::Rc};

pub fn load(bytes: &[u8]) -> Result<ContainerIndex> {
    let raw: Rc<[u8]> = bytes.to_vec().into();
    let mut reader = Cursor::new(bytes);
    reader.set_position(4);

    let _total_size = reader.read_u32::<BigEndian>().map_err(Error::Io)?;
    let count = reader.read_u32::<BigEndian>().map_err(Error::Io)?;

    struct Entry {
        id: u32,
        kind: OsType,
        offset: u32,
        compressed_size: u32,
        uncompressed_size: u32,
        compression: CompressionKind,
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = reader.read_u32::<BigEndian>().map_err(Error::Io)?;
        let kind = reader.read_os_type().map_err(Error::Io)?;
        let offset = reader.read_u32::<BigEndian>().map_err(Error::Io)?;
        let compressed_size = reader.read_u32::<BigEndian>().map_err(Error::Io)?;
        let uncompressed_size = reader.read_u32::<BigEndian>().map_err(Error::Io)?;
        let mut compression_id = [0u8; 16];
        reader.read_exact(&mut compression_id).map_err(Error::Io)?;
        entries.push(Entry {
            id,
            kind,
            offset,
            compressed_size,
            uncompressed_size,
            compression: CompressionKind::from(compression_id),
        });
    }

    let segment_start = u32::try_from(reader.position()).unwrap();

    let mut chunks = HashMap::with_capacity(entries.len());
    let mut order = Vec::with_capacity(entries.len());
    let mut root_kind = None;

    for entry in entries {
        if root_kind.is_none() {
            root_kind = Some(entry.kind);
        }

        if matches!(entry.compression, CompressionKind::Unknown(_)) {
            return Err(Error::UnsupportedCompression(entry.compression));
        }

        let absolute_offset = segment_start + entry.offset;
        chunks.insert(entry.id, ChunkRecord {
            id: entry.id,
            kind: entry.kind,
            offset: absolute_offset,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            compression: entry.compression,
            raw: Rc::clone(&raw),
            bytes: RefCell::new(ChunkBytes::Pending),
        });
        order.push(entry.id);
    }

    Ok(ContainerIndex {
        root_kind: root_kind.unwrap_or_else(|| OsType::new(*b"\0\0\0\0")),
        version: FileVersion::default(),
        chunks,
        order,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    fn build_test_container() -> Vec<u8> {
        let payload = b"hello afterburner";
        let mut compressed = Vec::new();
        {
            let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
            encoder.write_all(payload).unwrap();
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"FFIR");
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(1).unwrap();

        out.write_u32::<BigEndian>(0).unwrap();
        out.extend_from_slice(b"Lscr");
        out.write_u32::<BigEndian>(0).unwrap();
        out.write_u32::<BigEndian>(compressed.len() as u32).unwrap();
        out.write_u32::<BigEndian>(payload.len() as u32).unwrap();
        out.extend_from_slice(&CompressionKind::Zlib.id_bytes());

        out.extend_from_slice(&compressed);
        out
    }

    #[test]
    fn decompresses_zlib_chunk() {
        let bytes = build_test_container();
        let index = load(&bytes).unwrap();
        let record = index.get(0).unwrap();
        assert_eq!(&*record.bytes().unwrap(), b"hello afterburner");
    }

    #[test]
    fn rejects_unknown_compression_kind() {
        let mut bytes = build_test_container();
        let id_offset = 32; // 12-byte file header + 20 bytes of fixed entry fields
        bytes[id_offset..id_offset + 16].copy_from_slice(b"mystery-codec-!!");
        assert!(matches!(load(&bytes), Err(Error::UnsupportedCompression(_))));
    }
}
