//! The chunked binary container: root-tag detection, the uncompressed
//! memory-map format, and the compressed ("afterburner") variant.

mod afterburner;
mod plain;

use crate::{error::Error, platform::{OsType, OsTypeReadExt}};
use byteorder::{BigEndian, ReadBytesExt};
use std::{cell::RefCell, collections::HashMap, io::Cursor, rc::Rc};

pub type Result<T> = core::result::Result<T, Error>;

/// The file-version-derived parameters that decoders need to pick field
/// widths: 2- vs 4-byte name ids, 6- vs 8-byte handler vector strides, and
/// (per the open question in the design notes) chunk index widths.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileVersion {
    pub director_version: u16,
    pub capital_x: bool,
}

impl FileVersion {
    #[must_use]
    pub fn new(director_version: u16, capital_x: bool) -> Self {
        Self { director_version, capital_x }
    }

    #[must_use]
    pub fn wide_name_ids(&self) -> bool {
        self.capital_x || self.director_version >= 1100
    }

    #[must_use]
    pub fn handler_stride(&self) -> u32 {
        if self.wide_name_ids() { 8 } else { 6 }
    }
}

impl Default for FileVersion {
    fn default() -> Self {
        Self { director_version: 1150, capital_x: false }
    }
}

/// The 16-byte compression identifier recognized kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompressionKind {
    /// Decompressed inline by the loader.
    Zlib,
    /// Stored as-is.
    Null,
    /// Opaque to the VM; surfaced as raw bytes.
    SoundCodec,
    /// Opaque to the VM; surfaced as raw bytes.
    FontMap,
    Unknown([u8; 16]),
}

const ZLIB_ID: [u8; 16] = *b"zlib\0\0\0\0\0\0\0\0\0\0\0\0";
const NULL_ID: [u8; 16] = *b"raw\0\0\0\0\0\0\0\0\0\0\0\0\0";
const SOUND_ID: [u8; 16] = *b"sound-codec\0\0\0\0\0";
const FONTMAP_ID: [u8; 16] = *b"font-map\0\0\0\0\0\0\0\0";

impl From<[u8; 16]> for CompressionKind {
    fn from(id: [u8; 16]) -> Self {
        match id {
            ZLIB_ID => Self::Zlib,
            NULL_ID => Self::Null,
            SOUND_ID => Self::SoundCodec,
            FONTMAP_ID => Self::FontMap,
            other => Self::Unknown(other),
        }
    }
}

impl CompressionKind {
    #[must_use]
    pub fn id_bytes(self) -> [u8; 16] {
        match self {
            Self::Zlib => ZLIB_ID,
            Self::Null => NULL_ID,
            Self::SoundCodec => SOUND_ID,
            Self::FontMap => FONTMAP_ID,
            Self::Unknown(id) => id,
        }
    }

    /// Whether this chunk is opaque to the VM core (sound/font data it
    /// never interprets, just hands back to the presenter/sound layer).
    #[must_use]
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::SoundCodec | Self::FontMap)
    }
}

#[derive(Debug)]
enum ChunkBytes {
    Pending,
    Loaded(Rc<[u8]>),
}

/// A single chunk's metadata plus its lazily-materialized bytes. Chunks are
/// immutable once loaded.
#[derive(Debug)]
pub struct ChunkRecord {
    pub id: u32,
    pub kind: OsType,
    pub offset: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub compression: CompressionKind,
    raw: Rc<[u8]>,
    bytes: RefCell<ChunkBytes>,
}

impl ChunkRecord {
    /// Returns the chunk's decoded bytes, decompressing on first access.
    pub fn bytes(&self) -> Result<Rc<[u8]>> {
        {
            if let ChunkBytes::Loaded(bytes) = &*self.bytes.borrow() {
                return Ok(Rc::clone(bytes));
            }
        }

        let slice = &self.raw[self.offset as usize..(self.offset + self.compressed_size) as usize];
        let decoded: Rc<[u8]> = match self.compression {
            CompressionKind::Zlib => {
                use flate2::read::ZlibDecoder;
                use std::io::Read;
                let mut out = Vec::with_capacity(self.uncompressed_size as usize);
                ZlibDecoder::new(slice)
                    .read_to_end(&mut out)
                    .map_err(|e| Error::CorruptChunk(format!("zlib: {}", e)))?;
                if out.len() as u32 != self.uncompressed_size {
                    return Err(Error::CorruptChunk(format!(
                        "decompressed size mismatch for chunk {}: expected {}, got {}",
                        self.id, self.uncompressed_size, out.len()
                    )));
                }
                out.into()
            }
            _ => slice.to_vec().into(),
        };

        *self.bytes.borrow_mut() = ChunkBytes::Loaded(Rc::clone(&decoded));
        Ok(decoded)
    }
}

/// `resource_id → ChunkRecord`, plus the designated root chunk kind.
#[derive(Debug)]
pub struct ContainerIndex {
    pub root_kind: OsType,
    pub version: FileVersion,
    chunks: HashMap<u32, ChunkRecord>,
    order: Vec<u32>,
}

impl ContainerIndex {
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&ChunkRecord> {
        self.chunks.get(&id)
    }

    #[must_use]
    pub fn first_of_kind(&self, kind: OsType) -> Option<&ChunkRecord> {
        self.order.iter().filter_map(|id| self.chunks.get(id)).find(|c| c.kind == kind)
    }

    pub fn all_of_kind(&self, kind: OsType) -> impl Iterator<Item = &ChunkRecord> {
        self.order.iter().filter_map(move |id| self.chunks.get(id)).filter(move |c| c.kind == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Parses the root tag and dispatches to the uncompressed or compressed
/// loader.
pub fn load(bytes: &[u8]) -> Result<ContainerIndex> {
    let mut reader = Cursor::new(bytes);
    let tag = reader.read_os_type().map_err(Error::Io)?;
    match tag.as_bytes() {
        b"RIFX" => plain::load(bytes, true),
        b"XFIR" => plain::load(bytes, false),
        b"FFIR" => afterburner::load(bytes),
        _ => Err(Error::BadFormat),
    }
}

fn read_chunk_header(reader: &mut Cursor<&[u8]>, big_endian: bool) -> std::io::Result<(OsType, u32)> {
    let kind = reader.read_os_type()?;
    let size = if big_endian { reader.read_u32::<BigEndian>()? } else { reader.read_u32::<byteorder::LittleEndian>()? };
    Ok((kind, size))
}

fn make_record(id: u32, kind: OsType, offset: u32, size: u32, raw: &Rc<[u8]>) -> ChunkRecord {
    ChunkRecord {
        id,
        kind,
        offset,
        compressed_size: size,
        uncompressed_size: size,
        compression: CompressionKind::Null,
        raw: Rc::clone(raw),
        bytes: RefCell::new(ChunkBytes::Pending),
    }
}
