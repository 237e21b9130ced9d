//! Small value types shared by the container and resource decoders.
//!
//! Replaces the GUI toolkit's platform layer with the handful of plain
//! value types the chunk format actually needs: four-byte chunk tags,
//! Pascal-style strings, and 2D points/rects.

use byteorder::{BigEndian, ReadBytesExt};
use derive_more::{Display, From};
use std::{
    convert::TryFrom,
    fmt,
    io::{self, Read},
};

/// A four-byte chunk/resource tag, e.g. `RIFX`, `CFTC`, `KEY*`.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct OsType([u8; 4]);

impl OsType {
    #[must_use]
    pub fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<&[u8; 4]> for OsType {
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

impl From<u32> for OsType {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<OsType> for u32 {
    fn from(value: OsType) -> Self {
        u32::from_be_bytes(value.0)
    }
}

impl fmt::Debug for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OsType({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

pub trait OsTypeReadExt: Read {
    fn read_os_type(&mut self) -> io::Result<OsType> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(OsType(buf))
    }
}

impl<T: Read + ?Sized> OsTypeReadExt for T {}

/// Identifies a chunk inside a cast library by tag and 1-indexed number.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId {
    kind: OsType,
    id: i16,
}

impl ResourceId {
    #[must_use]
    pub fn new(kind: OsType, id: i16) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub fn kind(&self) -> OsType {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> i16 {
        self.id
    }
}

impl From<(OsType, i16)> for ResourceId {
    fn from((kind, id): (OsType, i16)) -> Self {
        Self::new(kind, id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

/// A length-prefixed byte string, decoded lossily to UTF-8 on read.
#[derive(Clone, Debug, Default, Display, Eq, PartialEq)]
pub struct PString(String);

impl PString {
    pub fn read(reader: &mut impl Read) -> io::Result<Self> {
        let len = reader.read_u8()?;
        let mut buf = vec![0; len.into()];
        reader.read_exact(&mut buf)?;
        Ok(Self(libcommon::encodings::decode_lossy(&buf)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<PString> for String {
    fn from(value: PString) -> Self {
        value.0
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, From, PartialEq)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub fn read(reader: &mut impl Read) -> io::Result<Self> {
        let y = reader.read_i16::<BigEndian>()?;
        let x = reader.read_i16::<BigEndian>()?;
        Ok(Self { x, y })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, From, PartialEq)]
pub struct Rect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

impl Rect {
    pub const SIZE: u32 = 8;

    pub fn read(reader: &mut impl Read) -> io::Result<Self> {
        let top = reader.read_i16::<BigEndian>()?;
        let left = reader.read_i16::<BigEndian>()?;
        let bottom = reader.read_i16::<BigEndian>()?;
        let right = reader.read_i16::<BigEndian>()?;
        Ok(Self { top, left, bottom, right })
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        i32::from(self.right) - i32::from(self.left)
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        i32::from(self.bottom) - i32::from(self.top)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[allow(clippy::fallible_impl_from)]
impl TryFrom<u32> for Color {
    type Error = core::convert::Infallible;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let bytes = value.to_be_bytes();
        Ok(Self { r: bytes[1], g: bytes[2], b: bytes[3] })
    }
}
