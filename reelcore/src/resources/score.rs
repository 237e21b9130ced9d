//! Score chunk: the frame/channel layout describing which member occupies
//! which sprite channel over which frame range.

use super::Result;
use crate::{platform::Rect, value::MemberRef};
use byteorder::{BigEndian, ReadBytesExt};
use std::{collections::HashMap, io::Cursor};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpriteKind {
    Bitmap,
    Text,
    Shape,
    Button,
    Unknown(u8),
}

impl SpriteKind {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Bitmap,
            2 => Self::Text,
            3 => Self::Shape,
            4 => Self::Button,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SpriteRecord {
    pub kind: SpriteKind,
    pub member: MemberRef,
    pub ink: u8,
    pub fore_color_index: u8,
    pub back_color_index: u8,
    pub rect: Rect,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameRecord {
    pub tempo_override: Option<u8>,
    pub sprites: HashMap<u16, SpriteRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct Score {
    pub frames: Vec<FrameRecord>,
}

pub fn decode(bytes: &[u8]) -> Result<Score> {
    let mut reader = Cursor::new(bytes);
    let frame_count = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;

    let mut frames = Vec::with_capacity(frame_count as usize);
    for _ in 0..frame_count {
        let tempo_raw = reader.read_u8().map_err(crate::Error::Io)?;
        let sprite_count = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;

        let mut sprites = HashMap::with_capacity(sprite_count.into());
        for _ in 0..sprite_count {
            let channel = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
            let cast_lib = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
            let member = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
            let kind = SpriteKind::from_u8(reader.read_u8().map_err(crate::Error::Io)?);
            let ink = reader.read_u8().map_err(crate::Error::Io)?;
            let fore_color_index = reader.read_u8().map_err(crate::Error::Io)?;
            let back_color_index = reader.read_u8().map_err(crate::Error::Io)?;
            let rect = Rect::read(&mut reader).map_err(crate::Error::Io)?;

            sprites.insert(channel, SpriteRecord {
                kind,
                member: MemberRef::new(cast_lib, member),
                ink,
                fore_color_index,
                back_color_index,
                rect,
            });
        }

        frames.push(FrameRecord { tempo_override: if tempo_raw == 0 { None } else { Some(tempo_raw) }, sprites });
    }

    Ok(Score { frames })
}
