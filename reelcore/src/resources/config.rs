//! Config chunk: stage geometry, tempo, color depth, and the version/flag
//! fields that drive every other decoder's field widths.

use super::{corrupt, Result};
use crate::{container::FileVersion, platform::Rect};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    pub stage_rect: Rect,
    pub tempo: u8,
    pub color_depth: u16,
    pub director_version: u16,
    pub stage_color_index: u16,
    pub capital_x: bool,
}

impl Config {
    #[must_use]
    pub fn file_version(&self) -> FileVersion {
        FileVersion::new(self.director_version, self.capital_x)
    }
}

pub fn decode(bytes: &[u8]) -> Result<Config> {
    let mut reader = Cursor::new(bytes);
    let stage_rect = Rect::read(&mut reader).map_err(|_| corrupt("config: truncated stage rect"))?;
    let tempo = reader.read_u8().map_err(|_| corrupt("config: truncated tempo"))?;
    let color_depth = reader.read_u16::<BigEndian>().map_err(|_| corrupt("config: truncated color depth"))?;
    let stage_color_index = reader.read_u16::<BigEndian>().map_err(|_| corrupt("config: truncated stage color"))?;
    let director_version = reader.read_u16::<BigEndian>().map_err(|_| corrupt("config: truncated version"))?;
    let capital_x = reader.read_u8().map_err(|_| corrupt("config: truncated capital-x flag"))? != 0;

    Ok(Config { stage_rect, tempo, color_depth, director_version, stage_color_index, capital_x })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    #[test]
    fn decodes_config_fields() {
        let mut bytes = Vec::new();
        bytes.write_i16::<BigEndian>(0).unwrap();
        bytes.write_i16::<BigEndian>(0).unwrap();
        bytes.write_i16::<BigEndian>(480).unwrap();
        bytes.write_i16::<BigEndian>(640).unwrap();
        bytes.write_u8(15).unwrap();
        bytes.write_u16::<BigEndian>(32).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes.write_u16::<BigEndian>(1150).unwrap();
        bytes.write_u8(1).unwrap();

        let config = decode(&bytes).unwrap();
        assert_eq!(config.stage_rect.width(), 640);
        assert_eq!(config.tempo, 15);
        assert_eq!(config.color_depth, 32);
        assert!(config.capital_x);
        assert!(config.file_version().wide_name_ids());
    }
}
