//! Cast-member chunk: a single member's descriptor. Only the `Script`
//! kind's payload (a back-reference, resolved separately via the key
//! table) is consumed by the VM core; everything else is opaque.

use super::{read_str16, Result};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemberKind {
    Bitmap,
    Sound,
    Text,
    Shape,
    FilmLoop,
    Palette,
    Script,
    Transition,
    DigitalVideo,
    Xtra,
    Unknown(u16),
}

impl MemberKind {
    fn from_u16(raw: u16) -> Self {
        match raw {
            1 => Self::Bitmap,
            2 => Self::Text,
            3 => Self::Palette,
            4 => Self::Shape,
            6 => Self::Sound,
            7 => Self::FilmLoop,
            8 => Self::DigitalVideo,
            11 => Self::Script,
            12 => Self::Transition,
            16 => Self::Xtra,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CastMember {
    pub number: u16,
    pub id: u32,
    pub name: String,
    pub kind: MemberKind,
    pub payload: Vec<u8>,
}

pub fn decode(bytes: &[u8]) -> Result<CastMember> {
    let mut reader = Cursor::new(bytes);
    let number = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
    let id = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
    let kind_raw = reader.read_u16::<BigEndian>().map_err(crate::Error::Io)?;
    let name = read_str16(&mut reader)?;
    let payload = bytes[reader.position() as usize..].to_vec();

    Ok(CastMember { number, id, name, kind: MemberKind::from_u16(kind_raw), payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    #[test]
    fn decodes_script_member() {
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(3).unwrap();
        bytes.write_u32::<BigEndian>(301).unwrap();
        bytes.write_u16::<BigEndian>(11).unwrap();
        bytes.write_u16::<BigEndian>(4).unwrap();
        bytes.extend_from_slice(b"Util");
        bytes.extend_from_slice(&[9, 9]);

        let member = decode(&bytes).unwrap();
        assert_eq!(member.number, 3);
        assert_eq!(member.name, "Util");
        assert_eq!(member.kind, MemberKind::Script);
        assert_eq!(member.payload, vec![9, 9]);
    }
}
