//! Script chunk: handlers, the literal pool, and the property/global
//! name-id lists a script declares.

use super::{read_str16, Result};
use crate::vm::bytecode::{decode_instructions, Instruction};
use byteorder::{BigEndian, ReadBytesExt};
use std::{collections::HashMap, io::Cursor};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Score,
    Movie,
    Parent,
    Behavior,
}

impl Kind {
    fn from_u16(raw: u16) -> Self {
        match raw {
            1 => Self::Score,
            2 => Self::Behavior,
            7 => Self::Parent,
            _ => Self::Movie,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f64),
    String(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Handler {
    pub name_id: u32,
    pub argument_name_ids: Vec<u32>,
    pub local_name_ids: Vec<u32>,
    pub instructions: Vec<Instruction>,
    pub offset_to_index: HashMap<u32, usize>,
}

#[derive(Clone, Debug)]
pub struct Script {
    pub kind: Kind,
    pub property_name_ids: Vec<u32>,
    pub global_name_ids: Vec<u32>,
    pub literals: Vec<Literal>,
    pub handlers: Vec<Handler>,
}

impl Script {
    #[must_use]
    pub fn handler_by_name_id(&self, name_id: u32) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.name_id == name_id)
    }
}

pub fn decode(bytes: &[u8]) -> Result<Script> {
    let mut reader = Cursor::new(bytes);

    let kind = Kind::from_u16(read_u16(&mut reader)?);
    let property_count = read_u16(&mut reader)?;
    let global_count = read_u16(&mut reader)?;
    let literal_count = read_u16(&mut reader)?;
    let handler_count = read_u16(&mut reader)?;

    let property_name_ids = read_u32_vec(&mut reader, property_count)?;
    let global_name_ids = read_u32_vec(&mut reader, global_count)?;

    let mut literals = Vec::with_capacity(literal_count.into());
    for _ in 0..literal_count {
        let tag = reader.read_u8().map_err(crate::Error::Io)?;
        let literal = match tag {
            0 => Literal::Int(reader.read_i32::<BigEndian>().map_err(crate::Error::Io)?),
            1 => Literal::Float(reader.read_f64::<BigEndian>().map_err(crate::Error::Io)?),
            2 => Literal::String(read_str16(&mut reader)?),
            other => return Err(super::corrupt(format!("script: unknown literal tag {}", other))),
        };
        literals.push(literal);
    }

    let mut handlers = Vec::with_capacity(handler_count.into());
    for _ in 0..handler_count {
        let name_id = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
        let argc = read_u16(&mut reader)?;
        let argument_name_ids = read_u32_vec(&mut reader, argc)?;
        let local_count = read_u16(&mut reader)?;
        let local_name_ids = read_u32_vec(&mut reader, local_count)?;
        let bytecode_len = reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?;
        let start = reader.position() as usize;
        let end = start + bytecode_len as usize;
        let code = bytes.get(start..end).ok_or_else(|| super::corrupt("script: truncated bytecode"))?;
        reader.set_position(end as u64);

        let (instructions, offset_to_index) = decode_instructions(code);
        handlers.push(Handler { name_id, argument_name_ids, local_name_ids, instructions, offset_to_index });
    }

    Ok(Script { kind, property_name_ids, global_name_ids, literals, handlers })
}

fn read_u16(reader: &mut Cursor<&[u8]>) -> Result<u16> {
    reader.read_u16::<BigEndian>().map_err(crate::Error::Io)
}

fn read_u32_vec(reader: &mut Cursor<&[u8]>, count: u16) -> Result<Vec<u32>> {
    let mut values = Vec::with_capacity(count.into());
    for _ in 0..count {
        values.push(reader.read_u32::<BigEndian>().map_err(crate::Error::Io)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn write_str16(out: &mut Vec<u8>, s: &str) {
        out.write_u16::<BigEndian>(s.len() as u16).unwrap();
        out.extend_from_slice(s.as_bytes());
    }

    #[test]
    fn decodes_a_single_handler_with_one_literal() {
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(2).unwrap(); // kind = behavior
        bytes.write_u16::<BigEndian>(0).unwrap(); // property count
        bytes.write_u16::<BigEndian>(0).unwrap(); // global count
        bytes.write_u16::<BigEndian>(1).unwrap(); // literal count
        bytes.write_u16::<BigEndian>(1).unwrap(); // handler count

        bytes.write_u8(2).unwrap(); // string literal
        write_str16(&mut bytes, "hello");

        bytes.write_u32::<BigEndian>(42).unwrap(); // handler name_id
        bytes.write_u16::<BigEndian>(0).unwrap(); // argc
        bytes.write_u16::<BigEndian>(0).unwrap(); // local count
        let code = [0x01u8, 0x16]; // PUSH_VOID, RET
        bytes.write_u32::<BigEndian>(code.len() as u32).unwrap();
        bytes.extend_from_slice(&code);

        let script = decode(&bytes).unwrap();
        assert_eq!(script.kind, Kind::Behavior);
        assert_eq!(script.literals, vec![Literal::String("hello".to_string())]);
        assert_eq!(script.handlers[0].name_id, 42);
        assert_eq!(script.handlers[0].instructions.len(), 2);
        assert_eq!(script.handler_by_name_id(42).unwrap().instructions.len(), 2);
    }
}
