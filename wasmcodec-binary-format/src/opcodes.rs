//! The opcode registry used to decode instructions.
//!
//! Primary opcodes index a 256 entry table directly; the two escape bytes
//! `0xFC` and `0xFE` lead into secondary tables keyed by a LEB128 sub-opcode.

use std::collections::HashMap;
use std::sync::OnceLock;

use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::instructions::Instr;
use wasmcodec_structure::opcodes::{AtomicOp, MemOp, Opcode, Plane, SimpleOp};
use wasmcodec_structure::types::Ieee32;
use wasmcodec_structure::types::Ieee64;

use super::decoder::Decoder;
use super::instructions as instr;
use super::instructions::DecodeCtx;

pub type DecodeFn = dyn for<'a, 'm> Fn(&mut Decoder<'a>, &mut DecodeCtx<'m>) -> Result<Instr> + Send + Sync;

pub enum Entry {
    /// No immediates, decoding yields the shared value.
    Singleton(SimpleOp),
    /// Reads its immediates.
    Decodable(Box<DecodeFn>),
}

impl ::std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match *self {
            Entry::Singleton(op) => write!(f, "Singleton({})", op.name()),
            Entry::Decodable(_) => f.write_str("Decodable"),
        }
    }
}

#[derive(Debug)]
pub struct OpcodeTable {
    primary: Vec<Option<Entry>>,
    misc: HashMap<u32, Entry>,
    atomic: HashMap<u32, Entry>,
}

impl OpcodeTable {
    fn empty() -> Self {
        OpcodeTable {
            primary: (0..256).map(|_| None).collect(),
            misc: HashMap::new(),
            atomic: HashMap::new(),
        }
    }

    fn insert(&mut self, opcode: Opcode, entry: Entry) {
        match opcode.plane {
            Plane::Primary => self.primary[opcode.code as usize] = Some(entry),
            Plane::Misc => {
                self.misc.insert(opcode.code, entry);
            }
            Plane::Atomic => {
                self.atomic.insert(opcode.code, entry);
            }
        }
    }

    pub fn get(&self, opcode: Opcode) -> Option<&Entry> {
        match opcode.plane {
            Plane::Primary => self.primary.get(opcode.code as usize)?.as_ref(),
            Plane::Misc => self.misc.get(&opcode.code),
            Plane::Atomic => self.atomic.get(&opcode.code),
        }
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.get(opcode).is_some()
    }
}

fn decodable<F>(f: F) -> Entry
where
    F: for<'a, 'm> Fn(&mut Decoder<'a>, &mut DecodeCtx<'m>) -> Result<Instr> + Send + Sync + 'static,
{
    Entry::Decodable(Box::new(f))
}

fn build() -> OpcodeTable {
    let mut t = OpcodeTable::empty();

    for &op in SimpleOp::ALL {
        t.insert(op.opcode(), Entry::Singleton(op));
    }
    for &op in MemOp::ALL {
        t.insert(op.opcode(), decodable(move |d, _| Ok(Instr::Memory(op, instr::read_memarg(d)?))));
    }
    for &op in AtomicOp::ALL {
        t.insert(op.opcode(), decodable(move |d, _| Ok(Instr::Atomic(op, instr::read_memarg(d)?))));
    }
    t.insert(Opcode::atomic(0x03), decodable(|d, _| {
        d.expect_u8(0x00, "atomic.fence flags")?;
        Ok(Instr::AtomicFence)
    }));

    // 5.4.1 Control Instructions
    t.insert(Opcode::primary(0x02), decodable(instr::decode_block));
    t.insert(Opcode::primary(0x03), decodable(instr::decode_loop));
    t.insert(Opcode::primary(0x04), decodable(instr::decode_if));
    t.insert(Opcode::primary(0x0c), decodable(|d, cx| Ok(Instr::Br(cx.read_label(d)?))));
    t.insert(Opcode::primary(0x0d), decodable(|d, cx| Ok(Instr::BrIf(cx.read_label(d)?))));
    t.insert(Opcode::primary(0x0e), decodable(|d, cx| {
        let targets = d.read_vec(|d| cx.read_label(d))?;
        let default = cx.read_label(d)?;
        Ok(Instr::BrTable { targets, default })
    }));
    t.insert(Opcode::primary(0x10), decodable(|d, cx| Ok(Instr::Call(cx.read_func(d)?))));
    t.insert(Opcode::primary(0x11), decodable(|d, cx| {
        let ty = cx.read_type(d)?;
        let table = cx.read_table(d)?;
        Ok(Instr::CallIndirect { ty, table })
    }));

    // 5.4.2 Parametric Instructions
    t.insert(Opcode::primary(0x1c), decodable(|d, _| {
        Ok(Instr::SelectTyped(d.read_vec(instr::read_valtype)?))
    }));

    // 5.4.3 Variable Instructions
    t.insert(Opcode::primary(0x20), decodable(|d, _| Ok(Instr::LocalGet(d.read_u32()?))));
    t.insert(Opcode::primary(0x21), decodable(|d, _| Ok(Instr::LocalSet(d.read_u32()?))));
    t.insert(Opcode::primary(0x22), decodable(|d, _| Ok(Instr::LocalTee(d.read_u32()?))));
    t.insert(Opcode::primary(0x23), decodable(|d, cx| Ok(Instr::GlobalGet(cx.read_global(d)?))));
    t.insert(Opcode::primary(0x24), decodable(|d, cx| Ok(Instr::GlobalSet(cx.read_global(d)?))));

    // 5.4.4 Table Instructions
    t.insert(Opcode::primary(0x25), decodable(|d, cx| Ok(Instr::TableGet(cx.read_table(d)?))));
    t.insert(Opcode::primary(0x26), decodable(|d, cx| Ok(Instr::TableSet(cx.read_table(d)?))));
    t.insert(Opcode::misc(12), decodable(|d, cx| {
        let elem = cx.read_elem(d)?;
        let table = cx.read_table(d)?;
        Ok(Instr::TableInit { elem, table })
    }));
    t.insert(Opcode::misc(13), decodable(|d, cx| Ok(Instr::ElemDrop(cx.read_elem(d)?))));
    t.insert(Opcode::misc(14), decodable(|d, cx| {
        let dst = cx.read_table(d)?;
        let src = cx.read_table(d)?;
        Ok(Instr::TableCopy { dst, src })
    }));
    t.insert(Opcode::misc(15), decodable(|d, cx| Ok(Instr::TableGrow(cx.read_table(d)?))));
    t.insert(Opcode::misc(16), decodable(|d, cx| Ok(Instr::TableSize(cx.read_table(d)?))));
    t.insert(Opcode::misc(17), decodable(|d, cx| Ok(Instr::TableFill(cx.read_table(d)?))));

    // 5.4.5 Memory Instructions
    t.insert(Opcode::primary(0x3f), decodable(|d, cx| Ok(Instr::MemorySize(cx.read_mem(d)?))));
    t.insert(Opcode::primary(0x40), decodable(|d, cx| Ok(Instr::MemoryGrow(cx.read_mem(d)?))));
    t.insert(Opcode::misc(8), decodable(|d, cx| {
        let data = cx.read_data(d)?;
        let mem = cx.read_mem(d)?;
        Ok(Instr::MemoryInit { data, mem })
    }));
    t.insert(Opcode::misc(9), decodable(|d, cx| Ok(Instr::DataDrop(cx.read_data(d)?))));
    t.insert(Opcode::misc(10), decodable(|d, cx| {
        let dst = cx.read_mem(d)?;
        let src = cx.read_mem(d)?;
        Ok(Instr::MemoryCopy { dst, src })
    }));
    t.insert(Opcode::misc(11), decodable(|d, cx| Ok(Instr::MemoryFill(cx.read_mem(d)?))));

    // 5.4.6 Numeric and Reference Instructions
    t.insert(Opcode::primary(0x41), decodable(|d, _| Ok(Instr::I32Const(d.read_s32()?))));
    t.insert(Opcode::primary(0x42), decodable(|d, _| Ok(Instr::I64Const(d.read_s64()?))));
    t.insert(Opcode::primary(0x43), decodable(|d, _| Ok(Instr::F32Const(Ieee32(d.read_f32()?)))));
    t.insert(Opcode::primary(0x44), decodable(|d, _| Ok(Instr::F64Const(Ieee64(d.read_f64()?)))));
    t.insert(Opcode::primary(0xd0), decodable(|d, _| Ok(Instr::RefNull(instr::read_reftype(d)?))));
    t.insert(Opcode::primary(0xd2), decodable(|d, cx| Ok(Instr::RefFunc(cx.read_func(d)?))));

    t
}

static TABLE: OnceLock<OpcodeTable> = OnceLock::new();

pub fn table() -> &'static OpcodeTable {
    TABLE.get_or_init(build)
}

/// Reads an opcode, including the sub-opcode of the extension planes.
pub fn read_opcode(d: &mut Decoder) -> Result<Opcode> {
    let b = d.read_u8()?;
    Ok(match Plane::from_prefix(b) {
        Some(plane) => Opcode::new(plane, d.read_u32()?),
        None => Opcode::primary(b),
    })
}

/// Looks up the registry entry for `opcode`, which was read at `offset`.
pub fn entry(opcode: Opcode, offset: usize) -> Result<&'static Entry> {
    table()
        .get(opcode)
        .ok_or(Error::UnsupportedInstruction { offset, opcode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_opcode_is_registered() {
        let t = table();
        for op in SimpleOp::ALL {
            assert!(matches!(t.get(op.opcode()), Some(Entry::Singleton(x)) if x == op));
        }
        for op in MemOp::ALL {
            assert!(t.contains(op.opcode()), "{}", op.name());
        }
        for op in AtomicOp::ALL {
            assert!(t.contains(op.opcode()), "{}", op.name());
        }
    }

    #[test]
    fn structural_bytes_are_not_instructions() {
        assert!(!table().contains(Opcode::primary(0x05)));
        assert!(!table().contains(Opcode::primary(0x0b)));
        assert!(!table().contains(Opcode::misc(18)));
    }

    #[test]
    fn unknown_opcode_names_plane() {
        let err = entry(Opcode::misc(0x99), 7).unwrap_err();
        assert_eq!(err.to_string(), "unsupported instruction 0xfc 0x99 at offset 7");
    }
}
