//! Encoding and decoding of instruction sequences.
//!
//! Branch targets travel as relative depths on the wire and as [`Label`]s in
//! memory; both directions keep the currently open blocks on a
//! [`BlockStack`] owned by the traversal context.

use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::features::Features;
use wasmcodec_structure::instructions::{Expr, Instr, Label, MemArg};
use wasmcodec_structure::labels::{scoped, BlockStack, Blocks, MAX_NESTING};
use wasmcodec_structure::modules::DataRef;
use wasmcodec_structure::modules::ElemRef;
use wasmcodec_structure::modules::FuncRef;
use wasmcodec_structure::modules::GlobalRef;
use wasmcodec_structure::modules::MemRef;
use wasmcodec_structure::modules::Module;
use wasmcodec_structure::modules::TableRef;
use wasmcodec_structure::opcodes::Opcode;
use wasmcodec_structure::types::BlockType;
use wasmcodec_structure::types::FuncType;
use wasmcodec_structure::types::RefType;
use wasmcodec_structure::types::ValType;

use super::decoder::Decoder;
use super::encoder::Encoder;
use super::opcodes;
use super::opcodes::Entry;
use super::parsers;

pub const END: u8 = 0x0b;
pub const ELSE: u8 = 0x05;
const EMPTY_BLOCK: u8 = 0x40;

fn supported(features: &Features, opcode: Opcode) -> bool {
    opcode.feature().map_or(true, |f| features.enabled(f))
}

fn nested_too_deeply<T>(blocks: &BlockStack<T>) -> Option<String> {
    if blocks.has_room() {
        None
    } else {
        Some(format!("blocks nested more than {} deep", MAX_NESTING))
    }
}

pub struct EncodeCtx<'m> {
    pub module: &'m Module,
    pub features: &'m Features,
    blocks: BlockStack<()>,
}

impl<'m> Blocks<()> for EncodeCtx<'m> {
    fn blocks(&mut self) -> &mut BlockStack<()> {
        &mut self.blocks
    }
}

impl<'m> EncodeCtx<'m> {
    pub fn new(module: &'m Module, features: &'m Features) -> Self {
        EncodeCtx {
            module,
            features,
            blocks: BlockStack::new(),
        }
    }

    fn open_block(&self) -> Result<()> {
        match nested_too_deeply(&self.blocks) {
            Some(message) => Err(Error::structure(message)),
            None => Ok(()),
        }
    }

    fn write_label(&self, e: &mut Encoder, label: Label) -> Result<()> {
        e.write_u32(self.blocks.resolve(label)?);
        Ok(())
    }

    fn write_type(&self, e: &mut Encoder, ft: &FuncType) -> Result<()> {
        e.write_u32(self.module.types.resolve(ft)?);
        Ok(())
    }

    pub fn write_func(&self, e: &mut Encoder, func: &FuncRef) -> Result<()> {
        e.write_u32(self.module.func_index(func)?);
        Ok(())
    }

    pub fn write_table(&self, e: &mut Encoder, table: &TableRef) -> Result<()> {
        e.write_u32(self.module.table_index(table)?);
        Ok(())
    }

    pub fn write_mem(&self, e: &mut Encoder, mem: &MemRef) -> Result<()> {
        e.write_u32(self.module.mem_index(mem)?);
        Ok(())
    }

    pub fn write_global(&self, e: &mut Encoder, global: &GlobalRef) -> Result<()> {
        e.write_u32(self.module.global_index(global)?);
        Ok(())
    }

    fn write_elem(&self, e: &mut Encoder, elem: &ElemRef) -> Result<()> {
        e.write_u32(self.module.elem_index(elem)?);
        Ok(())
    }

    fn write_data(&self, e: &mut Encoder, data: &DataRef) -> Result<()> {
        e.write_u32(self.module.data_index(data)?);
        Ok(())
    }

    fn write_blocktype(&self, e: &mut Encoder, ty: &BlockType) -> Result<()> {
        match *ty {
            BlockType::Empty => e.write_u8(EMPTY_BLOCK),
            BlockType::Value(t) => e.write_u8(t.to_byte()),
            BlockType::Func(ref ft) => e.write_s33(self.module.types.resolve(ft)? as i64),
        }
        Ok(())
    }
}

pub struct DecodeCtx<'m> {
    pub module: &'m Module,
    pub features: &'m Features,
    blocks: BlockStack<()>,
}

impl<'m> Blocks<()> for DecodeCtx<'m> {
    fn blocks(&mut self) -> &mut BlockStack<()> {
        &mut self.blocks
    }
}

impl<'m> DecodeCtx<'m> {
    pub fn new(module: &'m Module, features: &'m Features) -> Self {
        DecodeCtx {
            module,
            features,
            blocks: BlockStack::new(),
        }
    }

    fn open_block(&self, d: &Decoder) -> Result<()> {
        match nested_too_deeply(&self.blocks) {
            Some(message) => Err(Error::malformed(d.offset(), message)),
            None => Ok(()),
        }
    }

    pub fn read_label(&self, d: &mut Decoder) -> Result<Label> {
        let depth = d.read_u32()?;
        Ok(self.blocks.lookup(depth)?.0)
    }

    pub fn read_type(&self, d: &mut Decoder) -> Result<FuncType> {
        let index = d.read_u32()?;
        Ok(self.module.types.lookup(index)?.clone())
    }

    pub fn read_func(&self, d: &mut Decoder) -> Result<FuncRef> {
        let index = d.read_u32()?;
        self.module.func_ref(index)
    }

    pub fn read_table(&self, d: &mut Decoder) -> Result<TableRef> {
        let index = d.read_u32()?;
        self.module.table_ref(index)
    }

    pub fn read_mem(&self, d: &mut Decoder) -> Result<MemRef> {
        let index = d.read_u32()?;
        self.module.mem_ref(index)
    }

    pub fn read_global(&self, d: &mut Decoder) -> Result<GlobalRef> {
        let index = d.read_u32()?;
        self.module.global_ref(index)
    }

    pub fn read_elem(&self, d: &mut Decoder) -> Result<ElemRef> {
        let index = d.read_u32()?;
        self.module.elem_ref(index)
    }

    /// Data segments are decoded after the code, so the index is only
    /// checked against the declared data count. Segment ids are handed out
    /// in order, starting at 0.
    pub fn read_data(&self, d: &mut Decoder) -> Result<DataRef> {
        let offset = d.offset();
        let index = d.read_u32()?;
        let count = self
            .module
            .data_count
            .ok_or_else(|| Error::malformed(offset, "data index without a DataCount section"))?;
        if index < count {
            Ok(DataRef::local(index))
        } else {
            Err(Error::reference(format!(
                "data segment index {} out of range ({} declared)",
                index, count
            )))
        }
    }

    fn read_blocktype(&self, d: &mut Decoder) -> Result<BlockType> {
        match d.peek_u8() {
            Some(EMPTY_BLOCK) => {
                d.read_u8()?;
                Ok(BlockType::Empty)
            }
            Some(b) if ValType::from_byte(b).is_some() => Ok(BlockType::Value(read_valtype(d)?)),
            _ => {
                let offset = d.offset();
                let index = d.read_s33()?;
                if index < 0 {
                    return Err(Error::malformed(offset, format!("invalid block type {}", index)));
                }
                let ft = self.module.types.lookup(index as u32)?;
                Ok(BlockType::Func(ft.clone()))
            }
        }
    }
}

// 5.3.1 Value Types
pub fn read_valtype(d: &mut Decoder) -> Result<ValType> {
    d.run(parsers::parse_valtype, "value type")
}

pub fn read_reftype(d: &mut Decoder) -> Result<RefType> {
    d.run(parsers::parse_reftype, "reference type")
}

pub fn read_memarg(d: &mut Decoder) -> Result<MemArg> {
    let align = d.read_u32()?;
    let offset = d.read_u32()?;
    Ok(MemArg { align, offset })
}

fn write_memarg(e: &mut Encoder, arg: MemArg) {
    e.write_u32(arg.align);
    e.write_u32(arg.offset);
}

pub fn write_opcode(e: &mut Encoder, opcode: Opcode) {
    match opcode.plane.prefix() {
        None => e.write_u8(opcode.code as u8),
        Some(prefix) => {
            e.write_u8(prefix);
            e.write_u32(opcode.code);
        }
    }
}

// 5.4 Instructions
pub fn encode_instr(e: &mut Encoder, cx: &mut EncodeCtx, instr: &Instr) -> Result<()> {
    use self::Instr::*;

    let opcode = instr.opcode();
    if !supported(cx.features, opcode) {
        e.mark_unsupported(opcode);
    }
    write_opcode(e, opcode);

    match *instr {
        Simple(_) => {}
        Memory(_, arg) | Atomic(_, arg) => write_memarg(e, arg),
        AtomicFence => e.write_u8(0x00),

        Block { label, ref ty, ref body } | Loop { label, ref ty, ref body } => {
            cx.open_block()?;
            cx.write_blocktype(e, ty)?;
            scoped(cx, label, (), |cx| encode_seq(e, cx, body))?;
            e.write_u8(END);
        }
        If { label, ref ty, ref then, ref else_ } => {
            cx.open_block()?;
            cx.write_blocktype(e, ty)?;
            scoped(cx, label, (), |cx| {
                encode_seq(e, cx, then)?;
                if !else_.is_empty() {
                    e.write_u8(ELSE);
                    encode_seq(e, cx, else_)?;
                }
                Ok(())
            })?;
            e.write_u8(END);
        }
        Br(label) | BrIf(label) => cx.write_label(e, label)?,
        BrTable { ref targets, default } => {
            e.write_vec(targets, |e, &target| cx.write_label(e, target))?;
            cx.write_label(e, default)?;
        }
        Call(ref func) => cx.write_func(e, func)?,
        CallIndirect { ref ty, ref table } => {
            cx.write_type(e, ty)?;
            cx.write_table(e, table)?;
        }

        SelectTyped(ref types) => e.write_vec(types, |e, t| {
            e.write_u8(t.to_byte());
            Ok(())
        })?,

        LocalGet(index) | LocalSet(index) | LocalTee(index) => e.write_u32(index),
        GlobalGet(ref global) | GlobalSet(ref global) => cx.write_global(e, global)?,

        TableGet(ref table)
        | TableSet(ref table)
        | TableSize(ref table)
        | TableGrow(ref table)
        | TableFill(ref table) => cx.write_table(e, table)?,
        TableCopy { ref dst, ref src } => {
            cx.write_table(e, dst)?;
            cx.write_table(e, src)?;
        }
        TableInit { ref elem, ref table } => {
            cx.write_elem(e, elem)?;
            cx.write_table(e, table)?;
        }
        ElemDrop(ref elem) => cx.write_elem(e, elem)?,

        MemorySize(ref mem) | MemoryGrow(ref mem) | MemoryFill(ref mem) => cx.write_mem(e, mem)?,
        MemoryCopy { ref dst, ref src } => {
            cx.write_mem(e, dst)?;
            cx.write_mem(e, src)?;
        }
        MemoryInit { ref data, ref mem } => {
            cx.write_data(e, data)?;
            cx.write_mem(e, mem)?;
        }
        DataDrop(ref data) => cx.write_data(e, data)?,

        I32Const(v) => e.write_s32(v),
        I64Const(v) => e.write_s64(v),
        F32Const(x) => e.write_f32(x),
        F64Const(x) => e.write_f64(x),
        RefNull(t) => e.write_u8(t.to_byte()),
        RefFunc(ref func) => cx.write_func(e, func)?,
    }
    Ok(())
}

fn encode_seq(e: &mut Encoder, cx: &mut EncodeCtx, body: &[Instr]) -> Result<()> {
    for instr in body {
        encode_instr(e, cx, instr)?;
    }
    Ok(())
}

/// Writes `expr` followed by `end`.
pub fn encode_expr(e: &mut Encoder, cx: &mut EncodeCtx, expr: &Expr) -> Result<()> {
    scoped(cx, expr.label, (), |cx| encode_seq(e, cx, &expr.body))?;
    e.write_u8(END);
    Ok(())
}

pub fn decode_instr(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Instr> {
    let offset = d.offset();
    let opcode = opcodes::read_opcode(d)?;
    let entry = opcodes::entry(opcode, offset)?;
    if !supported(cx.features, opcode) {
        return Err(Error::UnsupportedInstruction { offset, opcode });
    }
    match *entry {
        Entry::Singleton(op) => Ok(Instr::Simple(op)),
        Entry::Decodable(ref decode) => decode(d, cx),
    }
}

/// Decodes instructions up to the next `end`, or `else` if `in_if`.
/// Returns whether the sequence was closed by `else`.
fn decode_seq(d: &mut Decoder, cx: &mut DecodeCtx, in_if: bool) -> Result<(Vec<Instr>, bool)> {
    let mut body = Vec::new();
    loop {
        match d.peek_u8() {
            Some(END) => {
                d.read_u8()?;
                return Ok((body, false));
            }
            Some(ELSE) if in_if => {
                d.read_u8()?;
                return Ok((body, true));
            }
            Some(ELSE) => return Err(Error::malformed(d.offset(), "`else` outside of `if`")),
            _ => body.push(decode_instr(d, cx)?),
        }
    }
}

pub fn decode_expr(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Expr> {
    let label = Label::fresh();
    let (body, _) = scoped(cx, label, (), |cx| decode_seq(d, cx, false))?;
    Ok(Expr { label, body })
}

pub fn decode_block(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Instr> {
    cx.open_block(d)?;
    let ty = cx.read_blocktype(d)?;
    let label = Label::fresh();
    let (body, _) = scoped(cx, label, (), |cx| decode_seq(d, cx, false))?;
    Ok(Instr::Block { label, ty, body })
}

pub fn decode_loop(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Instr> {
    cx.open_block(d)?;
    let ty = cx.read_blocktype(d)?;
    let label = Label::fresh();
    let (body, _) = scoped(cx, label, (), |cx| decode_seq(d, cx, false))?;
    Ok(Instr::Loop { label, ty, body })
}

pub fn decode_if(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Instr> {
    cx.open_block(d)?;
    let ty = cx.read_blocktype(d)?;
    let label = Label::fresh();
    let (then, else_) = scoped(cx, label, (), |cx| {
        let (then, has_else) = decode_seq(d, cx, true)?;
        let else_ = if has_else {
            decode_seq(d, cx, false)?.0
        } else {
            Vec::new()
        };
        Ok((then, else_))
    })?;
    Ok(Instr::If { label, ty, then, else_ })
}
