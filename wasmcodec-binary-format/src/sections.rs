//! Payload codecs of the standard sections.
//!
//! Every `encode_*` function writes the payload without id and size, every
//! `decode_*` function reads one payload into the module. Sections are
//! decoded in their canonical order, so later sections can resolve indices
//! into the ones decoded before them.

use log::trace;

use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::features::Features;
use wasmcodec_structure::modules::Code;
use wasmcodec_structure::modules::Data;
use wasmcodec_structure::modules::DataMode;
use wasmcodec_structure::modules::Elem;
use wasmcodec_structure::modules::ElemItems;
use wasmcodec_structure::modules::ElemMode;
use wasmcodec_structure::modules::Export;
use wasmcodec_structure::modules::ExportDesc;
use wasmcodec_structure::modules::Func;
use wasmcodec_structure::modules::Global;
use wasmcodec_structure::modules::Import;
use wasmcodec_structure::modules::ImportDesc;
use wasmcodec_structure::modules::Mem;
use wasmcodec_structure::modules::Module;
use wasmcodec_structure::modules::SectionId;
use wasmcodec_structure::modules::Table;
use wasmcodec_structure::types::FuncType;
use wasmcodec_structure::types::GlobalType;
use wasmcodec_structure::types::Limits;
use wasmcodec_structure::types::MemType;
use wasmcodec_structure::types::Mut;
use wasmcodec_structure::types::RefType;
use wasmcodec_structure::types::TableType;
use wasmcodec_structure::types::ValType;

use super::decoder::Decoder;
use super::encoder::Encoder;
use super::instructions::{decode_expr, encode_expr, read_reftype, read_valtype};
use super::instructions::{DecodeCtx, EncodeCtx};
use super::parsers;

/// Upper bound on the locals one function body may declare.
pub const MAX_LOCALS: u64 = 50_000;

const FUNC_TYPE: u8 = 0x60;
const ELEM_KIND_FUNCREF: u8 = 0x00;

const EXTERN_FUNC: u8 = 0x00;
const EXTERN_TABLE: u8 = 0x01;
const EXTERN_MEM: u8 = 0x02;
const EXTERN_GLOBAL: u8 = 0x03;

// 5.3 Types
fn write_valtype(e: &mut Encoder, t: ValType) {
    e.write_u8(t.to_byte());
}

fn write_functype(e: &mut Encoder, ft: &FuncType) -> Result<()> {
    e.write_u8(FUNC_TYPE);
    e.write_vec(&ft.params, |e, &t| {
        write_valtype(e, t);
        Ok(())
    })?;
    e.write_vec(&ft.results, |e, &t| {
        write_valtype(e, t);
        Ok(())
    })
}

fn write_limits(e: &mut Encoder, limits: &Limits) {
    match limits.max {
        None => {
            e.write_u8(0x00);
            e.write_u32(limits.min);
        }
        Some(max) => {
            e.write_u8(0x01);
            e.write_u32(limits.min);
            e.write_u32(max);
        }
    }
}

fn write_tabletype(e: &mut Encoder, tt: &TableType) {
    e.write_u8(tt.elem.to_byte());
    write_limits(e, &tt.limits);
}

fn write_memtype(e: &mut Encoder, mt: &MemType) {
    write_limits(e, &mt.limits);
}

fn write_globaltype(e: &mut Encoder, gt: &GlobalType) {
    write_valtype(e, gt.valtype);
    e.write_u8(match gt.mutability {
        Mut::Const => 0x00,
        Mut::Var => 0x01,
    });
}

fn read_functype(d: &mut Decoder) -> Result<FuncType> {
    d.run(parsers::parse_functype, "function type")
}

fn read_tabletype(d: &mut Decoder) -> Result<TableType> {
    d.run(parsers::parse_tabletype, "table type")
}

fn read_memtype(d: &mut Decoder) -> Result<MemType> {
    d.run(parsers::parse_memtype, "memory type")
}

fn read_globaltype(d: &mut Decoder) -> Result<GlobalType> {
    d.run(parsers::parse_globaltype, "global type")
}

/// Whether the module has nothing to put into section `id`.
pub fn is_empty(id: SectionId, m: &Module) -> bool {
    match id {
        SectionId::Custom => true,
        SectionId::Type => m.types.is_empty(),
        SectionId::Import => m.imports.is_empty(),
        SectionId::Function => m.funcs.is_empty(),
        SectionId::Table => m.tables.is_empty(),
        SectionId::Memory => m.mems.is_empty(),
        SectionId::Global => m.globals.is_empty(),
        SectionId::Export => m.exports.is_empty(),
        SectionId::Start => m.start.is_none(),
        SectionId::Element => m.elems.is_empty(),
        SectionId::DataCount => m.data_count.is_none(),
        SectionId::Code => m.funcs.is_empty(),
        SectionId::Data => m.data.is_empty(),
    }
}

pub fn encode_section(e: &mut Encoder, id: SectionId, m: &Module, features: &Features) -> Result<()> {
    let mut cx = EncodeCtx::new(m, features);
    match id {
        SectionId::Custom => Err(Error::structure("custom sections have no standard payload")),
        SectionId::Type => e.write_vec(&m.types.iter().collect::<Vec<_>>(), |e, ft| write_functype(e, ft)),
        SectionId::Import => encode_imports(e, &cx),
        SectionId::Function => {
            let funcs: Vec<&Func> = m.funcs.values().collect();
            e.write_vec(&funcs, |e, func| {
                e.write_u32(m.types.resolve(&func.type_)?);
                Ok(())
            })
        }
        SectionId::Table => {
            let tables: Vec<&Table> = m.tables.values().collect();
            e.write_vec(&tables, |e, table| {
                write_tabletype(e, &table.type_);
                Ok(())
            })
        }
        SectionId::Memory => {
            let mems: Vec<&Mem> = m.mems.values().collect();
            e.write_vec(&mems, |e, mem| {
                write_memtype(e, &mem.type_);
                Ok(())
            })
        }
        SectionId::Global => {
            let globals: Vec<&Global> = m.globals.values().collect();
            e.write_vec(&globals, |e, global| {
                write_globaltype(e, &global.type_);
                encode_expr(e, &mut cx, &global.init)
            })
        }
        SectionId::Export => encode_exports(e, &cx),
        SectionId::Start => match m.start {
            Some(ref start) => cx.write_func(e, start),
            None => Ok(()),
        },
        SectionId::Element => {
            let elems: Vec<&Elem> = m.elems.values().collect();
            e.write_vec(&elems, |e, elem| encode_elem(e, &mut cx, elem))
        }
        SectionId::DataCount => {
            e.write_u32(m.data_count.unwrap_or(0));
            Ok(())
        }
        SectionId::Code => {
            let funcs: Vec<&Func> = m.funcs.values().collect();
            e.write_vec(&funcs, |e, func| encode_code(e, &mut cx, &func.code))
        }
        SectionId::Data => {
            let data: Vec<&Data> = m.data.values().collect();
            e.write_vec(&data, |e, data| encode_data(e, &mut cx, data))
        }
    }
}

pub fn decode_section(d: &mut Decoder, id: SectionId, m: &mut Module, features: &Features) -> Result<()> {
    match id {
        SectionId::Custom => Err(Error::structure("custom sections have no standard payload")),
        SectionId::Type => {
            for ft in d.read_vec(read_functype)? {
                m.types.push(ft);
            }
            Ok(())
        }
        SectionId::Import => decode_imports(d, m),
        SectionId::Function => {
            let indices = d.read_vec(|d| d.read_u32())?;
            for index in indices {
                let type_ = m.types.lookup(index)?.clone();
                m.funcs.append(Func {
                    type_,
                    code: Code::default(),
                    name: None,
                    local_names: Vec::new(),
                });
            }
            Ok(())
        }
        SectionId::Table => {
            for type_ in d.read_vec(read_tabletype)? {
                m.tables.append(Table { type_ });
            }
            Ok(())
        }
        SectionId::Memory => {
            for type_ in d.read_vec(read_memtype)? {
                m.mems.append(Mem { type_ });
            }
            Ok(())
        }
        SectionId::Global => {
            let n = d.read_u32()?;
            for _ in 0..n {
                // Decoded one at a time, so an initializer sees the globals
                // before it.
                let global = {
                    let mut cx = DecodeCtx::new(m, features);
                    let type_ = read_globaltype(d)?;
                    let init = decode_expr(d, &mut cx)?;
                    Global { type_, init, name: None }
                };
                m.globals.append(global);
            }
            Ok(())
        }
        SectionId::Export => {
            let exports = {
                let cx = DecodeCtx::new(m, features);
                d.read_vec(|d| decode_export(d, &cx))?
            };
            m.exports = exports;
            Ok(())
        }
        SectionId::Start => {
            let start = DecodeCtx::new(m, features).read_func(d)?;
            m.start = Some(start);
            Ok(())
        }
        SectionId::Element => {
            let n = d.read_u32()?;
            for _ in 0..n {
                let elem = decode_elem(d, &mut DecodeCtx::new(m, features))?;
                m.elems.append(elem);
            }
            Ok(())
        }
        SectionId::DataCount => {
            m.data_count = Some(d.read_u32()?);
            Ok(())
        }
        SectionId::Code => {
            let offset = d.offset();
            let n = d.read_u32()?;
            if n as usize != m.funcs.len() {
                return Err(Error::malformed(
                    offset,
                    format!("{} function body(ies) for {} declared function(s)", n, m.funcs.len()),
                ));
            }
            let mut bodies = Vec::with_capacity(m.funcs.len());
            for _ in 0..n {
                bodies.push(decode_code(d, &mut DecodeCtx::new(m, features))?);
            }
            for ((_, func), code) in m.funcs.iter_mut().zip(bodies) {
                func.code = code;
            }
            Ok(())
        }
        SectionId::Data => {
            let n = d.read_u32()?;
            for _ in 0..n {
                let data = decode_data(d, &mut DecodeCtx::new(m, features))?;
                m.data.append(data);
            }
            Ok(())
        }
    }
}

// 5.5.5 Import Section
fn encode_imports(e: &mut Encoder, cx: &EncodeCtx) -> Result<()> {
    let imports: Vec<&Import> = cx.module.imports.values().collect();
    e.write_vec(&imports, |e, import| {
        e.write_name(&import.module)?;
        e.write_name(&import.name)?;
        match import.desc {
            ImportDesc::Func(ref ft) => {
                e.write_u8(EXTERN_FUNC);
                e.write_u32(cx.module.types.resolve(ft)?);
            }
            ImportDesc::Table(ref tt) => {
                e.write_u8(EXTERN_TABLE);
                write_tabletype(e, tt);
            }
            ImportDesc::Mem(ref mt) => {
                e.write_u8(EXTERN_MEM);
                write_memtype(e, mt);
            }
            ImportDesc::Global(ref gt) => {
                e.write_u8(EXTERN_GLOBAL);
                write_globaltype(e, gt);
            }
        }
        Ok(())
    })
}

fn decode_imports(d: &mut Decoder, m: &mut Module) -> Result<()> {
    let n = d.read_u32()?;
    for _ in 0..n {
        let module = d.read_name()?;
        let name = d.read_name()?;
        let offset = d.offset();
        let desc = match d.read_u8()? {
            EXTERN_FUNC => {
                let index = d.read_u32()?;
                ImportDesc::Func(m.types.lookup(index)?.clone())
            }
            EXTERN_TABLE => ImportDesc::Table(read_tabletype(d)?),
            EXTERN_MEM => ImportDesc::Mem(read_memtype(d)?),
            EXTERN_GLOBAL => ImportDesc::Global(read_globaltype(d)?),
            b => return Err(Error::malformed(offset, format!("invalid import kind 0x{:02x}", b))),
        };
        m.imports.append(Import { module, name, desc });
    }
    Ok(())
}

// 5.5.10 Export Section
fn encode_exports(e: &mut Encoder, cx: &EncodeCtx) -> Result<()> {
    e.write_vec(&cx.module.exports, |e, export| {
        e.write_name(&export.name)?;
        match export.desc {
            ExportDesc::Func(ref r) => {
                e.write_u8(EXTERN_FUNC);
                cx.write_func(e, r)
            }
            ExportDesc::Table(ref r) => {
                e.write_u8(EXTERN_TABLE);
                cx.write_table(e, r)
            }
            ExportDesc::Mem(ref r) => {
                e.write_u8(EXTERN_MEM);
                cx.write_mem(e, r)
            }
            ExportDesc::Global(ref r) => {
                e.write_u8(EXTERN_GLOBAL);
                cx.write_global(e, r)
            }
        }
    })
}

fn decode_export(d: &mut Decoder, cx: &DecodeCtx) -> Result<Export> {
    let name = d.read_name()?;
    let offset = d.offset();
    let desc = match d.read_u8()? {
        EXTERN_FUNC => ExportDesc::Func(cx.read_func(d)?),
        EXTERN_TABLE => ExportDesc::Table(cx.read_table(d)?),
        EXTERN_MEM => ExportDesc::Mem(cx.read_mem(d)?),
        EXTERN_GLOBAL => ExportDesc::Global(cx.read_global(d)?),
        b => return Err(Error::malformed(offset, format!("invalid export kind 0x{:02x}", b))),
    };
    Ok(Export { name, desc })
}

// 5.5.12 Element Section
//
// Bit 0: passive or declarative, bit 1: explicit table (active) or
// declarative (otherwise), bit 2: items are expressions.
fn encode_elem(e: &mut Encoder, cx: &mut EncodeCtx, elem: &Elem) -> Result<()> {
    let exprs_bit = match elem.items {
        ElemItems::Funcs(_) => 0,
        ElemItems::Exprs(..) => 4,
    };
    let ref_type = elem.items.ref_type();
    let explicit_kind = match elem.mode {
        ElemMode::Active { ref table, ref offset } => {
            let index = cx.module.table_index(table)?;
            if index == 0 && ref_type == RefType::FuncRef {
                e.write_u32(exprs_bit);
                encode_expr(e, cx, offset)?;
                false
            } else {
                e.write_u32(exprs_bit | 2);
                e.write_u32(index);
                encode_expr(e, cx, offset)?;
                true
            }
        }
        ElemMode::Passive => {
            e.write_u32(exprs_bit | 1);
            true
        }
        ElemMode::Declarative => {
            e.write_u32(exprs_bit | 3);
            true
        }
    };
    match elem.items {
        ElemItems::Funcs(ref funcs) => {
            if explicit_kind {
                e.write_u8(ELEM_KIND_FUNCREF);
            }
            e.write_vec(funcs, |e, func| cx.write_func(e, func))
        }
        ElemItems::Exprs(t, ref exprs) => {
            if explicit_kind {
                e.write_u8(t.to_byte());
            }
            e.write_vec(exprs, |e, expr| encode_expr(e, cx, expr))
        }
    }
}

fn decode_elem(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Elem> {
    let offset = d.offset();
    let flags = d.read_u32()?;
    if flags > 7 {
        return Err(Error::malformed(offset, format!("invalid element segment flags {}", flags)));
    }
    let mode = match flags & 3 {
        0 => {
            let table = cx.module.table_ref(0)?;
            ElemMode::Active { table, offset: decode_expr(d, cx)? }
        }
        2 => {
            let table = cx.read_table(d)?;
            ElemMode::Active { table, offset: decode_expr(d, cx)? }
        }
        1 => ElemMode::Passive,
        _ => ElemMode::Declarative,
    };
    let has_exprs = flags & 4 != 0;
    let ref_type = if flags & 3 == 0 {
        RefType::FuncRef
    } else if has_exprs {
        read_reftype(d)?
    } else {
        d.expect_u8(ELEM_KIND_FUNCREF, "element kind")?;
        RefType::FuncRef
    };
    let items = if has_exprs {
        ElemItems::Exprs(ref_type, d.read_vec(|d| decode_expr(d, cx))?)
    } else {
        ElemItems::Funcs(d.read_vec(|d| cx.read_func(d))?)
    };
    Ok(Elem { mode, items })
}

// 5.5.13 Code Section
fn local_groups(locals: &[ValType]) -> Vec<(u32, ValType)> {
    let mut groups: Vec<(u32, ValType)> = Vec::new();
    for &t in locals {
        if let Some(last) = groups.last_mut() {
            if last.1 == t {
                last.0 += 1;
                continue;
            }
        }
        groups.push((1, t));
    }
    groups
}

fn encode_code(e: &mut Encoder, cx: &mut EncodeCtx, code: &Code) -> Result<()> {
    let mut body = e.nested();
    body.write_vec(&local_groups(&code.locals), |e, &(n, t)| {
        e.write_u32(n);
        write_valtype(e, t);
        Ok(())
    })?;
    encode_expr(&mut body, cx, &code.body)?;
    e.write_sized(&body)
}

fn decode_code(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Code> {
    let size = d.read_u32()?;
    let mut body = d.slice(size as usize)?;
    let offset = body.offset();
    let groups = body.read_vec(|d| {
        let n = d.read_u32()?;
        Ok((n, read_valtype(d)?))
    })?;
    let total: u64 = groups.iter().map(|&(n, _)| n as u64).sum();
    if total > MAX_LOCALS {
        return Err(Error::malformed(offset, format!("too many locals: {}", total)));
    }
    let mut locals = Vec::with_capacity(total as usize);
    for (n, t) in groups {
        locals.extend((0..n).map(|_| t));
    }
    let expr = decode_expr(&mut body, cx)?;
    body.finish("function body")?;
    Ok(Code { locals, body: expr })
}

// 5.5.14 Data Section
fn encode_data(e: &mut Encoder, cx: &mut EncodeCtx, data: &Data) -> Result<()> {
    match data.mode {
        DataMode::Passive => e.write_u32(1),
        DataMode::Active { ref mem, ref offset } => {
            let index = cx.module.mem_index(mem)?;
            if index == 0 {
                e.write_u32(0);
            } else {
                e.write_u32(2);
                e.write_u32(index);
            }
            encode_expr(e, cx, offset)?;
        }
    }
    e.write_byte_vec(&data.init)
}

fn decode_data(d: &mut Decoder, cx: &mut DecodeCtx) -> Result<Data> {
    let offset = d.offset();
    let mode = match d.read_u32()? {
        0 => {
            let mem = cx.module.mem_ref(0)?;
            DataMode::Active { mem, offset: decode_expr(d, cx)? }
        }
        1 => DataMode::Passive,
        2 => {
            let mem = cx.read_mem(d)?;
            DataMode::Active { mem, offset: decode_expr(d, cx)? }
        }
        flags => return Err(Error::malformed(offset, format!("invalid data segment flags {}", flags))),
    };
    let init = d.read_byte_vec()?.to_vec();
    trace!("data segment with {} byte(s)", init.len());
    Ok(Data { mode, init })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmcodec_structure::types::ValType::{F64, I32, I64};

    #[test]
    fn locals_are_grouped_by_runs() {
        assert_eq!(local_groups(&[I32, I32, I64, I32]), vec![(2, I32), (1, I64), (1, I32)]);
        assert_eq!(local_groups(&[]), vec![]);
    }

    #[test]
    fn local_limit() {
        let mut e = Encoder::new();
        let mut body = e.nested();
        body.write_u32(2);
        body.write_u32(40_000);
        body.write_u8(F64.to_byte());
        body.write_u32(10_001);
        body.write_u8(I32.to_byte());
        body.write_u8(0x0b);
        e.write_sized(&body).unwrap();

        let module = Module::new();
        let features = Features::default();
        let mut d = Decoder::new(e.bytes());
        let err = decode_code(&mut d, &mut DecodeCtx::new(&module, &features)).unwrap_err();
        assert_eq!(err, Error::malformed(1, "too many locals: 50001"));
    }

    #[test]
    fn element_flags() {
        use wasmcodec_structure::instructions::{Expr, Instr};

        let mut m = Module::new();
        m.tables.append(Table {
            type_: TableType {
                elem: RefType::FuncRef,
                limits: Limits { min: 1, max: None },
            },
        });
        let f = m.add_func(FuncType::new(&[], &[]), Code::default());
        let table = m.table_ref(0).unwrap();
        let features = Features::default();
        let cx = &mut EncodeCtx::new(&m, &features);

        let flags_of = |elem: Elem, cx: &mut EncodeCtx| {
            let mut e = Encoder::new();
            encode_elem(&mut e, cx, &elem).unwrap();
            e.bytes()[0]
        };
        let offset = Expr::new(vec![Instr::I32Const(0)]);
        let funcs = ElemItems::Funcs(vec![f.clone()]);
        let exprs = ElemItems::Exprs(RefType::FuncRef, vec![Expr::new(vec![Instr::RefFunc(f.clone())])]);
        let externs = ElemItems::Exprs(RefType::ExternRef, vec![]);
        let active = |items| Elem {
            mode: ElemMode::Active { table: table.clone(), offset: offset.clone() },
            items,
        };

        assert_eq!(flags_of(active(funcs.clone()), cx), 0);
        assert_eq!(flags_of(Elem { mode: ElemMode::Passive, items: funcs.clone() }, cx), 1);
        assert_eq!(flags_of(Elem { mode: ElemMode::Declarative, items: funcs }, cx), 3);
        assert_eq!(flags_of(active(exprs.clone()), cx), 4);
        assert_eq!(flags_of(Elem { mode: ElemMode::Passive, items: exprs }, cx), 5);
        assert_eq!(flags_of(active(externs), cx), 6);
    }
}
