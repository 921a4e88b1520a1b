//! The `name` custom section: module name, function and local debug names.
//!
//! Subsections 0 to 2 are understood. The others are kept as
//! [`NameSubsection`]s and written back after the known ones.

use log::trace;

use wasmcodec_structure::error::Result;
use wasmcodec_structure::modules::Func;
use wasmcodec_structure::modules::FuncRef;
use wasmcodec_structure::modules::Module;
use wasmcodec_structure::modules::NameSubsection;
use wasmcodec_structure::modules::Target;

use super::decoder::Decoder;
use super::encoder::Encoder;

pub const SECTION_NAME: &str = "name";

const MODULE_NAME: u8 = 0;
const FUNCTION_NAMES: u8 = 1;
const LOCAL_NAMES: u8 = 2;

/// Whether the module carries any names worth a `name` section.
pub fn has_names(m: &Module) -> bool {
    m.name.is_some()
        || !m.name_subsections.is_empty()
        || m.funcs.values().any(|f| f.name.is_some() || !f.local_names.is_empty())
}

/// Writes the payload after the section name.
pub fn encode_names(e: &mut Encoder, m: &Module) -> Result<()> {
    if let Some(ref name) = m.name {
        let mut sub = e.nested();
        sub.write_name(name)?;
        e.write_u8(MODULE_NAME);
        e.write_sized(&sub)?;
    }

    let mut named = Vec::new();
    for (id, func) in m.funcs.iter() {
        if let Some(ref name) = func.name {
            named.push((m.func_index(&FuncRef::local(id))?, name));
        }
    }
    if !named.is_empty() {
        named.sort_by_key(|&(index, _)| index);
        let mut sub = e.nested();
        sub.write_vec(&named, |e, &(index, name)| {
            e.write_u32(index);
            e.write_name(name)
        })?;
        e.write_u8(FUNCTION_NAMES);
        e.write_sized(&sub)?;
    }

    let mut locals = Vec::new();
    for (id, func) in m.funcs.iter() {
        if !func.local_names.is_empty() {
            locals.push((m.func_index(&FuncRef::local(id))?, &func.local_names));
        }
    }
    if !locals.is_empty() {
        locals.sort_by_key(|&(index, _)| index);
        let mut sub = e.nested();
        sub.write_vec(&locals, |e, &(index, names)| {
            e.write_u32(index);
            e.write_vec(names, |e, &(local, ref name)| {
                e.write_u32(local);
                e.write_name(name)
            })
        })?;
        e.write_u8(LOCAL_NAMES);
        e.write_sized(&sub)?;
    }

    for sub in &m.name_subsections {
        e.write_u8(sub.id);
        e.write_byte_vec(&sub.payload)?;
    }
    trace!(
        "encoded names of {} function(s), locals of {}, {} opaque subsection(s)",
        named.len(),
        locals.len(),
        m.name_subsections.len()
    );
    Ok(())
}

/// Reads the payload after the section name into `m`.
pub fn decode_names(d: &mut Decoder, m: &mut Module) -> Result<()> {
    while !d.is_empty() {
        let id = d.read_u8()?;
        let size = d.read_u32()?;
        let mut sub = d.slice(size as usize)?;
        match id {
            MODULE_NAME => {
                m.name = Some(sub.read_name()?);
                sub.finish("module name")?;
            }
            FUNCTION_NAMES => {
                let entries = sub.read_vec(|d| {
                    let index = d.read_u32()?;
                    Ok((index, d.read_name()?))
                })?;
                sub.finish("function names")?;
                trace!("decoded names of {} function(s)", entries.len());
                for (index, name) in entries {
                    if let Some(func) = local_func(m, index)? {
                        func.name = Some(name);
                    }
                }
            }
            LOCAL_NAMES => {
                let entries = sub.read_vec(|d| {
                    let index = d.read_u32()?;
                    let names = d.read_vec(|d| {
                        let local = d.read_u32()?;
                        Ok((local, d.read_name()?))
                    })?;
                    Ok((index, names))
                })?;
                sub.finish("local names")?;
                for (index, names) in entries {
                    if let Some(func) = local_func(m, index)? {
                        func.local_names = names;
                    }
                }
            }
            _ => {
                trace!("keeping name subsection {} ({} bytes)", id, size);
                m.name_subsections.push(NameSubsection {
                    id,
                    payload: sub.rest().to_vec(),
                });
            }
        }
    }
    Ok(())
}

// Names of imported functions are not kept.
fn local_func(m: &mut Module, index: u32) -> Result<Option<&mut Func>> {
    match m.func_ref(index)?.0 {
        Target::Local(id) => Ok(m.funcs.get_mut(id)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmcodec_structure::modules::{Code, ImportDesc};
    use wasmcodec_structure::types::FuncType;

    #[test]
    fn names_survive() {
        let mut m = Module::new();
        m.add_import("env", "print", ImportDesc::Func(FuncType::new(&[], &[])));
        m.add_func(FuncType::new(&[], &[]), Code::default());
        let f = m.add_func(FuncType::new(&[], &[]), Code::default());
        if let Target::Local(id) = f.0 {
            m.funcs.get_mut(id).unwrap().name = Some("main".into());
        }
        m.name = Some("demo".into());
        assert!(has_names(&m));

        let mut e = Encoder::new();
        encode_names(&mut e, &m).unwrap();
        // module name, then one entry for function index 2
        assert_eq!(
            e.bytes(),
            &[0, 5, 4, b'd', b'e', b'm', b'o', 1, 7, 1, 2, 4, b'm', b'a', b'i', b'n'][..]
        );

        let mut copy = m.clone();
        copy.name = None;
        for (_, func) in copy.funcs.iter_mut() {
            func.name = None;
        }
        decode_names(&mut Decoder::new(e.bytes()), &mut copy).unwrap();
        assert_eq!(copy, m);
    }

    #[test]
    fn local_names_survive() {
        let mut m = Module::new();
        let f = m.add_func(FuncType::new(&[], &[]), Code::default());
        if let Target::Local(id) = f.0 {
            m.funcs.get_mut(id).unwrap().local_names = vec![(0, "x".into()), (2, "acc".into())];
        }
        assert!(has_names(&m));

        let mut e = Encoder::new();
        encode_names(&mut e, &m).unwrap();
        assert_eq!(
            e.bytes(),
            &[2, 11, 1, 0, 2, 0, 1, b'x', 2, 3, b'a', b'c', b'c'][..]
        );

        let mut copy = Module::new();
        copy.add_func(FuncType::new(&[], &[]), Code::default());
        decode_names(&mut Decoder::new(e.bytes()), &mut copy).unwrap();
        assert_eq!(copy, m);
    }

    #[test]
    fn unknown_subsections_are_kept() {
        let bytes = [4, 3, 0xaa, 0xbb, 0xcc, 7, 0];
        let mut m = Module::new();
        decode_names(&mut Decoder::new(&bytes), &mut m).unwrap();
        assert_eq!(
            m.name_subsections,
            vec![
                NameSubsection { id: 4, payload: vec![0xaa, 0xbb, 0xcc] },
                NameSubsection { id: 7, payload: vec![] },
            ]
        );
        assert!(has_names(&m));

        let mut e = Encoder::new();
        encode_names(&mut e, &m).unwrap();
        assert_eq!(e.bytes(), &bytes[..]);
    }
}
