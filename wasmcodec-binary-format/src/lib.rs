//! Encoder and decoder for the WebAssembly binary format.
//!
//! [`encode_module`] and [`decode_module`] are the entry points; the
//! [`Decoder`] cursor is public for tools that want to walk a binary
//! themselves.

extern crate log;
extern crate nom;

extern crate wasmcodec_structure;

use std::collections::HashMap;

use log::{debug, trace};

use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::features::Features;
use wasmcodec_structure::modules::CustomSection;
use wasmcodec_structure::modules::Module;
use wasmcodec_structure::modules::Placement;
use wasmcodec_structure::modules::SectionId;

pub mod decoder;
pub mod encoder;
pub mod instructions;
pub mod names;
pub mod opcodes;
pub mod parsers;
pub mod sections;

pub use decoder::Decoder;
pub use encoder::Encoder;

pub const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

struct Section {
    precedence: u32,
    id: SectionId,
    payload: Encoder,
}

// 5.5.2 Sections
pub fn encode_module(module: &Module, features: &Features) -> Result<Vec<u8>> {
    module.check_structure(features)?;
    if let Some(count) = module.data_count {
        if count as usize != module.data.len() {
            return Err(Error::structure(format!(
                "data count {} but {} data segment(s)",
                count,
                module.data.len()
            )));
        }
    }

    let mut out = Encoder::for_features(features);
    let mut sections = Vec::new();

    for &id in SectionId::ORDERED.iter() {
        if sections::is_empty(id, module) {
            continue;
        }
        let mut payload = out.nested();
        sections::encode_section(&mut payload, id, module, features)?;
        sections.push(Section { precedence: id.precedence(), id, payload });
    }

    let write_names = features.name_section && names::has_names(module);
    if write_names {
        let mut payload = out.nested();
        payload.write_name(names::SECTION_NAME)?;
        names::encode_names(&mut payload, module)?;
        trace!("name section with {} byte(s)", payload.len());
        sections.push(Section {
            precedence: Placement::After(SectionId::Data).precedence(),
            id: SectionId::Custom,
            payload,
        });
    }

    if features.custom_sections {
        for custom in &module.customs {
            if write_names && &*custom.name == names::SECTION_NAME {
                trace!("dropping stored name section in favor of the generated one");
                continue;
            }
            let mut payload = out.nested();
            payload.write_name(&custom.name)?;
            payload.write_bytes(&custom.payload);
            trace!("custom section `{}` placed {:?}", custom.name, custom.placement);
            sections.push(Section {
                precedence: custom.placement.precedence(),
                id: SectionId::Custom,
                payload,
            });
        }
    }

    // Stable, custom sections with the same placement keep their order.
    sections.sort_by_key(|s| s.precedence);

    out.write_bytes(&MAGIC);
    out.write_fixed_u32(module.version);
    for section in &sections {
        debug!("encoding {} section, {} byte(s)", section.id, section.payload.len());
        out.write_u8(section.id.code());
        out.write_sized(&section.payload)?;
    }
    out.finish()
}

pub fn decode_module(bytes: &[u8], features: &Features) -> Result<Module> {
    let mut d = Decoder::new(bytes);

    if d.read_bytes(MAGIC.len())? != &MAGIC[..] {
        return Err(Error::malformed(0, "magic header not detected"));
    }
    let version = d.read_fixed_u32()?;
    if version != Module::VERSION {
        return Err(Error::malformed(MAGIC.len(), format!("unknown binary version {}", version)));
    }

    let mut module = Module::new();
    module.version = version;

    let mut payloads: HashMap<SectionId, Decoder> = HashMap::new();
    let mut customs = Vec::new();
    let mut name_section = None;
    let mut previous = None;

    while !d.is_empty() {
        let offset = d.offset();
        let code = d.read_u8()?;
        let id = SectionId::from_code(code)
            .ok_or_else(|| Error::malformed(offset, format!("unknown section id {}", code)))?;
        let size = d.read_u32()?;
        let mut payload = d.slice(size as usize)?;
        debug!("found {} section at offset {}, {} byte(s)", id, offset, size);

        if id == SectionId::Custom {
            let name = payload.read_name()?;
            if features.name_section && &*name == names::SECTION_NAME && name_section.is_none() {
                name_section = Some(payload);
                continue;
            }
            let placement = previous.map(Placement::After).unwrap_or(Placement::Start);
            trace!("custom section `{}` placed {:?}", name, placement);
            customs.push(CustomSection {
                name,
                payload: payload.rest().to_vec(),
                placement,
            });
        } else {
            if payloads.contains_key(&id) {
                return Err(Error::DuplicateSection { offset, id });
            }
            payloads.insert(id, payload);
            previous = Some(id);
        }
    }

    let has_code = payloads.contains_key(&SectionId::Code);
    for &id in SectionId::ORDERED.iter() {
        if let Some(mut payload) = payloads.remove(&id) {
            sections::decode_section(&mut payload, id, &mut module, features)?;
            payload.finish(&format!("{} section", id))?;
        }
    }

    if !has_code && !module.funcs.is_empty() {
        return Err(Error::malformed(
            bytes.len(),
            format!("{} function(s) declared without a code section", module.funcs.len()),
        ));
    }
    if let Some(count) = module.data_count {
        if count as usize != module.data.len() {
            return Err(Error::malformed(
                bytes.len(),
                format!("data count {} but {} data segment(s)", count, module.data.len()),
            ));
        }
    }

    if let Some(mut payload) = name_section {
        names::decode_names(&mut payload, &mut module)?;
    }
    module.customs = customs;

    module.check_structure(features)?;
    Ok(module)
}

#[cfg(test)]
#[path = "tests_binary_format.rs"]
mod tests;
