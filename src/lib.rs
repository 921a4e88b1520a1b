//! Binary format codec, structural model and stack-effect validation for
//! WebAssembly modules.
//!
//! The work is split over three crates that are re-exported here:
//! [`structure`] holds the in-memory model, [`binary_format`] reads and writes
//! the binary encoding, and [`validation`] type checks instruction sequences
//! and whole modules.

pub extern crate wasmcodec_binary_format as binary_format;
pub extern crate wasmcodec_structure as structure;
pub extern crate wasmcodec_validation as validation;

pub use binary_format::{decode_module, encode_module};
pub use structure::{Error, ErrorKind, Feature, Features, Result};
pub use validation::validate_module;

use structure::modules::Module;

/// Decodes `bytes` and validates the result.
pub fn decode_and_validate(bytes: &[u8], features: &Features) -> Result<Module> {
    let module = decode_module(bytes, features)?;
    validate_module(&module)?;
    Ok(module)
}
