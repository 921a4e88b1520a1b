//! In-memory structure of WebAssembly modules.
//!
//! Entities reference each other through [`modules::Target`]s instead of
//! indices; indices only exist on the wire.

extern crate wasmcodec_utils;

pub mod effects;
pub mod error;
pub mod features;
pub mod instructions;
pub mod labels;
pub mod modules;
pub mod opcodes;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use features::{Feature, Features};
