use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::features::Features;
use wasmcodec_structure::opcodes::Opcode;
use wasmcodec_structure::types::Ieee32;
use wasmcodec_structure::types::Ieee64;

pub const CANONICAL_NAN32: u32 = 0x7fc0_0000;
pub const CANONICAL_NAN64: u64 = 0x7ff8_0000_0000_0000;

/// Number of 7-bit groups needed for any 32-bit (and 33-bit) value.
pub const MAX_GROUPS_32: usize = 5;
/// Number of 7-bit groups needed for any 64-bit value.
pub const MAX_GROUPS_64: usize = 10;

/// Writes `value` as unsigned LEB128, padded to `pad_to` groups if given.
pub fn write_unsigned(buf: &mut Vec<u8>, mut value: u64, pad_to: Option<usize>) {
    let mut groups = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        groups += 1;
        let more = value != 0 || pad_to.map_or(false, |max| groups < max);
        if more {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            return;
        }
    }
}

/// Writes `value` as signed LEB128, padded to `pad_to` groups if given.
pub fn write_signed(buf: &mut Vec<u8>, mut value: i64, pad_to: Option<usize>) {
    let mut groups = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        groups += 1;
        let sign_clear = byte & 0x40 == 0;
        let done = (value == 0 && sign_clear) || (value == -1 && !sign_clear);
        let more = !done || pad_to.map_or(false, |max| groups < max);
        if more {
            buf.push(byte | 0x80);
        } else {
            buf.push(byte);
            return;
        }
    }
}

/// Bits of `x` with every NaN replaced by the canonical quiet NaN.
pub fn canonical_f32(x: Ieee32) -> u32 {
    if x.value().is_nan() {
        CANONICAL_NAN32
    } else {
        x.0
    }
}

pub fn canonical_f64(x: Ieee64) -> u64 {
    if x.value().is_nan() {
        CANONICAL_NAN64
    } else {
        x.0
    }
}

/// An append-only output buffer.
///
/// An instruction the target features do not support is recorded instead of
/// failing on the spot, so its position can be reported relative to the
/// outermost buffer once the nested payloads are spliced in.
#[derive(Clone, Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
    max_width: bool,
    unsupported: Option<(usize, Opcode)>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder::default()
    }

    pub fn for_features(features: &Features) -> Self {
        Encoder {
            max_width: features.max_width_leb,
            ..Encoder::default()
        }
    }

    /// Pads every LEB128 integer to its maximal width.
    pub fn with_max_width(mut self, on: bool) -> Self {
        self.max_width = on;
        self
    }

    /// An empty encoder in the same mode, for payloads that get a size
    /// prefix.
    pub fn nested(&self) -> Encoder {
        Encoder {
            max_width: self.max_width,
            ..Encoder::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Remembers that `opcode` is about to be written at the current
    /// position. Only the first one is kept.
    pub fn mark_unsupported(&mut self, opcode: Opcode) {
        if self.unsupported.is_none() {
            self.unsupported = Some((self.buf.len(), opcode));
        }
    }

    /// The output, or the first unsupported instruction written to it.
    pub fn finish(self) -> Result<Vec<u8>> {
        match self.unsupported {
            Some((offset, opcode)) => Err(Error::UnsupportedInstruction { offset, opcode }),
            None => Ok(self.buf),
        }
    }

    fn pad(&self, groups: usize) -> Option<usize> {
        if self.max_width {
            Some(groups)
        } else {
            None
        }
    }

    // 5.2.1. Bytes
    pub fn write_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    // 5.2.2. Integers
    pub fn write_u32(&mut self, v: u32) {
        let pad = self.pad(MAX_GROUPS_32);
        write_unsigned(&mut self.buf, v as u64, pad);
    }
    pub fn write_u64(&mut self, v: u64) {
        let pad = self.pad(MAX_GROUPS_64);
        write_unsigned(&mut self.buf, v, pad);
    }
    pub fn write_s32(&mut self, v: i32) {
        let pad = self.pad(MAX_GROUPS_32);
        write_signed(&mut self.buf, v as i64, pad);
    }
    pub fn write_s33(&mut self, v: i64) {
        let pad = self.pad(MAX_GROUPS_32);
        write_signed(&mut self.buf, v, pad);
    }
    pub fn write_s64(&mut self, v: i64) {
        let pad = self.pad(MAX_GROUPS_64);
        write_signed(&mut self.buf, v, pad);
    }

    /// A length or count, which has to fit into a `u32`.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        if len > u32::MAX as usize {
            return Err(Error::structure(format!("length {} does not fit into u32", len)));
        }
        self.write_u32(len as u32);
        Ok(())
    }

    pub fn write_fixed_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    // 5.2.3. Floating-Point
    pub fn write_f32(&mut self, x: Ieee32) {
        self.buf.extend_from_slice(&canonical_f32(x).to_le_bytes());
    }
    pub fn write_f64(&mut self, x: Ieee64) {
        self.buf.extend_from_slice(&canonical_f64(x).to_le_bytes());
    }

    // 5.2.4. Names
    pub fn write_byte_vec(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.write_bytes(bytes);
        Ok(())
    }

    pub fn write_name(&mut self, name: &str) -> Result<()> {
        self.write_byte_vec(name.as_bytes())
    }

    // 5.1.3. Vectors
    pub fn write_vec<T, F>(&mut self, items: &[T], mut write: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        self.write_len(items.len())?;
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    /// Writes `payload` prefixed with its size.
    pub fn write_sized(&mut self, payload: &Encoder) -> Result<()> {
        self.write_len(payload.len())?;
        if let (None, Some((at, opcode))) = (self.unsupported, payload.unsupported) {
            self.unsupported = Some((self.buf.len() + at, opcode));
        }
        self.write_bytes(payload.bytes());
        Ok(())
    }
}
