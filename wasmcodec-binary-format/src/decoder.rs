use nom::Err as NomErr;
use nom::IResult;

use wasmcodec_structure::error::{Error, Result};
use wasmcodec_structure::types::Name;

use super::parsers;
use super::parsers::Inp;

/// A cursor over a byte buffer that knows its absolute offset.
///
/// Each read consumes exactly the bytes of one value. Sub-readers created
/// by [`Decoder::slice`] report offsets relative to the outermost buffer.
#[derive(Clone, Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Decoder { input, pos: 0, base: 0 }
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.input.get(self.pos).cloned()
    }

    fn exhausted(&self, requested: usize) -> Error {
        Error::BufferExhausted {
            offset: self.offset(),
            requested,
            available: self.remaining(),
        }
    }

    /// Runs a `nom` parser on the remaining input.
    ///
    /// Running out of input becomes `BufferExhausted`, every other parser
    /// failure `Malformed` with `what` in the message.
    pub fn run<T, P>(&mut self, mut parser: P, what: &str) -> Result<T>
    where
        P: FnMut(Inp<'a>) -> IResult<Inp<'a>, T>,
    {
        let rest = self.rest();
        match parser(rest) {
            Ok((after, value)) => {
                self.pos += rest.len() - after.len();
                Ok(value)
            }
            Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => {
                let at = self.offset() + (rest.len() - e.input.len());
                if e.code == nom::error::ErrorKind::Eof {
                    Err(Error::BufferExhausted {
                        offset: at,
                        requested: e.input.len() + 1,
                        available: e.input.len(),
                    })
                } else {
                    Err(Error::malformed(at, format!("invalid {}", what)))
                }
            }
            Err(NomErr::Incomplete(needed)) => {
                let requested = match needed {
                    nom::Needed::Size(n) => rest.len() + n.get(),
                    nom::Needed::Unknown => rest.len() + 1,
                };
                Err(self.exhausted(requested))
            }
        }
    }

    /// Performs one read and reports how many bytes it consumed.
    pub fn measure<T, F>(&mut self, read: F) -> Result<(T, usize)>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let start = self.pos;
        let value = read(self)?;
        Ok((value, self.pos - start))
    }

    /// A sub-reader over exactly the next `len` bytes, which are consumed
    /// from this reader.
    pub fn slice(&mut self, len: usize) -> Result<Decoder<'a>> {
        let bytes = self.read_bytes(len)?;
        Ok(Decoder {
            input: bytes,
            pos: 0,
            base: self.offset() - len,
        })
    }

    /// Fails if any input is left, naming `what` was being decoded.
    pub fn finish(&self, what: &str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(
                self.offset(),
                format!("{} byte(s) left over after {}", self.remaining(), what),
            ))
        }
    }

    // 5.2.1. Bytes
    pub fn read_u8(&mut self) -> Result<u8> {
        match self.peek_u8() {
            Some(b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(self.exhausted(1)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.exhausted(len));
        }
        let bytes = &self.input[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads `tag` or fails with `what` in the message.
    pub fn expect_u8(&mut self, tag: u8, what: &str) -> Result<()> {
        let offset = self.offset();
        let b = self.read_u8()?;
        if b == tag {
            Ok(())
        } else {
            Err(Error::malformed(offset, format!("expected {} 0x{:02x}, found 0x{:02x}", what, tag, b)))
        }
    }

    // 5.2.2. Integers
    pub fn read_u32(&mut self) -> Result<u32> {
        self.run(parsers::parse_u32, "u32")
    }
    pub fn read_u64(&mut self) -> Result<u64> {
        self.run(parsers::parse_u64, "u64")
    }
    pub fn read_s32(&mut self) -> Result<i32> {
        self.run(parsers::parse_s32, "s32")
    }
    pub fn read_s33(&mut self) -> Result<i64> {
        self.run(parsers::parse_s33, "s33")
    }
    pub fn read_s64(&mut self) -> Result<i64> {
        self.run(parsers::parse_s64, "s64")
    }

    pub fn read_fixed_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        let (_, v) = parsers::parse_fixed_u32(bytes).map_err(|_| self.exhausted(4))?;
        Ok(v)
    }

    // 5.2.3. Floating-Point
    pub fn read_f32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        let (_, v) = parsers::parse_f32(bytes).map_err(|_| self.exhausted(4))?;
        Ok(v)
    }
    pub fn read_f64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let (_, v) = parsers::parse_f64(bytes).map_err(|_| self.exhausted(8))?;
        Ok(v)
    }

    // 5.2.4. Names
    pub fn read_byte_vec(&mut self) -> Result<&'a [u8]> {
        let n = self.read_u32()?;
        self.read_bytes(n as usize)
    }

    pub fn read_name(&mut self) -> Result<Name> {
        let offset = self.offset();
        let bytes = self.read_byte_vec()?;
        ::std::str::from_utf8(bytes)
            .map(Name::from)
            .map_err(|e| Error::malformed(offset, format!("name is not valid UTF-8: {}", e)))
    }

    // 5.1.3. Vectors
    pub fn read_vec<T, F>(&mut self, mut read: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let n = self.read_u32()?;
        self.read_array(n as usize, |d| read(d))
    }

    /// `n` consecutive values without a length prefix.
    pub fn read_array<T, F>(&mut self, n: usize, mut read: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let mut v = Vec::with_capacity(n.min(self.remaining()));
        for _ in 0..n {
            v.push(read(self)?);
        }
        Ok(v)
    }
}
