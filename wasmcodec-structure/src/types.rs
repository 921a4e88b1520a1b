//! Value, function, limit and block types.

use std::fmt;

/// A name: a UTF-8 string, written as a byte vector.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Default)]
pub struct Name {
    inner: String,
}
impl From<String> for Name {
    fn from(inner: String) -> Self {
        Name { inner }
    }
}
impl<'a> From<&'a str> for Name {
    fn from(inner: &'a str) -> Self {
        Name { inner: inner.into() }
    }
}
impl From<Name> for String {
    fn from(name: Name) -> String {
        name.inner
    }
}
impl ::std::ops::Deref for Name {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    FuncRef,
    ExternRef,
}

impl ValType {
    pub fn to_byte(self) -> u8 {
        match self {
            ValType::I32 => 0x7f,
            ValType::I64 => 0x7e,
            ValType::F32 => 0x7d,
            ValType::F64 => 0x7c,
            ValType::FuncRef => 0x70,
            ValType::ExternRef => 0x6f,
        }
    }

    pub fn from_byte(b: u8) -> Option<ValType> {
        Some(match b {
            0x7f => ValType::I32,
            0x7e => ValType::I64,
            0x7d => ValType::F32,
            0x7c => ValType::F64,
            0x70 => ValType::FuncRef,
            0x6f => ValType::ExternRef,
            _ => return None,
        })
    }

    pub fn is_ref(self) -> bool {
        matches!(self, ValType::FuncRef | ValType::ExternRef)
    }

    pub fn is_num(self) -> bool {
        !self.is_ref()
    }

    pub const ALL: [ValType; 6] = [
        ValType::I32,
        ValType::I64,
        ValType::F32,
        ValType::F64,
        ValType::FuncRef,
        ValType::ExternRef,
    ];
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        })
    }
}

/// Formats a type list as `[i32 f64]`.
pub fn display_types(types: &[ValType]) -> String {
    let inner: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("[{}]", inner.join(" "))
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum RefType {
    FuncRef,
    ExternRef,
}

impl RefType {
    pub fn from_byte(b: u8) -> Option<RefType> {
        match b {
            0x70 => Some(RefType::FuncRef),
            0x6f => Some(RefType::ExternRef),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        ValType::from(self).to_byte()
    }
}

impl From<RefType> for ValType {
    fn from(t: RefType) -> ValType {
        match t {
            RefType::FuncRef => ValType::FuncRef,
            RefType::ExternRef => ValType::ExternRef,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        FuncType {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", display_types(&self.params), display_types(&self.results))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemType {
    pub limits: Limits,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableType {
    pub elem: RefType,
    pub limits: Limits,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalType {
    pub mutability: Mut,
    pub valtype: ValType,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Mut {
    Const,
    Var,
}

/// The type annotation of `block`, `loop` and `if`.
///
/// `Func` is written as a type index and therefore has to be present in the
/// module's type section when encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Empty,
    Value(ValType),
    Func(FuncType),
}

impl BlockType {
    pub fn params(&self) -> &[ValType] {
        match *self {
            BlockType::Func(ref ft) => &ft.params,
            _ => &[],
        }
    }

    pub fn results(&self) -> &[ValType] {
        match *self {
            BlockType::Empty => &[],
            BlockType::Value(ref t) => ::std::slice::from_ref(t),
            BlockType::Func(ref ft) => &ft.results,
        }
    }
}

impl From<Option<ValType>> for BlockType {
    fn from(t: Option<ValType>) -> Self {
        t.map(BlockType::Value).unwrap_or(BlockType::Empty)
    }
}
impl From<ValType> for BlockType {
    fn from(t: ValType) -> Self {
        BlockType::Value(t)
    }
}
impl From<FuncType> for BlockType {
    fn from(ft: FuncType) -> Self {
        BlockType::Func(ft)
    }
}

/// A 32-bit float held as its bit pattern, so equality is bitwise and NaN
/// payloads survive comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ieee32(pub u32);

/// A 64-bit float held as its bit pattern.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ieee64(pub u64);

impl From<f32> for Ieee32 {
    fn from(x: f32) -> Self {
        Ieee32(x.to_bits())
    }
}
impl From<f64> for Ieee64 {
    fn from(x: f64) -> Self {
        Ieee64(x.to_bits())
    }
}
impl Ieee32 {
    pub fn value(self) -> f32 {
        f32::from_bits(self.0)
    }
}
impl Ieee64 {
    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}
