//! Opcode space and the per-opcode metadata tables.
//!
//! Instructions without immediates are [`SimpleOp`]s, plain loads and stores
//! are [`MemOp`]s and the threads proposal's memory accesses are
//! [`AtomicOp`]s. Each table is generated from a single list, so opcode,
//! mnemonic and stack effect can not drift apart, and the `match`es below are
//! checked for exhaustiveness by the compiler.

use std::fmt;

use super::effects::{cap, same, StackEffect, ANY, NUM, REF};
use super::features::Feature;
use super::types::ValType;
use super::types::ValType::{F32, F64, I32, I64};

/// Which opcode space an opcode lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plane {
    /// Single byte opcodes.
    Primary,
    /// `0xFC` prefixed: saturating truncation, bulk memory, table operations.
    Misc,
    /// `0xFE` prefixed: the threads proposal.
    Atomic,
}

impl Plane {
    pub const MISC_PREFIX: u8 = 0xfc;
    pub const ATOMIC_PREFIX: u8 = 0xfe;

    /// The escape byte introducing this plane.
    pub fn prefix(self) -> Option<u8> {
        match self {
            Plane::Primary => None,
            Plane::Misc => Some(Plane::MISC_PREFIX),
            Plane::Atomic => Some(Plane::ATOMIC_PREFIX),
        }
    }

    pub fn from_prefix(b: u8) -> Option<Plane> {
        match b {
            Plane::MISC_PREFIX => Some(Plane::Misc),
            Plane::ATOMIC_PREFIX => Some(Plane::Atomic),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode {
    pub plane: Plane,
    pub code: u32,
}

impl Opcode {
    pub const fn new(plane: Plane, code: u32) -> Self {
        Opcode { plane, code }
    }

    pub const fn primary(code: u8) -> Self {
        Opcode::new(Plane::Primary, code as u32)
    }

    pub const fn misc(code: u32) -> Self {
        Opcode::new(Plane::Misc, code)
    }

    pub const fn atomic(code: u32) -> Self {
        Opcode::new(Plane::Atomic, code)
    }

    /// The proposal that has to be enabled to use this opcode.
    pub fn feature(self) -> Option<Feature> {
        match (self.plane, self.code) {
            (Plane::Primary, 0xc0..=0xc4) => Some(Feature::SignExtension),
            (Plane::Primary, 0x1c) | (Plane::Primary, 0x25) | (Plane::Primary, 0x26) => {
                Some(Feature::ReferenceTypes)
            }
            (Plane::Primary, 0xd0..=0xd2) => Some(Feature::ReferenceTypes),
            (Plane::Primary, _) => None,
            (Plane::Misc, 0..=7) => Some(Feature::SaturatingFloatToInt),
            (Plane::Misc, 8..=14) => Some(Feature::BulkMemory),
            (Plane::Misc, _) => Some(Feature::ReferenceTypes),
            (Plane::Atomic, _) => Some(Feature::Threads),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.plane.prefix() {
            None => write!(f, "0x{:02x}", self.code),
            Some(p) => write!(f, "0x{:02x} 0x{:02x}", p, self.code),
        }
    }
}

macro_rules! simple_ops {
    ($($variant:ident = $plane:ident $code:literal, $text:literal, [$($p:expr),*] => [$($r:expr),*];)*) => {
        /// Instructions without immediates.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum SimpleOp {
            $($variant,)*
        }

        impl SimpleOp {
            pub const ALL: &'static [SimpleOp] = &[$(SimpleOp::$variant,)*];

            pub fn opcode(self) -> Opcode {
                match self {
                    $(SimpleOp::$variant => Opcode::new(Plane::$plane, $code),)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(SimpleOp::$variant => $text,)*
                }
            }

            pub fn effect(self) -> StackEffect {
                match self {
                    $(SimpleOp::$variant => StackEffect::new(
                        vec![$($p.into()),*],
                        vec![$($r.into()),*],
                    ),)*
                }
            }
        }
    }
}

simple_ops! {
    // 5.4.1 Control Instructions
    Unreachable = Primary 0x00, "unreachable", [] => [];
    Nop = Primary 0x01, "nop", [] => [];
    Return = Primary 0x0f, "return", [ANY] => [cap(0)];

    // 5.4.2 Parametric Instructions
    Drop = Primary 0x1a, "drop", [ANY] => [];
    Select = Primary 0x1b, "select", [same(1), NUM, I32] => [cap(1)];

    // 5.4.3 Reference Instructions
    RefIsNull = Primary 0xd1, "ref.is_null", [REF] => [I32];

    // 5.4.5 Numeric Instructions
    I32Eqz = Primary 0x45, "i32.eqz", [I32] => [I32];
    I32Eq = Primary 0x46, "i32.eq", [I32, I32] => [I32];
    I32Ne = Primary 0x47, "i32.ne", [I32, I32] => [I32];
    I32LtS = Primary 0x48, "i32.lt_s", [I32, I32] => [I32];
    I32LtU = Primary 0x49, "i32.lt_u", [I32, I32] => [I32];
    I32GtS = Primary 0x4a, "i32.gt_s", [I32, I32] => [I32];
    I32GtU = Primary 0x4b, "i32.gt_u", [I32, I32] => [I32];
    I32LeS = Primary 0x4c, "i32.le_s", [I32, I32] => [I32];
    I32LeU = Primary 0x4d, "i32.le_u", [I32, I32] => [I32];
    I32GeS = Primary 0x4e, "i32.ge_s", [I32, I32] => [I32];
    I32GeU = Primary 0x4f, "i32.ge_u", [I32, I32] => [I32];

    I64Eqz = Primary 0x50, "i64.eqz", [I64] => [I32];
    I64Eq = Primary 0x51, "i64.eq", [I64, I64] => [I32];
    I64Ne = Primary 0x52, "i64.ne", [I64, I64] => [I32];
    I64LtS = Primary 0x53, "i64.lt_s", [I64, I64] => [I32];
    I64LtU = Primary 0x54, "i64.lt_u", [I64, I64] => [I32];
    I64GtS = Primary 0x55, "i64.gt_s", [I64, I64] => [I32];
    I64GtU = Primary 0x56, "i64.gt_u", [I64, I64] => [I32];
    I64LeS = Primary 0x57, "i64.le_s", [I64, I64] => [I32];
    I64LeU = Primary 0x58, "i64.le_u", [I64, I64] => [I32];
    I64GeS = Primary 0x59, "i64.ge_s", [I64, I64] => [I32];
    I64GeU = Primary 0x5a, "i64.ge_u", [I64, I64] => [I32];

    F32Eq = Primary 0x5b, "f32.eq", [F32, F32] => [I32];
    F32Ne = Primary 0x5c, "f32.ne", [F32, F32] => [I32];
    F32Lt = Primary 0x5d, "f32.lt", [F32, F32] => [I32];
    F32Gt = Primary 0x5e, "f32.gt", [F32, F32] => [I32];
    F32Le = Primary 0x5f, "f32.le", [F32, F32] => [I32];
    F32Ge = Primary 0x60, "f32.ge", [F32, F32] => [I32];

    F64Eq = Primary 0x61, "f64.eq", [F64, F64] => [I32];
    F64Ne = Primary 0x62, "f64.ne", [F64, F64] => [I32];
    F64Lt = Primary 0x63, "f64.lt", [F64, F64] => [I32];
    F64Gt = Primary 0x64, "f64.gt", [F64, F64] => [I32];
    F64Le = Primary 0x65, "f64.le", [F64, F64] => [I32];
    F64Ge = Primary 0x66, "f64.ge", [F64, F64] => [I32];

    I32Clz = Primary 0x67, "i32.clz", [I32] => [I32];
    I32Ctz = Primary 0x68, "i32.ctz", [I32] => [I32];
    I32Popcnt = Primary 0x69, "i32.popcnt", [I32] => [I32];
    I32Add = Primary 0x6a, "i32.add", [I32, I32] => [I32];
    I32Sub = Primary 0x6b, "i32.sub", [I32, I32] => [I32];
    I32Mul = Primary 0x6c, "i32.mul", [I32, I32] => [I32];
    I32DivS = Primary 0x6d, "i32.div_s", [I32, I32] => [I32];
    I32DivU = Primary 0x6e, "i32.div_u", [I32, I32] => [I32];
    I32RemS = Primary 0x6f, "i32.rem_s", [I32, I32] => [I32];
    I32RemU = Primary 0x70, "i32.rem_u", [I32, I32] => [I32];
    I32And = Primary 0x71, "i32.and", [I32, I32] => [I32];
    I32Or = Primary 0x72, "i32.or", [I32, I32] => [I32];
    I32Xor = Primary 0x73, "i32.xor", [I32, I32] => [I32];
    I32Shl = Primary 0x74, "i32.shl", [I32, I32] => [I32];
    I32ShrS = Primary 0x75, "i32.shr_s", [I32, I32] => [I32];
    I32ShrU = Primary 0x76, "i32.shr_u", [I32, I32] => [I32];
    I32Rotl = Primary 0x77, "i32.rotl", [I32, I32] => [I32];
    I32Rotr = Primary 0x78, "i32.rotr", [I32, I32] => [I32];

    I64Clz = Primary 0x79, "i64.clz", [I64] => [I64];
    I64Ctz = Primary 0x7a, "i64.ctz", [I64] => [I64];
    I64Popcnt = Primary 0x7b, "i64.popcnt", [I64] => [I64];
    I64Add = Primary 0x7c, "i64.add", [I64, I64] => [I64];
    I64Sub = Primary 0x7d, "i64.sub", [I64, I64] => [I64];
    I64Mul = Primary 0x7e, "i64.mul", [I64, I64] => [I64];
    I64DivS = Primary 0x7f, "i64.div_s", [I64, I64] => [I64];
    I64DivU = Primary 0x80, "i64.div_u", [I64, I64] => [I64];
    I64RemS = Primary 0x81, "i64.rem_s", [I64, I64] => [I64];
    I64RemU = Primary 0x82, "i64.rem_u", [I64, I64] => [I64];
    I64And = Primary 0x83, "i64.and", [I64, I64] => [I64];
    I64Or = Primary 0x84, "i64.or", [I64, I64] => [I64];
    I64Xor = Primary 0x85, "i64.xor", [I64, I64] => [I64];
    I64Shl = Primary 0x86, "i64.shl", [I64, I64] => [I64];
    I64ShrS = Primary 0x87, "i64.shr_s", [I64, I64] => [I64];
    I64ShrU = Primary 0x88, "i64.shr_u", [I64, I64] => [I64];
    I64Rotl = Primary 0x89, "i64.rotl", [I64, I64] => [I64];
    I64Rotr = Primary 0x8a, "i64.rotr", [I64, I64] => [I64];

    F32Abs = Primary 0x8b, "f32.abs", [F32] => [F32];
    F32Neg = Primary 0x8c, "f32.neg", [F32] => [F32];
    F32Ceil = Primary 0x8d, "f32.ceil", [F32] => [F32];
    F32Floor = Primary 0x8e, "f32.floor", [F32] => [F32];
    F32Trunc = Primary 0x8f, "f32.trunc", [F32] => [F32];
    F32Nearest = Primary 0x90, "f32.nearest", [F32] => [F32];
    F32Sqrt = Primary 0x91, "f32.sqrt", [F32] => [F32];
    F32Add = Primary 0x92, "f32.add", [F32, F32] => [F32];
    F32Sub = Primary 0x93, "f32.sub", [F32, F32] => [F32];
    F32Mul = Primary 0x94, "f32.mul", [F32, F32] => [F32];
    F32Div = Primary 0x95, "f32.div", [F32, F32] => [F32];
    F32Min = Primary 0x96, "f32.min", [F32, F32] => [F32];
    F32Max = Primary 0x97, "f32.max", [F32, F32] => [F32];
    F32Copysign = Primary 0x98, "f32.copysign", [F32, F32] => [F32];

    F64Abs = Primary 0x99, "f64.abs", [F64] => [F64];
    F64Neg = Primary 0x9a, "f64.neg", [F64] => [F64];
    F64Ceil = Primary 0x9b, "f64.ceil", [F64] => [F64];
    F64Floor = Primary 0x9c, "f64.floor", [F64] => [F64];
    F64Trunc = Primary 0x9d, "f64.trunc", [F64] => [F64];
    F64Nearest = Primary 0x9e, "f64.nearest", [F64] => [F64];
    F64Sqrt = Primary 0x9f, "f64.sqrt", [F64] => [F64];
    F64Add = Primary 0xa0, "f64.add", [F64, F64] => [F64];
    F64Sub = Primary 0xa1, "f64.sub", [F64, F64] => [F64];
    F64Mul = Primary 0xa2, "f64.mul", [F64, F64] => [F64];
    F64Div = Primary 0xa3, "f64.div", [F64, F64] => [F64];
    F64Min = Primary 0xa4, "f64.min", [F64, F64] => [F64];
    F64Max = Primary 0xa5, "f64.max", [F64, F64] => [F64];
    F64Copysign = Primary 0xa6, "f64.copysign", [F64, F64] => [F64];

    I32WrapI64 = Primary 0xa7, "i32.wrap_i64", [I64] => [I32];
    I32TruncF32S = Primary 0xa8, "i32.trunc_f32_s", [F32] => [I32];
    I32TruncF32U = Primary 0xa9, "i32.trunc_f32_u", [F32] => [I32];
    I32TruncF64S = Primary 0xaa, "i32.trunc_f64_s", [F64] => [I32];
    I32TruncF64U = Primary 0xab, "i32.trunc_f64_u", [F64] => [I32];
    I64ExtendI32S = Primary 0xac, "i64.extend_i32_s", [I32] => [I64];
    I64ExtendI32U = Primary 0xad, "i64.extend_i32_u", [I32] => [I64];
    I64TruncF32S = Primary 0xae, "i64.trunc_f32_s", [F32] => [I64];
    I64TruncF32U = Primary 0xaf, "i64.trunc_f32_u", [F32] => [I64];
    I64TruncF64S = Primary 0xb0, "i64.trunc_f64_s", [F64] => [I64];
    I64TruncF64U = Primary 0xb1, "i64.trunc_f64_u", [F64] => [I64];
    F32ConvertI32S = Primary 0xb2, "f32.convert_i32_s", [I32] => [F32];
    F32ConvertI32U = Primary 0xb3, "f32.convert_i32_u", [I32] => [F32];
    F32ConvertI64S = Primary 0xb4, "f32.convert_i64_s", [I64] => [F32];
    F32ConvertI64U = Primary 0xb5, "f32.convert_i64_u", [I64] => [F32];
    F32DemoteF64 = Primary 0xb6, "f32.demote_f64", [F64] => [F32];
    F64ConvertI32S = Primary 0xb7, "f64.convert_i32_s", [I32] => [F64];
    F64ConvertI32U = Primary 0xb8, "f64.convert_i32_u", [I32] => [F64];
    F64ConvertI64S = Primary 0xb9, "f64.convert_i64_s", [I64] => [F64];
    F64ConvertI64U = Primary 0xba, "f64.convert_i64_u", [I64] => [F64];
    F64PromoteF32 = Primary 0xbb, "f64.promote_f32", [F32] => [F64];
    I32ReinterpretF32 = Primary 0xbc, "i32.reinterpret_f32", [F32] => [I32];
    I64ReinterpretF64 = Primary 0xbd, "i64.reinterpret_f64", [F64] => [I64];
    F32ReinterpretI32 = Primary 0xbe, "f32.reinterpret_i32", [I32] => [F32];
    F64ReinterpretI64 = Primary 0xbf, "f64.reinterpret_i64", [I64] => [F64];

    I32Extend8S = Primary 0xc0, "i32.extend8_s", [I32] => [I32];
    I32Extend16S = Primary 0xc1, "i32.extend16_s", [I32] => [I32];
    I64Extend8S = Primary 0xc2, "i64.extend8_s", [I64] => [I64];
    I64Extend16S = Primary 0xc3, "i64.extend16_s", [I64] => [I64];
    I64Extend32S = Primary 0xc4, "i64.extend32_s", [I64] => [I64];

    I32TruncSatF32S = Misc 0, "i32.trunc_sat_f32_s", [F32] => [I32];
    I32TruncSatF32U = Misc 1, "i32.trunc_sat_f32_u", [F32] => [I32];
    I32TruncSatF64S = Misc 2, "i32.trunc_sat_f64_s", [F64] => [I32];
    I32TruncSatF64U = Misc 3, "i32.trunc_sat_f64_u", [F64] => [I32];
    I64TruncSatF32S = Misc 4, "i64.trunc_sat_f32_s", [F32] => [I64];
    I64TruncSatF32U = Misc 5, "i64.trunc_sat_f32_u", [F32] => [I64];
    I64TruncSatF64S = Misc 6, "i64.trunc_sat_f64_s", [F64] => [I64];
    I64TruncSatF64U = Misc 7, "i64.trunc_sat_f64_u", [F64] => [I64];
}

/// How a memory instruction touches memory; determines its stack effect.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Load,
    Store,
    Rmw,
    Cmpxchg,
    Notify,
    Wait,
}

impl Access {
    /// The stack effect for an access of value type `t` at an `i32` address.
    pub fn effect(self, t: ValType) -> StackEffect {
        match self {
            Access::Load => StackEffect::exact(&[I32], &[t]),
            Access::Store => StackEffect::exact(&[I32, t], &[]),
            Access::Rmw => StackEffect::exact(&[I32, t], &[t]),
            Access::Cmpxchg => StackEffect::exact(&[I32, t, t], &[t]),
            Access::Notify => StackEffect::exact(&[I32, I32], &[I32]),
            Access::Wait => StackEffect::exact(&[I32, t, I64], &[I32]),
        }
    }
}

macro_rules! access_ops {
    ($(#[$m:meta])* $name:ident in $plane:ident {
        $($variant:ident = $code:literal, $text:literal, $access:ident $ty:ident $width:literal;)*
    }) => {
        $(#[$m])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn opcode(self) -> Opcode {
                match self {
                    $($name::$variant => Opcode::new(Plane::$plane, $code),)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }

            pub fn access(self) -> Access {
                match self {
                    $($name::$variant => Access::$access,)*
                }
            }

            pub fn valtype(self) -> ValType {
                match self {
                    $($name::$variant => ValType::$ty,)*
                }
            }

            /// Number of bytes accessed, which is also the natural alignment.
            pub fn width(self) -> u32 {
                match self {
                    $($name::$variant => $width,)*
                }
            }

            pub fn effect(self) -> StackEffect {
                self.access().effect(self.valtype())
            }
        }
    }
}

access_ops! {
    /// Plain loads and stores, `0x28` to `0x3E`.
    MemOp in Primary {
        I32Load = 0x28, "i32.load", Load I32 4;
        I64Load = 0x29, "i64.load", Load I64 8;
        F32Load = 0x2a, "f32.load", Load F32 4;
        F64Load = 0x2b, "f64.load", Load F64 8;
        I32Load8S = 0x2c, "i32.load8_s", Load I32 1;
        I32Load8U = 0x2d, "i32.load8_u", Load I32 1;
        I32Load16S = 0x2e, "i32.load16_s", Load I32 2;
        I32Load16U = 0x2f, "i32.load16_u", Load I32 2;
        I64Load8S = 0x30, "i64.load8_s", Load I64 1;
        I64Load8U = 0x31, "i64.load8_u", Load I64 1;
        I64Load16S = 0x32, "i64.load16_s", Load I64 2;
        I64Load16U = 0x33, "i64.load16_u", Load I64 2;
        I64Load32S = 0x34, "i64.load32_s", Load I64 4;
        I64Load32U = 0x35, "i64.load32_u", Load I64 4;
        I32Store = 0x36, "i32.store", Store I32 4;
        I64Store = 0x37, "i64.store", Store I64 8;
        F32Store = 0x38, "f32.store", Store F32 4;
        F64Store = 0x39, "f64.store", Store F64 8;
        I32Store8 = 0x3a, "i32.store8", Store I32 1;
        I32Store16 = 0x3b, "i32.store16", Store I32 2;
        I64Store8 = 0x3c, "i64.store8", Store I64 1;
        I64Store16 = 0x3d, "i64.store16", Store I64 2;
        I64Store32 = 0x3e, "i64.store32", Store I64 4;
    }
}

access_ops! {
    /// Atomic memory accesses of the `0xFE` plane. `atomic.fence` has an
    /// immediate of its own and is not part of this table.
    AtomicOp in Atomic {
        MemoryAtomicNotify = 0x00, "memory.atomic.notify", Notify I32 4;
        MemoryAtomicWait32 = 0x01, "memory.atomic.wait32", Wait I32 4;
        MemoryAtomicWait64 = 0x02, "memory.atomic.wait64", Wait I64 8;

        I32AtomicLoad = 0x10, "i32.atomic.load", Load I32 4;
        I64AtomicLoad = 0x11, "i64.atomic.load", Load I64 8;
        I32AtomicLoad8U = 0x12, "i32.atomic.load8_u", Load I32 1;
        I32AtomicLoad16U = 0x13, "i32.atomic.load16_u", Load I32 2;
        I64AtomicLoad8U = 0x14, "i64.atomic.load8_u", Load I64 1;
        I64AtomicLoad16U = 0x15, "i64.atomic.load16_u", Load I64 2;
        I64AtomicLoad32U = 0x16, "i64.atomic.load32_u", Load I64 4;
        I32AtomicStore = 0x17, "i32.atomic.store", Store I32 4;
        I64AtomicStore = 0x18, "i64.atomic.store", Store I64 8;
        I32AtomicStore8 = 0x19, "i32.atomic.store8", Store I32 1;
        I32AtomicStore16 = 0x1a, "i32.atomic.store16", Store I32 2;
        I64AtomicStore8 = 0x1b, "i64.atomic.store8", Store I64 1;
        I64AtomicStore16 = 0x1c, "i64.atomic.store16", Store I64 2;
        I64AtomicStore32 = 0x1d, "i64.atomic.store32", Store I64 4;

        I32AtomicRmwAdd = 0x1e, "i32.atomic.rmw.add", Rmw I32 4;
        I64AtomicRmwAdd = 0x1f, "i64.atomic.rmw.add", Rmw I64 8;
        I32AtomicRmw8AddU = 0x20, "i32.atomic.rmw8.add_u", Rmw I32 1;
        I32AtomicRmw16AddU = 0x21, "i32.atomic.rmw16.add_u", Rmw I32 2;
        I64AtomicRmw8AddU = 0x22, "i64.atomic.rmw8.add_u", Rmw I64 1;
        I64AtomicRmw16AddU = 0x23, "i64.atomic.rmw16.add_u", Rmw I64 2;
        I64AtomicRmw32AddU = 0x24, "i64.atomic.rmw32.add_u", Rmw I64 4;

        I32AtomicRmwSub = 0x25, "i32.atomic.rmw.sub", Rmw I32 4;
        I64AtomicRmwSub = 0x26, "i64.atomic.rmw.sub", Rmw I64 8;
        I32AtomicRmw8SubU = 0x27, "i32.atomic.rmw8.sub_u", Rmw I32 1;
        I32AtomicRmw16SubU = 0x28, "i32.atomic.rmw16.sub_u", Rmw I32 2;
        I64AtomicRmw8SubU = 0x29, "i64.atomic.rmw8.sub_u", Rmw I64 1;
        I64AtomicRmw16SubU = 0x2a, "i64.atomic.rmw16.sub_u", Rmw I64 2;
        I64AtomicRmw32SubU = 0x2b, "i64.atomic.rmw32.sub_u", Rmw I64 4;

        I32AtomicRmwAnd = 0x2c, "i32.atomic.rmw.and", Rmw I32 4;
        I64AtomicRmwAnd = 0x2d, "i64.atomic.rmw.and", Rmw I64 8;
        I32AtomicRmw8AndU = 0x2e, "i32.atomic.rmw8.and_u", Rmw I32 1;
        I32AtomicRmw16AndU = 0x2f, "i32.atomic.rmw16.and_u", Rmw I32 2;
        I64AtomicRmw8AndU = 0x30, "i64.atomic.rmw8.and_u", Rmw I64 1;
        I64AtomicRmw16AndU = 0x31, "i64.atomic.rmw16.and_u", Rmw I64 2;
        I64AtomicRmw32AndU = 0x32, "i64.atomic.rmw32.and_u", Rmw I64 4;

        I32AtomicRmwOr = 0x33, "i32.atomic.rmw.or", Rmw I32 4;
        I64AtomicRmwOr = 0x34, "i64.atomic.rmw.or", Rmw I64 8;
        I32AtomicRmw8OrU = 0x35, "i32.atomic.rmw8.or_u", Rmw I32 1;
        I32AtomicRmw16OrU = 0x36, "i32.atomic.rmw16.or_u", Rmw I32 2;
        I64AtomicRmw8OrU = 0x37, "i64.atomic.rmw8.or_u", Rmw I64 1;
        I64AtomicRmw16OrU = 0x38, "i64.atomic.rmw16.or_u", Rmw I64 2;
        I64AtomicRmw32OrU = 0x39, "i64.atomic.rmw32.or_u", Rmw I64 4;

        I32AtomicRmwXor = 0x3a, "i32.atomic.rmw.xor", Rmw I32 4;
        I64AtomicRmwXor = 0x3b, "i64.atomic.rmw.xor", Rmw I64 8;
        I32AtomicRmw8XorU = 0x3c, "i32.atomic.rmw8.xor_u", Rmw I32 1;
        I32AtomicRmw16XorU = 0x3d, "i32.atomic.rmw16.xor_u", Rmw I32 2;
        I64AtomicRmw8XorU = 0x3e, "i64.atomic.rmw8.xor_u", Rmw I64 1;
        I64AtomicRmw16XorU = 0x3f, "i64.atomic.rmw16.xor_u", Rmw I64 2;
        I64AtomicRmw32XorU = 0x40, "i64.atomic.rmw32.xor_u", Rmw I64 4;

        I32AtomicRmwXchg = 0x41, "i32.atomic.rmw.xchg", Rmw I32 4;
        I64AtomicRmwXchg = 0x42, "i64.atomic.rmw.xchg", Rmw I64 8;
        I32AtomicRmw8XchgU = 0x43, "i32.atomic.rmw8.xchg_u", Rmw I32 1;
        I32AtomicRmw16XchgU = 0x44, "i32.atomic.rmw16.xchg_u", Rmw I32 2;
        I64AtomicRmw8XchgU = 0x45, "i64.atomic.rmw8.xchg_u", Rmw I64 1;
        I64AtomicRmw16XchgU = 0x46, "i64.atomic.rmw16.xchg_u", Rmw I64 2;
        I64AtomicRmw32XchgU = 0x47, "i64.atomic.rmw32.xchg_u", Rmw I64 4;

        I32AtomicRmwCmpxchg = 0x48, "i32.atomic.rmw.cmpxchg", Cmpxchg I32 4;
        I64AtomicRmwCmpxchg = 0x49, "i64.atomic.rmw.cmpxchg", Cmpxchg I64 8;
        I32AtomicRmw8CmpxchgU = 0x4a, "i32.atomic.rmw8.cmpxchg_u", Cmpxchg I32 1;
        I32AtomicRmw16CmpxchgU = 0x4b, "i32.atomic.rmw16.cmpxchg_u", Cmpxchg I32 2;
        I64AtomicRmw8CmpxchgU = 0x4c, "i64.atomic.rmw8.cmpxchg_u", Cmpxchg I64 1;
        I64AtomicRmw16CmpxchgU = 0x4d, "i64.atomic.rmw16.cmpxchg_u", Cmpxchg I64 2;
        I64AtomicRmw32CmpxchgU = 0x4e, "i64.atomic.rmw32.cmpxchg_u", Cmpxchg I64 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tables_have_no_duplicate_opcodes() {
        let mut seen = HashSet::new();
        let all = SimpleOp::ALL.iter().map(|op| op.opcode())
            .chain(MemOp::ALL.iter().map(|op| op.opcode()))
            .chain(AtomicOp::ALL.iter().map(|op| op.opcode()));
        for opcode in all {
            assert!(seen.insert(opcode), "duplicate opcode {}", opcode);
        }
    }

    #[test]
    fn opcode_display() {
        assert_eq!(SimpleOp::I32Add.opcode().to_string(), "0x6a");
        assert_eq!(SimpleOp::I64TruncSatF64U.opcode().to_string(), "0xfc 0x07");
        assert_eq!(AtomicOp::I32AtomicLoad.opcode().to_string(), "0xfe 0x10");
    }

    #[test]
    fn feature_requirements() {
        assert_eq!(SimpleOp::I32Add.opcode().feature(), None);
        assert_eq!(SimpleOp::I32Extend8S.opcode().feature(), Some(Feature::SignExtension));
        assert_eq!(SimpleOp::I32TruncSatF32S.opcode().feature(), Some(Feature::SaturatingFloatToInt));
        assert_eq!(SimpleOp::RefIsNull.opcode().feature(), Some(Feature::ReferenceTypes));
        assert_eq!(Opcode::misc(8).feature(), Some(Feature::BulkMemory));
        assert_eq!(Opcode::misc(16).feature(), Some(Feature::ReferenceTypes));
        assert_eq!(AtomicOp::MemoryAtomicNotify.opcode().feature(), Some(Feature::Threads));
    }

    #[test]
    fn memory_effects() {
        assert_eq!(MemOp::I64Load32U.effect(), StackEffect::exact(&[I32], &[I64]));
        assert_eq!(MemOp::F32Store.effect(), StackEffect::exact(&[I32, F32], &[]));
        assert_eq!(AtomicOp::I64AtomicRmw8CmpxchgU.effect(), StackEffect::exact(&[I32, I64, I64], &[I64]));
        assert_eq!(AtomicOp::MemoryAtomicWait64.effect(), StackEffect::exact(&[I32, I64, I64], &[I32]));
    }
}
