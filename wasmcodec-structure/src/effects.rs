//! Declared stack effects of instructions.

use std::fmt;

use super::types::ValType;

/// One operand an instruction pops.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pop {
    /// The operand must have exactly this type.
    Exact(ValType),
    /// Any type; the popped type is captured under this slot's position.
    Any,
    /// Like `Any`, restricted to numeric types.
    Num,
    /// Like `Any`, restricted to reference types.
    Ref,
    /// The operand must have the type captured by the slot at this position.
    Captured(usize),
}

/// One result an instruction pushes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Push {
    Exact(ValType),
    /// Pushes the type captured by the pop slot at this position.
    Captured(usize),
}

impl Pop {
    /// Whether an operand of type `t` fits this slot, ignoring captures.
    pub fn admits(self, t: ValType) -> bool {
        match self {
            Pop::Exact(expected) => expected == t,
            Pop::Any | Pop::Captured(_) => true,
            Pop::Num => t.is_num(),
            Pop::Ref => t.is_ref(),
        }
    }
}

impl From<ValType> for Pop {
    fn from(t: ValType) -> Pop {
        Pop::Exact(t)
    }
}
impl From<ValType> for Push {
    fn from(t: ValType) -> Push {
        Push::Exact(t)
    }
}

/// Wildcard pop slot.
pub const ANY: Pop = Pop::Any;

/// Wildcard pop slot for numeric operands.
pub const NUM: Pop = Pop::Num;

/// Wildcard pop slot for reference operands.
pub const REF: Pop = Pop::Ref;

/// Pop slot that must repeat the type captured at `slot`.
pub const fn same(slot: usize) -> Pop {
    Pop::Captured(slot)
}

/// Push slot that repeats the type captured at `slot`.
pub const fn cap(slot: usize) -> Push {
    Push::Captured(slot)
}

/// `(pops, pushes)`, both listed in stack order: the last pop slot is the
/// topmost operand, the last push ends up on top.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct StackEffect {
    pub pops: Vec<Pop>,
    pub pushes: Vec<Push>,
}

impl StackEffect {
    pub fn new(pops: Vec<Pop>, pushes: Vec<Push>) -> Self {
        StackEffect { pops, pushes }
    }

    /// An effect without wildcards.
    pub fn exact(params: &[ValType], results: &[ValType]) -> Self {
        StackEffect {
            pops: params.iter().map(|&t| Pop::Exact(t)).collect(),
            pushes: results.iter().map(|&t| Push::Exact(t)).collect(),
        }
    }

    /// Pops `n` values of any type and pushes them back unchanged.
    pub fn passthrough(n: usize) -> Self {
        StackEffect {
            pops: vec![Pop::Any; n],
            pushes: (0..n).map(Push::Captured).collect(),
        }
    }

    /// Pops exactly `types` and pushes them back.
    pub fn keep(types: &[ValType]) -> Self {
        StackEffect::exact(types, types)
    }

    /// Appends exact pop slots below the existing ones.
    pub fn with_pops_below(mut self, types: &[ValType]) -> Self {
        let shift = types.len();
        let mut pops: Vec<Pop> = types.iter().map(|&t| Pop::Exact(t)).collect();
        pops.extend(self.pops.drain(..).map(|p| match p {
            Pop::Captured(i) => Pop::Captured(i + shift),
            p => p,
        }));
        for push in &mut self.pushes {
            if let Push::Captured(ref mut i) = *push {
                *i += shift;
            }
        }
        self.pops = pops;
        self
    }
}

impl fmt::Display for Pop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Pop::Exact(t) => write!(f, "{}", t),
            Pop::Any => f.write_str("any"),
            Pop::Num => f.write_str("num"),
            Pop::Ref => f.write_str("ref"),
            Pop::Captured(i) => write!(f, "${}", i),
        }
    }
}

impl fmt::Display for Push {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Push::Exact(t) => write!(f, "{}", t),
            Push::Captured(i) => write!(f, "${}", i),
        }
    }
}

impl fmt::Display for StackEffect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pops: Vec<String> = self.pops.iter().map(|p| p.to_string()).collect();
        let pushes: Vec<String> = self.pushes.iter().map(|p| p.to_string()).collect();
        write!(f, "[{}] -> [{}]", pops.join(" "), pushes.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_captures_each_slot() {
        let e = StackEffect::passthrough(2);
        assert_eq!(e.pops, vec![Pop::Any, Pop::Any]);
        assert_eq!(e.pushes, vec![Push::Captured(0), Push::Captured(1)]);
        assert_eq!(e.to_string(), "[any any] -> [$0 $1]");
    }

    #[test]
    fn wildcards_admit_their_class() {
        assert!(NUM.admits(ValType::F64));
        assert!(!NUM.admits(ValType::ExternRef));
        assert!(REF.admits(ValType::FuncRef));
        assert!(!REF.admits(ValType::I32));
        assert!(ANY.admits(ValType::ExternRef));
        assert!(!Pop::Exact(ValType::I32).admits(ValType::I64));
    }

    #[test]
    fn pops_below_shift_captures() {
        let e = StackEffect::new(vec![same(1), ANY], vec![cap(1)])
            .with_pops_below(&[ValType::I64]);
        assert_eq!(e.pops, vec![Pop::Exact(ValType::I64), Pop::Captured(2), Pop::Any]);
        assert_eq!(e.pushes, vec![Push::Captured(2)]);
    }
}
