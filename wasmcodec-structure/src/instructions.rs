use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use super::effects::StackEffect;
use super::error::{Error, Result};
use super::modules::DataRef;
use super::modules::ElemRef;
use super::modules::FuncRef;
use super::modules::GlobalRef;
use super::modules::MemRef;
use super::modules::TableRef;
use super::opcodes::{AtomicOp, MemOp, Opcode, SimpleOp};
use super::types::BlockType;
use super::types::FuncType;
use super::types::GlobalType;
use super::types::Ieee32;
use super::types::Ieee64;
use super::types::Name;
use super::types::RefType;
use super::types::TableType;
use super::types::ValType;
use super::types::ValType::{F32, F64, I32, I64};

/// Alignment exponent and offset of a memory access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct MemArg {
    /// log2 of the alignment in bytes.
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    pub fn new(align: u32, offset: u32) -> Self {
        MemArg { align, offset }
    }
}

static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

/// Identity of one `block`, `loop` or `if`.
///
/// Branches name their target by its label, the relative depth is only
/// computed when writing the binary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    pub fn fresh() -> Label {
        Label(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Simple(SimpleOp),
    Memory(MemOp, MemArg),
    Atomic(AtomicOp, MemArg),
    AtomicFence,

    // 5.4.1 Control Instructions
    Block { label: Label, ty: BlockType, body: Vec<Instr> },
    Loop { label: Label, ty: BlockType, body: Vec<Instr> },
    If { label: Label, ty: BlockType, then: Vec<Instr>, else_: Vec<Instr> },
    Br(Label),
    BrIf(Label),
    BrTable { targets: Vec<Label>, default: Label },
    Call(FuncRef),
    CallIndirect { ty: FuncType, table: TableRef },

    // 5.4.2 Parametric Instructions
    SelectTyped(Vec<ValType>),

    // 5.4.3 Variable Instructions
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(GlobalRef),
    GlobalSet(GlobalRef),

    // 5.4.4 Table Instructions
    TableGet(TableRef),
    TableSet(TableRef),
    TableSize(TableRef),
    TableGrow(TableRef),
    TableFill(TableRef),
    TableCopy { dst: TableRef, src: TableRef },
    TableInit { elem: ElemRef, table: TableRef },
    ElemDrop(ElemRef),

    // 5.4.5 Memory Instructions
    MemorySize(MemRef),
    MemoryGrow(MemRef),
    MemoryFill(MemRef),
    MemoryCopy { dst: MemRef, src: MemRef },
    MemoryInit { data: DataRef, mem: MemRef },
    DataDrop(DataRef),

    // 5.4.6 Numeric and Reference Instructions
    I32Const(i32),
    I64Const(i64),
    F32Const(Ieee32),
    F64Const(Ieee64),
    RefNull(RefType),
    RefFunc(FuncRef),
}

/// Contextual types an instruction's stack effect depends on.
pub trait EffectEnv {
    fn local_type(&self, index: u32) -> Result<ValType>;
    fn global_type(&self, global: &GlobalRef) -> Result<GlobalType>;
    fn func_type(&self, func: &FuncRef) -> Result<FuncType>;
    fn table_type(&self, table: &TableRef) -> Result<TableType>;
    /// Types a branch to `label` carries: the results of a block or `if`,
    /// the params of a loop.
    fn label_types(&self, label: Label) -> Result<Vec<ValType>>;
    /// Results of the enclosing function.
    fn return_types(&self) -> Result<Vec<ValType>>;
}

/// Mutable access to one entity reference held by an instruction.
#[derive(Debug)]
pub enum RefMut<'a> {
    Func(&'a mut FuncRef),
    Table(&'a mut TableRef),
    Mem(&'a mut MemRef),
    Global(&'a mut GlobalRef),
    Elem(&'a mut ElemRef),
    Data(&'a mut DataRef),
}

impl Instr {
    /// A `block` with a fresh label; `body` receives the label to branch to.
    pub fn block(ty: impl Into<BlockType>, body: impl FnOnce(Label) -> Vec<Instr>) -> Instr {
        let label = Label::fresh();
        Instr::Block { label, ty: ty.into(), body: body(label) }
    }

    pub fn loop_(ty: impl Into<BlockType>, body: impl FnOnce(Label) -> Vec<Instr>) -> Instr {
        let label = Label::fresh();
        Instr::Loop { label, ty: ty.into(), body: body(label) }
    }

    pub fn if_else(
        ty: impl Into<BlockType>,
        then: impl FnOnce(Label) -> Vec<Instr>,
        else_: impl FnOnce(Label) -> Vec<Instr>,
    ) -> Instr {
        let label = Label::fresh();
        Instr::If { label, ty: ty.into(), then: then(label), else_: else_(label) }
    }

    pub fn opcode(&self) -> Opcode {
        use self::Instr::*;

        match *self {
            Simple(op) => op.opcode(),
            Memory(op, _) => op.opcode(),
            Atomic(op, _) => op.opcode(),
            AtomicFence => Opcode::atomic(0x03),

            Block { .. } => Opcode::primary(0x02),
            Loop { .. } => Opcode::primary(0x03),
            If { .. } => Opcode::primary(0x04),
            Br(_) => Opcode::primary(0x0c),
            BrIf(_) => Opcode::primary(0x0d),
            BrTable { .. } => Opcode::primary(0x0e),
            Call(_) => Opcode::primary(0x10),
            CallIndirect { .. } => Opcode::primary(0x11),

            SelectTyped(_) => Opcode::primary(0x1c),

            LocalGet(_) => Opcode::primary(0x20),
            LocalSet(_) => Opcode::primary(0x21),
            LocalTee(_) => Opcode::primary(0x22),
            GlobalGet(_) => Opcode::primary(0x23),
            GlobalSet(_) => Opcode::primary(0x24),

            TableGet(_) => Opcode::primary(0x25),
            TableSet(_) => Opcode::primary(0x26),
            TableInit { .. } => Opcode::misc(12),
            ElemDrop(_) => Opcode::misc(13),
            TableCopy { .. } => Opcode::misc(14),
            TableGrow(_) => Opcode::misc(15),
            TableSize(_) => Opcode::misc(16),
            TableFill(_) => Opcode::misc(17),

            MemorySize(_) => Opcode::primary(0x3f),
            MemoryGrow(_) => Opcode::primary(0x40),
            MemoryInit { .. } => Opcode::misc(8),
            DataDrop(_) => Opcode::misc(9),
            MemoryCopy { .. } => Opcode::misc(10),
            MemoryFill(_) => Opcode::misc(11),

            I32Const(_) => Opcode::primary(0x41),
            I64Const(_) => Opcode::primary(0x42),
            F32Const(_) => Opcode::primary(0x43),
            F64Const(_) => Opcode::primary(0x44),
            RefNull(_) => Opcode::primary(0xd0),
            RefFunc(_) => Opcode::primary(0xd2),
        }
    }

    pub fn name(&self) -> &'static str {
        use self::Instr::*;

        match *self {
            Simple(op) => op.name(),
            Memory(op, _) => op.name(),
            Atomic(op, _) => op.name(),
            AtomicFence => "atomic.fence",
            Block { .. } => "block",
            Loop { .. } => "loop",
            If { .. } => "if",
            Br(_) => "br",
            BrIf(_) => "br_if",
            BrTable { .. } => "br_table",
            Call(_) => "call",
            CallIndirect { .. } => "call_indirect",
            SelectTyped(_) => "select",
            LocalGet(_) => "local.get",
            LocalSet(_) => "local.set",
            LocalTee(_) => "local.tee",
            GlobalGet(_) => "global.get",
            GlobalSet(_) => "global.set",
            TableGet(_) => "table.get",
            TableSet(_) => "table.set",
            TableSize(_) => "table.size",
            TableGrow(_) => "table.grow",
            TableFill(_) => "table.fill",
            TableCopy { .. } => "table.copy",
            TableInit { .. } => "table.init",
            ElemDrop(_) => "elem.drop",
            MemorySize(_) => "memory.size",
            MemoryGrow(_) => "memory.grow",
            MemoryFill(_) => "memory.fill",
            MemoryCopy { .. } => "memory.copy",
            MemoryInit { .. } => "memory.init",
            DataDrop(_) => "data.drop",
            I32Const(_) => "i32.const",
            I64Const(_) => "i64.const",
            F32Const(_) => "f32.const",
            F64Const(_) => "f64.const",
            RefNull(_) => "ref.null",
            RefFunc(_) => "ref.func",
        }
    }

    /// The label of a block-like instruction.
    pub fn label(&self) -> Option<Label> {
        match *self {
            Instr::Block { label, .. } | Instr::Loop { label, .. } | Instr::If { label, .. } => {
                Some(label)
            }
            _ => None,
        }
    }

    /// The nested sequences of a block-like instruction. Only `if` has a
    /// second one.
    pub fn bodies(&self) -> Option<(&[Instr], &[Instr])> {
        match *self {
            Instr::Block { ref body, .. } | Instr::Loop { ref body, .. } => Some((body, &[])),
            Instr::If { ref then, ref else_, .. } => Some((then, else_)),
            _ => None,
        }
    }

    /// The declared stack effect, with contextual types taken from `env`.
    pub fn effect<E: EffectEnv + ?Sized>(&self, env: &E) -> Result<StackEffect> {
        use self::Instr::*;

        let exact = StackEffect::exact;
        Ok(match *self {
            Simple(SimpleOp::Return) => StackEffect::keep(&env.return_types()?),
            Simple(op) => op.effect(),
            Memory(op, _) => op.effect(),
            Atomic(op, _) => op.effect(),
            AtomicFence => StackEffect::default(),

            Block { ref ty, .. } | Loop { ref ty, .. } => exact(ty.params(), ty.results()),
            If { ref ty, .. } => exact(&with_top(ty.params(), I32), ty.results()),
            Br(label) => StackEffect::keep(&env.label_types(label)?),
            BrIf(label) => {
                let types = env.label_types(label)?;
                exact(&with_top(&types, I32), &types)
            }
            BrTable { ref targets, default } => {
                let types = env.label_types(default)?;
                for &target in targets {
                    if env.label_types(target)? != types {
                        return Err(Error::structure(format!(
                            "br_table target {} disagrees with the default's arity",
                            target
                        )));
                    }
                }
                exact(&with_top(&types, I32), &types)
            }
            Call(ref func) => {
                let ft = env.func_type(func)?;
                exact(&ft.params, &ft.results)
            }
            CallIndirect { ref ty, .. } => exact(&with_top(&ty.params, I32), &ty.results),

            SelectTyped(ref types) => match types[..] {
                [t] => exact(&[t, t, I32], &[t]),
                _ => {
                    return Err(Error::structure(format!(
                        "typed select needs exactly one type, got {}",
                        types.len()
                    )))
                }
            },

            LocalGet(index) => exact(&[], &[env.local_type(index)?]),
            LocalSet(index) => exact(&[env.local_type(index)?], &[]),
            LocalTee(index) => StackEffect::keep(&[env.local_type(index)?]),
            GlobalGet(ref global) => exact(&[], &[env.global_type(global)?.valtype]),
            GlobalSet(ref global) => exact(&[env.global_type(global)?.valtype], &[]),

            TableGet(ref table) => exact(&[I32], &[env.table_type(table)?.elem.into()]),
            TableSet(ref table) => exact(&[I32, env.table_type(table)?.elem.into()], &[]),
            TableSize(_) => exact(&[], &[I32]),
            TableGrow(ref table) => exact(&[env.table_type(table)?.elem.into(), I32], &[I32]),
            TableFill(ref table) => exact(&[I32, env.table_type(table)?.elem.into(), I32], &[]),
            TableCopy { .. } | TableInit { .. } => exact(&[I32, I32, I32], &[]),
            ElemDrop(_) => StackEffect::default(),

            MemorySize(_) => exact(&[], &[I32]),
            MemoryGrow(_) => exact(&[I32], &[I32]),
            MemoryFill(_) | MemoryCopy { .. } | MemoryInit { .. } => exact(&[I32, I32, I32], &[]),
            DataDrop(_) => StackEffect::default(),

            I32Const(_) => exact(&[], &[I32]),
            I64Const(_) => exact(&[], &[I64]),
            F32Const(_) => exact(&[], &[F32]),
            F64Const(_) => exact(&[], &[F64]),
            RefNull(t) => exact(&[], &[t.into()]),
            RefFunc(_) => exact(&[], &[ValType::FuncRef]),
        })
    }

    /// Calls `f` for every entity reference in this instruction and its
    /// nested bodies.
    pub fn visit_refs_mut<F: FnMut(RefMut) -> Result<()>>(&mut self, f: &mut F) -> Result<()> {
        use self::Instr::*;

        match *self {
            Block { ref mut body, .. } | Loop { ref mut body, .. } => {
                for instr in body {
                    instr.visit_refs_mut(f)?;
                }
                Ok(())
            }
            If { ref mut then, ref mut else_, .. } => {
                for instr in then.iter_mut().chain(else_.iter_mut()) {
                    instr.visit_refs_mut(f)?;
                }
                Ok(())
            }
            Call(ref mut func) | RefFunc(ref mut func) => f(RefMut::Func(func)),
            CallIndirect { ref mut table, .. } => f(RefMut::Table(table)),
            GlobalGet(ref mut global) | GlobalSet(ref mut global) => f(RefMut::Global(global)),
            TableGet(ref mut table)
            | TableSet(ref mut table)
            | TableSize(ref mut table)
            | TableGrow(ref mut table)
            | TableFill(ref mut table) => f(RefMut::Table(table)),
            TableCopy { ref mut dst, ref mut src } => {
                f(RefMut::Table(dst))?;
                f(RefMut::Table(src))
            }
            TableInit { ref mut elem, ref mut table } => {
                f(RefMut::Elem(elem))?;
                f(RefMut::Table(table))
            }
            ElemDrop(ref mut elem) => f(RefMut::Elem(elem)),
            MemorySize(ref mut mem) | MemoryGrow(ref mut mem) | MemoryFill(ref mut mem) => {
                f(RefMut::Mem(mem))
            }
            MemoryCopy { ref mut dst, ref mut src } => {
                f(RefMut::Mem(dst))?;
                f(RefMut::Mem(src))
            }
            MemoryInit { ref mut data, ref mut mem } => {
                f(RefMut::Data(data))?;
                f(RefMut::Mem(mem))
            }
            DataDrop(ref mut data) => f(RefMut::Data(data)),
            _ => Ok(()),
        }
    }

    /// Calls `f` for every function type this instruction names by type
    /// index on the wire.
    pub fn visit_types<F: FnMut(&FuncType)>(&self, f: &mut F) {
        match *self {
            Instr::Block { ref ty, .. } | Instr::Loop { ref ty, .. } | Instr::If { ref ty, .. } => {
                if let BlockType::Func(ref ft) = *ty {
                    f(ft);
                }
            }
            Instr::CallIndirect { ref ty, .. } => f(ty),
            _ => {}
        }
        if let Some((first, second)) = self.bodies() {
            for instr in first.iter().chain(second) {
                instr.visit_types(f);
            }
        }
    }
}

impl Instr {
    /// A call to a function that is linked by name later.
    pub fn call_named(name: impl Into<Name>) -> Instr {
        Instr::Call(FuncRef::named(name))
    }
}

impl From<SimpleOp> for Instr {
    fn from(op: SimpleOp) -> Instr {
        Instr::Simple(op)
    }
}

fn with_top(types: &[ValType], top: ValType) -> Vec<ValType> {
    let mut v = types.to_vec();
    v.push(top);
    v
}

/// An instruction sequence, terminated by `end` on the wire.
///
/// `label` names the implicit frame around the sequence, so a branch to it
/// leaves the function (or constant expression).
///
/// Equality ignores which labels name the blocks: two expressions are equal
/// if every branch targets a block at the same relative depth.
#[derive(Clone, Debug)]
pub struct Expr {
    pub label: Label,
    pub body: Vec<Instr>,
}

impl Expr {
    pub fn new(body: Vec<Instr>) -> Self {
        Expr { label: Label::fresh(), body }
    }

    /// Builds the body with access to the frame label.
    pub fn with_frame(body: impl FnOnce(Label) -> Vec<Instr>) -> Self {
        let label = Label::fresh();
        Expr { label, body: body(label) }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::new(Vec::new())
    }
}

impl From<Vec<Instr>> for Expr {
    fn from(body: Vec<Instr>) -> Self {
        Expr::new(body)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        scoped(&mut Vec::new(), self.label, other.label, |s| seq_eq(&self.body, &other.body, s))
    }
}

fn seq_eq(a: &[Instr], b: &[Instr], scope: &mut Vec<(Label, Label)>) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| instr_eq(a, b, scope))
}

fn scoped<F>(scope: &mut Vec<(Label, Label)>, a: Label, b: Label, f: F) -> bool
where
    F: FnOnce(&mut Vec<(Label, Label)>) -> bool,
{
    scope.push((a, b));
    let eq = f(scope);
    scope.pop();
    eq
}

fn target_eq(scope: &[(Label, Label)], a: Label, b: Label) -> bool {
    let da = scope.iter().rev().position(|&(l, _)| l == a);
    let db = scope.iter().rev().position(|&(_, l)| l == b);
    match (da, db) {
        (None, None) => a == b,
        (da, db) => da == db,
    }
}

fn instr_eq(a: &Instr, b: &Instr, scope: &mut Vec<(Label, Label)>) -> bool {
    use self::Instr::*;

    match (a, b) {
        (&Block { label: la, ty: ref ta, body: ref ba }, &Block { label: lb, ty: ref tb, body: ref bb })
        | (&Loop { label: la, ty: ref ta, body: ref ba }, &Loop { label: lb, ty: ref tb, body: ref bb }) => {
            ta == tb && scoped(scope, la, lb, |s| seq_eq(ba, bb, s))
        }
        (
            &If { label: la, ty: ref ta, then: ref tha, else_: ref ea },
            &If { label: lb, ty: ref tb, then: ref thb, else_: ref eb },
        ) => ta == tb && scoped(scope, la, lb, |s| seq_eq(tha, thb, s) && seq_eq(ea, eb, s)),
        (&Br(la), &Br(lb)) | (&BrIf(la), &BrIf(lb)) => target_eq(scope, la, lb),
        (&BrTable { targets: ref ta, default: da }, &BrTable { targets: ref tb, default: db }) => {
            ta.len() == tb.len()
                && ta.iter().zip(tb).all(|(&x, &y)| target_eq(scope, x, y))
                && target_eq(scope, da, db)
        }
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_labels_are_distinct() {
        assert_ne!(Label::fresh(), Label::fresh());
    }

    #[test]
    fn expr_equality_ignores_label_identity() {
        let build = || {
            Expr::new(vec![Instr::block(BlockType::Empty, |outer| {
                vec![Instr::loop_(BlockType::Empty, |_| vec![Instr::Br(outer)])]
            })])
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn expr_equality_compares_depths() {
        let to_outer = Expr::new(vec![Instr::block(BlockType::Empty, |outer| {
            vec![Instr::block(BlockType::Empty, |_| vec![Instr::Br(outer)])]
        })]);
        let to_inner = Expr::new(vec![Instr::block(BlockType::Empty, |_| {
            vec![Instr::block(BlockType::Empty, |inner| vec![Instr::Br(inner)])]
        })]);
        assert_ne!(to_outer, to_inner);
    }

    #[test]
    fn frame_branches_compare_by_depth() {
        let a = Expr::with_frame(|frame| vec![Instr::Br(frame)]);
        let b = Expr::with_frame(|frame| vec![Instr::Br(frame)]);
        let stray = Expr::new(vec![Instr::Br(Label::fresh())]);
        assert_eq!(a, b);
        assert_ne!(a, stray);
    }

    #[test]
    fn wildcard_return_in_table() {
        use crate::effects::{Pop, Push};
        let e = SimpleOp::Return.effect();
        assert_eq!(e.pops, vec![Pop::Any]);
        assert_eq!(e.pushes, vec![Push::Captured(0)]);
    }
}
