//! Stack effect checking and module validation.
//!
//! The abstract operand stack is a list of [`ValType`]s with the top last.
//! [`evaluate`] applies one declared [`StackEffect`] to it and reports a
//! `StackTypeMismatch` if the stack does not fit; [`speculate`] does the same
//! but only answers whether it fits. Instruction sequences are folded with
//! [`check_sequence`], which descends into block bodies with their labels
//! pushed on the [`Ctx`]'s block stack.

extern crate log;

extern crate wasmcodec_structure as structure;

use std::collections::HashSet;

use log::{debug, trace};

use structure::effects::Pop;
use structure::effects::Push;
use structure::effects::StackEffect;
use structure::error::{Error, Result};
use structure::instructions::EffectEnv;
use structure::instructions::Expr;
use structure::instructions::Instr;
use structure::instructions::Label;
use structure::instructions::MemArg;
use structure::labels::scoped;
use structure::labels::BlockStack;
use structure::labels::Blocks;
use structure::labels::MAX_NESTING;
use structure::modules::Code;
use structure::modules::Data;
use structure::modules::DataMode;
use structure::modules::Elem;
use structure::modules::ElemItems;
use structure::modules::ElemMode;
use structure::modules::Export;
use structure::modules::ExportDesc;
use structure::modules::Func;
use structure::modules::FuncRef;
use structure::modules::Global;
use structure::modules::GlobalRef;
use structure::modules::ImportDesc;
use structure::modules::Module;
use structure::modules::TableRef;
use structure::opcodes::SimpleOp;
use structure::types::display_types;
use structure::types::BlockType;
use structure::types::FuncType;
use structure::types::GlobalType;
use structure::types::Limits;
use structure::types::MemType;
use structure::types::Mut;
use structure::types::TableType;
use structure::types::ValType;

/// What the validator knows while walking one expression.
pub struct Ctx<'m> {
    module: &'m Module,
    locals: Vec<ValType>,
    return_: Option<Vec<ValType>>,
    labels: BlockStack<Vec<ValType>>,
}

impl<'m> Ctx<'m> {
    /// A context outside of any function: no locals, no `return`.
    pub fn new(module: &'m Module) -> Self {
        Ctx {
            module,
            locals: Vec::new(),
            return_: None,
            labels: BlockStack::new(),
        }
    }

    /// A context for the body of a function of type `ft`.
    pub fn for_function(module: &'m Module, ft: &FuncType, code: &Code) -> Self {
        let mut locals = ft.params.clone();
        locals.extend_from_slice(&code.locals);
        Ctx {
            module,
            locals,
            return_: Some(ft.results.clone()),
            labels: BlockStack::new(),
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }
}

impl<'m> Blocks<Vec<ValType>> for Ctx<'m> {
    fn blocks(&mut self) -> &mut BlockStack<Vec<ValType>> {
        &mut self.labels
    }
}

impl<'m> EffectEnv for Ctx<'m> {
    fn local_type(&self, index: u32) -> Result<ValType> {
        self.locals.get(index as usize).copied().ok_or_else(|| {
            Error::reference(format!(
                "local {} out of range, {} local(s) declared",
                index,
                self.locals.len()
            ))
        })
    }

    fn global_type(&self, global: &GlobalRef) -> Result<GlobalType> {
        self.module.global_type(global).cloned()
    }

    fn func_type(&self, func: &FuncRef) -> Result<FuncType> {
        self.module.func_type(func).cloned()
    }

    fn table_type(&self, table: &TableRef) -> Result<TableType> {
        self.module.table_type(table).cloned()
    }

    fn label_types(&self, label: Label) -> Result<Vec<ValType>> {
        let depth = self.labels.resolve(label)?;
        self.labels.lookup(depth).map(|(_, types)| types.clone())
    }

    fn return_types(&self) -> Result<Vec<ValType>> {
        self.return_
            .clone()
            .ok_or_else(|| Error::structure("`return` outside of a function body"))
    }
}

// Stack effects

fn apply(stack: &[ValType], effect: &StackEffect) -> Option<Vec<ValType>> {
    let n = effect.pops.len();
    if stack.len() < n {
        return None;
    }
    let (rest, operands) = stack.split_at(stack.len() - n);

    for (pop, &t) in effect.pops.iter().zip(operands) {
        if !pop.admits(t) {
            return None;
        }
        if let Pop::Captured(slot) = *pop {
            if operands.get(slot) != Some(&t) {
                return None;
            }
        }
    }

    let mut out = rest.to_vec();
    for push in &effect.pushes {
        out.push(match *push {
            Push::Exact(t) => t,
            Push::Captured(slot) => *operands.get(slot)?,
        });
    }
    Some(out)
}

/// Like `apply`, for the stack of code after an unconditional branch.
///
/// `None` entries and everything below `known` can have any type, so
/// missing operands are taken from there.
fn apply_unreachable(known: &[Option<ValType>], effect: &StackEffect) -> Option<Vec<Option<ValType>>> {
    let n = effect.pops.len();
    let split = known.len().saturating_sub(n);
    let mut operands = vec![None; n - (known.len() - split)];
    operands.extend_from_slice(&known[split..]);

    for (pop, operand) in effect.pops.iter().zip(&operands) {
        let t = match *operand {
            Some(t) => t,
            None => continue,
        };
        if !pop.admits(t) {
            return None;
        }
        if let Pop::Captured(slot) = *pop {
            if let Some(&Some(c)) = operands.get(slot) {
                if c != t {
                    return None;
                }
            }
        }
    }

    // An unknown operand is still pinned down by a slot that must repeat it.
    let captured = |slot: usize| -> Option<ValType> {
        operands.get(slot).copied().flatten().or_else(|| {
            effect.pops.iter().zip(&operands).find_map(|(pop, &operand)| match *pop {
                Pop::Captured(s) if s == slot => operand,
                _ => None,
            })
        })
    };

    let mut out = known[..split].to_vec();
    for push in &effect.pushes {
        out.push(match *push {
            Push::Exact(t) => Some(t),
            Push::Captured(slot) => captured(slot),
        });
    }
    Some(out)
}

fn display_unreachable(known: &[Option<ValType>]) -> String {
    let mut inner = vec!["...".to_string()];
    inner.extend(known.iter().map(|t| t.map_or_else(|| "any".to_string(), |t| t.to_string())));
    format!("[{}]", inner.join(" "))
}

/// Applies `effect` to `stack`, failing with a `StackTypeMismatch` that names
/// `instruction` if the stack does not provide the operands.
pub fn evaluate(stack: &[ValType], effect: &StackEffect, instruction: &str) -> Result<Vec<ValType>> {
    apply(stack, effect).ok_or_else(|| Error::StackTypeMismatch {
        instruction: instruction.to_string(),
        stack: display_types(stack),
        signature: effect.to_string(),
    })
}

/// Like [`evaluate`], with `None` in place of the error.
pub fn speculate(stack: &[ValType], effect: &StackEffect) -> Option<Vec<ValType>> {
    apply(stack, effect)
}

/// Compares the stacks at the start and the end of a sequence with the
/// parameters and results it is expected to have.
pub fn check_signature(start: &[ValType], end: &[ValType], expected: &FuncType, what: &str) -> Result<()> {
    if start == &expected.params[..] && end == &expected.results[..] {
        Ok(())
    } else {
        Err(Error::StackTypeMismatch {
            instruction: what.to_string(),
            stack: format!("{} -> {}", display_types(start), display_types(end)),
            signature: expected.to_string(),
        })
    }
}

// Sequences

fn transfers_control(instr: &Instr) -> bool {
    matches!(
        *instr,
        Instr::Simple(SimpleOp::Unreachable)
            | Instr::Simple(SimpleOp::Return)
            | Instr::Br(_)
            | Instr::BrTable { .. }
    )
}

enum Operands {
    Reachable(Vec<ValType>),
    /// After an unconditional branch, see `apply_unreachable`.
    Unreachable(Vec<Option<ValType>>),
}

/// Folds `body` over `stack`.
///
/// Code after an unconditional branch is still checked, against a stack
/// whose bottom can provide operands of any type. Such a sequence ends with
/// `end_types` if what it left on top fits them.
pub fn check_sequence(
    cx: &mut Ctx,
    stack: Vec<ValType>,
    body: &[Instr],
    end_types: &[ValType],
) -> Result<Vec<ValType>> {
    let mut operands = Operands::Reachable(stack);
    for instr in body {
        let effect = check_instr(cx, instr)?;
        let after = match operands {
            Operands::Reachable(ref stack) => Operands::Reachable(evaluate(stack, &effect, instr.name())?),
            Operands::Unreachable(ref known) => {
                let after = apply_unreachable(known, &effect).ok_or_else(|| Error::StackTypeMismatch {
                    instruction: instr.name().to_string(),
                    stack: display_unreachable(known),
                    signature: effect.to_string(),
                })?;
                Operands::Unreachable(after)
            }
        };
        operands = if transfers_control(instr) {
            Operands::Unreachable(Vec::new())
        } else {
            after
        };
    }

    match operands {
        Operands::Reachable(stack) => Ok(stack),
        Operands::Unreachable(known) => {
            let fits = known.len() <= end_types.len()
                && known
                    .iter()
                    .rev()
                    .zip(end_types.iter().rev())
                    .all(|(&k, &t)| k.map_or(true, |k| k == t));
            if fits {
                Ok(end_types.to_vec())
            } else {
                Err(Error::StackTypeMismatch {
                    instruction: "end".to_string(),
                    stack: display_unreachable(&known),
                    signature: display_types(end_types),
                })
            }
        }
    }
}

/// Like [`check_sequence`], with `None` in place of any error.
pub fn speculate_sequence(
    cx: &mut Ctx,
    stack: Vec<ValType>,
    body: &[Instr],
    end_types: &[ValType],
) -> Option<Vec<ValType>> {
    check_sequence(cx, stack, body, end_types).ok()
}

fn check_block(
    cx: &mut Ctx,
    label: Label,
    ty: &BlockType,
    label_types: &[ValType],
    body: &[Instr],
    what: &str,
) -> Result<()> {
    if !cx.labels.has_room() {
        return Err(Error::structure(format!("blocks nested more than {} deep", MAX_NESTING)));
    }
    let params = ty.params().to_vec();
    let end = scoped(cx, label, label_types.to_vec(), |cx| {
        check_sequence(cx, params, body, ty.results())
    })?;
    check_signature(ty.params(), &end, &FuncType::new(ty.params(), ty.results()), what)
}

/// Checks everything about `instr` except its operands, including nested
/// bodies, and returns its stack effect.
fn check_instr(cx: &mut Ctx, instr: &Instr) -> Result<StackEffect> {
    use structure::instructions::Instr::*;

    let effect = instr.effect(&*cx)?;

    match *instr {
        Block { label, ref ty, ref body } => check_block(cx, label, ty, ty.results(), body, "block")?,
        Loop { label, ref ty, ref body } => check_block(cx, label, ty, ty.params(), body, "loop")?,
        If { label, ref ty, ref then, ref else_ } => {
            check_block(cx, label, ty, ty.results(), then, "if")?;
            check_block(cx, label, ty, ty.results(), else_, "else")?;
        }

        GlobalSet(ref global) => {
            if cx.module.global_type(global)?.mutability != Mut::Var {
                return Err(Error::structure(format!(
                    "global.set on immutable global {:?}",
                    global.target()
                )));
            }
        }

        Memory(op, ref arg) => {
            validate::memory_present(cx, op.name())?;
            validate::memarg(cx, arg, op.width(), false)?;
        }
        Atomic(op, ref arg) => {
            validate::memory_present(cx, op.name())?;
            validate::memarg(cx, arg, op.width(), true)?;
        }

        CallIndirect { ref table, .. } | TableSize(ref table) => {
            cx.module.table_type(table)?;
        }
        TableCopy { ref dst, ref src } => {
            cx.module.table_type(dst)?;
            cx.module.table_type(src)?;
        }
        TableInit { ref elem, ref table } => {
            cx.module.elem_index(elem)?;
            cx.module.table_type(table)?;
        }
        ElemDrop(ref elem) => {
            cx.module.elem_index(elem)?;
        }

        MemorySize(ref mem) | MemoryGrow(ref mem) | MemoryFill(ref mem) => {
            cx.module.mem_type(mem)?;
        }
        MemoryCopy { ref dst, ref src } => {
            cx.module.mem_type(dst)?;
            cx.module.mem_type(src)?;
        }
        MemoryInit { ref data, ref mem } => {
            cx.module.data_index(data)?;
            cx.module.mem_type(mem)?;
        }
        DataDrop(ref data) => {
            cx.module.data_index(data)?;
        }
        RefFunc(ref func) => {
            cx.module.func_type(func)?;
        }

        _ => {}
    }

    Ok(effect)
}

/// Speculatively evaluates `body` from the empty stack and describes what it
/// leaves behind as a block type.
pub fn infer_block_type(cx: &mut Ctx, body: &[Instr]) -> Option<BlockType> {
    let end = speculate_sequence(cx, Vec::new(), body, &[])?;
    Some(match end[..] {
        [] => BlockType::Empty,
        [t] => BlockType::Value(t),
        _ => BlockType::Func(FuncType::new(&[], &end)),
    })
}

/// Checks the typing rules of every part of `module`.
pub fn validate_module(module: &Module) -> Result<()> {
    let mut c = Ctx::new(module);
    validate::module(&mut c, module)
}

macro_rules! valid_with {
    (($ctx:ident, $name:ident: $type:ty $(,$arg:ident: $argty:ty)*) -> $rt:ty $b:block) => (
        pub fn $name($ctx: &mut Ctx, $name: &$type $(,$arg: $argty)*) -> Result<$rt> {
            let ty = $b;
            Ok(ty)
        }
    )
}

pub mod validate {
    use super::*;

    valid_with!((c, limits: Limits) -> () {
        let _ = c;
        if let Some(max) = limits.max {
            if max < limits.min {
                return Err(Error::structure(format!(
                    "limit maximum {} is smaller than the minimum {}",
                    max, limits.min
                )));
            }
        }
    });

    valid_with!((c, table_type: TableType) -> () {
        validate::limits(c, &table_type.limits)?;
    });

    valid_with!((c, mem_type: MemType) -> () {
        validate::limits(c, &mem_type.limits)?;
    });

    // Alignment is stored as a power of two; `width` is in bytes.
    valid_with!((c, memarg: MemArg, width: u32, exact: bool) -> () {
        let _ = c;
        let natural = width.trailing_zeros();
        if memarg.align > natural || (exact && memarg.align != natural) {
            return Err(Error::structure(format!(
                "alignment 2^{} for a {} byte access, natural alignment is 2^{}",
                memarg.align, width, natural
            )));
        }
    });

    valid_with!((c, memory_present: str) -> () {
        if c.module.mem_count() == 0 {
            return Err(Error::reference(format!(
                "`{}` needs a memory, none is declared",
                memory_present
            )));
        }
    });

    // `expr` is the body of a frame that must end with `results`.
    valid_with!((c, expr: Expr, results: &[ValType]) -> () {
        let end = scoped(c, expr.label, results.to_vec(), |c| {
            check_sequence(c, Vec::new(), &expr.body, results)
        })?;
        check_signature(&[], &end, &FuncType::new(&[], results), "expression")?;
    });

    valid_with!((c, const_expr: Expr, expected: ValType) -> () {
        for instr in &const_expr.body {
            match *instr {
                Instr::I32Const(_)
                | Instr::I64Const(_)
                | Instr::F32Const(_)
                | Instr::F64Const(_)
                | Instr::RefNull(_)
                | Instr::RefFunc(_) => {}
                Instr::GlobalGet(ref global) => {
                    if c.module.global_type(global)?.mutability != Mut::Const {
                        return Err(Error::structure(format!(
                            "constant expression reads mutable global {:?}",
                            global.target()
                        )));
                    }
                }
                _ => {
                    return Err(Error::structure(format!(
                        "`{}` is not allowed in a constant expression",
                        instr.name()
                    )))
                }
            }
        }
        validate::expr(c, const_expr, &[expected])?;
    });

    valid_with!((c, function: Func) -> () {
        let mut fc = Ctx::for_function(c.module, &function.type_, &function.code);
        validate::expr(&mut fc, &function.code.body, &function.type_.results)?;
    });

    valid_with!((c, global: Global) -> () {
        validate::const_expr(c, &global.init, global.type_.valtype)?;
    });

    valid_with!((c, elem: Elem) -> () {
        let ref_type = elem.items.ref_type();
        if let ElemMode::Active { ref table, ref offset } = elem.mode {
            let elem_type = c.module.table_type(table)?.elem;
            if elem_type != ref_type {
                return Err(Error::structure(format!(
                    "{} segment for a table of {}",
                    ValType::from(ref_type),
                    ValType::from(elem_type)
                )));
            }
            validate::const_expr(c, offset, ValType::I32)?;
        }
        match elem.items {
            ElemItems::Funcs(ref funcs) => {
                for func in funcs {
                    c.module.func_type(func)?;
                }
            }
            ElemItems::Exprs(t, ref exprs) => {
                for expr in exprs {
                    validate::const_expr(c, expr, t.into())?;
                }
            }
        }
    });

    valid_with!((c, data: Data) -> () {
        if let DataMode::Active { ref mem, ref offset } = data.mode {
            c.module.mem_type(mem)?;
            validate::const_expr(c, offset, ValType::I32)?;
        }
    });

    valid_with!((c, start: FuncRef) -> () {
        let ft = c.module.func_type(start)?;
        if !ft.params.is_empty() || !ft.results.is_empty() {
            return Err(Error::structure(format!(
                "start function has type {}, expected [] -> []",
                ft
            )));
        }
    });

    valid_with!((c, exports: [Export]) -> () {
        let mut seen = HashSet::new();
        for export in exports {
            if !seen.insert(&*export.name) {
                return Err(Error::structure(format!("duplicate export name `{}`", export.name)));
            }
            match export.desc {
                ExportDesc::Func(ref f) => { c.module.func_type(f)?; }
                ExportDesc::Table(ref t) => { c.module.table_type(t)?; }
                ExportDesc::Mem(ref m) => { c.module.mem_type(m)?; }
                ExportDesc::Global(ref g) => { c.module.global_type(g)?; }
            }
        }
    });

    valid_with!((c, module: Module) -> () {
        for import in module.imports.values() {
            match import.desc {
                ImportDesc::Table(ref tt) => validate::table_type(c, tt)?,
                ImportDesc::Mem(ref mt) => validate::mem_type(c, mt)?,
                _ => {}
            }
        }
        for table in module.tables.values() {
            validate::table_type(c, &table.type_)?;
        }
        for mem in module.mems.values() {
            validate::mem_type(c, &mem.type_)?;
        }
        for global in module.globals.values() {
            validate::global(c, global)?;
        }
        for (i, func) in module.funcs.values().enumerate() {
            trace!("validating function {}", i);
            validate::function(c, func)?;
        }
        for elem in module.elems.values() {
            validate::elem(c, elem)?;
        }
        for data in module.data.values() {
            validate::data(c, data)?;
        }
        if let Some(ref start) = module.start {
            validate::start(c, start)?;
        }
        validate::exports(c, &module.exports)?;

        debug!(
            "validated {} function(s), {} global(s), {} export(s)",
            module.funcs.len(),
            module.globals.len(),
            module.exports.len()
        );
    });
}

#[cfg(test)]
#[path = "tests_validation.rs"]
mod tests;
