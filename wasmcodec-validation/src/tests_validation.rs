use super::*;

use proptest::prelude::*;

use structure::error::ErrorKind;
use structure::modules::Mem;
use structure::opcodes::MemOp;
use structure::types::Ieee32;
use structure::types::Ieee64;
use structure::types::ValType::*;
use structure::types::ValType::FuncRef;

fn function(params: &[ValType], results: &[ValType], body: Vec<Instr>) -> Module {
    let mut m = Module::new();
    m.add_func(
        FuncType::new(params, results),
        Code {
            locals: Vec::new(),
            body: Expr::new(body),
        },
    );
    m
}

fn global(mutability: Mut, valtype: ValType, init: Vec<Instr>) -> Global {
    Global {
        type_: GlobalType { mutability, valtype },
        init: Expr::new(init),
        name: None,
    }
}

fn kind(r: Result<()>) -> ErrorKind {
    r.unwrap_err().kind()
}

#[test]
fn add_on_two_i32() {
    let effect = SimpleOp::I32Add.effect();
    assert_eq!(evaluate(&[I32, I32], &effect, "i32.add").unwrap(), vec![I32]);
    assert_eq!(evaluate(&[F64, I32, I32], &effect, "i32.add").unwrap(), vec![F64, I32]);
}

#[test]
fn add_on_one_i32() {
    let effect = SimpleOp::I32Add.effect();
    assert_eq!(
        evaluate(&[I32], &effect, "i32.add"),
        Err(Error::StackTypeMismatch {
            instruction: "i32.add".to_string(),
            stack: "[i32]".to_string(),
            signature: "[i32 i32] -> [i32]".to_string(),
        })
    );
    assert_eq!(speculate(&[I32], &effect), None);
    assert_eq!(speculate(&[I64, I32], &effect), None);
}

#[test]
fn return_keeps_the_popped_type() {
    let effect = SimpleOp::Return.effect();
    for &t in ValType::ALL.iter() {
        assert_eq!(evaluate(&[t], &effect, "return").unwrap(), vec![t]);
        assert_eq!(speculate(&[I32, t], &effect), Some(vec![I32, t]));
    }
    assert_eq!(speculate(&[], &effect), None);
}

#[test]
fn select_needs_matching_operands() {
    let effect = SimpleOp::Select.effect();
    assert_eq!(speculate(&[F32, F32, I32], &effect), Some(vec![F32]));
    assert_eq!(speculate(&[I32, I64, I32], &effect), None);
    assert_eq!(speculate(&[F32, F32, F32], &effect), None);
    assert_eq!(speculate(&[FuncRef, FuncRef, I32], &effect), None);
}

#[test]
fn ref_is_null_needs_a_reference() {
    let effect = SimpleOp::RefIsNull.effect();
    assert_eq!(speculate(&[ExternRef], &effect), Some(vec![I32]));
    assert_eq!(speculate(&[FuncRef], &effect), Some(vec![I32]));
    assert_eq!(speculate(&[I32], &effect), None);
}

#[test]
fn signature_check() {
    let ft = FuncType::new(&[I32], &[I64]);
    assert!(check_signature(&[I32], &[I64], &ft, "f").is_ok());
    assert!(check_signature(&[I32], &[I64, I64], &ft, "f").is_err());
    assert!(check_signature(&[], &[I64], &ft, "f").is_err());
}

#[test]
fn block_bodies_are_checked() {
    let ok = function(&[], &[I32], vec![Instr::block(I32, |_| vec![Instr::I32Const(1)])]);
    validate_module(&ok).unwrap();

    let empty = function(&[], &[I32], vec![Instr::block(I32, |_| vec![])]);
    assert_eq!(kind(validate_module(&empty)), ErrorKind::StackTypeMismatch);
}

#[test]
fn if_without_else_must_keep_its_params() {
    let m = function(
        &[I32],
        &[I32],
        vec![
            Instr::LocalGet(0),
            Instr::if_else(I32, |_| vec![Instr::I32Const(1)], |_| vec![]),
        ],
    );
    assert_eq!(kind(validate_module(&m)), ErrorKind::StackTypeMismatch);
}

#[test]
fn branches_carry_label_types() {
    // `br` to the function frame carries the results.
    let m = {
        let mut m = Module::new();
        m.add_func(
            FuncType::new(&[], &[I64]),
            Code {
                locals: Vec::new(),
                body: Expr::with_frame(|frame| vec![Instr::I64Const(7), Instr::Br(frame)]),
            },
        );
        m
    };
    validate_module(&m).unwrap();

    // A loop label carries its params, so this branch wants nothing.
    let m = function(
        &[],
        &[],
        vec![Instr::loop_(BlockType::Empty, |l| {
            vec![Instr::I32Const(0), Instr::BrIf(l)]
        })],
    );
    validate_module(&m).unwrap();
}

#[test]
fn code_after_return_takes_any_operands() {
    let m = function(
        &[],
        &[I32],
        vec![
            Instr::I32Const(42),
            Instr::Simple(SimpleOp::Return),
            Instr::Simple(SimpleOp::Drop),
        ],
    );
    validate_module(&m).unwrap();

    let trap = function(&[], &[F32], vec![Instr::Simple(SimpleOp::Unreachable)]);
    validate_module(&trap).unwrap();

    let add = function(
        &[],
        &[I32],
        vec![Instr::Simple(SimpleOp::Unreachable), Instr::Simple(SimpleOp::I32Add)],
    );
    validate_module(&add).unwrap();
}

#[test]
fn code_after_unreachable_is_still_checked() {
    let m = function(
        &[],
        &[],
        vec![
            Instr::Simple(SimpleOp::Unreachable),
            Instr::I32Const(0),
            Instr::Simple(SimpleOp::I64Add),
        ],
    );
    assert_eq!(
        validate_module(&m),
        Err(Error::StackTypeMismatch {
            instruction: "i64.add".to_string(),
            stack: "[... i32]".to_string(),
            signature: "[i64 i64] -> [i64]".to_string(),
        })
    );

    // What dead code leaves behind must still fit the results.
    let leftover = function(
        &[],
        &[I32],
        vec![Instr::I32Const(1), Instr::Simple(SimpleOp::Return), Instr::I64Const(1)],
    );
    assert_eq!(kind(validate_module(&leftover)), ErrorKind::StackTypeMismatch);

    let nested = function(
        &[],
        &[],
        vec![
            Instr::Simple(SimpleOp::Unreachable),
            Instr::block(BlockType::Empty, |_| vec![Instr::Simple(SimpleOp::Drop)]),
        ],
    );
    assert_eq!(kind(validate_module(&nested)), ErrorKind::StackTypeMismatch);
}

#[test]
fn select_in_dead_code_keeps_the_known_operand() {
    let body = || {
        vec![
            Instr::Simple(SimpleOp::Unreachable),
            Instr::F32Const(Ieee32::from(1.5f32)),
            Instr::I32Const(0),
            Instr::Simple(SimpleOp::Select),
        ]
    };
    validate_module(&function(&[], &[F32], body())).unwrap();
    assert_eq!(
        kind(validate_module(&function(&[], &[I64], body()))),
        ErrorKind::StackTypeMismatch
    );
}

#[test]
fn blocks_nest_up_to_the_limit() {
    let nested = |blocks: usize| {
        let mut instr = Instr::block(BlockType::Empty, |_| vec![]);
        for _ in 1..blocks {
            instr = Instr::block(BlockType::Empty, move |_| vec![instr]);
        }
        function(&[], &[], vec![instr])
    };
    validate_module(&nested(MAX_NESTING - 1)).unwrap();
    assert_eq!(kind(validate_module(&nested(MAX_NESTING))), ErrorKind::InvalidStructure);
}

#[test]
fn locals_come_after_params() {
    let mut m = Module::new();
    m.add_func(
        FuncType::new(&[I32], &[I64]),
        Code {
            locals: vec![I64],
            body: Expr::new(vec![Instr::LocalGet(1)]),
        },
    );
    validate_module(&m).unwrap();

    let out_of_range = function(&[], &[], vec![Instr::LocalGet(0), Instr::Simple(SimpleOp::Drop)]);
    assert_eq!(kind(validate_module(&out_of_range)), ErrorKind::InvalidReference);
}

#[test]
fn inferred_block_types() {
    let m = Module::new();
    let mut cx = Ctx::new(&m);
    assert_eq!(infer_block_type(&mut cx, &[]), Some(BlockType::Empty));
    assert_eq!(
        infer_block_type(&mut cx, &[Instr::I32Const(1), Instr::I32Const(2), Instr::Simple(SimpleOp::I32Add)]),
        Some(BlockType::Value(I32))
    );
    assert_eq!(
        infer_block_type(&mut cx, &[Instr::I32Const(1), Instr::F64Const(Ieee64::from(1.5f64))]),
        Some(BlockType::Func(FuncType::new(&[], &[I32, F64])))
    );
    assert_eq!(infer_block_type(&mut cx, &[Instr::Simple(SimpleOp::I32Add)]), None);
    assert!(cx.labels.is_empty());
}

#[test]
fn start_must_be_nullary() {
    let mut m = function(&[I32], &[], vec![]);
    m.start = Some(structure::modules::FuncRef::local(0));
    assert_eq!(kind(validate_module(&m)), ErrorKind::InvalidStructure);

    let mut m = function(&[], &[], vec![]);
    m.start = Some(structure::modules::FuncRef::local(0));
    validate_module(&m).unwrap();
}

#[test]
fn global_set_needs_a_mutable_global() {
    for &(mutability, ok) in &[(Mut::Var, true), (Mut::Const, false)] {
        let mut m = function(&[], &[], vec![Instr::I32Const(1), Instr::GlobalSet(GlobalRef::local(0))]);
        m.globals.append(global(mutability, I32, vec![Instr::I32Const(0)]));
        assert_eq!(validate_module(&m).is_ok(), ok);
    }
}

#[test]
fn global_initializers() {
    let mut m = Module::new();
    m.globals.append(global(Mut::Const, I64, vec![Instr::I64Const(3)]));
    validate_module(&m).unwrap();

    m.globals.append(global(Mut::Const, I32, vec![Instr::I64Const(3)]));
    assert_eq!(kind(validate_module(&m)), ErrorKind::StackTypeMismatch);

    let mut m = Module::new();
    m.globals.append(global(
        Mut::Const,
        I32,
        vec![Instr::I32Const(1), Instr::I32Const(2), Instr::Simple(SimpleOp::I32Add)],
    ));
    assert_eq!(kind(validate_module(&m)), ErrorKind::InvalidStructure);
}

#[test]
fn data_offsets_are_i32() {
    let mut m = Module::new();
    m.mems.append(Mem {
        type_: MemType { limits: Limits { min: 1, max: None } },
    });
    m.data.append(Data {
        mode: DataMode::Active {
            mem: structure::modules::MemRef::local(0),
            offset: Expr::new(vec![Instr::I64Const(0)]),
        },
        init: vec![1, 2, 3],
    });
    assert_eq!(kind(validate_module(&m)), ErrorKind::StackTypeMismatch);
}

#[test]
fn alignment_up_to_natural_width() {
    let load = |align| {
        let mut m = function(
            &[],
            &[I32],
            vec![Instr::I32Const(0), Instr::Memory(MemOp::I32Load, MemArg::new(align, 0))],
        );
        m.mems.append(Mem {
            type_: MemType { limits: Limits { min: 1, max: Some(1) } },
        });
        validate_module(&m)
    };
    load(0).unwrap();
    load(2).unwrap();
    assert_eq!(kind(load(3)), ErrorKind::InvalidStructure);

    let no_memory = function(
        &[],
        &[I32],
        vec![Instr::I32Const(0), Instr::Memory(MemOp::I32Load, MemArg::new(2, 0))],
    );
    assert_eq!(kind(validate_module(&no_memory)), ErrorKind::InvalidReference);
}

#[test]
fn limits_need_min_below_max() {
    let mut m = Module::new();
    m.mems.append(Mem {
        type_: MemType { limits: Limits { min: 2, max: Some(1) } },
    });
    assert_eq!(kind(validate_module(&m)), ErrorKind::InvalidStructure);
}

#[test]
fn export_names_are_unique() {
    let mut m = function(&[], &[], vec![]);
    for _ in 0..2 {
        m.exports.push(Export {
            name: "run".into(),
            desc: ExportDesc::Func(structure::modules::FuncRef::local(0)),
        });
    }
    assert_eq!(kind(validate_module(&m)), ErrorKind::InvalidStructure);

    m.exports.pop();
    validate_module(&m).unwrap();
}

fn valtype() -> impl Strategy<Value = ValType> {
    prop::sample::select(ValType::ALL.to_vec())
}

proptest! {
    #[test]
    fn passthrough_keeps_any_stack(stack in prop::collection::vec(valtype(), 0..8), n in 0usize..8) {
        let effect = StackEffect::passthrough(n);
        let after = speculate(&stack, &effect);
        if n <= stack.len() {
            prop_assert_eq!(after, Some(stack.clone()));
        } else {
            prop_assert_eq!(after, None);
        }
    }

    #[test]
    fn drop_removes_the_top(stack in prop::collection::vec(valtype(), 1..8)) {
        let after = evaluate(&stack, &SimpleOp::Drop.effect(), "drop").unwrap();
        prop_assert_eq!(&after[..], &stack[..stack.len() - 1]);
    }
}
