#![allow(non_snake_case)]

use super::decoder::Decoder;
use super::encoder::Encoder;
use super::instructions::{decode_expr, encode_expr, DecodeCtx, EncodeCtx};
use super::parsers::*;
use std::fmt::Debug;

use proptest::prelude::*;

use wasmcodec_structure::error::{Error, ErrorKind};
use wasmcodec_structure::features::Features;
use wasmcodec_structure::instructions::{Expr, Instr, Label, MemArg};
use wasmcodec_structure::labels::MAX_NESTING;
use wasmcodec_structure::modules::Module;
use wasmcodec_structure::opcodes::{AtomicOp, MemOp, Opcode, SimpleOp};
use wasmcodec_structure::types::*;

enum CheckRes<T> {
    Failed,
    OkWith(T),
}
use self::CheckRes::*;

fn check<'a, T, F>(parse: F, input: &'a [u8], res: CheckRes<T>)
    where T: Debug + PartialEq,
          F: Fn(Inp<'a>) -> IResult<Inp<'a>, T>,
{
    let mut err = None;
    match parse(input) {
        Ok((&[], is)) => {
            if let OkWith(should) = res {
                if is != should {
                    err = Some(format!("Should have parsed with {:?}, but is {:?}", should, is));
                }
            } else {
                err = Some(format!("Should have failed, but parsed with {:?}", is));
            }
        }
        Ok((x, is)) => {
            err = Some(format!("Accepted without parsing all input. Remaining: {:?}, result: {:?}", x, is));
        }
        Err(x) => {
            if let OkWith(should) = res {
                err = Some(format!("Should have parsed with {:?}, but failed with {:?}", should, x));
            }
        }
    }
    if let Some(err) = err {
        panic!("\n\nERROR: {}\nInput:\n{:?}\n\n", err, input);
    }
}

use nom::IResult;

fn test_parse_uN<F>(parse: F, bits: u32)
    where F: Fn(Inp) -> IResult<Inp, u64>,
{
    check(&parse, &[0x00], OkWith(0x00));
    check(&parse, &[0x7f], OkWith(0x7f));
    check(&parse, &[0xff], Failed);

    check(&parse, &[0xff, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x01], OkWith(0xff));
    check(&parse, &[0xff, 0x80, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x80, 0x80, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));
    if bits == 32 {
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x00], Failed);
        // unused high bits of the last group
        check(&parse, &[0xff, 0xff, 0xff, 0xff, 0x1f], Failed);
        check(&parse, &[0xff, 0xff, 0xff, 0xff, 0x0f], OkWith(0xffff_ffff));
    } else {
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00], Failed);
    }

    check(&parse, &[0xff, 0xff, 0xff, 0x7f], OkWith(0b1111111_1111111_1111111_1111111));
    check(&parse, &[0b1_0011111, 0b1_0001111, 0b1_0000111, 0b0_0000011],
             OkWith(0b__0000011______0000111______0001111______0011111));
}

#[test]
fn test_parse_u32() {
    test_parse_uN(|inp| parse_u32(inp).map(|(i, x)| (i, x as u64)), 32);
}

#[test]
fn test_parse_u64() {
    test_parse_uN(parse_u64, 64);
}

fn test_parse_sN<F>(parse: F, bits: u32)
    where F: Fn(Inp) -> IResult<Inp, i64>,
{
    check(&parse, &[0x00], OkWith(0x00));
    check(&parse, &[0x3f], OkWith(0x3f));
    check(&parse, &[0x7f], OkWith(-0x01));
    check(&parse, &[0xff], Failed);

    check(&parse, &[0xff, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x01], OkWith(0xff));
    check(&parse, &[0xff, 0x80, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x80, 0x80, 0x00], OkWith(0x7f));
    check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));

    check(&parse, &[0x7f], OkWith(-1));
    check(&parse, &[0xff, 0x7f], OkWith(-1));
    check(&parse, &[0xff, 0xff, 0x7f], OkWith(-1));
    check(&parse, &[0xff, 0xff, 0xff, 0x7f], OkWith(-1));
    check(&parse, &[0xff, 0xff, 0xff, 0xff, 0x7f], OkWith(-1));

    if bits == 32 {
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x00], Failed);
        check(&parse, &[0x80, 0x80, 0x80, 0x80, 0x70], Failed);
    } else {
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00], OkWith(0x7f));
        check(&parse, &[0xff, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00], Failed);
    }

    check(&parse, &[0b1_0011111, 0b1_0001111, 0b1_0000111, 0b0_0000011],
             OkWith(0b__0000011______0000111______0001111______0011111));
}

#[test]
fn test_parse_s32() {
    test_parse_sN(|inp| parse_s32(inp).map(|(i, x)| (i, x as i64)), 32);
}

#[test]
fn test_parse_s64() {
    test_parse_sN(parse_s64, 64);
}

#[test]
fn test_parse_s33() {
    check(&parse_s33, &[0x40], OkWith(-64));
    check(&parse_s33, &[0xff, 0xff, 0xff, 0xff, 0x0f], OkWith(0xffff_ffff));
    check(&parse_s33, &[0xff, 0xff, 0xff, 0xff, 0x1f], Failed);
    check(&parse_s33, &[0xff, 0xff, 0xff, 0xff, 0x7f], OkWith(-1));
    check(&parse_s33, &[0x80, 0x80, 0x80, 0x80, 0x70], OkWith(-0x1_0000_0000));
}

#[test]
fn test_parse_f32() {
    let x: f32 = -1459.78965;
    let b = x.to_bits().to_le_bytes();

    check(&parse_f32, &b, OkWith(x.to_bits()));
}

#[test]
fn test_parse_f64() {
    let x: f64 = -1459.78965;
    let b = x.to_bits().to_le_bytes();

    check(&parse_f64, &b, OkWith(x.to_bits()));
}

#[test]
fn test_parse_name() {
    let s = "hello wörldß";

    check(&parse_name, &{
        let mut v = vec![s.len() as u8];
        v.extend(s.bytes());
        v
    }, OkWith(s.into()));

    check(&parse_name, &{
        let mut v = vec![s.len() as u8 - 1];
        v.extend(s.bytes());
        v
    }, Failed);

    check(&parse_name, &{
        let mut v = vec![s.len() as u8 + 1];
        v.extend(s.bytes());
        v
    }, Failed);

    check(&parse_name, &vec![5, 0xff, 0xff, 0xff, 0xff, 0xff], Failed);
}

#[test]
fn test_parse_valtype() {
    check(&parse_valtype, &[0x7f], OkWith(ValType::I32));
    check(&parse_valtype, &[0x7e], OkWith(ValType::I64));
    check(&parse_valtype, &[0x7d], OkWith(ValType::F32));
    check(&parse_valtype, &[0x7c], OkWith(ValType::F64));
    check(&parse_valtype, &[0x70], OkWith(ValType::FuncRef));
    check(&parse_valtype, &[0x6f], OkWith(ValType::ExternRef));
    check(&parse_valtype, &[0x40], Failed);
}

#[test]
fn test_parse_functype() {
    check(&parse_functype, &[0x60, 1, 0x7f, 2, 0x7e, 0x7c], OkWith(
        FuncType::new(&[ValType::I32], &[ValType::I64, ValType::F64])
    ));
    check(&parse_functype, &[0x61, 0, 0], Failed);
}

#[test]
fn test_parse_limits() {
    check(&parse_limits, &[0x00, 0x00], OkWith(
        Limits {
            min: 0x00,
            max: None,
        }
    ));
    check(&parse_limits, &[0x00, 0xff, 0x01], OkWith(
        Limits {
            min: 0xff,
            max: None,
        }
    ));
    check(&parse_limits, &[0x01, 0x00, 0x00], OkWith(
        Limits {
            min: 0x00,
            max: Some(0x00),
        }
    ));
    check(&parse_limits, &[0x01, 0xff, 0x01, 0xff, 0x01], OkWith(
        Limits {
            min: 0xff,
            max: Some(0xff),
        }
    ));
    check(&parse_limits, &[0x02, 0x00], Failed);
}

#[test]
fn test_parse_tabletype() {
    check(&parse_tabletype, &[0x6f, 0x00, 0x01], OkWith(
        TableType {
            elem: RefType::ExternRef,
            limits: Limits { min: 1, max: None },
        }
    ));
    check(&parse_tabletype, &[0x7f, 0x00, 0x01], Failed);
}

#[test]
fn test_parse_globaltype() {
    check(&parse_globaltype, &[0x7e, 0x01], OkWith(
        GlobalType {
            mutability: Mut::Var,
            valtype: ValType::I64,
        }
    ));
    check(&parse_globaltype, &[0x7e, 0x02], Failed);
}

#[test]
fn decoder_tracks_offsets() {
    let bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
    let mut d = Decoder::new(&bytes);
    assert_eq!(d.peek_u8(), Some(0x01));
    assert_eq!(d.read_u8(), Ok(0x01));

    let mut sub = d.slice(2).unwrap();
    assert_eq!(sub.offset(), 1);
    assert_eq!(sub.remaining(), 2);
    assert_eq!(sub.read_u8(), Ok(0x02));
    assert_eq!(sub.finish("test"), Err(Error::malformed(2, "1 byte(s) left over after test")));
    assert_eq!(sub.read_u8(), Ok(0x03));
    assert_eq!(sub.read_u8().map_err(|e| e.kind()), Err(ErrorKind::BufferExhausted));

    assert_eq!(d.offset(), 3);
    assert_eq!(d.remaining(), 2);
}

#[test]
fn decoder_reports_exhaustion() {
    assert_eq!(
        Decoder::new(&[0x80]).read_u32(),
        Err(Error::BufferExhausted { offset: 1, requested: 1, available: 0 })
    );
    assert_eq!(
        Decoder::new(&[0x01, 0x02]).read_bytes(3),
        Err(Error::BufferExhausted { offset: 0, requested: 3, available: 2 })
    );
    assert_eq!(
        Decoder::new(&[0x03, b'a']).read_name().map_err(|e| e.kind()),
        Err(ErrorKind::BufferExhausted)
    );
}

#[test]
fn decoder_measures_reads() {
    let mut d = Decoder::new(&[0xe5, 0x8e, 0x26, 0x00]);
    assert_eq!(d.measure(|d| d.read_u32()), Ok((624485, 3)));
    assert_eq!(d.measure(|d| d.read_u32()), Ok((0, 1)));
}

#[test]
fn decoder_rejects_bad_utf8() {
    let err = Decoder::new(&[0x02, 0xc3, 0x28]).read_name().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);
}

#[test]
fn encoder_leb128() {
    let mut e = Encoder::new();
    e.write_u32(624485);
    e.write_s32(-123456);
    e.write_s64(-1);
    e.write_u32(0);
    assert_eq!(e.bytes(), &[0xe5, 0x8e, 0x26, 0xc0, 0xbb, 0x78, 0x7f, 0x00][..]);
}

#[test]
fn encoder_max_width() {
    let mut e = Encoder::new().with_max_width(true);
    e.write_u32(0);
    e.write_s32(-1);
    assert_eq!(e.bytes(), &[0x80, 0x80, 0x80, 0x80, 0x00, 0xff, 0xff, 0xff, 0xff, 0x7f][..]);

    let mut e = Encoder::new().with_max_width(true);
    e.write_u64(1);
    assert_eq!(e.len(), 10);
    assert_eq!(Decoder::new(e.bytes()).read_u64(), Ok(1));

    let nested = e.nested();
    assert!(nested.is_empty());
}

#[test]
fn encoder_canonicalizes_nan() {
    let mut e = Encoder::new();
    e.write_f32(Ieee32(0x7fc0_0001));
    e.write_f32(Ieee32(0xffc0_0000));
    e.write_f64(Ieee64(0x7ff0_0000_0000_0001));
    let mut d = Decoder::new(e.bytes());
    assert_eq!(d.read_f32(), Ok(0x7fc0_0000));
    assert_eq!(d.read_f32(), Ok(0x7fc0_0000));
    assert_eq!(d.read_f64(), Ok(0x7ff8_0000_0000_0000));
}

#[test]
fn float_bits_round_trip() {
    for &x in &[0.0f32, -0.0, ::std::f32::INFINITY, ::std::f32::NEG_INFINITY, ::std::f32::NAN, 1.5, -123.456] {
        let mut e = Encoder::new();
        e.write_f32(x.into());
        let bits = Decoder::new(e.bytes()).read_f32().unwrap();
        assert_eq!(bits, x.to_bits(), "{}", x);
    }
    for &x in &[0.0f64, -0.0, ::std::f64::INFINITY, ::std::f64::NEG_INFINITY, ::std::f64::NAN, 1.5, -123.456] {
        let mut e = Encoder::new();
        e.write_f64(x.into());
        let bits = Decoder::new(e.bytes()).read_f64().unwrap();
        assert_eq!(bits, x.to_bits(), "{}", x);
    }
}

fn encode_with(module: &Module, features: &Features, expr: &Expr) -> Result<Vec<u8>, Error> {
    let mut e = Encoder::for_features(features);
    encode_expr(&mut e, &mut EncodeCtx::new(module, features), expr)?;
    e.finish()
}

fn decode_with(module: &Module, features: &Features, bytes: &[u8]) -> Result<Expr, Error> {
    let mut d = Decoder::new(bytes);
    let expr = decode_expr(&mut d, &mut DecodeCtx::new(module, features))?;
    d.finish("expression")?;
    Ok(expr)
}

#[test]
fn branch_depths_on_the_wire() {
    let expr = Expr::with_frame(|frame| {
        vec![Instr::block(BlockType::Empty, |block| {
            vec![Instr::Br(block), Instr::BrIf(frame)]
        })]
    });
    let m = Module::new();
    let features = Features::default();
    let bytes = encode_with(&m, &features, &expr).unwrap();
    assert_eq!(bytes, vec![0x02, 0x40, 0x0c, 0x00, 0x0d, 0x01, 0x0b, 0x0b]);
    assert_eq!(decode_with(&m, &features, &bytes), Ok(expr));
}

#[test]
fn if_else_arms() {
    let m = Module::new();
    let features = Features::default();
    let bytes = [0x04, 0x7f, 0x41, 0x01, 0x05, 0x41, 0x02, 0x0b, 0x0b];
    let expr = decode_with(&m, &features, &bytes).unwrap();
    let expected = Expr::new(vec![Instr::if_else(
        ValType::I32,
        |_| vec![Instr::I32Const(1)],
        |_| vec![Instr::I32Const(2)],
    )]);
    assert_eq!(expr, expected);
    assert_eq!(encode_with(&m, &features, &expr).unwrap(), bytes.to_vec());

    // `if` without `else` is written without the separator
    let lone = Expr::new(vec![Instr::if_else(BlockType::Empty, |_| vec![], |_| vec![])]);
    assert_eq!(encode_with(&m, &features, &lone).unwrap(), vec![0x04, 0x40, 0x0b, 0x0b]);
}

#[test]
fn stray_branches() {
    let m = Module::new();
    let features = Features::default();

    let err = decode_with(&m, &features, &[0x0c, 0x01, 0x0b]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReference);

    let stray = Expr::new(vec![Instr::Br(Label::fresh())]);
    let err = encode_with(&m, &features, &stray).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReference);

    let err = decode_with(&m, &features, &[0x05, 0x0b]).unwrap_err();
    assert_eq!(err, Error::malformed(0, "`else` outside of `if`"));
}

fn nested_blocks(blocks: usize) -> Expr {
    let mut instr = Instr::block(BlockType::Empty, |_| vec![]);
    for _ in 1..blocks {
        instr = Instr::block(BlockType::Empty, move |_| vec![instr]);
    }
    Expr::new(vec![instr])
}

#[test]
fn nesting_limit() {
    let m = Module::new();
    let features = Features::default();

    // The frame of the expression takes one level.
    let deepest = nested_blocks(MAX_NESTING - 1);
    let bytes = encode_with(&m, &features, &deepest).unwrap();
    assert_eq!(decode_with(&m, &features, &bytes), Ok(deepest));

    let err = encode_with(&m, &features, &nested_blocks(MAX_NESTING)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStructure);

    let mut bytes = Vec::new();
    for _ in 0..MAX_NESTING {
        bytes.extend_from_slice(&[0x02, 0x40]);
    }
    bytes.extend(vec![0x0b; MAX_NESTING + 1]);
    let offset = 2 * MAX_NESTING - 1;
    assert_eq!(
        decode_with(&m, &features, &bytes),
        Err(Error::malformed(offset, format!("blocks nested more than {} deep", MAX_NESTING)))
    );
}

#[test]
fn unsupported_opcodes() {
    let m = Module::new();
    let features = Features::default();

    assert_eq!(
        decode_with(&m, &features, &[0x01, 0xff, 0x0b]),
        Err(Error::UnsupportedInstruction { offset: 1, opcode: Opcode::primary(0xff) })
    );
    // known, but threads are disabled by default
    assert_eq!(
        decode_with(&m, &features, &[0xfe, 0x03, 0x00, 0x0b]),
        Err(Error::UnsupportedInstruction { offset: 0, opcode: Opcode::atomic(0x03) })
    );
    let threads = Features::default().with_threads(true);
    assert_eq!(
        decode_with(&m, &threads, &[0xfe, 0x03, 0x00, 0x0b]),
        Ok(Expr::new(vec![Instr::AtomicFence]))
    );

    let extend = Expr::new(vec![
        Instr::I32Const(7),
        Instr::block(BlockType::Empty, |_| vec![Instr::Simple(SimpleOp::I32Extend8S)]),
    ]);
    assert_eq!(
        encode_with(&m, &Features::mvp(), &extend),
        Err(Error::UnsupportedInstruction { offset: 4, opcode: Opcode::primary(0xc0) })
    );
}

#[test]
fn every_simple_op_round_trips() {
    let m = Module::new();
    let features = Features::all();
    for &op in SimpleOp::ALL {
        let expr = Expr::new(vec![Instr::Simple(op)]);
        let bytes = encode_with(&m, &features, &expr).unwrap();
        assert_eq!(decode_with(&m, &features, &bytes), Ok(expr), "{}", op.name());
    }
}

#[test]
fn every_memory_op_round_trips() {
    let m = Module::new();
    let features = Features::all();
    let arg = MemArg::new(2, 0x1234);
    let body = MemOp::ALL
        .iter()
        .map(|&op| Instr::Memory(op, arg))
        .chain(AtomicOp::ALL.iter().map(|&op| Instr::Atomic(op, arg)))
        .collect();
    let expr = Expr::new(body);
    let bytes = encode_with(&m, &features, &expr).unwrap();
    assert_eq!(decode_with(&m, &features, &bytes), Ok(expr));
}

#[test]
fn data_index_needs_data_count() {
    let mut m = Module::new();
    let features = Features::default();
    let bytes = [0xfc, 0x09, 0x00, 0x0b];

    let err = decode_with(&m, &features, &bytes).unwrap_err();
    assert_eq!(err, Error::malformed(2, "data index without a DataCount section"));

    m.data_count = Some(1);
    let expr = decode_with(&m, &features, &bytes).unwrap();
    assert_eq!(expr.body.len(), 1);

    m.data_count = Some(0);
    let err = decode_with(&m, &features, &bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

fn minimal_groups(significant_bits: u32) -> usize {
    (significant_bits.max(1) as usize + 6) / 7
}

proptest! {
    #[test]
    fn u32_round_trips(v in any::<u32>()) {
        let mut e = Encoder::new();
        e.write_u32(v);
        prop_assert_eq!(e.len(), minimal_groups(32 - v.leading_zeros()));
        prop_assert_eq!(Decoder::new(e.bytes()).read_u32(), Ok(v));

        let mut e = Encoder::new().with_max_width(true);
        e.write_u32(v);
        prop_assert_eq!(e.len(), 5);
        prop_assert_eq!(Decoder::new(e.bytes()).read_u32(), Ok(v));
    }

    #[test]
    fn s32_round_trips(v in any::<i32>()) {
        let mut e = Encoder::new();
        e.write_s32(v);
        // one extra bit for the sign
        let significant = (if v < 0 { 32 - v.leading_ones() } else { 32 - v.leading_zeros() }) + 1;
        prop_assert_eq!(e.len(), minimal_groups(significant));
        prop_assert_eq!(Decoder::new(e.bytes()).read_s32(), Ok(v));

        let mut e = Encoder::new().with_max_width(true);
        e.write_s32(v);
        prop_assert_eq!(e.len(), 5);
        prop_assert_eq!(Decoder::new(e.bytes()).read_s32(), Ok(v));
    }

    #[test]
    fn u64_round_trips(v in any::<u64>()) {
        for &max in &[false, true] {
            let mut e = Encoder::new().with_max_width(max);
            e.write_u64(v);
            prop_assert_eq!(Decoder::new(e.bytes()).read_u64(), Ok(v));
        }
    }

    #[test]
    fn s64_round_trips(v in any::<i64>()) {
        for &max in &[false, true] {
            let mut e = Encoder::new().with_max_width(max);
            e.write_s64(v);
            prop_assert!(e.len() <= 10);
            prop_assert_eq!(Decoder::new(e.bytes()).read_s64(), Ok(v));
        }
    }

    #[test]
    fn f64_bits_round_trip(v in any::<f64>().prop_filter("NaN is canonicalized", |v| !v.is_nan())) {
        let mut e = Encoder::new();
        e.write_f64(v.into());
        prop_assert_eq!(Decoder::new(e.bytes()).read_f64(), Ok(v.to_bits()));
    }
}
