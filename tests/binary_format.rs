extern crate wasmcodec;

use wasmcodec::binary_format::encoder::write_unsigned;
use wasmcodec::structure::instructions::*;
use wasmcodec::structure::modules::*;
use wasmcodec::structure::opcodes::SimpleOp;
use wasmcodec::structure::types::*;
use wasmcodec::*;

const HEADER: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

fn with_header(sections: &[u8]) -> Vec<u8> {
    let mut bytes = HEADER.to_vec();
    bytes.extend_from_slice(sections);
    bytes
}

fn answer() -> Module {
    let mut m = Module::new();
    m.add_func(
        FuncType::new(&[], &[ValType::I32]),
        Code {
            locals: vec![],
            body: Expr::new(vec![Instr::I32Const(42), Instr::Simple(SimpleOp::Return)]),
        },
    );
    m.intern_types();
    m
}

#[test]
fn answer_round_trip() {
    let features = Features::default();
    let m = answer();
    let bytes = encode_module(&m, &features).unwrap();
    assert_eq!(
        bytes,
        with_header(&[
            0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f, // type
            0x03, 0x02, 0x01, 0x00, // function
            0x0a, 0x07, 0x01, 0x05, 0x00, 0x41, 0x2a, 0x0f, 0x0b, // code
        ])
    );

    let decoded = decode_and_validate(&bytes, &features).unwrap();
    assert_eq!(decoded, m);
    let func = decoded.funcs.values().next().unwrap();
    assert_eq!(func.type_, FuncType::new(&[], &[ValType::I32]));
    assert_eq!(
        func.code.body.body,
        vec![Instr::I32Const(42), Instr::Simple(SimpleOp::Return)]
    );
}

#[test]
fn empty_sections_are_omitted() {
    let bytes = encode_module(&Module::new(), &Features::default()).unwrap();
    assert_eq!(bytes, HEADER.to_vec());
    assert_eq!(decode_module(&bytes, &Features::default()).unwrap(), Module::new());
}

#[test]
fn duplicate_type_section() {
    let bytes = with_header(&[0x01, 0x01, 0x00, 0x01, 0x01, 0x00]);
    assert_eq!(
        decode_module(&bytes, &Features::default()),
        Err(Error::DuplicateSection {
            offset: 11,
            id: SectionId::Type
        })
    );
}

#[test]
fn call_out_of_range() {
    let bytes = with_header(&[
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x0a, 0x06, 0x01, 0x04, 0x00, 0x10, 0x05, 0x0b, // code: call 5
    ]);
    let err = decode_module(&bytes, &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidReference);
}

#[test]
fn bad_header() {
    let err = decode_module(&[0x00, 0x61, 0x73, 0x6e, 1, 0, 0, 0], &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);

    let err = decode_module(&[0x00, 0x61, 0x73, 0x6d, 2, 0, 0, 0], &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);

    let err = decode_module(&[0x00, 0x61, 0x73], &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BufferExhausted);
}

#[test]
fn max_width_integers() {
    let features = Features::default().with_max_width_leb(true);
    let m = answer();
    let bytes = encode_module(&m, &features).unwrap();
    let canonical = encode_module(&m, &Features::default()).unwrap();
    assert!(bytes.len() > canonical.len());

    // The type section size takes five bytes.
    assert_eq!(bytes[8], 0x01);
    assert!(bytes[9..13].iter().all(|b| b & 0x80 != 0));
    assert_eq!(bytes[13] & 0x80, 0);

    assert_eq!(decode_module(&bytes, &Features::default()).unwrap(), m);
}

#[test]
fn custom_sections_keep_their_place() {
    let mut m = answer();
    m.customs.push(CustomSection {
        name: "before-all".into(),
        payload: vec![1, 2, 3],
        placement: Placement::Start,
    });
    m.customs.push(CustomSection {
        name: "after-types".into(),
        payload: vec![4],
        placement: Placement::After(SectionId::Type),
    });
    m.customs.push(CustomSection {
        name: "trailer".into(),
        payload: vec![],
        placement: Placement::After(SectionId::Code),
    });

    let features = Features::default();
    let bytes = encode_module(&m, &features).unwrap();
    assert_eq!(bytes[8], 0x00);
    assert_eq!(decode_module(&bytes, &features).unwrap(), m);

    let dropped = encode_module(&m, &features.with_custom_sections(false)).unwrap();
    assert_eq!(dropped, encode_module(&answer(), &features).unwrap());
}

#[test]
fn name_section() {
    let mut m = answer();
    m.name = Some("answers".into());
    for (_, func) in m.funcs.iter_mut() {
        func.name = Some("answer".into());
    }

    let features = Features::default();
    let bytes = encode_module(&m, &features).unwrap();
    assert_eq!(decode_module(&bytes, &features).unwrap(), m);

    // Without name section support it is kept as an opaque custom section.
    let opaque = decode_module(&bytes, &features.with_name_section(false)).unwrap();
    assert_eq!(opaque.name, None);
    assert_eq!(opaque.customs.len(), 1);
    assert_eq!(&*opaque.customs[0].name, "name");
    assert_eq!(opaque.customs[0].placement, Placement::After(SectionId::Code));
}

#[test]
fn mvp_rejects_sign_extension() {
    let mut m = Module::new();
    m.add_func(
        FuncType::new(&[ValType::I32], &[ValType::I32]),
        Code {
            locals: vec![],
            body: Expr::new(vec![Instr::LocalGet(0), Instr::Simple(SimpleOp::I32Extend8S)]),
        },
    );
    m.intern_types();

    let bytes = encode_module(&m, &Features::default()).unwrap();
    assert_eq!(decode_and_validate(&bytes, &Features::default()).unwrap(), m);

    // The offset points at the `i32.extend8_s` byte inside the code section.
    assert_eq!(bytes[27], 0xc0);
    let err = encode_module(&m, &Features::mvp()).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedInstruction {
            offset: 27,
            opcode: wasmcodec::structure::opcodes::Opcode::primary(0xc0)
        }
    );
    let err = decode_module(&bytes, &Features::mvp()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);
}

#[test]
fn deeply_nested_blocks_fail_cleanly() {
    let depth = 100_000;
    let mut body = vec![0x00];
    for _ in 0..depth {
        body.extend_from_slice(&[0x02, 0x40]);
    }
    body.extend(vec![0x0b; depth + 1]);

    let mut code = vec![0x01];
    write_unsigned(&mut code, body.len() as u64, None);
    code.extend(body);

    let mut sections = vec![
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x0a,
    ];
    write_unsigned(&mut sections, code.len() as u64, None);
    sections.extend(code);

    let err = decode_module(&with_header(&sections), &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);
}

#[test]
fn bodies_follow_their_functions() {
    let mut m = Module::new();
    m.add_func(
        FuncType::new(&[], &[ValType::I64]),
        Code {
            locals: vec![],
            body: Expr::new(vec![Instr::I64Const(1)]),
        },
    );
    m.add_func(FuncType::new(&[], &[ValType::I32]), answer().funcs.values().next().unwrap().code.clone());
    let first = m.funcs.iter().map(|(id, _)| id).next().unwrap();
    m.funcs.remove(first);
    m.intern_types();
    let features = Features::default();
    let bytes = encode_module(&m, &features).unwrap();
    let decoded = decode_and_validate(&bytes, &features).unwrap();
    assert_eq!(decoded, answer());
}

#[test]
fn function_and_code_counts_must_agree() {
    let declared = [
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type
        0x03, 0x03, 0x02, 0x00, 0x00, // function: two of type 0
    ];

    let err = decode_module(&with_header(&declared), &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);

    let mut one_body = declared.to_vec();
    one_body.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]);
    let err = decode_module(&with_header(&one_body), &Features::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedBinary);
}
