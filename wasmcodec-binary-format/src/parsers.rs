//! `nom` parsers for the primitive values of the binary format.
//!
//! These are composed by [`Decoder`](crate::decoder::Decoder), which tracks
//! offsets and turns `nom` errors into [`Error`](wasmcodec_structure::Error)s.

use nom::bytes::complete::take;
use nom::combinator::{map, map_res};
use nom::error::{Error as NomError, ErrorKind as NomErrorKind};
use nom::number::complete::{le_u32, le_u64, le_u8};
use nom::sequence::pair;
use nom::Err;
use nom::IResult;

use wasmcodec_structure::types::FuncType;
use wasmcodec_structure::types::GlobalType;
use wasmcodec_structure::types::Limits;
use wasmcodec_structure::types::MemType;
use wasmcodec_structure::types::Mut;
use wasmcodec_structure::types::Name;
use wasmcodec_structure::types::RefType;
use wasmcodec_structure::types::TableType;
use wasmcodec_structure::types::ValType;

pub type Inp<'a> = &'a [u8];

fn fail<T>(input: Inp, kind: NomErrorKind) -> IResult<Inp, T> {
    Err(Err::Error(NomError::new(input, kind)))
}

fn btag(b: u8) -> impl Fn(Inp) -> IResult<Inp, u8> {
    move |input| {
        let (rest, x) = parse_byte(input)?;
        if x == b {
            Ok((rest, x))
        } else {
            fail(input, NomErrorKind::Tag)
        }
    }
}

// 5.1.3. Vectors
pub fn parse_vec<'a, F, B>(input: Inp<'a>, mut parse_b: F) -> IResult<Inp<'a>, Vec<B>>
where
    F: FnMut(Inp<'a>) -> IResult<Inp<'a>, B>,
{
    let (mut input, n) = parse_u32(input)?;
    // Never trust the length prefix for the allocation.
    let mut res = Vec::with_capacity((n as usize).min(input.len()));
    for _ in 0..n {
        let (i, b) = parse_b(input)?;
        res.push(b);
        input = i;
    }
    Ok((input, res))
}

// 5.2.1. Bytes
pub fn parse_byte(input: Inp) -> IResult<Inp, u8> {
    le_u8(input)
}

// 5.2.2. Integers
#[allow(non_snake_case)]
pub fn parse_uN(input: Inp, N: u32) -> IResult<Inp, u64> {
    let (rest, n) = parse_byte(input)?;
    let n = n as u128;
    if n < (1 << 7) {
        // n < 2^7 ∧ n < 2^N
        if n < (1u128 << N) {
            return Ok((rest, n as u64));
        }
    } else if N > 7 {
        // n ≥ 2^7 ∧ N > 7
        let (rest, m) = parse_uN(rest, N - 7)?;
        return Ok((rest, (m << 7) + (n as u64 - (1 << 7))));
    }
    fail(input, NomErrorKind::TooLarge)
}

#[allow(non_snake_case)]
pub fn parse_sN(input: Inp, N: u32) -> IResult<Inp, i64> {
    let (rest, n) = parse_byte(input)?;
    let n = n as i128;
    let v26 = 1 << 6;
    let v27 = 1 << 7;
    let v2N1 = 1i128 << (N - 1);
    if n < v26 {
        // n < 2^6 ∧ n < 2^(N−1)
        if n < v2N1 {
            return Ok((rest, n as i64));
        }
    } else if n < v27 {
        // 2^6 ≤ n < 2^7 ∧ n ≥ 2^7 − 2^(N − 1)
        if n >= v27 - v2N1 {
            return Ok((rest, (n - v27) as i64));
        }
    } else if N > 7 {
        // n ≥ 2^7 ∧ N > 7
        let (rest, m) = parse_sN(rest, N - 7)?;
        return Ok((rest, m * v27 as i64 + (n - v27) as i64));
    }
    fail(input, NomErrorKind::TooLarge)
}

pub fn parse_u32(input: Inp) -> IResult<Inp, u32> {
    let (rest, x) = parse_uN(input, 32)?;
    Ok((rest, x as u32))
}
pub fn parse_u64(input: Inp) -> IResult<Inp, u64> {
    parse_uN(input, 64)
}
pub fn parse_s32(input: Inp) -> IResult<Inp, i32> {
    let (rest, x) = parse_sN(input, 32)?;
    Ok((rest, x as i32))
}
pub fn parse_s33(input: Inp) -> IResult<Inp, i64> {
    parse_sN(input, 33)
}
pub fn parse_s64(input: Inp) -> IResult<Inp, i64> {
    parse_sN(input, 64)
}

/// The 4-byte little endian module version.
pub fn parse_fixed_u32(input: Inp) -> IResult<Inp, u32> {
    le_u32(input)
}

// 5.2.3. Floating-Point
pub fn parse_f32(input: Inp) -> IResult<Inp, u32> {
    le_u32(input)
}
pub fn parse_f64(input: Inp) -> IResult<Inp, u64> {
    le_u64(input)
}

// 5.2.4. Names
pub fn parse_bytes(input: Inp) -> IResult<Inp, &[u8]> {
    let (input, n) = parse_u32(input)?;
    take(n as usize)(input)
}

pub fn parse_name(input: Inp) -> IResult<Inp, Name> {
    map(
        map_res(parse_bytes, ::std::str::from_utf8),
        Name::from,
    )(input)
}

// 5.3.1 Value Types
pub fn parse_valtype(input: Inp) -> IResult<Inp, ValType> {
    let (rest, b) = parse_byte(input)?;
    match ValType::from_byte(b) {
        Some(t) => Ok((rest, t)),
        None => fail(input, NomErrorKind::Alt),
    }
}

pub fn parse_reftype(input: Inp) -> IResult<Inp, RefType> {
    let (rest, b) = parse_byte(input)?;
    match RefType::from_byte(b) {
        Some(t) => Ok((rest, t)),
        None => fail(input, NomErrorKind::Alt),
    }
}

// 5.3.3 Function Types
pub fn parse_functype(input: Inp) -> IResult<Inp, FuncType> {
    let (input, _) = btag(0x60)(input)?;
    let (input, params) = parse_vec(input, parse_valtype)?;
    let (input, results) = parse_vec(input, parse_valtype)?;
    Ok((input, FuncType { params, results }))
}

// 5.3.4 Limits
pub fn parse_limits(input: Inp) -> IResult<Inp, Limits> {
    let (rest, flag) = parse_byte(input)?;
    match flag {
        0x00 => map(parse_u32, |n| Limits { min: n, max: None })(rest),
        0x01 => map(pair(parse_u32, parse_u32), |(n, m)| Limits { min: n, max: Some(m) })(rest),
        _ => fail(input, NomErrorKind::Alt),
    }
}

// 5.3.5 Memory Types
pub fn parse_memtype(input: Inp) -> IResult<Inp, MemType> {
    map(parse_limits, |limits| MemType { limits })(input)
}

// 5.3.6. Table Types
pub fn parse_tabletype(input: Inp) -> IResult<Inp, TableType> {
    map(pair(parse_reftype, parse_limits), |(elem, limits)| TableType { elem, limits })(input)
}

// 5.3.7. Global Types
pub fn parse_globaltype(input: Inp) -> IResult<Inp, GlobalType> {
    map(pair(parse_valtype, parse_mut), |(valtype, mutability)| GlobalType { mutability, valtype })(input)
}

pub fn parse_mut(input: Inp) -> IResult<Inp, Mut> {
    let (rest, b) = parse_byte(input)?;
    match b {
        0x00 => Ok((rest, Mut::Const)),
        0x01 => Ok((rest, Mut::Var)),
        _ => fail(input, NomErrorKind::Alt),
    }
}
