//! The nom grammar for the pieces of a statement.
//!
//! The statement structure itself (directive vs. label vs. instruction) is
//! dispatched line by line in `lib.rs`; this module parses the leaves:
//! identifiers, integer literals, registers, memory references and operand
//! lists.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{
        alpha1, alphanumeric1, char, digit1, hex_digit1, oct_digit1, space0, space1,
    },
    combinator::{map, map_opt, map_res, opt, recognize, value},
    multi::{many0_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::program::{lookup_register, Operand, Register, Width};

/// An identifier: a letter or underscore, then letters, digits and
/// underscores.
pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alt((alpha1, tag("_"))), many0_count(alt((alphanumeric1, tag("_"))))))(input)
}

/// A label: an identifier followed by a colon.
pub(crate) fn label(input: &str) -> IResult<&str, &str> {
    terminated(identifier, pair(space0, char(':')))(input)
}

/// An integer literal: decimal, hexadecimal with a `0x` prefix, or octal
/// with a leading `0`, optionally negated.
pub(crate) fn integer(input: &str) -> IResult<&str, i64> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, magnitude) = alt((
        map_res(preceded(alt((tag("0x"), tag("0X"))), hex_digit1), |digits: &str| {
            i64::from_str_radix(digits, 16)
        }),
        map_res(preceded(char('0'), oct_digit1), |digits: &str| i64::from_str_radix(digits, 8)),
        map_res(digit1, |digits: &str| digits.parse::<i64>()),
    ))(input)?;

    Ok((input, if sign.is_some() { -magnitude } else { magnitude }))
}

/// A comma-separated list of operands.
pub(crate) fn operands(input: &str) -> IResult<&str, Vec<Operand>> {
    separated_list1(tuple((space0, char(','), space0)), operand)(input)
}

fn operand(input: &str) -> IResult<&str, Operand> {
    alt((memory, immediate, register_or_symbol))(input)
}

fn immediate(input: &str) -> IResult<&str, Operand> {
    map(integer, |value| Operand::Immediate { value, width: Width::of_value(value) })(input)
}

/// An identifier denotes a register when it is spelled like one, and a
/// symbol reference otherwise.
fn register_or_symbol(input: &str) -> IResult<&str, Operand> {
    map(identifier, |name| match lookup_register(name) {
        Some(register) => Operand::Register(register),
        None => Operand::Symbol(name.to_owned()),
    })(input)
}

fn register(input: &str) -> IResult<&str, Register> {
    map_opt(identifier, lookup_register)(input)
}

/// A memory reference: `[base]`, `[base + disp]` or `[base - disp]`, with an
/// optional `qword ptr`-style width prefix (the width defaults to qword).
fn memory(input: &str) -> IResult<&str, Operand> {
    let (input, width) = opt(terminated(width_keyword, tuple((space1, tag("ptr"), space1))))(input)?;
    let (input, (base, displacement)) = delimited(
        pair(char('['), space0),
        pair(register, opt(tuple((space0, alt((char('+'), char('-'))), space0, integer)))),
        pair(space0, char(']')),
    )(input)?;

    let displacement = match displacement {
        Some((_, '-', _, magnitude)) => -magnitude,
        Some((_, _, _, magnitude)) => magnitude,
        None => 0,
    };

    Ok((input, Operand::Memory { base, displacement, width: width.unwrap_or(Width::Qword) }))
}

fn width_keyword(input: &str) -> IResult<&str, Width> {
    alt((
        value(Width::Byte, tag("byte")),
        value(Width::Word, tag("word")),
        value(Width::Dword, tag("dword")),
        value(Width::Qword, tag("qword")),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::RegisterKind;

    #[test]
    fn test_identifier() {
        assert_eq!(identifier("main"), Ok(("", "main")));
        assert_eq!(identifier("_start:"), Ok((":", "_start")));
        assert_eq!(identifier("a1_b2 rest"), Ok((" rest", "a1_b2")));
        assert!(identifier("1abc").is_err());
    }

    #[test]
    fn test_label() {
        assert_eq!(label("main:"), Ok(("", "main")));
        assert_eq!(label("f : ret"), Ok((" ret", "f")));
        assert!(label("main").is_err());
    }

    #[test]
    fn test_integer() {
        assert_eq!(integer("42"), Ok(("", 42)));
        assert_eq!(integer("0"), Ok(("", 0)));
        assert_eq!(integer("0x2a"), Ok(("", 42)));
        assert_eq!(integer("0X2A"), Ok(("", 42)));
        assert_eq!(integer("052"), Ok(("", 42)));
        assert_eq!(integer("-42"), Ok(("", -42)));
        assert_eq!(integer("-0x10"), Ok(("", -16)));
        assert!(integer("x").is_err());
    }

    #[test]
    fn test_operands_registers() {
        assert_eq!(
            operands("rax, rdi"),
            Ok((
                "",
                vec![
                    Operand::Register(Register { kind: RegisterKind::Rax, width: Width::Qword }),
                    Operand::Register(Register { kind: RegisterKind::Rdi, width: Width::Qword }),
                ]
            ))
        );
    }

    #[test]
    fn test_operands_immediate() {
        assert_eq!(
            operands("rax, 42"),
            Ok((
                "",
                vec![
                    Operand::Register(Register { kind: RegisterKind::Rax, width: Width::Qword }),
                    Operand::Immediate { value: 42, width: Width::Byte },
                ]
            ))
        );
    }

    #[test]
    fn test_operand_symbol() {
        assert_eq!(operands("printf"), Ok(("", vec![Operand::Symbol("printf".to_owned())])));
    }

    #[test]
    fn test_operand_memory() {
        assert_eq!(
            operands("[rbp]"),
            Ok((
                "",
                vec![Operand::Memory {
                    base: Register { kind: RegisterKind::Rbp, width: Width::Qword },
                    displacement: 0,
                    width: Width::Qword,
                }]
            ))
        );

        assert_eq!(
            operands("qword ptr [rbp - 8]"),
            Ok((
                "",
                vec![Operand::Memory {
                    base: Register { kind: RegisterKind::Rbp, width: Width::Qword },
                    displacement: -8,
                    width: Width::Qword,
                }]
            ))
        );

        assert_eq!(
            operands("byte ptr [rax+0x10]"),
            Ok((
                "",
                vec![Operand::Memory {
                    base: Register { kind: RegisterKind::Rax, width: Width::Qword },
                    displacement: 16,
                    width: Width::Byte,
                }]
            ))
        );
    }
}
