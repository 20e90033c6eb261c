//! Assembler: turns one textual instruction per line into [`Instruction`]s,
//! and parses the memory-initializer format.
//!
//! Tokens are separated by any run of whitespace, commas, or parentheses;
//! mnemonics and register names are matched case-insensitively.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SimError};
use crate::isa::{Instruction, Opcode, Operands};

fn token_split() -> &'static Regex {
    static TOKEN_SPLIT: OnceLock<Regex> = OnceLock::new();
    TOKEN_SPLIT.get_or_init(|| Regex::new(r"[\s,()]+").unwrap())
}

fn tokenize(line: &str) -> Vec<String> {
    token_split()
        .split(line.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_uppercase())
        .collect()
}

fn malformed(line: usize, reason: impl Into<String>) -> SimError {
    SimError::MalformedInstruction { line, reason: reason.into() }
}

fn parse_reg(line: usize, token: &str) -> Result<u8> {
    let rest = token
        .strip_prefix('R')
        .ok_or_else(|| malformed(line, format!("expected a register, got `{token}`")))?;
    let n: u8 = rest
        .parse()
        .map_err(|_| malformed(line, format!("expected a register, got `{token}`")))?;
    if n > 7 {
        return Err(malformed(line, format!("register out of range: `{token}`")));
    }
    Ok(n)
}

fn parse_int(line: usize, token: &str) -> Result<i32> {
    token
        .parse()
        .map_err(|_| malformed(line, format!("expected an integer, got `{token}`")))
}

/// Parse one non-blank program line into an [`Instruction`] at address `pc`.
/// `line` is the 1-indexed source line, used only for error messages.
pub fn parse_line(line: usize, text: &str, pc: i64) -> Result<Instruction> {
    let tokens = tokenize(text);
    let opcode_tok = tokens.first().ok_or_else(|| malformed(line, "empty instruction"))?;

    let expect_operands = |want: usize| -> Result<()> {
        if tokens.len() - 1 != want {
            Err(malformed(
                line,
                format!("{opcode_tok} expects {want} operand(s), got {}", tokens.len() - 1),
            ))
        } else {
            Ok(())
        }
    };

    let operands = match opcode_tok.as_str() {
        "LOAD" => {
            expect_operands(3)?;
            let dest = parse_reg(line, &tokens[1])?;
            let offset = parse_int(line, &tokens[2])?;
            let base = parse_reg(line, &tokens[3])?;
            Operands::Load { dest, base, offset }
        }
        "STORE" => {
            expect_operands(3)?;
            let data = parse_reg(line, &tokens[1])?;
            let offset = parse_int(line, &tokens[2])?;
            let base = parse_reg(line, &tokens[3])?;
            Operands::Store { data, base, offset }
        }
        "BEQ" => {
            expect_operands(3)?;
            let a = parse_reg(line, &tokens[1])?;
            let b = parse_reg(line, &tokens[2])?;
            let offset = parse_int(line, &tokens[3])?;
            Operands::Beq { a, b, offset }
        }
        "CALL" => {
            expect_operands(1)?;
            let label = parse_int(line, &tokens[1])?;
            if !(-64..=63).contains(&label) {
                return Err(malformed(
                    line,
                    format!("CALL label must be in [-64, 63], got {label}"),
                ));
            }
            Operands::Call { label }
        }
        "RET" => {
            expect_operands(0)?;
            Operands::Ret
        }
        "ADD" | "SUB" | "NOR" | "MUL" => {
            expect_operands(3)?;
            let dest = parse_reg(line, &tokens[1])?;
            let src1 = parse_reg(line, &tokens[2])?;
            let src2 = parse_reg(line, &tokens[3])?;
            Operands::Arith { dest, src1, src2 }
        }
        other => return Err(SimError::UnknownOpcode { line, opcode: other.to_string() }),
    };

    let opcode = match opcode_tok.as_str() {
        "LOAD" => Opcode::Load,
        "STORE" => Opcode::Store,
        "BEQ" => Opcode::Beq,
        "CALL" => Opcode::Call,
        "RET" => Opcode::Ret,
        "ADD" => Opcode::Add,
        "SUB" => Opcode::Sub,
        "NOR" => Opcode::Nor,
        "MUL" => Opcode::Mul,
        _ => unreachable!("validated above"),
    };

    Ok(Instruction::new(opcode, operands, pc))
}

/// Parse an entire program, one instruction per non-blank line, assigning
/// consecutive addresses starting at `starting_pc`.
pub fn parse_program(source: &str, starting_pc: i64) -> Result<Vec<Instruction>> {
    let mut program = Vec::new();
    let mut pc = starting_pc;
    for (idx, raw_line) in source.lines().enumerate() {
        if raw_line.trim().is_empty() {
            continue;
        }
        program.push(parse_line(idx + 1, raw_line, pc)?);
        pc += 1;
    }
    Ok(program)
}

/// Parse a memory-initializer line of the form `addr:value`. Negative values
/// are reduced to unsigned 16-bit two's complement.
pub fn parse_mem_init_line(line: usize, text: &str) -> Result<(u16, u16)> {
    let (addr_tok, val_tok) = text
        .trim()
        .split_once(':')
        .ok_or_else(|| malformed(line, format!("expected `addr:value`, got `{text}`")))?;
    let addr: i64 = addr_tok
        .trim()
        .parse()
        .map_err(|_| malformed(line, format!("expected an address, got `{addr_tok}`")))?;
    let value: i64 = val_tok
        .trim()
        .parse()
        .map_err(|_| malformed(line, format!("expected a value, got `{val_tok}`")))?;
    if !(0..=u16::MAX as i64).contains(&addr) {
        return Err(malformed(line, format!("address out of range: {addr}")));
    }
    Ok((addr as u16, (value & 0xFFFF) as u16))
}

/// Parse an entire memory-initializer file, one `addr:value` per non-blank line.
pub fn parse_mem_init(source: &str) -> Result<Vec<(u16, u16)>> {
    let mut cells = Vec::new();
    for (idx, raw_line) in source.lines().enumerate() {
        if raw_line.trim().is_empty() {
            continue;
        }
        cells.push(parse_mem_init_line(idx + 1, raw_line)?);
    }
    Ok(cells)
}
