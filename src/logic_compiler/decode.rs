/// decode.rs - Logic bytecode decoder
///
/// Turns a Logic code buffer into `LogicInstruction`s whose addresses are the
/// byte offsets of the instructions. Jump offsets are resolved into absolute
/// byte addresses, relative to the end of the jumping instruction.
use indexmap::IndexMap;
use log::{debug, trace};

use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::instruction::{
    Address, Label, LogicClause, LogicCompilerResult, LogicInstruction, LogicTest,
};
use crate::logic_compiler::opcodes::{
    OpcodeTable, TestArity, CONDITION_MARKER, GOTO_MARKER, NOT_MARKER, OR_MARKER,
};

pub struct LogicDecoder<'a> {
    code: &'a [u8],
    opcodes: &'a OpcodeTable,
    position: usize,
}

impl<'a> LogicDecoder<'a> {
    pub fn new(code: &'a [u8], opcodes: &'a OpcodeTable) -> Self {
        LogicDecoder {
            code,
            opcodes,
            position: 0,
        }
    }

    fn read_byte(&mut self) -> Result<u8, LogicError> {
        let byte = *self
            .code
            .get(self.position)
            .ok_or(LogicError::UnexpectedEndOfCode(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    fn read_word(&mut self) -> Result<u16, LogicError> {
        let low = self.read_byte()?;
        let high = self.read_byte()?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// Read a signed jump offset and resolve it against the current position,
    /// which is the end of the jumping instruction
    fn read_jump(&mut self, start: usize) -> Result<Address, LogicError> {
        let offset = self.read_word()? as i16;
        let target = self.position as i64 + offset as i64;
        if target < 0 || target > self.code.len() as i64 {
            return Err(LogicError::JumpOutsideCode {
                from: start,
                target,
            });
        }
        Ok(target as Address)
    }

    /// Decode the whole buffer
    pub fn decode(mut self) -> Result<Vec<LogicInstruction>, LogicError> {
        let mut instructions = Vec::new();
        while self.position < self.code.len() {
            let instruction = self.decode_instruction()?;
            trace!("decoded {}", instruction);
            instructions.push(instruction);
        }
        debug!(
            "decoded {} instructions from {} bytes",
            instructions.len(),
            self.code.len()
        );
        Ok(instructions)
    }

    fn decode_instruction(&mut self) -> Result<LogicInstruction, LogicError> {
        let start = self.position;
        let address = start as Address;
        let opcode = self.read_byte()?;
        match opcode {
            CONDITION_MARKER => {
                let clauses = self.decode_clauses()?;
                let skip = self.read_jump(start)?;
                Ok(LogicInstruction::Condition {
                    address,
                    clauses,
                    skip_address: Some(skip),
                })
            }
            GOTO_MARKER => {
                let target = self.read_jump(start)?;
                Ok(LogicInstruction::Goto {
                    address,
                    jump_address: target,
                })
            }
            _ => {
                let arity = self
                    .opcodes
                    .action_arity(opcode)
                    .ok_or(LogicError::UnknownOpcode {
                        opcode,
                        offset: start,
                    })?;
                let mut args = Vec::with_capacity(arity);
                for _ in 0..arity {
                    args.push(self.read_byte()?);
                }
                Ok(LogicInstruction::Command {
                    address,
                    opcode,
                    args,
                })
            }
        }
    }

    /// Clauses up to and including the closing condition marker
    fn decode_clauses(&mut self) -> Result<Vec<LogicClause>, LogicError> {
        let mut clauses = Vec::new();
        let mut or_group: Option<(usize, Vec<LogicTest>)> = None;
        let mut negate = false;

        loop {
            let offset = self.position;
            match self.read_byte()? {
                CONDITION_MARKER => {
                    if or_group.is_some() {
                        return Err(LogicError::InvalidCondition(
                            "unterminated OR group".to_string(),
                            offset,
                        ));
                    }
                    if negate {
                        return Err(LogicError::InvalidCondition(
                            "negation without a test".to_string(),
                            offset,
                        ));
                    }
                    return Ok(clauses);
                }
                OR_MARKER => {
                    if negate {
                        return Err(LogicError::InvalidCondition(
                            "negated OR group".to_string(),
                            offset,
                        ));
                    }
                    match or_group.take() {
                        None => or_group = Some((offset, Vec::new())),
                        Some((opened, tests)) => {
                            if tests.is_empty() {
                                return Err(LogicError::InvalidCondition(
                                    "empty OR group".to_string(),
                                    opened,
                                ));
                            }
                            clauses.push(LogicClause::Or(tests));
                        }
                    }
                }
                NOT_MARKER => negate = !negate,
                opcode => {
                    let mut test = self.decode_test(opcode, offset)?;
                    test.negate = negate;
                    negate = false;
                    match or_group.as_mut() {
                        Some((_, tests)) => tests.push(test),
                        None => clauses.push(LogicClause::Test(test)),
                    }
                }
            }
        }
    }

    fn decode_test(&mut self, opcode: u8, offset: usize) -> Result<LogicTest, LogicError> {
        let arity = self
            .opcodes
            .test_arity(opcode)
            .ok_or(LogicError::UnknownOpcode { opcode, offset })?;
        let args = match arity {
            TestArity::Fixed(count) => {
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(self.read_byte()? as u16);
                }
                args
            }
            TestArity::Variable => {
                let count = self.read_byte()? as usize;
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(self.read_word()?);
                }
                args
            }
        };
        Ok(LogicTest::new(opcode, args))
    }
}

/// One label per jump target, named in address order
pub fn collect_labels(instructions: &[LogicInstruction]) -> IndexMap<Address, Label> {
    let mut targets: Vec<(Address, Address)> = instructions
        .iter()
        .filter_map(|instruction| {
            instruction
                .jump_target()
                .map(|target| (target, instruction.address()))
        })
        .collect();
    targets.sort();

    let mut labels: IndexMap<Address, Label> = IndexMap::new();
    for (target, from) in targets {
        let next_number = labels.len() + 1;
        labels
            .entry(target)
            .or_insert_with(|| Label {
                address: target,
                name: format!("Label{}", next_number),
                references: Vec::new(),
            })
            .references
            .push(from);
    }
    labels
}

/// Decode with the default opcode table
pub fn decode(code: &[u8]) -> Result<Vec<LogicInstruction>, LogicError> {
    let table = OpcodeTable::default();
    LogicDecoder::new(code, &table).decode()
}

/// Listing of a code buffer, one decoded instruction per line
pub fn disassemble(code: &[u8], table: &OpcodeTable) -> Result<String, LogicError> {
    let instructions = LogicDecoder::new(code, table).decode()?;
    let labels = collect_labels(&instructions);
    Ok(LogicCompilerResult {
        instructions,
        labels,
    }
    .listing())
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
