/// assemble.rs - Two-pass Logic assembler
///
/// Pass 1 encodes every instruction with 2-byte placeholders for jump offsets
/// and records where each instruction starts and how long it is.
/// Pass 2 patches each placeholder with the signed little-endian distance from
/// the end of the jumping instruction to its target.
///
/// Layout:
///   command    opcode args...
///   goto       FE lo hi
///   condition  FF clauses... FF lo hi
///   test       [FD] opcode args...            (fixed arity)
///              [FD] opcode count word...      (variable arity, words LE)
///   or group   FC tests... FC
use indexmap::IndexMap;
use log::{debug, trace};

use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::instruction::{Address, LogicClause, LogicInstruction, LogicTest};
use crate::logic_compiler::opcodes::{
    OpcodeTable, TestArity, CONDITION_MARKER, GOTO_MARKER, NOT_MARKER, OR_MARKER,
};

/// Where an instruction landed in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: usize,
    pub length: usize,
}

/// A jump offset that still has to be written
#[derive(Debug, Clone, Copy)]
struct PendingJump {
    from: Address,
    target: Address,
}

pub struct LogicAssembler<'a> {
    instructions: &'a [LogicInstruction],
    opcodes: &'a OpcodeTable,
    code: Vec<u8>,
    placements: IndexMap<Address, Placement>,
    jumps: Vec<PendingJump>,
}

impl<'a> LogicAssembler<'a> {
    pub fn new(instructions: &'a [LogicInstruction], opcodes: &'a OpcodeTable) -> Self {
        LogicAssembler {
            instructions,
            opcodes,
            code: Vec::new(),
            placements: IndexMap::new(),
            jumps: Vec::new(),
        }
    }

    /// Assemble the instructions into Logic bytecode
    pub fn assemble(mut self) -> Result<Vec<u8>, LogicError> {
        self.encode_all()?;
        for jump in std::mem::take(&mut self.jumps) {
            self.patch(jump)?;
        }

        debug!(
            "assembled {} instructions into {} bytes",
            self.instructions.len(),
            self.code.len()
        );
        Ok(self.code)
    }

    /// Byte placement of every instruction, by address
    pub fn layout(mut self) -> Result<IndexMap<Address, Placement>, LogicError> {
        self.encode_all()?;
        Ok(self.placements)
    }

    fn encode_all(&mut self) -> Result<(), LogicError> {
        for instruction in self.instructions {
            let offset = self.code.len();
            self.encode_instruction(instruction)?;
            let placement = Placement {
                offset,
                length: self.code.len() - offset,
            };
            trace!("{:04x}: {} ({} bytes)", offset, instruction, placement.length);
            if self
                .placements
                .insert(instruction.address(), placement)
                .is_some()
            {
                return Err(LogicError::ConflictingAddress(instruction.address()));
            }
        }
        Ok(())
    }

    fn encode_instruction(&mut self, instruction: &LogicInstruction) -> Result<(), LogicError> {
        match instruction {
            LogicInstruction::Command { opcode, args, .. } => {
                self.code.push(*opcode);
                self.code.extend_from_slice(args);
            }
            LogicInstruction::Goto {
                address,
                jump_address,
            } => {
                self.code.extend_from_slice(&[GOTO_MARKER, 0x00, 0x00]);
                self.jumps.push(PendingJump {
                    from: *address,
                    target: *jump_address,
                });
            }
            LogicInstruction::Condition {
                address,
                clauses,
                skip_address,
            } => {
                let target = skip_address.ok_or(LogicError::UnresolvedSkip(*address))?;
                self.code.push(CONDITION_MARKER);
                for clause in clauses {
                    self.encode_clause(clause)?;
                }
                self.code.extend_from_slice(&[CONDITION_MARKER, 0x00, 0x00]);
                self.jumps.push(PendingJump {
                    from: *address,
                    target,
                });
            }
        }
        Ok(())
    }

    fn encode_clause(&mut self, clause: &LogicClause) -> Result<(), LogicError> {
        match clause {
            LogicClause::Test(test) => self.encode_test(test),
            LogicClause::Or(tests) => {
                self.code.push(OR_MARKER);
                for test in tests {
                    self.encode_test(test)?;
                }
                self.code.push(OR_MARKER);
                Ok(())
            }
        }
    }

    fn encode_test(&mut self, test: &LogicTest) -> Result<(), LogicError> {
        if test.negate {
            self.code.push(NOT_MARKER);
        }
        self.code.push(test.opcode);
        match self.opcodes.test_arity(test.opcode) {
            Some(TestArity::Variable) => {
                let count = u8::try_from(test.args.len()).map_err(|_| {
                    LogicError::ArgumentOutOfRange {
                        opcode: test.opcode,
                        value: test.args.len().min(u16::MAX as usize) as u16,
                    }
                })?;
                self.code.push(count);
                for word in &test.args {
                    self.code.extend_from_slice(&word.to_le_bytes());
                }
            }
            Some(TestArity::Fixed(_)) | None => {
                for value in &test.args {
                    let byte = u8::try_from(*value).map_err(|_| LogicError::ArgumentOutOfRange {
                        opcode: test.opcode,
                        value: *value,
                    })?;
                    self.code.push(byte);
                }
            }
        }
        Ok(())
    }

    fn patch(&mut self, jump: PendingJump) -> Result<(), LogicError> {
        let source = self
            .placements
            .get(&jump.from)
            .copied()
            .ok_or(LogicError::UnknownNode(format!("instruction {}", jump.from)))?;
        let target = self
            .placements
            .get(&jump.target)
            .copied()
            .ok_or(LogicError::DanglingJumpTarget {
                from: jump.from,
                target: jump.target,
            })?;

        let end = source.offset + source.length;
        let offset = target.offset as i64 - end as i64;
        let offset = i16::try_from(offset).map_err(|_| LogicError::JumpOutOfRange {
            from: jump.from,
            offset,
        })?;
        self.code[end - 2..end].copy_from_slice(&offset.to_le_bytes());
        trace!(
            "patched jump at {:04x} -> {:04x} with offset {}",
            source.offset,
            target.offset,
            offset
        );
        Ok(())
    }
}

/// Assemble with the default opcode table
pub fn assemble(instructions: &[LogicInstruction]) -> Result<Vec<u8>, LogicError> {
    let table = OpcodeTable::default();
    LogicAssembler::new(instructions, &table).assemble()
}

#[cfg(test)]
#[path = "assemble_tests.rs"]
mod tests;
