//! Linear Logic instructions
//!
//! The same instruction type is used on both sides of the recompiler. Coming out
//! of the decoder, `address` is the byte offset of the instruction in the
//! resource. Coming out of the recompiler, `address` is a symbolic identifier
//! that only orders and names instructions; the assembler maps it to a byte
//! offset.

use std::fmt::{self, Display, Formatter};

use indexmap::{IndexMap, IndexSet};

use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::opcodes;

/// Instruction address, either a byte offset or a symbolic identifier
pub type Address = u32;

/// A single test command inside a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicTest {
    pub opcode: u8,
    pub args: Vec<u16>,
    pub negate: bool,
}

impl LogicTest {
    pub fn new(opcode: u8, args: Vec<u16>) -> Self {
        LogicTest {
            opcode,
            args,
            negate: false,
        }
    }

    pub fn negated(opcode: u8, args: Vec<u16>) -> Self {
        LogicTest {
            opcode,
            args,
            negate: true,
        }
    }
}

/// One AND-combined part of a condition. OR groups hold plain tests only, so
/// nested OR groups cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicClause {
    Test(LogicTest),
    Or(Vec<LogicTest>),
}

/// An action command as it appears inside a basic block, before it has an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicCommand {
    pub opcode: u8,
    pub args: Vec<u8>,
}

impl LogicCommand {
    pub fn new(opcode: u8, args: Vec<u8>) -> Self {
        LogicCommand { opcode, args }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicInstruction {
    Command {
        address: Address,
        opcode: u8,
        args: Vec<u8>,
    },
    /// Falls through when all clauses hold, otherwise continues at `skip_address`
    Condition {
        address: Address,
        clauses: Vec<LogicClause>,
        skip_address: Option<Address>,
    },
    Goto {
        address: Address,
        jump_address: Address,
    },
}

impl LogicInstruction {
    pub fn address(&self) -> Address {
        match self {
            LogicInstruction::Command { address, .. }
            | LogicInstruction::Condition { address, .. }
            | LogicInstruction::Goto { address, .. } => *address,
        }
    }

    /// The address this instruction may transfer control to, other than the next one
    pub fn jump_target(&self) -> Option<Address> {
        match self {
            LogicInstruction::Command { .. } => None,
            LogicInstruction::Condition { skip_address, .. } => *skip_address,
            LogicInstruction::Goto { jump_address, .. } => Some(*jump_address),
        }
    }

    /// Point the jump or skip of this instruction somewhere else
    pub fn set_jump_target(&mut self, target: Address) {
        match self {
            LogicInstruction::Command { .. } => {}
            LogicInstruction::Condition { skip_address, .. } => *skip_address = Some(target),
            LogicInstruction::Goto { jump_address, .. } => *jump_address = target,
        }
    }

    pub fn is_goto(&self) -> bool {
        matches!(self, LogicInstruction::Goto { .. })
    }

    pub fn to_command(&self) -> Option<LogicCommand> {
        match self {
            LogicInstruction::Command { opcode, args, .. } => {
                Some(LogicCommand::new(*opcode, args.clone()))
            }
            _ => None,
        }
    }
}

impl Display for LogicTest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.negate {
            write!(f, "!")?;
        }
        write!(f, "{}(", opcodes::test_name(self.opcode))?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl Display for LogicClause {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            LogicClause::Test(test) => write!(f, "{}", test),
            LogicClause::Or(tests) => {
                write!(f, "(")?;
                for (i, test) in tests.iter().enumerate() {
                    if i > 0 {
                        write!(f, " || ")?;
                    }
                    write!(f, "{}", test)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for LogicInstruction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            LogicInstruction::Command {
                address,
                opcode,
                args,
            } => {
                write!(f, "{:04x}: {}(", address, opcodes::action_name(*opcode))?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            LogicInstruction::Condition {
                address,
                clauses,
                skip_address,
            } => {
                write!(f, "{:04x}: if (", address)?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " && ")?;
                    }
                    write!(f, "{}", clause)?;
                }
                match skip_address {
                    Some(skip) => write!(f, ") else {:04x}", skip),
                    None => write!(f, ") else ????"),
                }
            }
            LogicInstruction::Goto {
                address,
                jump_address,
            } => write!(f, "{:04x}: goto {:04x}", address, jump_address),
        }
    }
}

/// A named jump target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub address: Address,
    pub name: String,
    /// Addresses of the instructions that jump here
    pub references: Vec<Address>,
}

/// Linear output of the recompiler, ready for the assembler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicCompilerResult {
    pub instructions: Vec<LogicInstruction>,
    pub labels: IndexMap<Address, Label>,
}

impl LogicCompilerResult {
    pub fn label_at(&self, address: Address) -> Option<&Label> {
        self.labels.get(&address)
    }

    /// Listing with label lines interleaved, one instruction per line
    pub fn listing(&self) -> String {
        let mut output = String::new();
        for instruction in &self.instructions {
            if let Some(label) = self.labels.get(&instruction.address()) {
                output.push_str(&format!("{}:\n", label.name));
            }
            output.push_str(&format!("    {}\n", instruction));
        }
        output
    }
}

/// Hands out symbolic instruction addresses. A fresh address is always one
/// past the highest address seen so far.
#[derive(Debug, Clone, Default)]
pub struct AddressAllocator {
    used: IndexSet<Address>,
    next: Address,
}

impl AddressAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator seeded with the addresses of existing instructions
    pub fn from_instructions(instructions: &[LogicInstruction]) -> Result<Self, LogicError> {
        let mut allocator = AddressAllocator::new();
        for instruction in instructions {
            allocator.claim(instruction.address())?;
        }
        Ok(allocator)
    }

    /// Record an address as taken
    pub fn claim(&mut self, address: Address) -> Result<(), LogicError> {
        if !self.used.insert(address) {
            return Err(LogicError::ConflictingAddress(address));
        }
        self.next = self.next.max(address.saturating_add(1));
        Ok(())
    }

    pub fn fresh(&mut self) -> Result<Address, LogicError> {
        let address = self.next;
        self.claim(address)?;
        Ok(address)
    }

    pub fn is_used(&self, address: Address) -> bool {
        self.used.contains(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_condition() {
        let condition = LogicInstruction::Condition {
            address: 3,
            clauses: vec![
                LogicClause::Test(LogicTest::new(0x01, vec![1, 5])),
                LogicClause::Or(vec![
                    LogicTest::new(0x07, vec![3]),
                    LogicTest::negated(0x09, vec![2]),
                ]),
            ],
            skip_address: Some(0x10),
        };
        assert_eq!(
            condition.to_string(),
            "0003: if (equaln(1, 5) && (isset(3) || !has(2))) else 0010"
        );
    }

    #[test]
    fn test_jump_target_accessors() {
        let mut goto = LogicInstruction::Goto {
            address: 1,
            jump_address: 7,
        };
        assert_eq!(goto.jump_target(), Some(7));
        goto.set_jump_target(9);
        assert_eq!(goto.jump_target(), Some(9));

        let command = LogicInstruction::Command {
            address: 2,
            opcode: 0x65,
            args: vec![4],
        };
        assert_eq!(command.jump_target(), None);
        assert_eq!(command.to_string(), "0002: print(4)");
        assert_eq!(command.to_command(), Some(LogicCommand::new(0x65, vec![4])));
    }

    #[test]
    fn test_address_allocator() {
        let mut allocator = AddressAllocator::new();
        assert_eq!(allocator.fresh(), Ok(0));
        allocator.claim(7).unwrap();
        assert_eq!(allocator.fresh(), Ok(8));
        assert!(allocator.is_used(7));
        assert!(!allocator.is_used(3));
        assert_eq!(allocator.claim(7), Err(LogicError::ConflictingAddress(7)));
    }

    #[test]
    fn test_allocator_rejects_duplicate_instructions() {
        let instructions = vec![
            LogicInstruction::Goto {
                address: 4,
                jump_address: 4,
            },
            LogicInstruction::Command {
                address: 4,
                opcode: 0x00,
                args: vec![],
            },
        ];
        assert_eq!(
            AddressAllocator::from_instructions(&instructions).unwrap_err(),
            LogicError::ConflictingAddress(4)
        );
    }
}
