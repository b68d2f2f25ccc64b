// Logic Compiler Error Handling

use std::fmt;

use crate::logic_compiler::instruction::Address;

#[derive(Debug, Clone, PartialEq)]
pub enum LogicError {
    // Graph and tree lookups
    UnknownNode(String),

    // Recompiler structure errors
    ConflictingAddress(Address),
    UnresolvedExit(String),
    DanglingJumpTarget { from: Address, target: Address },
    MissingPostDominator(String),
    UnresolvedSkip(Address),

    // Decoder errors
    UnexpectedEndOfCode(usize),            // byte offset
    InvalidCondition(String, usize),       // message, byte offset
    UnknownOpcode { opcode: u8, offset: usize },
    JumpOutsideCode { from: usize, target: i64 },

    // Assembler errors
    ArgumentOutOfRange { opcode: u8, value: u16 },
    JumpOutOfRange { from: Address, offset: i64 },

    // Configuration and IO
    InvalidConfig(String),
    IoError(String),
}

impl fmt::Display for LogicError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogicError::UnknownNode(node) => write!(f, "Node not in graph: {}", node),
            LogicError::ConflictingAddress(address) => {
                write!(f, "Conflicting instruction at address {}", address)
            }
            LogicError::UnresolvedExit(block) => {
                write!(
                    f,
                    "Block {} has no instructions and no exit to follow",
                    block
                )
            }
            LogicError::DanglingJumpTarget { from, target } => {
                write!(
                    f,
                    "Instruction {} jumps to unknown address {}",
                    from, target
                )
            }
            LogicError::MissingPostDominator(block) => {
                write!(
                    f,
                    "No merge point found for conditional block {}",
                    block
                )
            }
            LogicError::UnresolvedSkip(address) => {
                write!(f, "Condition at address {} has no skip target", address)
            }
            LogicError::UnexpectedEndOfCode(offset) => {
                write!(f, "Unexpected end of code at byte 0x{:04x}", offset)
            }
            LogicError::InvalidCondition(msg, offset) => {
                write!(f, "Invalid condition at byte 0x{:04x}: {}", offset, msg)
            }
            LogicError::UnknownOpcode { opcode, offset } => {
                write!(
                    f,
                    "Unknown opcode 0x{:02x} at byte 0x{:04x}",
                    opcode, offset
                )
            }
            LogicError::JumpOutsideCode { from, target } => {
                write!(
                    f,
                    "Jump at byte 0x{:04x} leaves the code (target {})",
                    from, target
                )
            }
            LogicError::ArgumentOutOfRange { opcode, value } => {
                write!(
                    f,
                    "Argument {} of opcode 0x{:02x} does not fit in a byte",
                    value, opcode
                )
            }
            LogicError::JumpOutOfRange { from, offset } => {
                write!(
                    f,
                    "Jump offset {} from instruction {} does not fit in 16 bits",
                    offset, from
                )
            }
            LogicError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            LogicError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for LogicError {}

impl From<std::io::Error> for LogicError {
    fn from(e: std::io::Error) -> Self {
        LogicError::IoError(e.to_string())
    }
}
