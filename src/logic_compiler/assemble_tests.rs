// Assembler Tests

use super::*;
use crate::logic_compiler::decode::decode;
use crate::logic_compiler::opcodes::{RETURN, SAID};
use test_log::test;

fn command(address: Address, opcode: u8, args: Vec<u8>) -> LogicInstruction {
    LogicInstruction::Command {
        address,
        opcode,
        args,
    }
}

fn goto(address: Address, target: Address) -> LogicInstruction {
    LogicInstruction::Goto {
        address,
        jump_address: target,
    }
}

fn condition(address: Address, clauses: Vec<LogicClause>, skip: Address) -> LogicInstruction {
    LogicInstruction::Condition {
        address,
        clauses,
        skip_address: Some(skip),
    }
}

#[test]
fn test_backward_goto_offset() {
    let mut instructions = vec![
        command(0, 0x1A, vec![]),
        command(1, 0x0C, vec![1]),
        command(2, 0x65, vec![1]),
        command(3, 0x01, vec![1]),
    ];
    for address in 4..10 {
        instructions.push(command(address, 0x0C, vec![address as u8]));
    }
    instructions.push(command(10, 0x1A, vec![]));
    instructions.push(goto(11, 3));

    let table = OpcodeTable::default();
    let layout = LogicAssembler::new(&instructions, &table).layout().unwrap();
    assert_eq!(layout[&3], Placement { offset: 5, length: 2 });
    assert_eq!(layout[&10], Placement { offset: 19, length: 1 });
    assert_eq!(layout[&11], Placement { offset: 20, length: 3 });

    // Target at byte 5, goto ends at byte 23
    let code = assemble(&instructions).unwrap();
    assert_eq!(code.len(), 23);
    assert_eq!(code[20], GOTO_MARKER);
    assert_eq!(&code[21..23], &[0xEE, 0xFF]);
}

#[test]
fn test_or_group_with_negation() {
    let instructions = vec![
        condition(
            0,
            vec![LogicClause::Or(vec![
                LogicTest::new(0x01, vec![5]),
                LogicTest::negated(0x02, vec![10]),
            ])],
            1,
        ),
        command(1, RETURN, vec![]),
    ];

    let code = assemble(&instructions).unwrap();
    assert_eq!(
        code,
        vec![0xFF, 0xFC, 0x01, 0x05, 0xFD, 0x02, 0x0A, 0xFC, 0xFF, 0x00, 0x00, 0x00]
    );
}

#[test]
fn test_said_writes_count_and_words() {
    let instructions = vec![
        condition(
            0,
            vec![LogicClause::Test(LogicTest::new(SAID, vec![1, 0x1234]))],
            2,
        ),
        command(1, 0x65, vec![3]),
        command(2, RETURN, vec![]),
    ];

    let code = assemble(&instructions).unwrap();
    assert_eq!(
        code,
        vec![0xFF, 0x0E, 0x02, 0x01, 0x00, 0x34, 0x12, 0xFF, 0x02, 0x00, 0x65, 0x03, 0x00]
    );
}

#[test]
fn test_assembled_code_decodes_to_same_shape() {
    // if (isset(3)) { set(5) } else { reset(5) } return
    let instructions = vec![
        condition(0, vec![LogicClause::Test(LogicTest::new(0x07, vec![3]))], 3),
        command(1, 0x0C, vec![5]),
        goto(2, 4),
        command(3, 0x0D, vec![5]),
        command(4, RETURN, vec![]),
    ];
    let code = assemble(&instructions).unwrap();
    let decoded = decode(&code).unwrap();

    assert_eq!(decoded.len(), instructions.len());
    // Byte offsets: condition 0..6, set 6..8, goto 8..11, reset 11..13, return 13
    assert_eq!(decoded[0].jump_target(), Some(11));
    assert_eq!(decoded[2].jump_target(), Some(13));
    assert_eq!(decoded[1].to_command(), instructions[1].to_command());
    assert_eq!(decoded[3].to_command(), instructions[3].to_command());
}

#[test]
fn test_dangling_target() {
    let instructions = vec![goto(0, 7), command(1, RETURN, vec![])];
    assert_eq!(
        assemble(&instructions).unwrap_err(),
        LogicError::DanglingJumpTarget { from: 0, target: 7 }
    );
}

#[test]
fn test_unresolved_skip() {
    let instructions = vec![
        LogicInstruction::Condition {
            address: 4,
            clauses: vec![LogicClause::Test(LogicTest::new(0x07, vec![1]))],
            skip_address: None,
        },
        command(5, RETURN, vec![]),
    ];
    assert_eq!(
        assemble(&instructions).unwrap_err(),
        LogicError::UnresolvedSkip(4)
    );
}

#[test]
fn test_fixed_arity_argument_out_of_range() {
    let instructions = vec![
        condition(0, vec![LogicClause::Test(LogicTest::new(0x01, vec![1, 300]))], 1),
        command(1, RETURN, vec![]),
    ];
    assert_eq!(
        assemble(&instructions).unwrap_err(),
        LogicError::ArgumentOutOfRange {
            opcode: 0x01,
            value: 300
        }
    );
}

#[test]
fn test_jump_out_of_range() {
    let instructions = vec![
        goto(0, 2),
        command(1, 0x65, vec![0; 40_000]),
        command(2, RETURN, vec![]),
    ];
    assert_eq!(
        assemble(&instructions).unwrap_err(),
        LogicError::JumpOutOfRange {
            from: 0,
            offset: 40_001
        }
    );
}

#[test]
fn test_duplicate_address() {
    let instructions = vec![command(1, 0x65, vec![1]), command(1, RETURN, vec![])];
    assert_eq!(
        assemble(&instructions).unwrap_err(),
        LogicError::ConflictingAddress(1)
    );
}

#[test]
fn test_custom_variable_arity_table() {
    // With no variable-arity tests, said arguments are plain bytes
    let table = OpcodeTable::new(Vec::new());
    let instructions = vec![
        condition(0, vec![LogicClause::Test(LogicTest::new(SAID, vec![1, 2]))], 1),
        command(1, RETURN, vec![]),
    ];
    let code = LogicAssembler::new(&instructions, &table).assemble().unwrap();
    assert_eq!(code, vec![0xFF, 0x0E, 0x01, 0x02, 0xFF, 0x00, 0x00, 0x00]);
}
