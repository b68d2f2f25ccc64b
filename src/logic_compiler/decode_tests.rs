// Decoder Tests

use super::*;
use test_log::test;

#[test]
fn test_decode_commands() {
    let instructions = decode(&[0x0C, 0x05, 0x00]).unwrap();
    assert_eq!(
        instructions,
        vec![
            LogicInstruction::Command {
                address: 0,
                opcode: 0x0C,
                args: vec![5],
            },
            LogicInstruction::Command {
                address: 2,
                opcode: 0x00,
                args: vec![],
            },
        ]
    );
}

#[test]
fn test_decode_condition_skip_is_relative_to_end() {
    // if (isset(3)) { set(5) } return
    let code = [0xFF, 0x07, 0x03, 0xFF, 0x02, 0x00, 0x0C, 0x05, 0x00];
    let instructions = decode(&code).unwrap();

    assert_eq!(instructions.len(), 3);
    assert_eq!(
        instructions[0],
        LogicInstruction::Condition {
            address: 0,
            clauses: vec![LogicClause::Test(LogicTest::new(0x07, vec![3]))],
            skip_address: Some(8),
        }
    );
    assert_eq!(instructions[1].address(), 6);
    assert_eq!(instructions[2].address(), 8);
}

#[test]
fn test_decode_backward_goto() {
    let code = [0x0C, 0x01, 0xFE, 0xFB, 0xFF];
    let instructions = decode(&code).unwrap();
    assert_eq!(
        instructions[1],
        LogicInstruction::Goto {
            address: 2,
            jump_address: 0,
        }
    );
}

#[test]
fn test_decode_or_and_not() {
    let code = [
        0xFF, 0xFC, 0x01, 0x01, 0x05, 0xFD, 0x02, 0x01, 0x0A, 0xFC, 0xFD, 0x07, 0x03, 0xFF,
        0x00, 0x00, 0x00,
    ];
    let instructions = decode(&code).unwrap();
    assert_eq!(
        instructions[0],
        LogicInstruction::Condition {
            address: 0,
            clauses: vec![
                LogicClause::Or(vec![
                    LogicTest::new(0x01, vec![1, 5]),
                    LogicTest::negated(0x02, vec![1, 10]),
                ]),
                LogicClause::Test(LogicTest::negated(0x07, vec![3])),
            ],
            skip_address: Some(16),
        }
    );
    assert_eq!(instructions[1].address(), 16);
}

#[test]
fn test_decode_said_words() {
    let code = [
        0xFF, 0x0E, 0x02, 0x01, 0x00, 0x2C, 0x01, 0xFF, 0x00, 0x00, 0x00,
    ];
    let instructions = decode(&code).unwrap();
    assert_eq!(
        instructions[0],
        LogicInstruction::Condition {
            address: 0,
            clauses: vec![LogicClause::Test(LogicTest::new(0x0E, vec![1, 300]))],
            skip_address: Some(10),
        }
    );
}

#[test]
fn test_decode_configured_variable_arity() {
    // With 0x07 treated as variable arity, its argument is a count of words
    let table = OpcodeTable::new([0x0E, 0x07]);
    let code = [0xFF, 0x07, 0x01, 0x34, 0x12, 0xFF, 0x00, 0x00, 0x00];
    let instructions = LogicDecoder::new(&code, &table).decode().unwrap();
    assert_eq!(
        instructions[0],
        LogicInstruction::Condition {
            address: 0,
            clauses: vec![LogicClause::Test(LogicTest::new(0x07, vec![0x1234]))],
            skip_address: Some(8),
        }
    );
}

#[test]
fn test_truncated_input() {
    assert_eq!(decode(&[0x03, 0x01]), Err(LogicError::UnexpectedEndOfCode(2)));
    assert_eq!(decode(&[0xFF, 0x07]), Err(LogicError::UnexpectedEndOfCode(2)));
    assert_eq!(
        decode(&[0xFF, 0x07, 0x01, 0xFF, 0x00]),
        Err(LogicError::UnexpectedEndOfCode(5))
    );
}

#[test]
fn test_unknown_opcodes() {
    assert_eq!(
        decode(&[0xF0]),
        Err(LogicError::UnknownOpcode {
            opcode: 0xF0,
            offset: 0
        })
    );
    assert_eq!(
        decode(&[0xFF, 0x20, 0xFF, 0x00, 0x00]),
        Err(LogicError::UnknownOpcode {
            opcode: 0x20,
            offset: 1
        })
    );
}

#[test]
fn test_malformed_conditions() {
    assert_eq!(
        decode(&[0xFF, 0xFD, 0xFC, 0x07, 0x01, 0xFC, 0xFF, 0x00, 0x00]),
        Err(LogicError::InvalidCondition(
            "negated OR group".to_string(),
            2
        ))
    );
    assert_eq!(
        decode(&[0xFF, 0xFC, 0x07, 0x03, 0xFF, 0x00, 0x00]),
        Err(LogicError::InvalidCondition(
            "unterminated OR group".to_string(),
            4
        ))
    );
    assert_eq!(
        decode(&[0xFF, 0xFC, 0xFC, 0xFF, 0x00, 0x00]),
        Err(LogicError::InvalidCondition("empty OR group".to_string(), 1))
    );
    assert_eq!(
        decode(&[0xFF, 0x07, 0x03, 0xFD, 0xFF, 0x00, 0x00]),
        Err(LogicError::InvalidCondition(
            "negation without a test".to_string(),
            4
        ))
    );
}

#[test]
fn test_jump_outside_code() {
    assert_eq!(
        decode(&[0xFE, 0x10, 0x00]),
        Err(LogicError::JumpOutsideCode { from: 0, target: 19 })
    );
    assert_eq!(
        decode(&[0xFE, 0xF0, 0xFF]),
        Err(LogicError::JumpOutsideCode { from: 0, target: -13 })
    );
}

#[test]
fn test_collect_labels() {
    // 0: if (isset(3)) else 8; 6: goto 8; ... the skip and the goto share a label
    let code = [
        0xFF, 0x07, 0x03, 0xFF, 0x05, 0x00, 0x0C, 0x05, 0xFE, 0x00, 0x00, 0x00,
    ];
    let instructions = decode(&code).unwrap();
    let labels = collect_labels(&instructions);

    assert_eq!(labels.len(), 1);
    let label = &labels[&11];
    assert_eq!(label.name, "Label1");
    assert_eq!(label.references, vec![0, 8]);
}

#[test]
fn test_disassemble_listing() {
    let code = [0xFF, 0x07, 0x03, 0xFF, 0x02, 0x00, 0x0C, 0x05, 0x00];
    let listing = disassemble(&code, &OpcodeTable::default()).unwrap();
    assert_eq!(
        listing,
        "    0000: if (isset(3)) else 0008\n    0006: set(5)\nLabel1:\n    0008: return()\n"
    );
}
