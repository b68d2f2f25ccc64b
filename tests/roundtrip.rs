// Round Trip Tests for the Logic compiler
// Decompiles, recompiles and reassembles hand-written Logic programs and checks
// that the reassembled code behaves like the input

use agilogic::logic_compiler::assemble::assemble;
use agilogic::logic_compiler::config::RecompilerOptions;
use agilogic::logic_compiler::decode::decode;
use agilogic::logic_compiler::graph::Graph;
use agilogic::logic_compiler::instruction::{
    Address, LogicClause, LogicCommand, LogicInstruction, LogicTest,
};
use agilogic::logic_compiler::opcodes::{RETURN, SAID};
use agilogic::logic_compiler::{CompilerOptions, LogicCompiler};
use test_log::test;

const SET: u8 = 0x0C;
const RESET: u8 = 0x0D;
const TOGGLE: u8 = 0x0E;
const INCREMENT: u8 = 0x01;
const ISSET: u8 = 0x07;

/// Upper bounds on one abstract run
const MAX_COMMANDS: usize = 64;
const MAX_STEPS: usize = 10_000;

fn command(address: Address, opcode: u8, arg: u8) -> LogicInstruction {
    LogicInstruction::Command {
        address,
        opcode,
        args: vec![arg],
    }
}

fn ret(address: Address) -> LogicInstruction {
    LogicInstruction::Command {
        address,
        opcode: RETURN,
        args: vec![],
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

fn isset(flag: u16) -> Vec<LogicClause> {
    vec![LogicClause::Test(LogicTest::new(ISSET, vec![flag]))]
}

/// Commands executed by a run of decoded code. Each condition takes its
/// outcome from the next bit of `decisions`; the run stops when it returns,
/// falls off the end or runs out of decisions.
fn trace(instructions: &[LogicInstruction], decisions: u32, budget: u32) -> Vec<LogicCommand> {
    let position_of = |address: Address| {
        instructions
            .iter()
            .position(|instruction| instruction.address() == address)
            .unwrap()
    };

    let mut executed = Vec::new();
    let mut position = 0;
    let mut evaluated = 0;
    for _ in 0..MAX_STEPS {
        let Some(instruction) = instructions.get(position) else {
            break;
        };
        match instruction {
            LogicInstruction::Command { opcode, .. } if *opcode == RETURN => break,
            LogicInstruction::Command { .. } => {
                executed.push(instruction.to_command().unwrap());
                if executed.len() == MAX_COMMANDS {
                    break;
                }
                position += 1;
            }
            LogicInstruction::Goto { jump_address, .. } => position = position_of(*jump_address),
            LogicInstruction::Condition { skip_address, .. } => {
                if evaluated == budget {
                    break;
                }
                let holds = decisions & (1 << evaluated) != 0;
                evaluated += 1;
                position = if holds {
                    position + 1
                } else {
                    position_of(skip_address.unwrap())
                };
            }
        }
    }
    executed
}

/// Assemble a program, send it round the compiler and compare runs of the two
/// versions under every combination of condition outcomes
fn assert_round_trip(program: &[LogicInstruction], options: CompilerOptions) -> Vec<u8> {
    let original = assemble(program).unwrap();
    let compiler = LogicCompiler::new(options);
    let trip = compiler.roundtrip(&original).unwrap();

    let before = decode(&original).unwrap();
    let after = decode(&trip.code).unwrap();
    let budget = 8;
    for decisions in 0..(1u32 << budget) {
        assert_eq!(
            trace(&before, decisions, budget),
            trace(&after, decisions, budget),
            "runs differ for decisions {:08b}\n{}",
            decisions,
            trip.result.listing()
        );
    }
    trip.code
}

/// No condition skips backward or past the end of the region around it
fn assert_self_contained(instructions: &[LogicInstruction]) {
    let position_of = |address: Address| {
        instructions
            .iter()
            .position(|instruction| instruction.address() == address)
            .unwrap()
    };
    let mut regions: Vec<usize> = Vec::new();
    for (position, instruction) in instructions.iter().enumerate() {
        while regions.last().is_some_and(|end| *end <= position) {
            regions.pop();
        }
        if let LogicInstruction::Condition {
            skip_address: Some(skip),
            ..
        } = instruction
        {
            let skip = position_of(*skip);
            let limit = regions.last().copied().unwrap_or(instructions.len());
            assert!(skip > position && skip <= limit, "{} escapes", instruction);
            regions.push(skip);
        }
    }
}

/// if (isset(1)) { set(2) } else { reset(2) } set(3) return
fn if_else() -> Vec<LogicInstruction> {
    vec![
        condition(0, isset(1), 3),
        command(1, SET, 2),
        goto(2, 4),
        command(3, RESET, 2),
        command(4, SET, 3),
        ret(5),
    ]
}

/// increment(1)
/// while (isset(1)) { if (isset(2)) { set(3) return } toggle(4) }
/// reset(5) return
fn loop_with_early_return() -> Vec<LogicInstruction> {
    vec![
        command(0, INCREMENT, 1),
        condition(1, isset(1), 7),
        condition(2, isset(2), 5),
        command(3, SET, 3),
        ret(4),
        command(5, TOGGLE, 4),
        goto(6, 1),
        command(7, RESET, 5),
        ret(8),
    ]
}

/// if (isset(1) || !isset(2)) { if (said(1, 2)) { set(1) } increment(2) }
/// reset(9) return
fn nested_with_or_and_said() -> Vec<LogicInstruction> {
    vec![
        condition(
            0,
            vec![LogicClause::Or(vec![
                LogicTest::new(ISSET, vec![1]),
                LogicTest::negated(ISSET, vec![2]),
            ])],
            4,
        ),
        condition(
            1,
            vec![LogicClause::Test(LogicTest::new(SAID, vec![1, 2]))],
            3,
        ),
        command(2, SET, 1),
        command(3, INCREMENT, 2),
        command(4, RESET, 9),
        ret(5),
    ]
}

/// if (isset(1)) { set(1) } reset(1), without a final return
fn falls_off_the_end() -> Vec<LogicInstruction> {
    vec![condition(0, isset(1), 2), command(1, SET, 1), command(2, RESET, 1)]
}

/// if (isset(1)) { set(1) return } if (isset(2)) { set(2) return } return
fn every_branch_returns() -> Vec<LogicInstruction> {
    vec![
        condition(0, isset(1), 3),
        command(1, SET, 1),
        ret(2),
        condition(3, isset(2), 6),
        command(4, SET, 2),
        ret(5),
        ret(6),
    ]
}

#[test]
fn test_if_else_round_trip() {
    let code = assert_round_trip(&if_else(), CompilerOptions::default());
    // Nothing to normalize, so the code comes back byte for byte
    assert_eq!(code, assemble(&if_else()).unwrap());
}

#[test]
fn test_loop_with_early_return_round_trip() {
    let code = assert_round_trip(&loop_with_early_return(), CompilerOptions::default());
    assert_self_contained(&decode(&code).unwrap());
}

#[test]
fn test_or_and_said_round_trip() {
    let code = assert_round_trip(&nested_with_or_and_said(), CompilerOptions::default());
    assert_eq!(code, assemble(&nested_with_or_and_said()).unwrap());
}

#[test]
fn test_program_without_return_round_trip() {
    assert_round_trip(&falls_off_the_end(), CompilerOptions::default());
}

#[test]
fn test_every_branch_returns_round_trip() {
    assert_round_trip(&every_branch_returns(), CompilerOptions::default());
}

#[test]
fn test_round_trip_without_normalizing_conditionals() {
    let options = CompilerOptions {
        recompiler: RecompilerOptions {
            self_contained_conditionals: false,
        },
        ..CompilerOptions::default()
    };
    for program in [
        if_else(),
        loop_with_early_return(),
        nested_with_or_and_said(),
        falls_off_the_end(),
        every_branch_returns(),
    ] {
        assert_round_trip(&program, options.clone());
    }
}

#[test]
fn test_decompiled_graph_shape() {
    let compiler = LogicCompiler::default();
    let code = assemble(&loop_with_early_return()).unwrap();
    let graph = compiler.decompile(&code).unwrap();

    // increment / loop header / inner if / set+return / toggle / reset+return
    assert_eq!(graph.len(), 6);
    let dominators = graph.dominator_tree();
    let root = graph.root();
    for (block, _) in graph.blocks() {
        assert!(dominators.dominates(root, block).unwrap());
    }
    let dot = graph.to_graphviz("loop");
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("isset(1)"));
}

#[test]
fn test_config_changes_said_encoding() {
    // if (said) { set(1) } return, with said as a test without arguments
    let code = [0xFF, 0x0E, 0xFF, 0x02, 0x00, 0x0C, 0x01, 0x00];

    let options = CompilerOptions::from_toml_str("[opcodes]\nvariable_arity_tests = []\n")
        .unwrap();
    let compiler = LogicCompiler::new(options);
    assert_eq!(compiler.decode(&code).unwrap().len(), 3);
    let trip = compiler.roundtrip(&code).unwrap();
    assert_eq!(trip.code, code.to_vec());

    // The stock table reads 0xFF as an argument count and runs out of code
    assert!(LogicCompiler::default().roundtrip(&code).is_err());
}

#[test]
fn test_truncated_code_is_rejected() {
    let compiler = LogicCompiler::default();
    let code = assemble(&if_else()).unwrap();
    assert!(compiler.roundtrip(&code[..code.len() - 3]).is_err());
}
