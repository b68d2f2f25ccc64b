//! AGI Logic Opcode Tables
//!
//! Action commands and test commands live in two separate opcode spaces. An
//! action command is a single opcode byte followed by a fixed number of byte
//! arguments. Test commands only appear inside conditions, and most of them
//! also take a fixed number of byte arguments. The exception is `said`, which
//! is followed by an argument count and that many 16-bit word numbers.
//!
//! Bytes 0xFC-0xFF are never action opcodes; they are the structural markers
//! of the bytecode:
//! - 0xFF opens and closes a condition
//! - 0xFE is an unconditional jump
//! - 0xFD negates the following test
//! - 0xFC opens and closes an OR group

use indexmap::IndexSet;

/// Opens and closes the clause list of a condition
pub const CONDITION_MARKER: u8 = 0xFF;
/// Unconditional relative jump
pub const GOTO_MARKER: u8 = 0xFE;
/// Negates the next test
pub const NOT_MARKER: u8 = 0xFD;
/// Opens and closes an OR group
pub const OR_MARKER: u8 = 0xFC;

/// `return` ends execution of the current logic
pub const RETURN: u8 = 0x00;

/// `said` is the only variable-arity test in the stock interpreter
pub const SAID: u8 = 0x0E;

/// (name, argument count) for every action command, indexed by opcode
const ACTION_COMMANDS: [(&str, u8); 182] = [
    ("return", 0),
    ("increment", 1),
    ("decrement", 1),
    ("assignn", 2),
    ("assignv", 2),
    ("addn", 2),
    ("addv", 2),
    ("subn", 2),
    ("subv", 2),
    ("lindirectv", 2),
    ("rindirect", 2),
    ("lindirectn", 2),
    ("set", 1),
    ("reset", 1),
    ("toggle", 1),
    ("set.v", 1),
    ("reset.v", 1),
    ("toggle.v", 1),
    ("new.room", 1),
    ("new.room.v", 1),
    ("load.logics", 1),
    ("load.logics.v", 1),
    ("call", 1),
    ("call.v", 1),
    ("load.pic", 1),
    ("draw.pic", 1),
    ("show.pic", 0),
    ("discard.pic", 1),
    ("overlay.pic", 1),
    ("show.pri.screen", 0),
    ("load.view", 1),
    ("load.view.v", 1),
    ("discard.view", 1),
    ("animate.obj", 1),
    ("unanimate.all", 0),
    ("draw", 1),
    ("erase", 1),
    ("position", 3),
    ("position.v", 3),
    ("get.posn", 3),
    ("reposition", 3),
    ("set.view", 2),
    ("set.view.v", 2),
    ("set.loop", 2),
    ("set.loop.v", 2),
    ("fix.loop", 1),
    ("release.loop", 1),
    ("set.cel", 2),
    ("set.cel.v", 2),
    ("last.cel", 2),
    ("current.cel", 2),
    ("current.loop", 2),
    ("current.view", 2),
    ("number.of.loops", 2),
    ("set.priority", 2),
    ("set.priority.v", 2),
    ("release.priority", 1),
    ("get.priority", 2),
    ("stop.update", 1),
    ("start.update", 1),
    ("force.update", 1),
    ("ignore.horizon", 1),
    ("observe.horizon", 1),
    ("set.horizon", 1),
    ("object.on.water", 1),
    ("object.on.land", 1),
    ("object.on.anything", 1),
    ("ignore.objs", 1),
    ("observe.objs", 1),
    ("distance", 3),
    ("stop.cycling", 1),
    ("start.cycling", 1),
    ("normal.cycle", 1),
    ("end.of.loop", 2),
    ("reverse.cycle", 1),
    ("reverse.loop", 2),
    ("cycle.time", 2),
    ("stop.motion", 1),
    ("start.motion", 1),
    ("step.size", 2),
    ("step.time", 2),
    ("move.obj", 5),
    ("move.obj.v", 5),
    ("follow.ego", 3),
    ("wander", 1),
    ("normal.motion", 1),
    ("set.dir", 2),
    ("get.dir", 2),
    ("ignore.blocks", 1),
    ("observe.blocks", 1),
    ("block", 4),
    ("unblock", 0),
    ("get", 1),
    ("get.v", 1),
    ("drop", 1),
    ("put", 2),
    ("put.v", 2),
    ("get.room.v", 2),
    ("load.sound", 1),
    ("sound", 2),
    ("stop.sound", 0),
    ("print", 1),
    ("print.v", 1),
    ("display", 3),
    ("display.v", 3),
    ("clear.lines", 3),
    ("text.screen", 0),
    ("graphics", 0),
    ("set.cursor.char", 1),
    ("set.text.attribute", 2),
    ("shake.screen", 1),
    ("configure.screen", 3),
    ("status.line.on", 0),
    ("status.line.off", 0),
    ("set.string", 2),
    ("get.string", 5),
    ("word.to.string", 2),
    ("parse", 1),
    ("get.num", 2),
    ("prevent.input", 0),
    ("accept.input", 0),
    ("set.key", 3),
    ("add.to.pic", 7),
    ("add.to.pic.v", 7),
    ("status", 0),
    ("save.game", 0),
    ("restore.game", 0),
    ("init.disk", 0),
    ("restart.game", 0),
    ("show.obj", 1),
    ("random", 3),
    ("program.control", 0),
    ("player.control", 0),
    ("obj.status.v", 1),
    ("quit", 1),
    ("show.mem", 0),
    ("pause", 0),
    ("echo.line", 0),
    ("cancel.line", 0),
    ("init.joy", 0),
    ("toggle.monitor", 0),
    ("version", 0),
    ("script.size", 1),
    ("set.game.id", 1),
    ("log", 1),
    ("set.scan.start", 0),
    ("reset.scan.start", 0),
    ("reposition.to", 3),
    ("reposition.to.v", 3),
    ("trace.on", 0),
    ("trace.info", 3),
    ("print.at", 4),
    ("print.at.v", 4),
    ("discard.view.v", 1),
    ("clear.text.rect", 5),
    ("set.upper.left", 2),
    ("set.menu", 1),
    ("set.menu.item", 2),
    ("submit.menu", 0),
    ("enable.item", 1),
    ("disable.item", 1),
    ("menu.input", 0),
    ("show.obj.v", 1),
    ("open.dialogue", 0),
    ("close.dialogue", 0),
    ("mul.n", 2),
    ("mul.v", 2),
    ("div.n", 2),
    ("div.v", 2),
    ("close.window", 0),
    ("set.simple", 1),
    ("push.script", 0),
    ("pop.script", 0),
    ("hold.key", 0),
    ("set.pri.base", 1),
    ("discard.sound", 1),
    ("hide.mouse", 0),
    ("show.mouse", 0),
    ("fence.mouse", 4),
    ("mouse.posn", 2),
    ("release.key", 0),
    ("adj.ego.move.to.x.y", 0),
];

/// (name, argument count) for every test command, indexed by opcode.
/// The count of `said` is ignored; its arity is read from the bytecode.
const TEST_COMMANDS: [(&str, u8); 20] = [
    ("return.false", 0),
    ("equaln", 2),
    ("equalv", 2),
    ("lessn", 2),
    ("lessv", 2),
    ("greatern", 2),
    ("greaterv", 2),
    ("isset", 1),
    ("issetv", 1),
    ("has", 1),
    ("obj.in.room", 2),
    ("posn", 5),
    ("controller", 1),
    ("have.key", 0),
    ("said", 0),
    ("compare.strings", 2),
    ("obj.in.box", 5),
    ("center.posn", 5),
    ("right.posn", 5),
    ("in.motion.using.mouse", 0),
];

/// Get the name of an action command
pub fn action_name(opcode: u8) -> &'static str {
    ACTION_COMMANDS
        .get(opcode as usize)
        .map(|(name, _)| *name)
        .unwrap_or("unknown")
}

/// Get the argument count of an action command, `None` for unknown opcodes
pub fn action_arity(opcode: u8) -> Option<usize> {
    ACTION_COMMANDS
        .get(opcode as usize)
        .map(|(_, arity)| *arity as usize)
}

/// Get the name of a test command
pub fn test_name(opcode: u8) -> &'static str {
    TEST_COMMANDS
        .get(opcode as usize)
        .map(|(name, _)| *name)
        .unwrap_or("unknown_test")
}

/// How the arguments of a test command are laid out in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestArity {
    /// A fixed number of byte arguments
    Fixed(usize),
    /// An argument count byte followed by that many little-endian words
    Variable,
}

/// Opcode knowledge shared by the decoder and the assembler.
///
/// Only the set of variable-arity tests is configurable; everything else is the
/// fixed command set of the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct OpcodeTable {
    variable_arity_tests: IndexSet<u8>,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new([SAID])
    }
}

impl OpcodeTable {
    pub fn new(variable_arity_tests: impl IntoIterator<Item = u8>) -> Self {
        OpcodeTable {
            variable_arity_tests: variable_arity_tests.into_iter().collect(),
        }
    }

    pub fn is_variable_arity_test(&self, opcode: u8) -> bool {
        self.variable_arity_tests.contains(&opcode)
    }

    /// Argument layout of a test command, `None` for unknown opcodes
    pub fn test_arity(&self, opcode: u8) -> Option<TestArity> {
        if self.is_variable_arity_test(opcode) {
            return Some(TestArity::Variable);
        }
        TEST_COMMANDS
            .get(opcode as usize)
            .map(|(_, arity)| TestArity::Fixed(*arity as usize))
    }

    pub fn action_arity(&self, opcode: u8) -> Option<usize> {
        action_arity(opcode)
    }
}
