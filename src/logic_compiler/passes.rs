/// passes.rs - Normalization passes over linear Logic code
///
/// Each pass rewrites a `LinearProgram` in place and reports whether it changed
/// anything. `run_passes` drives every pass to its own fixpoint, in order:
///
/// 1. Remove unreachable instructions
/// 2. Make conditionals self-contained (optional)
/// 3. Remove redundant gotos
///
/// Labels are rebuilt from the jump targets after every run, so a pass may
/// drop or insert instructions without keeping the label table in sync itself.
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};

use crate::logic_compiler::config::RecompilerOptions;
use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::instruction::{
    Address, AddressAllocator, Label, LogicCompilerResult, LogicInstruction,
};
use crate::logic_compiler::opcodes::RETURN;

pub type Pass = fn(&mut LinearProgram) -> Result<bool, LogicError>;

/// Linear instructions with their labels and address allocator
#[derive(Debug, Clone)]
pub struct LinearProgram {
    pub instructions: Vec<LogicInstruction>,
    pub labels: IndexMap<Address, Label>,
    allocator: AddressAllocator,
}

impl LinearProgram {
    pub fn new(
        instructions: Vec<LogicInstruction>,
        labels: IndexMap<Address, Label>,
    ) -> Result<Self, LogicError> {
        let allocator = AddressAllocator::from_instructions(&instructions)?;
        let mut program = LinearProgram {
            instructions,
            labels,
            allocator,
        };
        program.rebuild_labels()?;
        Ok(program)
    }

    pub fn fresh_address(&mut self) -> Result<Address, LogicError> {
        self.allocator.fresh()
    }

    /// Position of every instruction, by address
    pub fn positions(&self) -> IndexMap<Address, usize> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(position, instruction)| (instruction.address(), position))
            .collect()
    }

    /// Recompute labels from the current jump targets. Names of labels that are
    /// still targeted are kept; new targets get a fresh `LabelN` name.
    pub fn rebuild_labels(&mut self) -> Result<(), LogicError> {
        let positions = self.positions();
        let mut references: IndexMap<Address, Vec<Address>> = IndexMap::new();
        for instruction in &self.instructions {
            if let Some(target) = instruction.jump_target() {
                if !positions.contains_key(&target) {
                    return Err(LogicError::DanglingJumpTarget {
                        from: instruction.address(),
                        target,
                    });
                }
                references
                    .entry(target)
                    .or_default()
                    .push(instruction.address());
            }
        }
        references.sort_by(|a, _, b, _| positions.get(a).cmp(&positions.get(b)));

        let mut used_names: IndexSet<String> = references
            .keys()
            .filter_map(|target| self.labels.get(target).map(|label| label.name.clone()))
            .collect();
        let mut counter = 0;
        let mut labels = IndexMap::with_capacity(references.len());
        for (target, references) in references {
            let name = match self.labels.get(&target) {
                Some(label) => label.name.clone(),
                None => loop {
                    counter += 1;
                    let candidate = format!("Label{}", counter);
                    if used_names.insert(candidate.clone()) {
                        break candidate;
                    }
                },
            };
            labels.insert(
                target,
                Label {
                    address: target,
                    name,
                    references,
                },
            );
        }
        self.labels = labels;
        Ok(())
    }

    pub fn into_result(self) -> LogicCompilerResult {
        LogicCompilerResult {
            instructions: self.instructions,
            labels: self.labels,
        }
    }
}

/// Run a pass until it stops reporting changes. Returns the number of runs
/// that changed something.
pub fn run_to_fixpoint(
    program: &mut LinearProgram,
    name: &str,
    pass: Pass,
) -> Result<usize, LogicError> {
    let mut changes = 0;
    while pass(program)? {
        program.rebuild_labels()?;
        changes += 1;
    }
    if changes > 0 {
        debug!(
            "pass '{}' reached fixpoint after {} changes ({} instructions)",
            name,
            changes,
            program.instructions.len()
        );
    }
    Ok(changes)
}

pub fn run_passes(
    program: &mut LinearProgram,
    options: &RecompilerOptions,
) -> Result<(), LogicError> {
    run_to_fixpoint(program, "remove unreachable", remove_unreachable)?;
    if options.self_contained_conditionals {
        run_to_fixpoint(
            program,
            "self-contained conditionals",
            make_conditionals_self_contained,
        )?;
    }
    run_to_fixpoint(program, "remove redundant gotos", remove_redundant_gotos)?;
    Ok(())
}

/// Drop every instruction that directly follows a goto and is not a label
/// target. Such code can never run.
pub fn remove_unreachable(program: &mut LinearProgram) -> Result<bool, LogicError> {
    let instructions = std::mem::take(&mut program.instructions);
    let before = instructions.len();
    let mut previous_is_goto = false;

    for (position, instruction) in instructions.into_iter().enumerate() {
        let reachable = position == 0
            || !previous_is_goto
            || program.labels.contains_key(&instruction.address());
        previous_is_goto = instruction.is_goto();
        if reachable {
            program.instructions.push(instruction);
        } else {
            trace!("dropping unreachable {}", instruction);
        }
    }
    Ok(program.instructions.len() != before)
}

/// Whether control can continue to the next instruction
fn falls_through(instruction: &LogicInstruction) -> bool {
    match instruction {
        LogicInstruction::Goto { .. } => false,
        LogicInstruction::Command { opcode, .. } => *opcode != RETURN,
        LogicInstruction::Condition { .. } => true,
    }
}

/// Find the first conditional whose skip target leaves its enclosing region.
///
/// A conditional at position `i` skipping to position `s` opens the region
/// `(i, s)`. It is self-contained when `s > i` and `s` does not pass the end
/// of the innermost region around it (the end of the code at top level).
/// Returns the conditional's position and the end of its enclosing region.
fn find_crossing_conditional(
    program: &LinearProgram,
) -> Result<Option<(usize, usize)>, LogicError> {
    let positions = program.positions();
    let code_end = program.instructions.len();
    let mut regions: Vec<usize> = Vec::new();

    for (position, instruction) in program.instructions.iter().enumerate() {
        while regions.last().is_some_and(|end| *end <= position) {
            regions.pop();
        }
        let LogicInstruction::Condition {
            address,
            skip_address: Some(skip),
            ..
        } = instruction
        else {
            continue;
        };
        let skip_position = positions
            .get(skip)
            .copied()
            .ok_or(LogicError::DanglingJumpTarget {
                from: *address,
                target: *skip,
            })?;
        let limit = regions.last().copied().unwrap_or(code_end);
        if skip_position > position && skip_position <= limit {
            regions.push(skip_position);
        } else {
            return Ok(Some((position, limit)));
        }
    }
    Ok(None)
}

/// Route one crossing conditional through a new goto placed at the end of its
/// enclosing region. If the code before that point can fall through, a goto
/// over the new one is inserted first (or a `return` at the end of the code).
pub fn make_conditionals_self_contained(
    program: &mut LinearProgram,
) -> Result<bool, LogicError> {
    let Some((condition, mut insertion)) = find_crossing_conditional(program)? else {
        return Ok(false);
    };
    let condition_address = program.instructions[condition].address();
    let Some(target) = program.instructions[condition].jump_target() else {
        return Err(LogicError::UnresolvedSkip(condition_address));
    };

    if insertion > 0 && falls_through(&program.instructions[insertion - 1]) {
        let address = program.fresh_address()?;
        let bridge = match program.instructions.get(insertion) {
            Some(next) => LogicInstruction::Goto {
                address,
                jump_address: next.address(),
            },
            None => LogicInstruction::Command {
                address,
                opcode: RETURN,
                args: Vec::new(),
            },
        };
        trace!("inserting {} to keep fall-through intact", bridge);
        program.instructions.insert(insertion, bridge);
        insertion += 1;
    }

    let address = program.fresh_address()?;
    program.instructions.insert(
        insertion,
        LogicInstruction::Goto {
            address,
            jump_address: target,
        },
    );
    program.instructions[condition].set_jump_target(address);
    warn!(
        "conditional at {:04x} skipped out of its block to {:04x}; now skips to goto {:04x}",
        condition_address, target, address
    );
    Ok(true)
}

/// Follow a chain of remapped addresses to its end
fn resolve(remap: &IndexMap<Address, Address>, mut address: Address) -> Address {
    let mut steps = 0;
    while let Some(next) = remap.get(&address) {
        address = *next;
        steps += 1;
        if steps > remap.len() {
            break;
        }
    }
    address
}

/// Drop gotos that jump to the instruction right after them, and gotos that
/// repeat the goto right before them. Jumps to a dropped goto are redirected
/// to where it led.
pub fn remove_redundant_gotos(program: &mut LinearProgram) -> Result<bool, LogicError> {
    let instructions = std::mem::take(&mut program.instructions);
    let mut remap: IndexMap<Address, Address> = IndexMap::new();
    let mut kept: Vec<LogicInstruction> = Vec::with_capacity(instructions.len());

    for (position, instruction) in instructions.iter().enumerate() {
        if let LogicInstruction::Goto {
            address,
            jump_address,
        } = instruction
        {
            let next = instructions.get(position + 1).map(|next| next.address());
            if next == Some(*jump_address) {
                trace!("dropping goto to next instruction {}", instruction);
                remap.insert(*address, *jump_address);
                continue;
            }
            let previous = position
                .checked_sub(1)
                .map(|previous| instructions[previous].address());
            if let Some(LogicInstruction::Goto {
                address: kept_address,
                jump_address: kept_target,
            }) = kept.last()
            {
                if previous == Some(*kept_address) && kept_target == jump_address {
                    trace!("dropping repeated {}", instruction);
                    remap.insert(*address, *kept_address);
                    continue;
                }
            }
        }
        kept.push(instruction.clone());
    }

    if remap.is_empty() {
        program.instructions = instructions;
        return Ok(false);
    }

    for instruction in &mut kept {
        if let Some(target) = instruction.jump_target() {
            let resolved = resolve(&remap, target);
            if resolved != target {
                instruction.set_jump_target(resolved);
            }
        }
    }

    // Names of labels on dropped gotos move to where the jumps now land
    for dropped in remap.keys() {
        if let Some(label) = program.labels.shift_remove(dropped) {
            let resolved = resolve(&remap, *dropped);
            program.labels.entry(resolved).or_insert(Label {
                address: resolved,
                ..label
            });
        }
    }

    program.instructions = kept;
    Ok(true)
}

#[cfg(test)]
#[path = "passes_tests.rs"]
mod tests;
