/// recompile.rs - Basic block graph to linear Logic instructions
///
/// Recompilation runs in three phases:
///
/// 1. Compile: every block reachable from the root becomes a `CompiledBlock`
///    exactly once. Commands get fresh symbolic addresses, and the skip target
///    of a conditional is resolved to its explicit else block or, failing that,
///    to its merge point (immediate post-dominator).
/// 2. Stitch: blocks are laid out from the root with an explicit work stack.
///    The first arrival at a block emits its code; every later arrival emits a
///    `Goto` to the block's entry instead.
/// 3. Normalize: the passes in `passes.rs` run to fixpoint.
///
/// A `LogicRecompiler` holds per-resource state and is consumed by `compile`.
use indexmap::IndexMap;
use log::{debug, info, trace, warn};

use crate::logic_compiler::cfg::{BasicBlockGraph, BlockExit, BlockId};
use crate::logic_compiler::config::RecompilerOptions;
use crate::logic_compiler::dominance::DominatorTree;
use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::graph::Graph;
use crate::logic_compiler::instruction::{
    Address, AddressAllocator, Label, LogicClause, LogicCompilerResult, LogicInstruction,
};
use crate::logic_compiler::opcodes::RETURN;
use crate::logic_compiler::passes::{run_passes, LinearProgram};

/// A block with addresses assigned to its code
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledBlock {
    SinglePath {
        instructions: Vec<LogicInstruction>,
        next: Option<BlockId>,
    },
    Conditional {
        instructions: Vec<LogicInstruction>,
        clauses: Vec<LogicClause>,
        condition_address: Address,
        /// Where control goes when the clauses do not hold
        skip: BlockId,
        then: BlockId,
        /// Where both branches meet again, if anywhere
        merge: Option<BlockId>,
    },
}

impl CompiledBlock {
    fn instructions(&self) -> &[LogicInstruction] {
        match self {
            CompiledBlock::SinglePath { instructions, .. }
            | CompiledBlock::Conditional { instructions, .. } => instructions,
        }
    }
}

/// Where a block's code ended up in the linear output
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedBlock {
    pub entry: Address,
    pub start: usize,
    pub len: usize,
}

/// One pending piece of layout: lay out `block`, stopping when control reaches
/// `stop`. At the stop, `jump_at_stop` says whether a goto is needed because
/// the stop block is not laid out next.
#[derive(Debug, Clone, Copy)]
struct Pending {
    block: BlockId,
    stop: Option<BlockId>,
    jump_at_stop: bool,
}

pub struct LogicRecompiler<'a> {
    graph: &'a BasicBlockGraph,
    options: &'a RecompilerOptions,
    post_dominators: DominatorTree,
    allocator: AddressAllocator,
    compiled: Vec<Option<CompiledBlock>>,
    entries: Vec<Option<Address>>,
    stitched: Vec<Option<StitchedBlock>>,
    labels: IndexMap<Address, Label>,
}

impl<'a> LogicRecompiler<'a> {
    pub fn new(graph: &'a BasicBlockGraph, options: &'a RecompilerOptions) -> Self {
        let block_count = graph.len();
        LogicRecompiler {
            graph,
            options,
            post_dominators: graph.post_dominator_tree(),
            allocator: AddressAllocator::new(),
            compiled: vec![None; block_count],
            entries: vec![None; block_count],
            stitched: vec![None; block_count],
            labels: IndexMap::new(),
        }
    }

    /// Name of a block for error messages
    fn describe(&self, block: BlockId) -> String {
        match self.graph.block(block).ok().and_then(|b| b.name.clone()) {
            Some(name) => format!("{} ({})", self.graph.identity(block), name),
            None => self.graph.identity(block),
        }
    }

    pub fn compile(mut self) -> Result<LogicCompilerResult, LogicError> {
        let order = self.graph.preorder();
        for block in &order {
            let compiled = self.compile_block(*block)?;
            self.compiled[block.0] = Some(compiled);
        }
        debug!("compiled {} of {} blocks", order.len(), self.graph.len());

        let instructions = self.stitch()?;
        let stitched = self.stitched.iter().filter(|s| s.is_some()).count();
        debug!(
            "stitched {} blocks into {} instructions",
            stitched,
            instructions.len()
        );

        let mut program = LinearProgram::new(instructions, std::mem::take(&mut self.labels))?;
        run_passes(&mut program, self.options)?;
        info!(
            "recompiled {} blocks into {} instructions with {} labels",
            order.len(),
            program.instructions.len(),
            program.labels.len()
        );
        Ok(program.into_result())
    }

    /// Immediate post-dominator of a conditional block, other than the exit
    fn merge_point(&self, block: BlockId) -> Option<BlockId> {
        if !self.post_dominators.contains(block) {
            return None;
        }
        match self.post_dominators.immediate_dominator(block) {
            Ok(Some(merge)) if merge != self.graph.exit_node() => Some(merge),
            _ => None,
        }
    }

    fn compile_block(&mut self, id: BlockId) -> Result<CompiledBlock, LogicError> {
        let graph = self.graph;
        let block = graph.block(id)?;
        let mut instructions = Vec::with_capacity(block.instructions.len() + 1);
        for command in &block.instructions {
            instructions.push(LogicInstruction::Command {
                address: self.allocator.fresh()?,
                opcode: command.opcode,
                args: command.args.clone(),
            });
        }

        match &block.exit {
            BlockExit::SinglePath { next } => Ok(CompiledBlock::SinglePath {
                instructions,
                next: *next,
            }),
            BlockExit::IfExit {
                clauses,
                then,
                otherwise,
            } => {
                let merge = self.merge_point(id);
                let missing = || LogicError::MissingPostDominator(self.describe(id));
                let skip = match otherwise {
                    Some(otherwise) => *otherwise,
                    None => merge.ok_or_else(missing)?,
                };
                let then = match then {
                    Some(then) => *then,
                    None => merge.ok_or_else(missing)?,
                };
                let condition_address = self.allocator.fresh()?;
                trace!(
                    "{}: condition {:04x}, then {}, skip {}",
                    self.describe(id),
                    condition_address,
                    graph.identity(then),
                    graph.identity(skip)
                );
                Ok(CompiledBlock::Conditional {
                    instructions,
                    clauses: clauses.clone(),
                    condition_address,
                    skip,
                    then,
                    merge,
                })
            }
        }
    }

    fn compiled(&self, block: BlockId) -> Result<&CompiledBlock, LogicError> {
        self.compiled
            .get(block.0)
            .and_then(|compiled| compiled.as_ref())
            .ok_or_else(|| LogicError::UnknownNode(self.describe(block)))
    }

    /// Address control lands on when it enters `block`. Empty single-path
    /// blocks pass control straight on to their successor.
    fn entry(&mut self, block: BlockId) -> Result<Address, LogicError> {
        let mut chain = Vec::new();
        let mut current = block;
        let address = loop {
            if let Some(address) = self.entries.get(current.0).copied().flatten() {
                break address;
            }
            let compiled = self.compiled(current)?;
            if let Some(first) = compiled.instructions().first() {
                break first.address();
            }
            match compiled {
                CompiledBlock::Conditional {
                    condition_address, ..
                } => break *condition_address,
                CompiledBlock::SinglePath {
                    next: Some(next), ..
                } => {
                    if chain.contains(&current) {
                        return Err(LogicError::UnresolvedExit(self.describe(current)));
                    }
                    chain.push(current);
                    current = *next;
                }
                CompiledBlock::SinglePath { next: None, .. } => {
                    return Err(LogicError::UnresolvedExit(self.describe(current)));
                }
            }
        };
        chain.push(current);
        for visited in chain {
            self.entries[visited.0] = Some(address);
        }
        Ok(address)
    }

    /// Record a jump to `target`, naming the label after `block` if it has a name
    fn reference(&mut self, target: Address, from: Address, block: BlockId) {
        let name = self.graph.block(block).ok().and_then(|b| b.name.clone());
        match self.labels.get_mut(&target) {
            Some(label) => label.references.push(from),
            None => {
                if let Some(name) = name {
                    self.labels.insert(
                        target,
                        Label {
                            address: target,
                            name,
                            references: vec![from],
                        },
                    );
                }
            }
        }
    }

    fn emit_goto(
        &mut self,
        output: &mut Vec<LogicInstruction>,
        block: BlockId,
    ) -> Result<(), LogicError> {
        let target = self.entry(block)?;
        let address = self.allocator.fresh()?;
        trace!("goto {:04x} for {}", target, self.describe(block));
        output.push(LogicInstruction::Goto {
            address,
            jump_address: target,
        });
        self.reference(target, address, block);
        Ok(())
    }

    fn stitch(&mut self) -> Result<Vec<LogicInstruction>, LogicError> {
        let mut output = Vec::new();
        let mut work = vec![Pending {
            block: self.graph.root(),
            stop: None,
            jump_at_stop: false,
        }];

        while let Some(pending) = work.pop() {
            let block = pending.block;
            if pending.stop == Some(block) {
                if pending.jump_at_stop {
                    self.emit_goto(&mut output, block)?;
                }
                continue;
            }
            if self.stitched.get(block.0).is_some_and(|s| s.is_some()) {
                self.emit_goto(&mut output, block)?;
                continue;
            }

            let compiled = self.compiled(block)?.clone();
            let entry = self.entry(block)?;
            let start = output.len();
            match compiled {
                CompiledBlock::SinglePath { instructions, next } => {
                    let is_empty = instructions.is_empty();
                    output.extend(instructions);
                    match next {
                        Some(next) => work.push(Pending {
                            block: next,
                            ..pending
                        }),
                        None if is_empty => {
                            return Err(LogicError::UnresolvedExit(self.describe(block)));
                        }
                        None => {
                            let ends_with_return = matches!(
                                output.last(),
                                Some(LogicInstruction::Command { opcode, .. }) if *opcode == RETURN
                            );
                            if !work.is_empty() && !ends_with_return {
                                // More code follows, so leaving has to be explicit
                                let address = self.allocator.fresh()?;
                                warn!(
                                    "{} leaves the logic without return; adding one at {:04x}",
                                    self.describe(block),
                                    address
                                );
                                output.push(LogicInstruction::Command {
                                    address,
                                    opcode: RETURN,
                                    args: Vec::new(),
                                });
                            }
                        }
                    }
                }
                CompiledBlock::Conditional {
                    instructions,
                    clauses,
                    condition_address,
                    skip,
                    then,
                    merge,
                } => {
                    output.extend(instructions);
                    let skip_address = self.entry(skip)?;
                    output.push(LogicInstruction::Condition {
                        address: condition_address,
                        clauses,
                        skip_address: Some(skip_address),
                    });
                    self.reference(skip_address, condition_address, skip);

                    match merge {
                        // if/else: then-branch, jump over the else-branch,
                        // else-branch, then the merge point
                        Some(merge) if merge != skip => {
                            work.push(Pending {
                                block: merge,
                                ..pending
                            });
                            work.push(Pending {
                                block: skip,
                                stop: Some(merge),
                                jump_at_stop: false,
                            });
                            work.push(Pending {
                                block: then,
                                stop: Some(merge),
                                jump_at_stop: true,
                            });
                        }
                        // if without else: the then-branch falls into the skip target
                        _ => {
                            work.push(Pending {
                                block: skip,
                                ..pending
                            });
                            work.push(Pending {
                                block: then,
                                stop: Some(skip),
                                jump_at_stop: false,
                            });
                        }
                    }
                }
            }
            self.stitched[block.0] = Some(StitchedBlock {
                entry,
                start,
                len: output.len() - start,
            });
        }
        Ok(output)
    }
}

/// Recompile a basic block graph into normalized linear instructions
pub fn recompile(
    graph: &BasicBlockGraph,
    options: &RecompilerOptions,
) -> Result<LogicCompilerResult, LogicError> {
    LogicRecompiler::new(graph, options).compile()
}

#[cfg(test)]
#[path = "recompile_tests.rs"]
mod tests;
