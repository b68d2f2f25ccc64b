/// cfg.rs - Basic block graphs of Logic code
///
/// A `BasicBlockGraph` is an arena of blocks addressed by `BlockId`. Each block
/// holds a straight run of action commands and ends in a `BlockExit`:
///
/// - `SinglePath`: continue with `next`, or leave the resource when it is `None`
/// - `IfExit`: evaluate clauses; `then` is taken when they hold, `otherwise`
///   when they do not. An absent `otherwise` means the not-taken path leads
///   straight to the block's merge point (its immediate post-dominator), and an
///   absent `then` means the same for the taken path.
///
/// Control edges are kept next to the exits. The exits say how the block is
/// structured, the edges say where control can go. An `IfExit` without
/// `otherwise` still has its not-taken edge in the graph, otherwise its merge
/// point could not be found.
use std::cell::OnceCell;

use indexmap::IndexMap;
use log::debug;

use crate::logic_compiler::dominance::DominatorTree;
use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::graph::{self, Graph, NodeId};
use crate::logic_compiler::instruction::{
    Address, Label, LogicClause, LogicCommand, LogicInstruction,
};
use crate::logic_compiler::opcodes;

pub type BlockId = NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockExit {
    SinglePath {
        next: Option<BlockId>,
    },
    IfExit {
        clauses: Vec<LogicClause>,
        then: Option<BlockId>,
        otherwise: Option<BlockId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Author-supplied label name for the start of this block
    pub name: Option<String>,
    pub instructions: Vec<LogicCommand>,
    pub exit: BlockExit,
}

impl BasicBlock {
    pub fn single_path(instructions: Vec<LogicCommand>, next: Option<BlockId>) -> Self {
        BasicBlock {
            name: None,
            instructions,
            exit: BlockExit::SinglePath { next },
        }
    }

    pub fn if_exit(
        instructions: Vec<LogicCommand>,
        clauses: Vec<LogicClause>,
        then: Option<BlockId>,
        otherwise: Option<BlockId>,
    ) -> Self {
        BasicBlock {
            name: None,
            instructions,
            exit: BlockExit::IfExit {
                clauses,
                then,
                otherwise,
            },
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Successors named by the exit itself
    fn exit_targets(&self) -> Vec<BlockId> {
        match &self.exit {
            BlockExit::SinglePath { next } => next.iter().copied().collect(),
            BlockExit::IfExit {
                then, otherwise, ..
            } => then.iter().chain(otherwise.iter()).copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlockGraph {
    blocks: Vec<BasicBlock>,
    /// Edges that are not named by a block's exit, such as the not-taken edge
    /// of an `IfExit` without `otherwise`
    extra_edges: Vec<Vec<BlockId>>,
    root: BlockId,
    predecessors: OnceCell<Vec<Vec<BlockId>>>,
}

impl BasicBlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and return its id. The first block added is the root.
    pub fn add_block(&mut self, block: BasicBlock) -> BlockId {
        let id = NodeId(self.blocks.len());
        self.blocks.push(block);
        self.extra_edges.push(Vec::new());
        self.predecessors = OnceCell::new();
        id
    }

    /// Replace the contents of an existing block
    pub fn replace_block(&mut self, id: BlockId, block: BasicBlock) -> Result<(), LogicError> {
        let slot = self
            .blocks
            .get_mut(id.0)
            .ok_or_else(|| LogicError::UnknownNode(format!("B{}", id.0)))?;
        *slot = block;
        self.predecessors = OnceCell::new();
        Ok(())
    }

    /// Add a control edge that the exit of `from` does not name
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> Result<(), LogicError> {
        let edges = self
            .extra_edges
            .get_mut(from.0)
            .ok_or_else(|| LogicError::UnknownNode(format!("B{}", from.0)))?;
        if !edges.contains(&to) {
            edges.push(to);
        }
        self.predecessors = OnceCell::new();
        Ok(())
    }

    pub fn set_root(&mut self, root: BlockId) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> Result<&BasicBlock, LogicError> {
        self.blocks
            .get(id.0)
            .ok_or_else(|| LogicError::UnknownNode(format!("B{}", id.0)))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (NodeId(index), block))
    }

    /// Dominator tree of the graph
    pub fn dominator_tree(&self) -> DominatorTree {
        DominatorTree::build(self)
    }

    /// Post-dominator tree, rooted at the virtual exit `self.exit_node()`
    pub fn post_dominator_tree(&self) -> DominatorTree {
        DominatorTree::post_dominators(self)
    }

    /// Id of the virtual exit node in the post-dominator tree
    pub fn exit_node(&self) -> NodeId {
        NodeId(self.blocks.len())
    }

    pub fn to_graphviz(&self, name: &str) -> String {
        graph::to_graphviz(self, name)
    }

    fn predecessor_table(&self) -> &Vec<Vec<BlockId>> {
        self.predecessors.get_or_init(|| {
            let mut table = vec![Vec::new(); self.blocks.len()];
            for index in 0..self.blocks.len() {
                for successor in self.successors(NodeId(index)) {
                    if let Some(entry) = table.get_mut(successor.0) {
                        entry.push(NodeId(index));
                    }
                }
            }
            table
        })
    }
}

impl Graph for BasicBlockGraph {
    fn root(&self) -> NodeId {
        self.root
    }

    fn node_count(&self) -> usize {
        self.blocks.len()
    }

    fn successors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(block) = self.blocks.get(node.0) else {
            return Vec::new();
        };
        let mut successors = block.exit_targets();
        for edge in &self.extra_edges[node.0] {
            if !successors.contains(edge) {
                successors.push(*edge);
            }
        }
        successors.dedup();
        successors
    }

    fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.predecessor_table()
            .get(node.0)
            .cloned()
            .unwrap_or_default()
    }

    fn identity(&self, node: NodeId) -> String {
        format!("B{}", node.0)
    }

    fn display_label(&self, node: NodeId) -> String {
        let Some(block) = self.blocks.get(node.0) else {
            return self.identity(node);
        };
        let mut label = match &block.name {
            Some(name) => format!("B{} ({})\n", node.0, name),
            None => format!("B{}\n", node.0),
        };
        for command in &block.instructions {
            label.push_str(&format!("{}{:?}\n", opcodes::action_name(command.opcode), command.args));
        }
        if let BlockExit::IfExit { clauses, .. } = &block.exit {
            let rendered: Vec<String> = clauses.iter().map(|c| c.to_string()).collect();
            label.push_str(&format!("if {}\n", rendered.join(" && ")));
        }
        label
    }

    fn edge_label(&self, from: NodeId, to: NodeId) -> Option<String> {
        let block = self.blocks.get(from.0)?;
        let label = match &block.exit {
            BlockExit::SinglePath { next } if *next == Some(to) => "next",
            BlockExit::IfExit { then, .. } if *then == Some(to) => "then",
            BlockExit::IfExit { otherwise, .. } if *otherwise == Some(to) => "else",
            _ => "merge",
        };
        Some(label.to_string())
    }
}

/// How a run of decoded instructions ends
enum BlockEnd {
    Condition {
        clauses: Vec<LogicClause>,
        fall_through: usize,
        skip: usize,
    },
    Jump(usize),
    Exit,
    FallInto(usize),
}

struct BlockSpan {
    start: usize,
    commands: Vec<LogicCommand>,
    end: BlockEnd,
}

/// Builds a `BasicBlockGraph` out of decoded instructions
pub struct BasicBlockGraphBuilder<'a> {
    instructions: &'a [LogicInstruction],
    labels: &'a IndexMap<Address, Label>,
    positions: IndexMap<Address, usize>,
}

impl<'a> BasicBlockGraphBuilder<'a> {
    pub fn new(
        instructions: &'a [LogicInstruction],
        labels: &'a IndexMap<Address, Label>,
    ) -> Self {
        let positions = instructions
            .iter()
            .enumerate()
            .map(|(position, instruction)| (instruction.address(), position))
            .collect();
        BasicBlockGraphBuilder {
            instructions,
            labels,
            positions,
        }
    }

    fn position_of(&self, from: Address, target: Address) -> Result<usize, LogicError> {
        self.positions
            .get(&target)
            .copied()
            .ok_or(LogicError::DanglingJumpTarget { from, target })
    }

    /// Positions that start a block: the entry, every jump target and every
    /// instruction after a goto, condition or return
    fn find_leaders(&self) -> Result<Vec<bool>, LogicError> {
        let mut leaders = vec![false; self.instructions.len()];
        if let Some(first) = leaders.first_mut() {
            *first = true;
        }
        for (position, instruction) in self.instructions.iter().enumerate() {
            let ends_block = match instruction {
                LogicInstruction::Command { opcode, .. } => *opcode == opcodes::RETURN,
                LogicInstruction::Condition { .. } | LogicInstruction::Goto { .. } => true,
            };
            if ends_block && position + 1 < leaders.len() {
                leaders[position + 1] = true;
            }
            if let Some(target) = instruction.jump_target() {
                let target_position = self.position_of(instruction.address(), target)?;
                leaders[target_position] = true;
            }
            if let LogicInstruction::Condition {
                skip_address: None,
                address,
                ..
            } = instruction
            {
                return Err(LogicError::UnresolvedSkip(*address));
            }
        }
        Ok(leaders)
    }

    fn scan_block(&self, start: usize, leaders: &[bool]) -> Result<BlockSpan, LogicError> {
        let mut commands = Vec::new();
        let mut position = start;
        loop {
            if position >= self.instructions.len() {
                return Ok(BlockSpan {
                    start,
                    commands,
                    end: BlockEnd::Exit,
                });
            }
            if position > start && leaders[position] {
                return Ok(BlockSpan {
                    start,
                    commands,
                    end: BlockEnd::FallInto(position),
                });
            }
            match &self.instructions[position] {
                LogicInstruction::Command { opcode, args, .. } => {
                    commands.push(LogicCommand::new(*opcode, args.clone()));
                    if *opcode == opcodes::RETURN {
                        return Ok(BlockSpan {
                            start,
                            commands,
                            end: BlockEnd::Exit,
                        });
                    }
                }
                LogicInstruction::Condition {
                    address,
                    clauses,
                    skip_address,
                } => {
                    // A condition must have something to fall through to
                    if position + 1 >= self.instructions.len() {
                        return Err(LogicError::UnexpectedEndOfCode(*address as usize));
                    }
                    let skip_target = skip_address.ok_or(LogicError::UnresolvedSkip(*address))?;
                    return Ok(BlockSpan {
                        start,
                        commands,
                        end: BlockEnd::Condition {
                            clauses: clauses.clone(),
                            fall_through: position + 1,
                            skip: self.position_of(*address, skip_target)?,
                        },
                    });
                }
                LogicInstruction::Goto {
                    address,
                    jump_address,
                } => {
                    return Ok(BlockSpan {
                        start,
                        commands,
                        end: BlockEnd::Jump(self.position_of(*address, *jump_address)?),
                    });
                }
            }
            position += 1;
        }
    }

    /// Build the graph of every block reachable from the first instruction
    pub fn build(&self) -> Result<BasicBlockGraph, LogicError> {
        if self.instructions.is_empty() {
            return Err(LogicError::UnexpectedEndOfCode(0));
        }
        let mut graph = BasicBlockGraph::new();

        let leaders = self.find_leaders()?;

        // Discover reachable blocks, numbering them in discovery order
        let mut block_ids: IndexMap<usize, BlockId> = IndexMap::new();
        let mut spans: Vec<BlockSpan> = Vec::new();
        let mut work = vec![0usize];
        while let Some(start) = work.pop() {
            if block_ids.contains_key(&start) {
                continue;
            }
            block_ids.insert(start, NodeId(spans.len()));
            let span = self.scan_block(start, &leaders)?;
            match &span.end {
                BlockEnd::Condition {
                    fall_through, skip, ..
                } => {
                    work.push(*skip);
                    work.push(*fall_through);
                }
                BlockEnd::Jump(target) | BlockEnd::FallInto(target) => work.push(*target),
                BlockEnd::Exit => {}
            }
            spans.push(span);
        }

        let id_of = |position: &usize| block_ids.get(position).copied();
        for span in spans {
            let mut block = match span.end {
                BlockEnd::Condition {
                    clauses,
                    fall_through,
                    skip,
                } => BasicBlock::if_exit(
                    span.commands,
                    clauses,
                    id_of(&fall_through),
                    id_of(&skip),
                ),
                BlockEnd::Jump(target) | BlockEnd::FallInto(target) => {
                    BasicBlock::single_path(span.commands, id_of(&target))
                }
                BlockEnd::Exit => BasicBlock::single_path(span.commands, None),
            };
            let address = self.instructions[span.start].address();
            block.name = self.labels.get(&address).map(|label| label.name.clone());
            graph.add_block(block);
        }
        graph.set_root(NodeId(0));

        self.drop_implicit_else(&mut graph)?;

        debug!(
            "built basic block graph: {} blocks from {} instructions",
            graph.len(),
            self.instructions.len()
        );
        Ok(graph)
    }

    /// Keep the not-taken edge of every conditional, but drop `otherwise`
    /// wherever it is just the merge point of the two branches
    fn drop_implicit_else(&self, graph: &mut BasicBlockGraph) -> Result<(), LogicError> {
        let post_dominators = graph.post_dominator_tree();
        let mut rewrites = Vec::new();
        for (id, block) in graph.blocks() {
            if let BlockExit::IfExit {
                otherwise: Some(otherwise),
                ..
            } = &block.exit
            {
                if !post_dominators.contains(id) {
                    continue;
                }
                if post_dominators.immediate_dominator(id)? == Some(*otherwise) {
                    rewrites.push((id, *otherwise));
                }
            }
        }

        for (id, otherwise) in rewrites {
            let mut block = graph.block(id)?.clone();
            if let BlockExit::IfExit {
                otherwise: slot, ..
            } = &mut block.exit
            {
                *slot = None;
            }
            graph.replace_block(id, block)?;
            graph.add_edge(id, otherwise)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "cfg_tests.rs"]
mod tests;
