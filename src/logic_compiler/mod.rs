// Logic Compiler Module
// Decompiles AGI Logic bytecode into basic block graphs and compiles them back

pub mod assemble;
pub mod cfg;
pub mod config;
pub mod decode;
pub mod dominance;
pub mod error;
pub mod graph;
pub mod instruction;
pub mod opcodes;
pub mod passes;
pub mod recompile;

use log::info;

pub use cfg::{BasicBlock, BasicBlockGraph, BlockExit, BlockId};
pub use config::CompilerOptions;
pub use error::LogicError;
pub use instruction::{LogicCompilerResult, LogicInstruction};

use assemble::LogicAssembler;
use cfg::BasicBlockGraphBuilder;
use decode::{collect_labels, LogicDecoder};
use opcodes::OpcodeTable;
use recompile::LogicRecompiler;

/// Every stage of one resource's trip through the compiler
#[derive(Debug, Clone)]
pub struct RoundTrip {
    pub graph: BasicBlockGraph,
    pub result: LogicCompilerResult,
    pub code: Vec<u8>,
}

/// Main compiler structure
pub struct LogicCompiler {
    options: CompilerOptions,
    opcodes: OpcodeTable,
}

impl Default for LogicCompiler {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl LogicCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        let opcodes = options.opcode_table();
        LogicCompiler { options, opcodes }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Decode bytecode into instructions addressed by byte offset
    pub fn decode(&self, code: &[u8]) -> Result<Vec<LogicInstruction>, LogicError> {
        LogicDecoder::new(code, &self.opcodes).decode()
    }

    /// Decode bytecode and build its basic block graph
    pub fn decompile(&self, code: &[u8]) -> Result<BasicBlockGraph, LogicError> {
        let instructions = self.decode(code)?;
        let labels = collect_labels(&instructions);
        BasicBlockGraphBuilder::new(&instructions, &labels).build()
    }

    /// Lay out a basic block graph as normalized linear instructions
    pub fn recompile(&self, graph: &BasicBlockGraph) -> Result<LogicCompilerResult, LogicError> {
        LogicRecompiler::new(graph, &self.options.recompiler).compile()
    }

    pub fn assemble(&self, result: &LogicCompilerResult) -> Result<Vec<u8>, LogicError> {
        LogicAssembler::new(&result.instructions, &self.opcodes).assemble()
    }

    /// Decompile, recompile and reassemble one resource
    pub fn roundtrip(&self, code: &[u8]) -> Result<RoundTrip, LogicError> {
        // Phase 1: Decode and build the graph
        let graph = self.decompile(code)?;

        // Phase 2: Recompile to linear code
        let result = self.recompile(&graph)?;

        // Phase 3: Assemble
        let assembled = self.assemble(&result)?;

        info!(
            "round trip: {} bytes in, {} blocks, {} bytes out",
            code.len(),
            graph.len(),
            assembled.len()
        );
        Ok(RoundTrip {
            graph,
            result,
            code: assembled,
        })
    }
}
