// Compiler configuration, loaded from TOML
//
// [recompiler]
// self_contained_conditionals = true
//
// [opcodes]
// variable_arity_tests = [0x0E]

use std::path::Path;

use serde::Deserialize;

use crate::logic_compiler::error::LogicError;
use crate::logic_compiler::opcodes::{OpcodeTable, SAID};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    pub recompiler: RecompilerOptions,
    pub opcodes: OpcodeOptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecompilerOptions {
    /// Rewrite conditionals whose skip leaves their enclosing region, so that
    /// tools that only understand nested conditionals can read the output
    pub self_contained_conditionals: bool,
}

impl Default for RecompilerOptions {
    fn default() -> Self {
        RecompilerOptions {
            self_contained_conditionals: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpcodeOptions {
    /// Test opcodes encoded as an argument count followed by 16-bit words
    pub variable_arity_tests: Vec<u8>,
}

impl Default for OpcodeOptions {
    fn default() -> Self {
        OpcodeOptions {
            variable_arity_tests: vec![SAID],
        }
    }
}

impl CompilerOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, LogicError> {
        toml::from_str(text).map_err(|e| LogicError::InvalidConfig(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, LogicError> {
        let text = std::fs::read_to_string(path)?;
        let options = Self::from_toml_str(&text)?;
        log::debug!("loaded compiler options from {}", path.display());
        Ok(options)
    }

    pub fn opcode_table(&self) -> OpcodeTable {
        OpcodeTable::new(self.opcodes.variable_arity_tests.iter().copied())
    }
}
