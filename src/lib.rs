pub mod logic_compiler;
