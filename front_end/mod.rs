//! Front end: parse the textual bytecode form and link it into the program
//! model the analyses consume.

pub mod ast;
pub mod link;
pub mod parser;

#[cfg(test)]
mod tests;

use crate::commons::Valid;
use crate::middle_end::lang::Program;

/// Parse and link a program in one step.  Errors from both phases are
/// configuration-class failures: the caller should report them and stop.
pub fn load(code: &str) -> Result<Valid<Program>, String> {
    let raw = parser::parse(code).map_err(|e| e.to_string())?;
    link::link(&raw).map_err(|e| e.to_string())
}
