//! Translates a subset of Python into C++ over a tagged `Value` runtime.
//!
//! ```text
//! source --lexer--> tokens --parser--> ast::Program --transpiler--> C++ text
//! ```

pub mod ast;
pub mod builtins;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod transpiler;

use thiserror::Error;

pub use config::{ConfigError, TranspileConfig};
pub use parser::ParseError;
pub use transpiler::{TranspileError, Transpiler};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Transpile(#[from] TranspileError),
}

/// Parses and translates `source` in one step.
pub fn compile(source: &str, config: &TranspileConfig) -> Result<String, Error> {
    let program = parser::parse(source)?;
    let output = Transpiler::new(config.clone()).transpile(&program)?;
    Ok(output)
}
