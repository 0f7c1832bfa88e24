//! `diosgen`: compiles a DiOS cooperative-scheduler description into PIC14/16
//! assembly (§1). The five cooperating components are, leaves-first: the
//! lexer, the parser (which builds a [`model::Program`]), the module weaver,
//! the queue codegen, and the phase assembler, tied together by
//! [`generate::generate`].

pub mod constants;
pub mod error;
pub mod generate;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod phase;
pub mod queue;
pub mod weaver;

use std::io::{BufRead, Write};

pub use error::{DiosError, Result};
pub use model::Program;

/// Parse `reader` (a description sourced from `path`, used only for
/// diagnostics) and write the generated assembly to `writer`.
pub fn run<R: BufRead, W: Write>(reader: R, path: &str, writer: &mut W) -> Result<()> {
    let program = parser::parse_lines(reader, path)?;
    let text = generate::generate(&program);
    writer.write_all(text.as_bytes())?;
    Ok(())
}
