pub mod context;
pub mod entity;
pub mod instruction;
pub mod node;
pub mod parser;
pub mod tags;
pub mod template;

use std::fmt::Write;

use crate::instruction::Instruction;
use crate::parser::error::line_column;

/// A compiled template unit.
#[derive(Debug, Clone)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Program {
    /// Human-readable instruction listing, each tag annotated with the
    /// source line it came from.
    pub fn listing(&self, source: &str) -> String {
        let mut out = String::new();
        for (i, instruction) in self.instructions.iter().enumerate() {
            let (kind, span) = match instruction {
                Instruction::Literal(text) => {
                    let _ = writeln!(out, "{:>3}       text {:?}", i, text);
                    continue;
                }
                Instruction::Emit { filter: true, span, .. } => ("emit|pretty", span),
                Instruction::Emit { span, .. } => ("emit", span),
                Instruction::Execute { span, .. } => ("exec", span),
            };
            let (line, _) = line_column(source, span.start);
            let text = source.get(span.clone()).unwrap_or_default();
            let _ = writeln!(out, "{:>3} L{:<4}  {} {}", i, line, kind, text.replace('\n', "⏎"));
        }
        out
    }

    pub fn is_static(&self) -> bool {
        self.instructions
            .iter()
            .all(|i| matches!(i, Instruction::Literal(_)))
    }
}
