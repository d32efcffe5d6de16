pub mod error;
pub mod expression;
pub mod graph;
pub mod lexer;

pub use error::ParseError;

use crate::Program;
use crate::instruction::Instruction;
use crate::parser::error::line_column;
use crate::parser::lexer::{Lexer, RawTag, Segment};
use crate::tags::{TagTable, TrimPolicy};

/// Turns template text into a [`Program`] using a tag table.
#[derive(Debug)]
pub struct Compiler<'t> {
    lexer: Result<Lexer<'t>, regex::Error>,
}

impl<'t> Compiler<'t> {
    pub fn new(tags: &'t TagTable) -> Self {
        Compiler {
            lexer: Lexer::new(tags),
        }
    }

    /// Compile `source`. A syntax error in any tag aborts the whole unit.
    pub fn compile(&self, source: &str, file_id: usize) -> Result<Program, ParseError> {
        let lexer = self.lexer.as_ref().map_err(|e| {
            ParseError::error(format!("invalid tag table: {}", e), 0..0, file_id)
        })?;

        let mut instructions = Vec::new();
        let mut pending_trim = TrimPolicy::None;

        for segment in lexer.segments(source, file_id)? {
            match segment {
                Segment::Text(text) => {
                    let text = apply_trim(text, pending_trim);
                    pending_trim = TrimPolicy::None;
                    if !text.is_empty() {
                        instructions.push(Instruction::Literal(text.to_string()));
                    }
                }
                Segment::Tag(tag) => {
                    pending_trim = tag.def.trim;
                    let instruction = compile_tag(&tag, file_id)
                        .map_err(|e| annotate(e, source, &tag))?;
                    instructions.push(instruction);
                }
            }
        }

        Ok(Program {
            instructions,
            source_id: file_id,
        })
    }
}

fn compile_tag(tag: &RawTag<'_, '_>, file_id: usize) -> Result<Instruction, ParseError> {
    let span = tag.span.clone();
    let rewritten = tag.def.rewrite.map(|rewrite| rewrite(tag.body));
    let script = rewritten.as_deref().unwrap_or(tag.body);

    let compiled = if tag.class.statement {
        expression::parse_statements(script, tag.body_start, file_id)
            .map(|statements| Instruction::Execute { statements, span: span.clone() })
    } else {
        expression::parse_expression(script, tag.body_start, file_id).map(|value| {
            Instruction::Emit {
                value,
                filter: tag.def.auto_filter,
                span: span.clone(),
            }
        })
    };

    // Offsets inside rewritten script do not map back onto the source.
    compiled.map_err(|mut e| {
        if rewritten.is_some() {
            e.span = span;
        }
        e
    })
}

fn annotate(error: ParseError, source: &str, tag: &RawTag<'_, '_>) -> ParseError {
    let (line, _) = line_column(source, tag.span.start);
    let excerpt = source[tag.span.clone()].lines().next().unwrap_or_default();
    error
        .locate(source)
        .with_note(format!("in tag on line {}: {}", line, excerpt))
}

fn apply_trim(text: &str, trim: TrimPolicy) -> &str {
    match trim {
        TrimPolicy::None => text,
        TrimPolicy::OneNewline => text
            .strip_prefix("\r\n")
            .or_else(|| text.strip_prefix('\n'))
            .unwrap_or(text),
        TrimPolicy::AllWhitespace => text.trim_start(),
    }
}
