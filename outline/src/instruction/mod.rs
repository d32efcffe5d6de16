pub mod template_string;
pub mod value;

use std::ops::Range;

use crate::instruction::value::Value;

/// One step of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Literal template text, appended as is.
    Literal(String),
    /// Evaluate `value` and append it, through the pretty-printing filter
    /// when `filter` is set.
    Emit {
        value: Value,
        filter: bool,
        span: Range<usize>,
    },
    /// Run statements for their side effects only.
    Execute {
        statements: Vec<Statement>,
        span: Range<usize>,
    },
}

impl Instruction {
    pub fn span(&self) -> Option<&Range<usize>> {
        match self {
            Instruction::Literal(_) => None,
            Instruction::Emit { span, .. } => Some(span),
            Instruction::Execute { span, .. } => Some(span),
        }
    }
}

/// A statement inside a statement tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `variable = expression`; `let variable = expression` when `declare`.
    Assignment {
        variable: String,
        value: Value,
        declare: bool,
        span: Range<usize>,
    },
    /// Expression evaluation (side effects only, result discarded).
    Expression { value: Value, span: Range<usize> },
    /// `if cond { ... } else { ... }`
    If {
        condition: Value,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
        span: Range<usize>,
    },
}

impl Statement {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Statement::Assignment { span, .. } => span,
            Statement::Expression { span, .. } => span,
            Statement::If { span, .. } => span,
        }
    }
}
