use std::ops::Range;

use crate::instruction::template_string::TemplateString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Negation,
    /// Logical not: !x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    LogicalAnd,
    LogicalOr,
    /// `a ?? b`: `b` when `a` is null or empty.
    Coalesce,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    // Literals
    StringLiteral(String),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    NullLiteral,
    ListLiteral(Vec<Value>),
    /// Backtick string with `${expr}` parts.
    Interpolation(TemplateString),

    // References
    VariableReference(String, Range<usize>),
    /// `object.field`
    Member {
        object: Box<Value>,
        field: String,
        span: Range<usize>,
    },
    /// `object[index]`
    Index {
        object: Box<Value>,
        index: Box<Value>,
        span: Range<usize>,
    },

    /// `callee(args)`. A dotted callee names a helper (`date.nlp`); when no
    /// helper has that name, `a.f(x)` calls `f(a, x)`.
    Call {
        callee: Box<Value>,
        args: Vec<Value>,
        span: Range<usize>,
    },

    // Operations
    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<Value>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Value>,
        right: Box<Value>,
    },

    /// cond ? expr : expr
    Conditional {
        condition: Box<Value>,
        true_branch: Box<Value>,
        false_branch: Box<Value>,
    },
}

impl Value {
    /// The dotted name of a plain reference chain: `date.nlp` for
    /// `Member(VariableReference("date"), "nlp")`.
    pub fn path(&self) -> Option<String> {
        match self {
            Value::VariableReference(name, _) => Some(name.clone()),
            Value::Member { object, field, .. } => {
                let mut path = object.path()?;
                path.push('.');
                path.push_str(field);
                Some(path)
            }
            _ => None,
        }
    }
}
