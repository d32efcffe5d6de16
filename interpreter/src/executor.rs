use std::ops::Range;

use outline::Program;
use outline::context::ConfigContext;
use outline::instruction::{Instruction, Statement};
use outline::node::OutlineNode;

use crate::environment::Environment;
use crate::error::{DiagnosticError, RuntimeError};
use crate::evaluator::evaluate;
use crate::filters;
use crate::helpers::Helpers;

/// Side effects one node's template code asked for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    /// Identifier forced with `set_uuid`.
    pub uuid: Option<String>,
    /// Nodes to insert before the node's own children.
    pub spawned: Vec<OutlineNode>,
    /// Nodes to insert as siblings right after the node.
    pub appended: Vec<OutlineNode>,
}

/// The output of executing one compiled unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    pub state: RenderState,
}

/// Everything evaluation needs besides variables.
pub struct Runtime<'a> {
    pub helpers: &'a Helpers,
    pub config: &'a ConfigContext,
    pub state: RenderState,
    pub source_id: usize,
}

impl<'a> Runtime<'a> {
    pub fn new(helpers: &'a Helpers, config: &'a ConfigContext, source_id: usize) -> Self {
        Runtime {
            helpers,
            config,
            state: RenderState::default(),
            source_id,
        }
    }

    pub(crate) fn error(&self, error: RuntimeError, span: &Range<usize>) -> DiagnosticError {
        DiagnosticError::at(error, span.clone(), self.source_id)
    }
}

/// Execute a compiled unit inside its own scope.
pub fn execute_program(
    program: &Program,
    env: &mut Environment,
    helpers: &Helpers,
    config: &ConfigContext,
) -> Result<Rendered, DiagnosticError> {
    let mut runtime = Runtime::new(helpers, config, program.source_id);
    let mut text = String::new();

    env.push_scope();
    let result = execute_instructions(&program.instructions, env, &mut runtime, &mut text);
    env.pop_scope();
    result?;

    Ok(Rendered {
        text,
        state: runtime.state,
    })
}

fn execute_instructions(
    instructions: &[Instruction],
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
    out: &mut String,
) -> Result<(), DiagnosticError> {
    for instruction in instructions {
        match instruction {
            Instruction::Literal(text) => out.push_str(text),
            Instruction::Emit {
                value,
                filter,
                span,
            } => {
                let value = evaluate(value, env, runtime, 0, span)?;
                if *filter {
                    out.push_str(&filters::pretty(&value, runtime.config));
                } else {
                    out.push_str(&value.to_string());
                }
            }
            Instruction::Execute { statements, .. } => {
                execute_statements(statements, env, runtime)?;
            }
        }
    }
    Ok(())
}

fn execute_statements(
    statements: &[Statement],
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
) -> Result<(), DiagnosticError> {
    for statement in statements {
        match statement {
            Statement::Assignment {
                variable,
                value,
                declare,
                span,
            } => {
                let value = evaluate(value, env, runtime, 0, span)?;
                let result = if *declare {
                    env.declare(variable, value)
                } else {
                    env.assign(variable, value)
                };
                result.map_err(|e| runtime.error(e, span))?;
            }
            Statement::Expression { value, span } => {
                evaluate(value, env, runtime, 0, span)?;
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                let branch = if evaluate(condition, env, runtime, 0, span)?.is_truthy() {
                    then_branch
                } else {
                    else_branch
                };
                env.push_scope();
                let result = execute_statements(branch, env, runtime);
                env.pop_scope();
                result?;
            }
        }
    }
    Ok(())
}
