use std::cmp::Ordering;
use std::ops::Range;

use chrono::{Datelike, Days};
use outline::instruction::template_string::{TemplateString, TemplateStringPart};
use outline::instruction::value::{BinaryOperator, UnaryOperator, Value};
use outline::node::{CURSOR_MARKER, OutlineNode};

use crate::environment::Environment;
use crate::error::{DiagnosticError, RuntimeError};
use crate::executor::Runtime;
use crate::helpers::CallSite;
use crate::runtime_value::RuntimeValue;

const MAX_DEPTH: usize = 256;

/// Evaluate a Value AST node to produce a RuntimeValue.
pub fn evaluate(
    value: &Value,
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
    depth: usize,
    instruction_span: &Range<usize>,
) -> Result<RuntimeValue, DiagnosticError> {
    if depth > MAX_DEPTH {
        return Err(runtime.error(RuntimeError::StackOverflow, instruction_span));
    }

    match value {
        // --- Literals ---
        Value::NumberLiteral(n) => Ok(RuntimeValue::Number(*n)),
        Value::StringLiteral(s) => Ok(RuntimeValue::String(s.clone())),
        Value::BooleanLiteral(b) => Ok(RuntimeValue::Boolean(*b)),
        Value::NullLiteral => Ok(RuntimeValue::Null),
        Value::ListLiteral(items) => {
            let items = items
                .iter()
                .map(|item| evaluate(item, env, runtime, depth + 1, instruction_span))
                .collect::<Result<_, _>>()?;
            Ok(RuntimeValue::List(items))
        }
        Value::Interpolation(template) => {
            let s = eval_template_string(template, env, runtime, depth + 1, instruction_span)?;
            Ok(RuntimeValue::String(s))
        }

        // --- References ---
        Value::VariableReference(name, value_span) => {
            if let Some(value) = env.get_variable(name) {
                return Ok(value.clone());
            }
            // `$1`, `$name`: shorthand for argument lookups
            if name.starts_with('$') {
                if let Some(RuntimeValue::Args(args)) = env.get_variable("args") {
                    return Ok(arg_value(args.get(name)));
                }
            }
            let span = if value_span.is_empty() { instruction_span } else { value_span };
            Err(runtime.error(RuntimeError::UndefinedVariable(name.clone()), span))
        }

        Value::Member {
            object,
            field,
            span,
        } => {
            let object = evaluate(object, env, runtime, depth + 1, instruction_span)?;
            member(&object, field).map_err(|e| runtime.error(e, span))
        }

        Value::Index {
            object,
            index,
            span,
        } => {
            let object = evaluate(object, env, runtime, depth + 1, instruction_span)?;
            let index = evaluate(index, env, runtime, depth + 1, instruction_span)?;
            index_value(&object, &index).map_err(|e| runtime.error(e, span))
        }

        Value::Call { callee, args, span } => {
            call(callee, args, env, runtime, depth, span)
        }

        // --- Operations ---
        Value::UnaryOperation { operator, operand } => {
            let val = evaluate(operand, env, runtime, depth + 1, instruction_span)?;
            match operator {
                UnaryOperator::Negation => {
                    let n = coerce_number(&val).map_err(|e| runtime.error(e, instruction_span))?;
                    Ok(RuntimeValue::Number(-n))
                }
                UnaryOperator::LogicalNot => Ok(RuntimeValue::Boolean(val.is_falsy())),
            }
        }

        Value::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let l = evaluate(left, env, runtime, depth + 1, instruction_span)?;
            // Short-circuiting operators yield one of their operands.
            match operator {
                BinaryOperator::LogicalAnd if l.is_falsy() => return Ok(l),
                BinaryOperator::LogicalOr if l.is_truthy() => return Ok(l),
                BinaryOperator::Coalesce if !l.is_empty() => return Ok(l),
                BinaryOperator::LogicalAnd
                | BinaryOperator::LogicalOr
                | BinaryOperator::Coalesce => {
                    return evaluate(right, env, runtime, depth + 1, instruction_span);
                }
                _ => {}
            }
            let r = evaluate(right, env, runtime, depth + 1, instruction_span)?;
            eval_binary_op(operator, &l, &r).map_err(|e| runtime.error(e, instruction_span))
        }

        // --- Conditional ---
        Value::Conditional {
            condition,
            true_branch,
            false_branch,
        } => {
            let cond_val = evaluate(condition, env, runtime, depth + 1, instruction_span)?;
            if cond_val.is_truthy() {
                evaluate(true_branch, env, runtime, depth + 1, instruction_span)
            } else {
                evaluate(false_branch, env, runtime, depth + 1, instruction_span)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

fn call(
    callee: &Value,
    args: &[Value],
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
    depth: usize,
    span: &Range<usize>,
) -> Result<RuntimeValue, DiagnosticError> {
    let path = callee.path();

    if let Some(path) = path.as_deref() {
        if is_builtin(path) {
            let args = evaluate_all(args, env, runtime, depth, span)?;
            return call_builtin(path, args, runtime).map_err(|e| runtime.error(e, span));
        }
        if let Some(helper) = runtime.helpers.get(path).cloned() {
            let args = evaluate_all(args, env, runtime, depth, span)?;
            let site = CallSite {
                config: runtime.config,
            };
            return helper(&args, &site).map_err(|e| runtime.error(e, span));
        }
    }

    // `value.helper(x)` calls `helper(value, x)`
    if let Value::Member { object, field, .. } = callee {
        if let Some(helper) = runtime.helpers.get(field).cloned() {
            let receiver = evaluate(object, env, runtime, depth + 1, span)?;
            let mut all = vec![receiver];
            all.extend(evaluate_all(args, env, runtime, depth, span)?);
            let site = CallSite {
                config: runtime.config,
            };
            return helper(&all, &site).map_err(|e| runtime.error(e, span));
        }
    }

    let name = path.unwrap_or_else(|| "<expression>".to_string());
    Err(runtime.error(RuntimeError::UndefinedFunction(name), span))
}

fn evaluate_all(
    args: &[Value],
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
    depth: usize,
    span: &Range<usize>,
) -> Result<Vec<RuntimeValue>, DiagnosticError> {
    args.iter()
        .map(|a| evaluate(a, env, runtime, depth + 1, span))
        .collect()
}

const BUILTINS: [&str; 4] = ["cursor", "set_uuid", "spawn", "append"];

fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Builtins that write into the node's render state.
fn call_builtin(
    name: &str,
    args: Vec<RuntimeValue>,
    runtime: &mut Runtime<'_>,
) -> Result<RuntimeValue, RuntimeError> {
    match name {
        "cursor" => Ok(RuntimeValue::String(CURSOR_MARKER.to_string())),
        "set_uuid" => {
            let id = args.first().map(|a| a.to_string()).unwrap_or_default();
            if id.trim().is_empty() {
                return Err(RuntimeError::helper("set_uuid", "expected a non-empty id"));
            }
            runtime.state.uuid = Some(id.trim().to_string());
            Ok(RuntimeValue::Null)
        }
        "spawn" => {
            runtime.state.spawned.extend(nodes_from(args));
            Ok(RuntimeValue::Null)
        }
        "append" => {
            runtime.state.appended.extend(nodes_from(args));
            Ok(RuntimeValue::Null)
        }
        other => Err(RuntimeError::UndefinedFunction(other.to_string())),
    }
}

/// One node per text argument; lists contribute one node per item.
fn nodes_from(args: Vec<RuntimeValue>) -> Vec<OutlineNode> {
    let mut nodes = Vec::new();
    for arg in args {
        match arg {
            RuntimeValue::Null => {}
            RuntimeValue::List(items) => nodes.extend(nodes_from(items)),
            other => nodes.push(OutlineNode::new(other.to_string())),
        }
    }
    nodes
}

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

fn arg_value(value: outline::context::ArgValue) -> RuntimeValue {
    match value {
        outline::context::ArgValue::Text(s) => RuntimeValue::String(s),
        outline::context::ArgValue::Flag(b) => RuntimeValue::Boolean(b),
    }
}

fn member(object: &RuntimeValue, field: &str) -> Result<RuntimeValue, RuntimeError> {
    match object {
        RuntimeValue::Record(record) => Ok(record.get(field).cloned().unwrap_or(RuntimeValue::Null)),
        RuntimeValue::Args(args) => match args.lookup(field) {
            Some(value) => Ok(arg_value(value.clone())),
            None if field == "length" => Ok(RuntimeValue::Number(args.len() as f64)),
            None => Ok(RuntimeValue::String(String::new())),
        },
        RuntimeValue::String(s) if field == "length" => {
            Ok(RuntimeValue::Number(s.chars().count() as f64))
        }
        RuntimeValue::List(items) if field == "length" => {
            Ok(RuntimeValue::Number(items.len() as f64))
        }
        RuntimeValue::Date(date) => match field {
            "year" => Ok(RuntimeValue::Number(date.year() as f64)),
            "month" => Ok(RuntimeValue::Number(date.month() as f64)),
            "day" => Ok(RuntimeValue::Number(date.day() as f64)),
            "weekday" => Ok(RuntimeValue::String(date.format("%A").to_string())),
            _ => Err(invalid_member(object, field)),
        },
        _ => Err(invalid_member(object, field)),
    }
}

fn invalid_member(object: &RuntimeValue, field: &str) -> RuntimeError {
    RuntimeError::InvalidMember {
        field: field.to_string(),
        target: object.type_name().to_string(),
    }
}

fn index_value(object: &RuntimeValue, index: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match (object, index) {
        (RuntimeValue::List(items), RuntimeValue::Number(n)) => Ok(position(*n)
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(RuntimeValue::Null)),
        (RuntimeValue::String(s), RuntimeValue::Number(n)) => Ok(position(*n)
            .and_then(|i| s.chars().nth(i))
            .map_or(RuntimeValue::Null, |c| RuntimeValue::String(c.to_string()))),
        (RuntimeValue::Args(args), RuntimeValue::Number(n)) => {
            Ok(position(*n).map_or(RuntimeValue::String(String::new()), |i| arg_value(args.ordinal(i))))
        }
        (RuntimeValue::Record(_) | RuntimeValue::Args(_), RuntimeValue::String(key)) => {
            member(object, key)
        }
        _ => Err(RuntimeError::TypeError {
            expected: "List, String or Record index".to_string(),
            got: format!("{}[{}]", object.type_name(), index.type_name()),
        }),
    }
}

fn position(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn coerce_number(val: &RuntimeValue) -> Result<f64, RuntimeError> {
    match val {
        RuntimeValue::Number(n) => Ok(*n),
        RuntimeValue::String(s) => s.trim().parse().map_err(|_| RuntimeError::TypeError {
            expected: "Number".to_string(),
            got: format!("String '{}'", s),
        }),
        other => Err(RuntimeError::TypeError {
            expected: "Number".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn eval_binary_op(
    op: &BinaryOperator,
    left: &RuntimeValue,
    right: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => {
                Ok(RuntimeValue::Number(a + b))
            }
            (RuntimeValue::Date(date), RuntimeValue::Number(n)) => shift_date(*date, *n),
            (RuntimeValue::List(a), RuntimeValue::List(b)) => {
                Ok(RuntimeValue::List(a.iter().chain(b).cloned().collect()))
            }
            (RuntimeValue::String(_), _) | (_, RuntimeValue::String(_)) => {
                Ok(RuntimeValue::String(format!("{}{}", left, right)))
            }
            _ => Err(RuntimeError::TypeError {
                expected: "matching numeric or string types".to_string(),
                got: format!("{} + {}", left.type_name(), right.type_name()),
            }),
        },
        BinaryOperator::Subtraction => match (left, right) {
            (RuntimeValue::Date(date), RuntimeValue::Number(n)) => shift_date(*date, -n),
            (RuntimeValue::Date(a), RuntimeValue::Date(b)) => {
                Ok(RuntimeValue::Number((*a - *b).num_days() as f64))
            }
            _ => numeric_binop(left, right, |a, b| a - b),
        },
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(a / b))
        }
        BinaryOperator::Modulo => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(RuntimeValue::Number(a % b))
        }
        BinaryOperator::Equality => Ok(RuntimeValue::Boolean(loose_eq(left, right))),
        BinaryOperator::Inequality => Ok(RuntimeValue::Boolean(!loose_eq(left, right))),
        BinaryOperator::GreaterThan => compare(left, right, Ordering::is_gt),
        BinaryOperator::LessThan => compare(left, right, Ordering::is_lt),
        BinaryOperator::GreaterThanOrEqual => compare(left, right, Ordering::is_ge),
        BinaryOperator::LessThanOrEqual => compare(left, right, Ordering::is_le),
        // Short-circuited in `evaluate`
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr | BinaryOperator::Coalesce => {
            Ok(right.clone())
        }
    }
}

/// Equality that lets a number match its decimal string form, since
/// arguments and properties always arrive as text.
fn loose_eq(left: &RuntimeValue, right: &RuntimeValue) -> bool {
    match (left, right) {
        (RuntimeValue::Number(n), RuntimeValue::String(s))
        | (RuntimeValue::String(s), RuntimeValue::Number(n)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        _ => left == right,
    }
}

fn shift_date(date: chrono::NaiveDate, days: f64) -> Result<RuntimeValue, RuntimeError> {
    let magnitude = Days::new(days.abs() as u64);
    let shifted = if days >= 0.0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted
        .map(RuntimeValue::Date)
        .ok_or_else(|| RuntimeError::Custom("date out of range".to_string()))
}

fn numeric_binop(
    left: &RuntimeValue,
    right: &RuntimeValue,
    f: impl Fn(f64, f64) -> f64,
) -> Result<RuntimeValue, RuntimeError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(RuntimeValue::Number(f(a, b)))
}

fn compare(
    left: &RuntimeValue,
    right: &RuntimeValue,
    f: impl Fn(Ordering) -> bool,
) -> Result<RuntimeValue, RuntimeError> {
    let ordering = match (left, right) {
        (RuntimeValue::String(a), RuntimeValue::String(b)) => Some(a.cmp(b)),
        (RuntimeValue::Date(a), RuntimeValue::Date(b)) => Some(a.cmp(b)),
        _ => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            a.partial_cmp(&b)
        }
    };
    Ok(RuntimeValue::Boolean(ordering.is_some_and(f)))
}

pub fn eval_template_string(
    ts: &TemplateString,
    env: &mut Environment,
    runtime: &mut Runtime<'_>,
    depth: usize,
    instruction_span: &Range<usize>,
) -> Result<String, DiagnosticError> {
    let mut result = String::new();
    for part in &ts.parts {
        match part {
            TemplateStringPart::Literal(s) => result.push_str(s),
            TemplateStringPart::Expression(expr) => {
                let val = evaluate(expr, env, runtime, depth, instruction_span)?;
                result.push_str(&val.to_string());
            }
        }
    }
    Ok(result)
}
