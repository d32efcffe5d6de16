use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use outline::context::ArgsContext;

/// What a record stands for; decides how the pretty filter prints it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Page,
    Block,
    Plain,
}

/// A read-only bag of named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub fields: Arc<BTreeMap<String, RuntimeValue>>,
}

impl Record {
    pub fn new(kind: RecordKind, fields: BTreeMap<String, RuntimeValue>) -> Self {
        Record {
            kind,
            fields: Arc::new(fields),
        }
    }

    pub fn get(&self, field: &str) -> Option<&RuntimeValue> {
        self.fields.get(field)
    }
}

/// A runtime value produced by evaluating an expression.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
    List(Vec<RuntimeValue>),
    Record(Record),
    Date(NaiveDate),
    /// Invocation arguments; member access never fails on them.
    Args(Arc<ArgsContext>),
}

impl RuntimeValue {
    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn is_falsy(&self) -> bool {
        match self {
            RuntimeValue::Boolean(b) => !b,
            RuntimeValue::Null => true,
            RuntimeValue::Number(n) => *n == 0.0 || n.is_nan(),
            RuntimeValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Null, the empty string, and empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            RuntimeValue::Null => true,
            RuntimeValue::String(s) => s.is_empty(),
            RuntimeValue::List(items) => items.is_empty(),
            RuntimeValue::Args(args) => args.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuntimeValue::Number(_) => "Number",
            RuntimeValue::Boolean(_) => "Boolean",
            RuntimeValue::String(_) => "String",
            RuntimeValue::Null => "Null",
            RuntimeValue::List(_) => "List",
            RuntimeValue::Record(r) => match r.kind {
                RecordKind::Page => "Page",
                RecordKind::Block => "Block",
                RecordKind::Plain => "Record",
            },
            RuntimeValue::Date(_) => "Date",
            RuntimeValue::Args(_) => "Args",
        }
    }

    pub fn optional_string(value: Option<&str>) -> RuntimeValue {
        value.map_or(RuntimeValue::Null, |s| RuntimeValue::String(s.to_string()))
    }
}

impl From<&str> for RuntimeValue {
    fn from(s: &str) -> Self {
        RuntimeValue::String(s.to_string())
    }
}

impl From<String> for RuntimeValue {
    fn from(s: String) -> Self {
        RuntimeValue::String(s)
    }
}

impl From<bool> for RuntimeValue {
    fn from(b: bool) -> Self {
        RuntimeValue::Boolean(b)
    }
}

impl From<f64> for RuntimeValue {
    fn from(n: f64) -> Self {
        RuntimeValue::Number(n)
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.floor() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Number(n) => write!(f, "{}", format_number(*n)),
            RuntimeValue::Boolean(b) => write!(f, "{}", b),
            RuntimeValue::String(s) => write!(f, "{}", s),
            RuntimeValue::Null => Ok(()),
            RuntimeValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            RuntimeValue::Record(record) => {
                let label = match record.kind {
                    RecordKind::Page => record.get("name"),
                    RecordKind::Block => record.get("uuid"),
                    RecordKind::Plain => None,
                };
                match label {
                    Some(label) => write!(f, "{}", label),
                    None => write!(f, "[record]"),
                }
            }
            RuntimeValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            RuntimeValue::Args(args) => {
                for (i, (_, value)) in args.entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Number(a), RuntimeValue::Number(b)) => a == b, // NaN != NaN per IEEE 754
            (RuntimeValue::Boolean(a), RuntimeValue::Boolean(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::Null, RuntimeValue::Null) => true,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a == b,
            (RuntimeValue::Record(a), RuntimeValue::Record(b)) => a == b,
            (RuntimeValue::Date(a), RuntimeValue::Date(b)) => a == b,
            (RuntimeValue::Args(a), RuntimeValue::Args(b)) => a == b,
            _ => false,
        }
    }
}
