//! Filter fragments: how each one reads as a query clause and how it
//! applies to a page held in memory.

use std::fmt::Write;
use std::str::FromStr;

use outline::context::normalize_property_name;
use outline::entity::{PageEntity, PropertyValue};
use regex::Regex;

use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Equals,
    StartsWith,
    EndsWith,
    Includes,
    Regex,
}

/// A text comparison, possibly negated. Parsed from the operator names used
/// in filter chains: `"="`, `"!="`, `"starts with"`, `"not starts with"`,
/// `"ends with"`, `"includes"`, `"regex"`, and their `not` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFilter {
    pub op: TextOp,
    pub negated: bool,
}

impl TextFilter {
    pub fn new(op: TextOp) -> Self {
        TextFilter { op, negated: false }
    }

    pub fn not(op: TextOp) -> Self {
        TextFilter { op, negated: true }
    }
}

impl FromStr for TextFilter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "=" | "==" => return Ok(TextFilter::new(TextOp::Equals)),
            "!=" | "≠" => return Ok(TextFilter::not(TextOp::Equals)),
            _ => {}
        }
        let (negated, name) = match normalized.strip_prefix("not ") {
            Some(rest) => (true, rest.trim()),
            None => (false, normalized.as_str()),
        };
        let op = match name {
            "equals" | "equal to" | "is" => TextOp::Equals,
            "starts with" => TextOp::StartsWith,
            "ends with" => TextOp::EndsWith,
            "includes" | "contains" => TextOp::Includes,
            "regex" | "matches" => TextOp::Regex,
            _ => return Err(QueryError::unknown("text", s)),
        };
        Ok(TextFilter { op, negated })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl IntOp {
    fn function(self) -> &'static str {
        match self {
            IntOp::Eq => "=",
            IntOp::Ne => "not=",
            IntOp::Gt => ">",
            IntOp::Ge => ">=",
            IntOp::Lt => "<",
            IntOp::Le => "<=",
        }
    }

    fn test(self, left: i64, right: i64) -> bool {
        match self {
            IntOp::Eq => left == right,
            IntOp::Ne => left != right,
            IntOp::Gt => left > right,
            IntOp::Ge => left >= right,
            IntOp::Lt => left < right,
            IntOp::Le => left <= right,
        }
    }
}

impl FromStr for IntOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(IntOp::Eq),
            "!=" | "≠" => Ok(IntOp::Ne),
            ">" => Ok(IntOp::Gt),
            ">=" | "≥" => Ok(IntOp::Ge),
            "<" => Ok(IntOp::Lt),
            "<=" | "≤" => Ok(IntOp::Le),
            _ => Err(QueryError::unknown("integer", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOp {
    /// Any of the names.
    Includes,
    /// Exactly the names, no more.
    IncludesOnly,
}

impl FromStr for RefOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "includes" | "contains" => Ok(RefOp::Includes),
            "includes only" | "contains only" => Ok(RefOp::IncludesOnly),
            _ => Err(QueryError::unknown("reference", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// What a text test reads from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Lowercase page name.
    Name,
    /// Display name.
    Title,
    /// Text value of a bound property.
    Property(String),
}

#[derive(Debug, Clone)]
pub struct TextTest {
    pub filter: TextFilter,
    pub text: String,
    /// Compiled once when the filter is built.
    pattern: Option<Regex>,
}

impl TextTest {
    pub(crate) fn new(filter: TextFilter, text: &str) -> Result<Self, QueryError> {
        let pattern = match filter.op {
            TextOp::Regex => Some(Regex::new(text)?),
            _ => None,
        };
        Ok(TextTest {
            filter,
            text: text.to_string(),
            pattern,
        })
    }

    fn test(&self, value: &str) -> bool {
        let hit = match self.filter.op {
            TextOp::Equals => value == self.text,
            TextOp::StartsWith => value.starts_with(&self.text),
            TextOp::EndsWith => value.ends_with(&self.text),
            TextOp::Includes => value.contains(&self.text),
            TextOp::Regex => self.pattern.as_ref().is_some_and(|re| re.is_match(value)),
        };
        hit != self.filter.negated
    }
}

/// One fragment group of a page query.
#[derive(Debug, Clone)]
pub enum Filter {
    Text { field: Field, test: TextTest },
    /// Bind a property's raw and text values; pages without it drop out.
    Property(String),
    Empty(String),
    NonEmpty(String),
    Integer { property: String, op: IntOp, value: i64 },
    Reference { property: String, op: RefOp, names: Vec<String> },
}

/// Keyword form of a property name, as the store spells it.
pub(crate) fn property_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .collect()
}

fn raw_var(property: &str) -> String {
    format!("?prop-{}", property)
}

fn text_var(property: &str) -> String {
    format!("?prop-{}-text", property)
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Filter {
    /// Render the fragment. `index` keeps helper variables unique.
    pub fn clause(&self, index: usize) -> String {
        match self {
            Filter::Text { field, test } => {
                let var = match field {
                    Field::Name => "?name".to_string(),
                    Field::Title => "?title".to_string(),
                    Field::Property(p) => text_var(p),
                };
                let text = quote(&test.text);
                let body = match test.filter.op {
                    TextOp::Equals => format!("[(= {} {})]", var, text),
                    TextOp::StartsWith => {
                        format!("[(clojure.string/starts-with? {} {})]", var, text)
                    }
                    TextOp::EndsWith => format!("[(clojure.string/ends-with? {} {})]", var, text),
                    TextOp::Includes => format!("[(clojure.string/includes? {} {})]", var, text),
                    TextOp::Regex => format!(
                        "[(re-pattern {}) ?re-{}] [(re-find ?re-{} {})]",
                        text, index, index, var
                    ),
                };
                if test.filter.negated {
                    format!("(not {})", body)
                } else {
                    body
                }
            }
            Filter::Property(p) => format!(
                "[?p :block/properties ?props] [(get ?props :{}) {}] \
                 [?p :block/properties-text-values ?texts] [(get ?texts :{}) {}]",
                p,
                raw_var(p),
                p,
                text_var(p)
            ),
            Filter::Empty(p) => format!("[(= {} \"\")]", text_var(p)),
            Filter::NonEmpty(p) => format!("[(not= {} \"\")]", text_var(p)),
            Filter::Integer { property, op, value } => format!(
                "[(parse-long {}) ?int-{}] [({} ?int-{} {})]",
                text_var(property),
                index,
                op.function(),
                index,
                value
            ),
            Filter::Reference { property, op, names } => {
                let mut set = String::from("#{");
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        set.push(' ');
                    }
                    let _ = write!(set, "{}", quote(name));
                }
                set.push('}');
                match op {
                    RefOp::Includes => format!(
                        "[(clojure.set/intersection {} {}) ?refs-{}] [(not-empty ?refs-{})]",
                        set,
                        raw_var(property),
                        index,
                        index
                    ),
                    RefOp::IncludesOnly => format!("[(= {} {})]", set, raw_var(property)),
                }
            }
        }
    }

    /// Apply the fragment to a page in memory.
    pub fn matches(&self, page: &PageEntity) -> bool {
        match self {
            Filter::Text { field, test } => match field {
                Field::Name => test.test(&page.name),
                Field::Title => test.test(title(page)),
                Field::Property(p) => property(page, p).is_some_and(|v| test.test(&v.text)),
            },
            Filter::Property(p) => property(page, p).is_some(),
            Filter::Empty(p) => property(page, p).is_some_and(|v| v.text.is_empty()),
            Filter::NonEmpty(p) => property(page, p).is_some_and(|v| !v.text.is_empty()),
            Filter::Integer { property: p, op, value } => property(page, p)
                .and_then(|v| v.text.trim().parse::<i64>().ok())
                .is_some_and(|n| op.test(n, *value)),
            Filter::Reference { property: p, op, names } => {
                let Some(value) = property(page, p) else {
                    return false;
                };
                match op {
                    RefOp::Includes => names.iter().any(|n| value.refs.contains(n)),
                    RefOp::IncludesOnly => {
                        value.refs.len() == names.len()
                            && names.iter().all(|n| value.refs.contains(n))
                    }
                }
            }
        }
    }
}

fn title(page: &PageEntity) -> &str {
    if page.original_name.is_empty() {
        &page.name
    } else {
        &page.original_name
    }
}

fn property<'p>(page: &'p PageEntity, key: &str) -> Option<&'p PropertyValue> {
    let wanted = normalize_property_name(key);
    page.properties
        .iter()
        .find(|(name, _)| normalize_property_name(name) == wanted)
        .map(|(_, value)| value)
}
