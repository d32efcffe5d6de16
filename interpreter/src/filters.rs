use std::fmt::Write;

use chrono::NaiveDate;
use outline::context::ConfigContext;

use crate::runtime_value::{RecordKind, RuntimeValue, format_number};

/// The auto-filter applied to values emitted by filtered tags: pages and
/// dates become page links, blocks become block references.
pub fn pretty(value: &RuntimeValue, config: &ConfigContext) -> String {
    match value {
        RuntimeValue::Null => String::new(),
        RuntimeValue::Number(n) => format_number(*n),
        RuntimeValue::List(items) => items
            .iter()
            .map(|item| pretty(item, config))
            .collect::<Vec<_>>()
            .join(", "),
        RuntimeValue::Record(record) => match record.kind {
            RecordKind::Page => match record.get("name") {
                Some(name) => format!("[[{}]]", name),
                None => String::new(),
            },
            RecordKind::Block => match record.get("uuid") {
                Some(RuntimeValue::String(uuid)) => format!("(({}))", uuid),
                _ => String::new(),
            },
            RecordKind::Plain => value.to_string(),
        },
        RuntimeValue::Date(date) => format!("[[{}]]", format_date(*date, &config.date_format)),
        other => other.to_string(),
    }
}

/// Format with a strftime pattern, falling back to ISO on a bad pattern.
pub fn format_date(date: NaiveDate, pattern: &str) -> String {
    let mut out = String::new();
    match write!(out, "{}", date.format(pattern)) {
        Ok(()) => out,
        Err(_) => date.format("%Y-%m-%d").to_string(),
    }
}
