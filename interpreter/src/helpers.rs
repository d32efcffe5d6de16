//! Host helper functions callable from template code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use outline::context::ConfigContext;

use crate::error::RuntimeError;
use crate::filters;
use crate::runtime_value::{RecordKind, RuntimeValue};

/// What a helper can see of the render it is called from.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub config: &'a ConfigContext,
}

pub type HelperFn =
    Arc<dyn Fn(&[RuntimeValue], &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> + Send + Sync>;

/// Named helpers. Dotted names (`date.nlp`) are looked up whole.
#[derive(Clone)]
pub struct Helpers {
    functions: HashMap<String, HelperFn>,
}

impl Helpers {
    /// A registry with no helpers at all.
    pub fn empty() -> Self {
        Helpers {
            functions: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[RuntimeValue], &CallSite<'_>) -> Result<RuntimeValue, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&HelperFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Helpers").field("functions", &names).finish()
    }
}

impl Default for Helpers {
    fn default() -> Self {
        let mut helpers = Helpers::empty();
        helpers.register("ref", reference);
        helpers.register("date.today", |_, site| Ok(RuntimeValue::Date(site.config.today)));
        helpers.register("date.nlp", date_nlp);
        helpers.register("date.format", date_format);
        helpers.register("upper", |args, _| Ok(text_arg(args, 0).to_uppercase().into()));
        helpers.register("lower", |args, _| Ok(text_arg(args, 0).to_lowercase().into()));
        helpers.register("trim", |args, _| Ok(text_arg(args, 0).trim().into()));
        helpers.register("len", length);
        helpers.register("join", join);
        helpers.register("empty", |args, _| {
            Ok(args.first().is_none_or(RuntimeValue::is_empty).into())
        });
        helpers.register("when", when);
        helpers.register("fill", |args, _| {
            let fill_char = text_arg(args, 1).chars().next().unwrap_or(' ');
            let width = number_arg(args, 2, "fill")?;
            let align = args.get(3).map(|a| a.to_string()).unwrap_or_default();
            Ok(pad(&text_arg(args, 0), fill_char, width, &align).into())
        });
        helpers.register("zeros", |args, _| {
            let width = number_arg(args, 1, "zeros")?;
            Ok(pad(&text_arg(args, 0), '0', width, "right").into())
        });
        helpers.register("space", |args, _| {
            let width = number_arg(args, 1, "space")?;
            let align = args.get(2).map(|a| a.to_string()).unwrap_or_default();
            Ok(pad(&text_arg(args, 0), ' ', width, &align).into())
        });
        helpers.register("bool", |args, _| Ok(to_bool(args.first())));
        helpers
    }
}

// ---------------------------------------------------------------------------
// Argument coercion
// ---------------------------------------------------------------------------

fn text_arg(args: &[RuntimeValue], index: usize) -> String {
    args.get(index).map(|a| a.to_string()).unwrap_or_default()
}

/// Widest padding the `fill`, `zeros` and `space` helpers produce.
pub const MAX_WIDTH: usize = 4096;

fn number_arg(args: &[RuntimeValue], index: usize, name: &str) -> Result<usize, RuntimeError> {
    let width = match args.get(index) {
        Some(RuntimeValue::Number(n)) if *n >= 0.0 && n.is_finite() => n.trunc(),
        Some(RuntimeValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| *n >= 0.0 && n.is_finite())
            .map(f64::trunc)
            .ok_or_else(|| RuntimeError::helper(name, format!("'{}' is not a width", s)))?,
        Some(other) => {
            return Err(RuntimeError::helper(
                name,
                format!("expected a width, got {}", other.type_name()),
            ));
        }
        None => return Err(RuntimeError::helper(name, "missing width argument")),
    };
    if width > MAX_WIDTH as f64 {
        return Err(RuntimeError::helper(
            name,
            format!("width {} is larger than {}", width, MAX_WIDTH),
        ));
    }
    Ok(width as usize)
}

fn date_arg(value: Option<&RuntimeValue>, today: NaiveDate) -> Option<NaiveDate> {
    match value {
        Some(RuntimeValue::Date(date)) => Some(*date),
        Some(RuntimeValue::String(s)) => parse_date_phrase(s, today),
        Some(RuntimeValue::Record(record)) if record.kind == RecordKind::Page => {
            match record.get("day") {
                Some(RuntimeValue::Date(date)) => Some(*date),
                _ => None,
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn reference(args: &[RuntimeValue], site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    let link = match args.first() {
        Some(RuntimeValue::String(s)) => {
            let s = s.trim();
            if (s.starts_with("[[") && s.ends_with("]]"))
                || (s.starts_with("((") && s.ends_with("))"))
            {
                s.to_string()
            } else {
                format!("[[{}]]", s)
            }
        }
        Some(RuntimeValue::Null) | None => String::new(),
        Some(other) => filters::pretty(other, site.config),
    };
    Ok(link.into())
}

fn date_nlp(args: &[RuntimeValue], site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    Ok(date_arg(args.first(), site.config.today).map_or(RuntimeValue::Null, RuntimeValue::Date))
}

fn date_format(args: &[RuntimeValue], site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    let Some(date) = date_arg(args.first(), site.config.today) else {
        return Ok(RuntimeValue::Null);
    };
    let pattern = match args.get(1) {
        Some(RuntimeValue::String(p)) => p.clone(),
        _ => site.config.date_format.clone(),
    };
    Ok(filters::format_date(date, &pattern).into())
}

fn length(args: &[RuntimeValue], _site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    let n = match args.first() {
        Some(RuntimeValue::String(s)) => s.chars().count(),
        Some(RuntimeValue::List(items)) => items.len(),
        Some(RuntimeValue::Args(a)) => a.len(),
        Some(RuntimeValue::Record(r)) => r.fields.len(),
        Some(RuntimeValue::Null) | None => 0,
        Some(other) => {
            return Err(RuntimeError::helper(
                "len",
                format!("{} has no length", other.type_name()),
            ));
        }
    };
    Ok(RuntimeValue::Number(n as f64))
}

fn join(args: &[RuntimeValue], _site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    let separator = match args.get(1) {
        Some(RuntimeValue::String(s)) => s.as_str(),
        _ => ", ",
    };
    let joined = match args.first() {
        Some(RuntimeValue::List(items)) => items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(separator),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    Ok(joined.into())
}

/// `when(value, template, fallback)`: `template` with `$1` replaced by the
/// value when the value is truthy, otherwise `fallback` (default `""`).
fn when(args: &[RuntimeValue], _site: &CallSite<'_>) -> Result<RuntimeValue, RuntimeError> {
    let value = args.first().cloned().unwrap_or(RuntimeValue::Null);
    if value.is_falsy() {
        return Ok(args.get(2).cloned().unwrap_or_else(|| "".into()));
    }
    Ok(match args.get(1) {
        Some(RuntimeValue::String(template)) => {
            template.replace("$1", &value.to_string()).into()
        }
        Some(other) => other.clone(),
        None => value,
    })
}

/// Pad `text` to `width` chars. `left` keeps the text on the left, `center`
/// splits the padding, anything else right-aligns.
fn pad(text: &str, fill: char, width: usize, align: &str) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let missing = width - len;
    let repeat = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    match align.trim() {
        "left" => format!("{}{}", text, repeat(missing)),
        "center" => {
            let left = missing / 2;
            format!("{}{}{}", repeat(left), text, repeat(missing - left))
        }
        _ => format!("{}{}", repeat(missing), text),
    }
}

fn to_bool(value: Option<&RuntimeValue>) -> RuntimeValue {
    match value {
        Some(RuntimeValue::Boolean(b)) => RuntimeValue::Boolean(*b),
        Some(RuntimeValue::Number(n)) => RuntimeValue::Boolean(*n != 0.0),
        Some(RuntimeValue::String(s)) => match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "true" | "on" | "1" | "+" => RuntimeValue::Boolean(true),
            "no" | "n" | "false" | "off" | "0" | "-" | "" => RuntimeValue::Boolean(false),
            _ => RuntimeValue::Null,
        },
        _ => RuntimeValue::Null,
    }
}

// ---------------------------------------------------------------------------
// Date phrases
// ---------------------------------------------------------------------------

/// Resolve a natural-language date phrase relative to `today`.
///
/// Understands `today`, `tomorrow`, `yesterday`, ISO dates, weekday names
/// (optionally prefixed by `next`, `last` or `this`), `in N days`,
/// `N weeks ago`, and `next month` style shifts.
pub fn parse_date_phrase(phrase: &str, today: NaiveDate) -> Option<NaiveDate> {
    let phrase = phrase.trim().to_lowercase();
    let words: Vec<&str> = phrase.split_whitespace().collect();

    match words.as_slice() {
        [] => None,
        ["today"] | ["now"] => Some(today),
        ["tomorrow"] => today.succ_opt(),
        ["yesterday"] => today.pred_opt(),
        [single] => NaiveDate::parse_from_str(single, "%Y-%m-%d")
            .ok()
            .or_else(|| single.parse::<Weekday>().ok().map(|w| upcoming(today, w, true))),
        ["this", day] => day.parse::<Weekday>().ok().map(|w| upcoming(today, w, true)),
        ["next", unit] | ["last", unit] => {
            let forward = words[0] == "next";
            if let Ok(weekday) = unit.parse::<Weekday>() {
                return Some(if forward {
                    upcoming(today, weekday, false)
                } else {
                    previous(today, weekday)
                });
            }
            shift(today, 1, unit, forward)
        }
        ["in", amount, unit] => shift(today, parse_amount(amount)?, unit, true),
        [amount, unit, "ago"] => shift(today, parse_amount(amount)?, unit, false),
        [amount, unit, "from", "now"] => shift(today, parse_amount(amount)?, unit, true),
        _ => None,
    }
}

fn parse_amount(word: &str) -> Option<u64> {
    match word {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        _ => word.parse().ok(),
    }
}

fn shift(today: NaiveDate, amount: u64, unit: &str, forward: bool) -> Option<NaiveDate> {
    let unit = unit.trim_end_matches('s');
    let days = |n: u64| {
        if forward {
            today.checked_add_days(Days::new(n))
        } else {
            today.checked_sub_days(Days::new(n))
        }
    };
    let months = |n: u32| {
        if forward {
            today.checked_add_months(Months::new(n))
        } else {
            today.checked_sub_months(Months::new(n))
        }
    };
    match unit {
        "day" => days(amount),
        "week" => days(amount.checked_mul(7)?),
        "month" => months(u32::try_from(amount).ok()?),
        "year" => months(u32::try_from(amount).ok()?.checked_mul(12)?),
        _ => None,
    }
}

/// The next `weekday` after `today`; `today` itself when `inclusive`.
fn upcoming(today: NaiveDate, weekday: Weekday, inclusive: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let mut ahead = (7 + target - current) % 7;
    if ahead == 0 && !inclusive {
        ahead = 7;
    }
    today + Days::new(ahead as u64)
}

fn previous(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = today.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let mut behind = (7 + current - target) % 7;
    if behind == 0 {
        behind = 7;
    }
    today - Days::new(behind as u64)
}
