use std::collections::HashMap;
use std::fmt;

/// A parsed invocation argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    /// `:name` alone is `true`; `:name ""` is `false`.
    Flag(bool),
}

impl ArgValue {
    fn empty() -> Self {
        ArgValue::Text(String::new())
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(s) => write!(f, "{}", s),
            ArgValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Invocation arguments, addressable by name and by 1-based ordinal.
///
/// Ordinals are keyed `$1`, `$2`, ... Undefined lookups yield an empty
/// string instead of failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgsContext {
    entries: Vec<(Option<String>, ArgValue)>,
    keyed: HashMap<String, ArgValue>,
}

impl ArgsContext {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut args = ArgsContext::default();
        for (index, arg) in raw.iter().enumerate() {
            let (name, value) = parse_argument(arg.as_ref());
            if let Some(name) = &name {
                args.keyed.insert(name.clone(), value.clone());
            }
            args.keyed.insert(ordinal_key(index + 1), value.clone());
            args.entries.push((name, value));
        }
        args
    }

    /// Parsed `(name, value)` pairs in invocation order.
    pub fn entries(&self) -> &[(Option<String>, ArgValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based positional lookup.
    pub fn ordinal(&self, position: usize) -> ArgValue {
        self.lookup(&ordinal_key(position))
            .cloned()
            .unwrap_or_else(ArgValue::empty)
    }

    /// Resolve `key` by name, ordinal (`$N`) or a compound of both.
    ///
    /// `name$N` tries the exact key, then `name`, then `$N`; `$Nname` tries
    /// the exact key, then `$N`, then `name`.
    pub fn get(&self, key: &str) -> ArgValue {
        self.lookup(key).cloned().unwrap_or_else(ArgValue::empty)
    }

    pub fn lookup(&self, key: &str) -> Option<&ArgValue> {
        if let Some(value) = self.keyed.get(key) {
            return Some(value);
        }
        if let Some((name, ordinal)) = split_name_then_ordinal(key) {
            return self
                .keyed
                .get(name)
                .or_else(|| self.keyed.get(&ordinal_key(ordinal)));
        }
        if let Some((ordinal, name)) = split_ordinal_then_name(key) {
            return self
                .keyed
                .get(&ordinal_key(ordinal))
                .or_else(|| self.keyed.get(name));
        }
        None
    }
}

fn ordinal_key(position: usize) -> String {
    format!("${}", position)
}

/// `name$3` → `("name", 3)`
fn split_name_then_ordinal(key: &str) -> Option<(&str, usize)> {
    let (name, digits) = key.rsplit_once('$')?;
    if name.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name, digits.parse().ok()?))
}

/// `$3name` → `(3, "name")`
fn split_ordinal_then_name(key: &str) -> Option<(usize, &str)> {
    let rest = key.strip_prefix('$')?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 || digits_end == rest.len() {
        return None;
    }
    Some((rest[..digits_end].parse().ok()?, &rest[digits_end..]))
}

fn parse_argument(raw: &str) -> (Option<String>, ArgValue) {
    let raw = unescape_macro(raw.trim());

    if let Some((name, rest)) = split_named(&raw) {
        let value = if rest.is_empty() {
            ArgValue::Flag(true)
        } else {
            let unquoted = unquote(rest);
            if unquoted.is_empty() {
                ArgValue::Flag(false)
            } else {
                ArgValue::Text(unquoted.to_string())
            }
        };
        return (Some(name.to_string()), value);
    }

    (None, ArgValue::Text(unquote(&raw).to_string()))
}

/// Unfilled `$N` placeholders drop to empty; `$$N` escapes a literal `$N`.
fn unescape_macro(raw: &str) -> String {
    let is_placeholder = |s: &str| s.len() > 1 && s[1..].bytes().all(|b| b.is_ascii_digit());
    if raw.starts_with("$$") && is_placeholder(&raw[1..]) {
        return raw[1..].to_string();
    }
    if raw.starts_with('$') && is_placeholder(raw) {
        return String::new();
    }
    raw.to_string()
}

/// `:name rest` → `("name", "rest")`. The name must be followed by
/// whitespace or the end of the value.
fn split_named(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix(':')?;
    let end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(body.len());
    if end == 0 {
        return None;
    }
    let (name, rest) = body.split_at(end);
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((name, rest.trim()))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
