//! Tag-delimiter definitions consumed by the template compiler.

use std::fmt;

/// What to strip from the literal text right after a closing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimPolicy {
    None,
    /// Drop a single following line break.
    OneNewline,
    /// Drop all following whitespace.
    AllWhitespace,
}

/// How a tag body executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagClass {
    /// Run for side effects only instead of emitting a value.
    pub statement: bool,
    /// The body may span several lines.
    pub multiline: bool,
}

impl TagClass {
    pub const EXPRESSION: TagClass = TagClass {
        statement: false,
        multiline: false,
    };
    pub const STATEMENT: TagClass = TagClass {
        statement: true,
        multiline: true,
    };
}

#[derive(Clone)]
pub struct TagDef {
    pub open: String,
    pub close: String,
    pub trim: TrimPolicy,
    /// Pass emitted values through the pretty-printing filter.
    pub auto_filter: bool,
    pub classify: Option<fn(&str) -> TagClass>,
    /// Turn the raw body into different script source before parsing.
    pub rewrite: Option<fn(&str) -> String>,
}

impl TagDef {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        TagDef {
            open: open.into(),
            close: close.into(),
            trim: TrimPolicy::None,
            auto_filter: false,
            classify: None,
            rewrite: None,
        }
    }

    pub fn trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }

    pub fn auto_filter(mut self, enabled: bool) -> Self {
        self.auto_filter = enabled;
        self
    }

    pub fn classify(mut self, classify: fn(&str) -> TagClass) -> Self {
        self.classify = Some(classify);
        self
    }

    pub fn rewrite(mut self, rewrite: fn(&str) -> String) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    /// Class of `body`; tags without a classifier hold single-line expressions.
    pub fn class_of(&self, body: &str) -> TagClass {
        match self.classify {
            Some(classify) => classify(body),
            None => TagClass::EXPRESSION,
        }
    }
}

impl fmt::Debug for TagDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagDef")
            .field("open", &self.open)
            .field("close", &self.close)
            .field("trim", &self.trim)
            .field("auto_filter", &self.auto_filter)
            .field("classify", &self.classify.is_some())
            .field("rewrite", &self.rewrite.is_some())
            .finish()
    }
}

/// The set of registered delimiter pairs.
#[derive(Debug, Clone)]
pub struct TagTable {
    tags: Vec<TagDef>,
}

impl TagTable {
    pub fn empty() -> Self {
        TagTable { tags: Vec::new() }
    }

    /// Register a pair. A pair with the same open marker is replaced.
    pub fn push(&mut self, tag: TagDef) {
        self.tags.retain(|t| t.open != tag.open);
        self.tags.push(tag);
    }

    pub fn with(mut self, tag: TagDef) -> Self {
        self.push(tag);
        self
    }

    pub fn get(&self, open: &str) -> Option<&TagDef> {
        self.tags.iter().find(|t| t.open == open)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagDef> {
        self.tags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagTable {
    fn default() -> Self {
        TagTable::empty()
            .with(
                TagDef::new("``{_", "}``")
                    .trim(TrimPolicy::AllWhitespace)
                    .classify(always_statement),
            )
            .with(
                TagDef::new("``{", "}``")
                    .trim(TrimPolicy::OneNewline)
                    .classify(always_statement),
            )
            .with(
                TagDef::new("``[[", "]]``")
                    .auto_filter(true)
                    .rewrite(rewrite_page_ref),
            )
            .with(
                TagDef::new("``((", "))``")
                    .auto_filter(true)
                    .rewrite(rewrite_block_ref),
            )
            .with(
                TagDef::new("``@", "``")
                    .auto_filter(true)
                    .rewrite(rewrite_date_phrase),
            )
            .with(
                TagDef::new("``", "``")
                    .auto_filter(true)
                    .classify(classify_expression_tag),
            )
    }
}

fn always_statement(_body: &str) -> TagClass {
    TagClass::STATEMENT
}

/// Plain tags hold an expression unless the body opens with a statement
/// form (`let`, `if`, or `name = ...`).
pub fn classify_expression_tag(body: &str) -> TagClass {
    let body = body.trim_start();
    let starts_with_keyword = |kw: &str| {
        body.strip_prefix(kw)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '('))
    };
    if starts_with_keyword("let") || starts_with_keyword("if") || is_assignment(body) {
        TagClass::STATEMENT
    } else {
        TagClass::EXPRESSION
    }
}

fn is_assignment(body: &str) -> bool {
    let ident_end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(body.len());
    if ident_end == 0 {
        return false;
    }
    let rest = body[ident_end..].trim_start();
    rest.starts_with('=') && !rest.starts_with("==")
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
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

fn rewrite_page_ref(body: &str) -> String {
    format!("ref({})", quote(&format!("[[{}]]", body.trim())))
}

fn rewrite_block_ref(body: &str) -> String {
    format!("ref({})", quote(&format!("(({}))", body.trim())))
}

fn rewrite_date_phrase(body: &str) -> String {
    format!("date.nlp({})", quote(body.trim()))
}
