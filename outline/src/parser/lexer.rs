use std::ops::Range;

use regex::Regex;

use crate::parser::error::ParseError;
use crate::tags::{TagClass, TagDef, TagTable};

/// A piece of template source: plain text or one delimited tag.
#[derive(Debug)]
pub enum Segment<'s, 't> {
    Text(&'s str),
    Tag(RawTag<'s, 't>),
}

#[derive(Debug)]
pub struct RawTag<'s, 't> {
    pub def: &'t TagDef,
    pub body: &'s str,
    /// Absolute offset of `body`.
    pub body_start: usize,
    /// Open marker through close marker.
    pub span: Range<usize>,
    pub class: TagClass,
}

/// Scans template source for the open markers of a tag table.
#[derive(Debug)]
pub struct Lexer<'t> {
    table: &'t TagTable,
    opens: Option<Regex>,
}

impl<'t> Lexer<'t> {
    pub fn new(table: &'t TagTable) -> Result<Self, regex::Error> {
        if table.is_empty() {
            return Ok(Lexer { table, opens: None });
        }
        let mut opens: Vec<&str> = table.iter().map(|t| t.open.as_str()).collect();
        // Alternation is leftmost-first, so longer markers must come first.
        opens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let pattern = opens
            .iter()
            .map(|o| regex::escape(o))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Lexer {
            table,
            opens: Some(Regex::new(&pattern)?),
        })
    }

    pub fn segments<'s>(
        &self,
        source: &'s str,
        file_id: usize,
    ) -> Result<Vec<Segment<'s, 't>>, ParseError> {
        let mut segments = Vec::new();
        let Some(opens) = &self.opens else {
            if !source.is_empty() {
                segments.push(Segment::Text(source));
            }
            return Ok(segments);
        };

        let mut text_start = 0;
        let mut pos = 0;
        while let Some(m) = opens.find_at(source, pos) {
            let Some(def) = self.table.get(m.as_str()) else {
                break;
            };
            let body_start = m.end();
            let close_at = find_close(source, body_start, def, m.range(), file_id)?;
            let body = &source[body_start..close_at];
            let class = def.class_of(body);

            if body.contains('\n') && !class.statement && !class.multiline {
                // Not a tag after all; try again one character later.
                pos = m.start() + source[m.start()..].chars().next().map_or(1, char::len_utf8);
                continue;
            }

            if m.start() > text_start {
                segments.push(Segment::Text(&source[text_start..m.start()]));
            }
            let end = close_at + def.close.len();
            segments.push(Segment::Tag(RawTag {
                def,
                body,
                body_start,
                span: m.start()..end,
                class,
            }));
            text_start = end;
            pos = end;
        }

        if text_start < source.len() {
            segments.push(Segment::Text(&source[text_start..]));
        }
        Ok(segments)
    }
}

/// Offset of the close marker for a tag whose body starts at `from`.
///
/// Script bodies skip quoted strings, template literals and block comments,
/// so a close marker inside them does not end the tag.
fn find_close(
    source: &str,
    from: usize,
    def: &TagDef,
    open: Range<usize>,
    file_id: usize,
) -> Result<usize, ParseError> {
    let bytes = source.as_bytes();
    let close = def.close.as_bytes();
    let script = def.rewrite.is_none();
    let mut i = from;

    while i < bytes.len() {
        if bytes[i..].starts_with(close) {
            return Ok(i);
        }
        if !script {
            i += 1;
            continue;
        }
        i = match bytes[i] {
            q @ (b'\'' | b'"') => skip_quoted(bytes, i, q).ok_or_else(|| {
                ParseError::error("unterminated string literal", i..bytes.len(), file_id)
                    .locate(source)
            })?,
            b'`' => skip_template(bytes, i).ok_or_else(|| {
                ParseError::error("unterminated template literal", i..bytes.len(), file_id)
                    .locate(source)
            })?,
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_comment(bytes, i).ok_or_else(|| {
                ParseError::error("unterminated block comment", i..bytes.len(), file_id)
                    .locate(source)
            })?,
            _ => i + 1,
        };
    }

    Err(ParseError::error(
        format!("unterminated tag: expected '{}'", def.close),
        open,
        file_id,
    )
    .locate(source))
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn skip_template(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = skip_interpolation(bytes, i + 2)?;
            }
            _ => i += 1,
        }
    }
    None
}

/// Skip a `${ ... }` body; nested strings and templates may contain braces.
fn skip_interpolation(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"') => {
                i = skip_quoted(bytes, i, q)?;
                continue;
            }
            b'`' => {
                i = skip_template(bytes, i)?;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn skip_comment(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}
