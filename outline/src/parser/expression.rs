use std::ops::Range;

use crate::instruction::Statement;
use crate::instruction::template_string::{TemplateString, TemplateStringPart};
use crate::instruction::value::{BinaryOperator, UnaryOperator, Value};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    /// Raw body of a backtick literal, with its body offset.
    Backtick(String, usize),
    True,
    False,
    Null,

    // Identifiers
    Ident(String),

    // Keywords
    Let,
    If,
    Else,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,         // =
    EqEq,       // ==
    BangEq,     // !=
    Gt,
    Lt,
    GtEq,
    LtEq,
    AmpAmp,     // &&
    PipePipe,   // ||
    QuestionQuestion, // ??
    Bang,       // !
    Question,   // ?
    Colon,      // :
    Comma,
    Dot,

    // Separators
    Semicolon,
    Newline,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    span: Range<usize>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a single expression. `base` is the absolute offset of `body`.
pub fn parse_expression(body: &str, base: usize, file_id: usize) -> Result<Value, ParseError> {
    let tokens = tokenize(body, base, file_id)?;
    let end = base + body.len();
    let mut parser = ExprParser::new(tokens, end, file_id);
    parser.skip_separators();
    let value = parser.parse_expr(0)?;
    parser.skip_separators();
    if !parser.at_end() {
        return Err(parser.error("unexpected tokens after expression"));
    }
    Ok(value)
}

/// Parse a sequence of statements separated by `;` or line breaks.
pub fn parse_statements(
    body: &str,
    base: usize,
    file_id: usize,
) -> Result<Vec<Statement>, ParseError> {
    let tokens = tokenize(body, base, file_id)?;
    let end = base + body.len();
    let mut parser = ExprParser::new(tokens, end, file_id);
    let statements = parser.parse_block(false)?;
    if !parser.at_end() {
        return Err(parser.error("unexpected '}'"));
    }
    Ok(statements)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(text: &str, base: usize, file_id: usize) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    let push = |tokens: &mut Vec<Spanned>, token: Token, start: usize, end: usize| {
        tokens.push(Spanned {
            token,
            span: base + start..base + end,
        });
    };

    while i < text.len() {
        let c = match text[i..].chars().next() {
            Some(c) => c,
            None => break,
        };
        let start = i;
        match c {
            '\n' => {
                i += 1;
                push(&mut tokens, Token::Newline, start, i);
            }
            c if c.is_whitespace() => {
                i += c.len_utf8();
            }

            // Comments
            '/' if text[i..].starts_with("//") => {
                i = text[i..].find('\n').map(|n| i + n).unwrap_or(text.len());
            }
            '/' if text[i..].starts_with("/*") => {
                let close = text[i + 2..].find("*/").ok_or_else(|| {
                    ParseError::error(
                        "unterminated block comment",
                        base + start..base + text.len(),
                        file_id,
                    )
                })?;
                i = i + 2 + close + 2;
            }

            // String literals
            '"' | '\'' => {
                let (s, end) = scan_string(text, i, c).ok_or_else(|| {
                    ParseError::error(
                        "unterminated string literal",
                        base + start..base + text.len(),
                        file_id,
                    )
                })?;
                i = end;
                push(&mut tokens, Token::StringLit(s), start, i);
            }
            '`' => {
                let end = scan_backtick(text, i).ok_or_else(|| {
                    ParseError::error(
                        "unterminated template literal",
                        base + start..base + text.len(),
                        file_id,
                    )
                })?;
                let raw = text[i + 1..end - 1].to_string();
                push(&mut tokens, Token::Backtick(raw, base + i + 1), start, end);
                i = end;
            }

            // Numbers
            '0'..='9' => {
                while i < text.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    // `1.foo` is a member access on 1, not a fraction
                    if bytes[i] == b'.'
                        && !bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
                    {
                        break;
                    }
                    i += 1;
                }
                let num_str = &text[start..i];
                let n = num_str.parse::<f64>().map_err(|_| {
                    ParseError::error(
                        format!("invalid number '{}'", num_str),
                        base + start..base + i,
                        file_id,
                    )
                })?;
                push(&mut tokens, Token::Number(n), start, i);
            }

            // Identifiers and keywords
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                while let Some(ch) = text[i..].chars().next() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                        i += ch.len_utf8();
                    } else {
                        break;
                    }
                }
                let ident = &text[start..i];
                let token = match ident {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    "let" | "var" | "const" => Token::Let,
                    "if" => Token::If,
                    "else" => Token::Else,
                    _ => Token::Ident(ident.to_string()),
                };
                push(&mut tokens, token, start, i);
            }

            _ => {
                let (token, len) = match_operator(&text[i..]).ok_or_else(|| {
                    ParseError::error(
                        format!("unexpected character '{}'", c),
                        base + start..base + start + c.len_utf8(),
                        file_id,
                    )
                })?;
                i += len;
                push(&mut tokens, token, start, i);
            }
        }
    }

    Ok(tokens)
}

fn match_operator(rest: &str) -> Option<(Token, usize)> {
    // Longest first
    const OPERATORS: &[(&str, fn() -> Token)] = &[
        ("===", || Token::EqEq),
        ("!==", || Token::BangEq),
        ("==", || Token::EqEq),
        ("!=", || Token::BangEq),
        (">=", || Token::GtEq),
        ("<=", || Token::LtEq),
        ("&&", || Token::AmpAmp),
        ("||", || Token::PipePipe),
        ("??", || Token::QuestionQuestion),
        ("=", || Token::Eq),
        (">", || Token::Gt),
        ("<", || Token::Lt),
        ("!", || Token::Bang),
        ("?", || Token::Question),
        (":", || Token::Colon),
        (",", || Token::Comma),
        (".", || Token::Dot),
        (";", || Token::Semicolon),
        ("+", || Token::Plus),
        ("-", || Token::Minus),
        ("*", || Token::Star),
        ("/", || Token::Slash),
        ("%", || Token::Percent),
        ("(", || Token::LParen),
        (")", || Token::RParen),
        ("[", || Token::LBracket),
        ("]", || Token::RBracket),
        ("{", || Token::LBrace),
        ("}", || Token::RBrace),
    ];
    OPERATORS
        .iter()
        .find(|(op, _)| rest.starts_with(op))
        .map(|(op, make)| (make(), op.len()))
}

/// Scan a quoted string starting at `start`; returns the unescaped content
/// and the offset past the closing quote.
fn scan_string(text: &str, start: usize, quote: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = text[start + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                out.push(unescape(escaped));
            }
            c if c == quote => return Some((out, start + 1 + offset + 1)),
            '\n' => return None,
            c => out.push(c),
        }
    }
    None
}

/// Offset past the closing backtick of a literal starting at `start`.
fn scan_backtick(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = start + 1;
    let mut depth = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'$' if depth == 0 && bytes.get(i + 1) == Some(&b'{') => {
                depth = 1;
                i += 1;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b'`' if depth == 0 => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Inside (), [] or call arguments line breaks do not end a statement.
    nesting: usize,
    end: usize,
    file_id: usize,
}

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left.
const BP_CONDITIONAL: u8 = 2;   // ? :
const BP_COALESCE: u8 = 3;      // ??
const BP_OR: u8 = 4;            // ||
const BP_AND: u8 = 6;           // &&
const BP_EQUALITY: u8 = 8;      // == !=
const BP_COMPARISON: u8 = 10;   // < > <= >=
const BP_ADDITIVE: u8 = 12;     // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16;        // ! -

impl ExprParser {
    fn new(tokens: Vec<Spanned>, end: usize, file_id: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            nesting: 0,
            end,
            file_id,
        }
    }

    fn skip_newlines_if_nested(&mut self) {
        if self.nesting > 0 {
            while matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Newline) {
                self.pos += 1;
            }
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.tokens.get(self.pos),
            Some(t) if matches!(t.token, Token::Newline | Token::Semicolon)
        ) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_newlines_if_nested();
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn peek_span(&self) -> Range<usize> {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.clone())
            .unwrap_or(self.end..self.end)
    }

    fn advance(&mut self) -> Option<Spanned> {
        self.skip_newlines_if_nested();
        let t = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(t)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::error(msg, self.peek_span(), self.file_id)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<Range<usize>, ParseError> {
        match self.peek() {
            Some(t) if *t == expected => {
                let span = self.peek_span();
                self.pos += 1;
                Ok(span)
            }
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Range<usize>), ParseError> {
        match self.advance() {
            Some(Spanned {
                token: Token::Ident(name),
                span,
            }) => Ok((name, span)),
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Check if the token stream continues with an assignment: ident = expr
    /// (ident followed by single `=`, not `==`)
    fn is_assignment(&self) -> bool {
        matches!(
            (
                self.tokens.get(self.pos).map(|t| &t.token),
                self.tokens.get(self.pos + 1).map(|t| &t.token)
            ),
            (Some(Token::Ident(_)), Some(Token::Eq))
        )
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Statements up to the end of input, or up to a `}` when `braced`.
    fn parse_block(&mut self, braced: bool) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.tokens.get(self.pos).map(|t| &t.token) {
                None => {
                    if braced {
                        return Err(self.error("expected '}'"));
                    }
                    break;
                }
                Some(Token::RBrace) => {
                    if braced {
                        self.pos += 1;
                    }
                    break;
                }
                Some(_) => {}
            }
            statements.push(self.parse_statement()?);
            match self.tokens.get(self.pos).map(|t| &t.token) {
                None | Some(Token::Newline) | Some(Token::Semicolon) | Some(Token::RBrace) => {}
                Some(_) => return Err(self.error("expected end of statement")),
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let token = self.peek().cloned();
        let start = self.peek_span().start;
        let assignment = self.is_assignment();
        match token {
            Some(Token::Let) => {
                self.advance();
                let (variable, _) = self.expect_ident()?;
                self.expect(Token::Eq, "'=' after variable name")?;
                let value = self.parse_expr(0)?;
                Ok(Statement::Assignment {
                    variable,
                    value,
                    declare: true,
                    span: start..self.last_end(),
                })
            }
            Some(Token::If) => self.parse_if(start),
            _ if assignment => {
                let (variable, _) = self.expect_ident()?;
                self.expect(Token::Eq, "'='")?;
                let value = self.parse_expr(0)?;
                Ok(Statement::Assignment {
                    variable,
                    value,
                    declare: false,
                    span: start..self.last_end(),
                })
            }
            _ => {
                let value = self.parse_expr(0)?;
                Ok(Statement::Expression {
                    value,
                    span: start..self.last_end(),
                })
            }
        }
    }

    fn parse_if(&mut self, start: usize) -> Result<Statement, ParseError> {
        self.advance(); // if
        let condition = self.parse_expr(0)?;
        self.expect(Token::LBrace, "'{' after if condition")?;
        let then_branch = self.parse_block(true)?;

        // `else` may sit on the next line
        let save = self.pos;
        while matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Newline) {
            self.pos += 1;
        }
        let else_branch = if matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Else)
        {
            self.pos += 1;
            if matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::If) {
                let nested_start = self.peek_span().start;
                vec![self.parse_if(nested_start)?]
            } else {
                self.expect(Token::LBrace, "'{' after else")?;
                self.parse_block(true)?
            }
        } else {
            self.pos = save;
            Vec::new()
        };

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            span: start..self.last_end(),
        })
    }

    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span.end)
            .unwrap_or(self.end)
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Value, ParseError> {
        let mut left = self.parse_prefix()?;

        loop {
            // Check for infix operators
            let Some(token) = self.peek().cloned() else { break };
            let Some((l_bp, r_bp)) = infix_bp(&token) else { break };

            if l_bp < min_bp {
                break;
            }

            // Special case: conditional operator (?)
            if token == Token::Question {
                self.advance();
                self.nesting += 1;
                let true_branch = self.parse_expr(0);
                self.nesting -= 1;
                let true_branch = true_branch?;
                self.expect(Token::Colon, "':' in conditional")?;
                let false_branch = self.parse_expr(r_bp)?;
                left = Value::Conditional {
                    condition: Box::new(left),
                    true_branch: Box::new(true_branch),
                    false_branch: Box::new(false_branch),
                };
                continue;
            }

            self.advance();
            let right = self.parse_expr(r_bp)?;

            let operator = match token {
                Token::Plus => BinaryOperator::Addition,
                Token::Minus => BinaryOperator::Subtraction,
                Token::Star => BinaryOperator::Multiplication,
                Token::Slash => BinaryOperator::Division,
                Token::Percent => BinaryOperator::Modulo,
                Token::EqEq => BinaryOperator::Equality,
                Token::BangEq => BinaryOperator::Inequality,
                Token::Gt => BinaryOperator::GreaterThan,
                Token::Lt => BinaryOperator::LessThan,
                Token::GtEq => BinaryOperator::GreaterThanOrEqual,
                Token::LtEq => BinaryOperator::LessThanOrEqual,
                Token::AmpAmp => BinaryOperator::LogicalAnd,
                Token::PipePipe => BinaryOperator::LogicalOr,
                Token::QuestionQuestion => BinaryOperator::Coalesce,
                _ => return Err(self.error("unexpected infix operator")),
            };

            left = Value::BinaryOperation {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Value, ParseError> {
        // An operand may continue on the next line after an operator.
        while matches!(self.tokens.get(self.pos), Some(t) if t.token == Token::Newline) {
            self.pos += 1;
        }
        let Some(Spanned { token, span }) = self.advance() else {
            return Err(self.error("unexpected end of expression"));
        };
        let start = span.start;

        let value = match token {
            // Literals
            Token::Number(n) => Value::NumberLiteral(n),
            Token::StringLit(s) => Value::StringLiteral(s),
            Token::Backtick(raw, offset) => self.parse_backtick(&raw, offset)?,
            Token::True => Value::BooleanLiteral(true),
            Token::False => Value::BooleanLiteral(false),
            Token::Null => Value::NullLiteral,

            // References
            Token::Ident(name) => Value::VariableReference(name, span),

            // Unary operators
            Token::Bang => {
                let operand = self.parse_expr(BP_UNARY)?;
                return Ok(Value::UnaryOperation {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                });
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                return Ok(Value::UnaryOperation {
                    operator: UnaryOperator::Negation,
                    operand: Box::new(operand),
                });
            }

            // Parenthesized expression
            Token::LParen => {
                self.nesting += 1;
                let expr = self.parse_expr(0);
                let close = expr.and_then(|e| self.expect(Token::RParen, "')'").map(|_| e));
                self.nesting -= 1;
                close?
            }

            // List literal
            Token::LBracket => {
                let items = self.parse_list(Token::RBracket, "']'")?;
                Value::ListLiteral(items)
            }

            other => {
                return Err(ParseError::error(
                    format!("unexpected token: {:?}", other),
                    span,
                    self.file_id,
                ));
            }
        };

        self.parse_postfix(value, start)
    }

    /// Member access, indexing and calls bind tighter than any operator.
    fn parse_postfix(&mut self, mut value: Value, start: usize) -> Result<Value, ParseError> {
        loop {
            // A line break ends the postfix chain outside of brackets.
            match self.tokens.get(self.pos).map(|t| &t.token) {
                Some(Token::Newline) if self.nesting == 0 => break,
                _ => {}
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let (field, field_span) = self.expect_ident()?;
                    value = Value::Member {
                        object: Box::new(value),
                        field,
                        span: start..field_span.end,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    self.nesting += 1;
                    let index = self.parse_expr(0);
                    let close = index.and_then(|i| self.expect(Token::RBracket, "']'").map(|s| (i, s)));
                    self.nesting -= 1;
                    let (index, close_span) = close?;
                    value = Value::Index {
                        object: Box::new(value),
                        index: Box::new(index),
                        span: start..close_span.end,
                    };
                }
                Some(Token::LParen) => {
                    self.advance();
                    let args = self.parse_list(Token::RParen, "')'")?;
                    value = Value::Call {
                        callee: Box::new(value),
                        args,
                        span: start..self.last_end(),
                    };
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// Comma-separated expressions up to `close` (already past the opener).
    fn parse_list(&mut self, close: Token, what: &str) -> Result<Vec<Value>, ParseError> {
        self.nesting += 1;
        let result = self.parse_list_inner(close, what);
        self.nesting -= 1;
        result
    }

    fn parse_list_inner(&mut self, close: Token, what: &str) -> Result<Vec<Value>, ParseError> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr(0)?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                    // trailing comma
                    if self.peek() == Some(&close) {
                        self.advance();
                        break;
                    }
                }
                Some(t) if *t == close => {
                    self.advance();
                    break;
                }
                _ => return Err(self.error(format!("expected ',' or {}", what))),
            }
        }
        Ok(items)
    }

    /// Parse a backtick literal's `${expr}` interpolations.
    fn parse_backtick(&self, raw: &str, offset: usize) -> Result<Value, ParseError> {
        let parts = parse_template_parts(raw, offset, self.file_id)?;
        Ok(match (TemplateString { parts }).into_text() {
            Ok(text) => Value::StringLiteral(text),
            Err(ts) => Value::Interpolation(ts),
        })
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::QuestionQuestion => Some((BP_COALESCE, BP_COALESCE + 1)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq => Some((BP_EQUALITY, BP_EQUALITY + 1)),
        Token::Gt | Token::Lt | Token::GtEq | Token::LtEq => {
            Some((BP_COMPARISON, BP_COMPARISON + 1))
        }
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Template string parsing
// ---------------------------------------------------------------------------

/// Split a backtick body into literal text and `${expr}` parts.
fn parse_template_parts(
    s: &str,
    base: usize,
    file_id: usize,
) -> Result<Vec<TemplateStringPart>, ParseError> {
    let mut parts = Vec::new();
    let mut current_literal = String::new();
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    current_literal.push(unescape(escaped));
                }
            }
            '$' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                if !current_literal.is_empty() {
                    parts.push(TemplateStringPart::Literal(std::mem::take(
                        &mut current_literal,
                    )));
                }
                // Find matching }
                let start = i + 2;
                let mut depth = 1u32;
                let mut end = s.len();
                for (j, ch) in chars.by_ref() {
                    if ch == '{' {
                        depth += 1;
                    } else if ch == '}' {
                        depth -= 1;
                        if depth == 0 {
                            end = j;
                            break;
                        }
                    }
                }
                if depth != 0 {
                    return Err(ParseError::error(
                        "unterminated '${' in template literal",
                        base + i..base + s.len(),
                        file_id,
                    ));
                }
                let expr = parse_expression(&s[start..end], base + start, file_id)?;
                parts.push(TemplateStringPart::Expression(expr));
            }
            c => current_literal.push(c),
        }
    }

    if !current_literal.is_empty() || parts.is_empty() {
        parts.push(TemplateStringPart::Literal(current_literal));
    }

    Ok(parts)
}
