//! Tokenizer for relaxed MongoDB extended JSON.
//!
//! The scanner understands the MongoDB shell dialect of JSON: single- and double-quoted strings,
//! unquoted words (`$toUpper`, `ObjectId`, `true`), regular expression literals (`/^a/i`) and
//! unquoted placeholders (`?0`). It has no notion of grammar; [`JsonReader`](crate::reader::JsonReader)
//! decides what a token means where it appears.
//!
//! Tokenization is generated by logos from the patterns on [`TokenKind`].

use bson::Bson;
use logos::{Lexer, Logos};
use std::fmt;

use crate::error::{ExpressionError, ExpressionResult};

/// Why a piece of input could not be tokenized.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
pub enum ScanError {
    #[default]
    #[error("unexpected character")]
    UnexpectedCharacter,

    #[error("unterminated string")]
    UnterminatedString,

    #[error("unterminated regular expression")]
    UnterminatedRegex,

    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("invalid unicode escape sequence")]
    InvalidUnicodeEscape,

    #[error("unpaired surrogate in unicode escape")]
    UnpairedSurrogate,

    #[error("invalid number")]
    InvalidNumber,
}

/// A numeric literal, already narrowed to the smallest BSON type that holds it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// An integer that fits in 32 bits.
    Int32(i32),
    /// An integer that fits in 64 bits.
    Int64(i64),
    /// A floating point number, or an integer too large for 64 bits.
    Double(f64),
}

impl From<Number> for Bson {
    fn from(number: Number) -> Self {
        match number {
            Number::Int32(value) => Bson::Int32(value),
            Number::Int64(value) => Bson::Int64(value),
            Number::Double(value) => Bson::Double(value),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int32(value) => write!(f, "{value}"),
            Number::Int64(value) => write!(f, "{value}"),
            Number::Double(value) => write!(f, "{value}"),
        }
    }
}

/// A `/pattern/flags` literal.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexLiteral {
    /// The pattern between the slashes, with `\/` unescaped.
    pub pattern: String,
    /// The flags after the closing slash.
    pub options: String,
}

/// The kind of a scanned token, along with its payload.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = ScanError)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    /// `{`
    #[token("{")]
    BeginObject,
    /// `}`
    #[token("}")]
    EndObject,
    /// `[`
    #[token("[")]
    BeginArray,
    /// `]`
    #[token("]")]
    EndArray,
    /// `(`
    #[token("(")]
    LeftParen,
    /// `)`
    #[token(")")]
    RightParen,
    /// `:`
    #[token(":")]
    Colon,
    /// `,`
    #[token(",")]
    Comma,

    /// A single- or double-quoted string, unescaped.
    #[regex(r#""([^"\\]|\\.)*""#, quoted_string)]
    #[regex(r"'([^'\\]|\\.)*'", quoted_string)]
    #[regex(r#""([^"\\]|\\.)*"#, unterminated_string)]
    #[regex(r"'([^'\\]|\\.)*", unterminated_string)]
    String(String),

    /// An unquoted word such as `true`, `$name` or `ISODate`.
    #[regex(r"[\p{L}$_][\p{L}\p{N}$_.]*", |lex| lex.slice().to_string())]
    Unquoted(String),

    /// An unquoted `?N` token, as written.
    #[regex(r"\?[0-9]+", |lex| lex.slice().to_string())]
    Placeholder(String),

    /// A numeric literal.
    #[regex(r"-?[0-9]+", integer)]
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", double)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", double)]
    #[token("-Infinity", |_| Number::Double(f64::NEG_INFINITY))]
    Number(Number),

    /// A `/pattern/flags` literal.
    #[regex(r"/([^/\\\n]|\\.)*/[a-zA-Z]*", regex_literal)]
    #[regex(r"/([^/\\\n]|\\.)*", unterminated_regex)]
    Regex(RegexLiteral),

    /// End of input. Never produced by the lexer itself.
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::BeginObject => f.write_str("'{'"),
            TokenKind::EndObject => f.write_str("'}'"),
            TokenKind::BeginArray => f.write_str("'['"),
            TokenKind::EndArray => f.write_str("']'"),
            TokenKind::LeftParen => f.write_str("'('"),
            TokenKind::RightParen => f.write_str("')'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::String(value) => write!(f, "string {value:?}"),
            TokenKind::Unquoted(value) => write!(f, "'{value}'"),
            TokenKind::Placeholder(raw) => write!(f, "placeholder {raw}"),
            TokenKind::Number(number) => write!(f, "number {number}"),
            TokenKind::Regex(regex) => write!(f, "regular expression /{}/{}", regex.pattern, regex.options),
            TokenKind::End => f.write_str("end of input"),
        }
    }
}

fn quoted_string(lex: &mut Lexer<'_, TokenKind>) -> Result<String, ScanError> {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

fn unterminated_string(_: &mut Lexer<'_, TokenKind>) -> Result<String, ScanError> {
    Err(ScanError::UnterminatedString)
}

fn integer(lex: &mut Lexer<'_, TokenKind>) -> Result<Number, ScanError> {
    match lex.slice().parse::<i64>() {
        Ok(value) => Ok(i32::try_from(value).map_or(Number::Int64(value), Number::Int32)),
        Err(_) => double(lex),
    }
}

fn double(lex: &mut Lexer<'_, TokenKind>) -> Result<Number, ScanError> {
    lex.slice()
        .parse::<f64>()
        .map(Number::Double)
        .map_err(|_| ScanError::InvalidNumber)
}

fn regex_literal(lex: &mut Lexer<'_, TokenKind>) -> Option<RegexLiteral> {
    let slice = lex.slice();
    // Flags are letters only, so the last slash closes the pattern.
    let close = slice.rfind('/')?;

    let mut pattern = String::with_capacity(close);
    let mut chars = slice.get(1..close)?.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            pattern.push(c);
            continue;
        }
        match chars.next() {
            Some('/') => pattern.push('/'),
            Some(escaped) => {
                pattern.push('\\');
                pattern.push(escaped);
            }
            None => pattern.push('\\'),
        }
    }

    Some(RegexLiteral { pattern, options: slice[close + 1..].to_string() })
}

fn unterminated_regex(_: &mut Lexer<'_, TokenKind>) -> Result<RegexLiteral, ScanError> {
    Err(ScanError::UnterminatedRegex)
}

fn unescape(body: &str) -> Result<String, ScanError> {
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => value.push('"'),
            Some('\'') => value.push('\''),
            Some('\\') => value.push('\\'),
            Some('/') => value.push('/'),
            Some('b') => value.push('\u{0008}'),
            Some('f') => value.push('\u{000C}'),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('t') => value.push('\t'),
            Some('u') => value.push(unicode_escape(&mut chars)?),
            Some(other) => return Err(ScanError::InvalidEscape(other)),
            None => return Err(ScanError::UnterminatedString),
        }
    }

    Ok(value)
}

fn hex4(chars: &mut std::str::Chars<'_>) -> Result<u32, ScanError> {
    let digits = chars.by_ref().take(4).collect::<String>();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ScanError::InvalidUnicodeEscape);
    }
    u32::from_str_radix(&digits, 16).map_err(|_| ScanError::InvalidUnicodeEscape)
}

fn unicode_escape(chars: &mut std::str::Chars<'_>) -> Result<char, ScanError> {
    let high = hex4(chars)?;

    let code = if (0xD800..0xDC00).contains(&high) {
        if chars.next() != Some('\\') || chars.next() != Some('u') {
            return Err(ScanError::UnpairedSurrogate);
        }
        let low = hex4(chars)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Err(ScanError::UnpairedSurrogate);
        }
        0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
    } else {
        high
    };

    char::from_u32(code).ok_or(ScanError::InvalidUnicodeEscape)
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was scanned.
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub offset: usize,
}

/// Splits relaxed extended JSON text into [`Token`]s.
#[derive(Clone)]
pub struct JsonScanner<'a> {
    lexer: Lexer<'a, TokenKind>,
}

impl<'a> JsonScanner<'a> {
    /// Creates a scanner positioned at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self { lexer: TokenKind::lexer(source) }
    }

    /// The text being scanned.
    pub fn source(&self) -> &'a str {
        self.lexer.source()
    }

    /// Scans the next token. Returns [`TokenKind::End`] once the input is exhausted.
    pub fn next_token(&mut self) -> ExpressionResult<Token> {
        match self.lexer.next() {
            None => Ok(Token { kind: TokenKind::End, offset: self.source().len() }),
            Some(Ok(kind)) => Ok(Token { kind, offset: self.lexer.span().start }),
            Some(Err(err)) => {
                let message = match err {
                    ScanError::UnexpectedCharacter => format!("unexpected character '{}'", self.lexer.slice()),
                    other => other.to_string(),
                };
                Err(ExpressionError::parse_at(self.source(), self.lexer.span().start, message))
            }
        }
    }
}

impl fmt::Debug for JsonScanner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonScanner")
            .field("source", &self.source())
            .field("position", &self.lexer.span().end)
            .finish()
    }
}
