//! Reader turning relaxed MongoDB extended JSON into BSON documents.
//!
//! Besides strict JSON, the reader accepts what people write in the MongoDB shell and in query
//! annotations:
//!
//! - single-quoted strings and unquoted keys (`{ name: 'Alice' }`)
//! - unquoted words as values (`{ $toUpper: $name }` reads `$name` as a string)
//! - regular expression literals (`/^A/i`)
//! - shell constructors (`ObjectId('…')`, `ISODate('…')`, `NumberLong(5)`, `UUID('…')`, …)
//! - extended JSON wrappers (`{ $oid: '…' }`, `{ $date: '…' }`, `{ $numberLong: '5' }`, …)
//!
//! When a [`BindingContext`] is attached, placeholders (`?0`, `'?1'`) are replaced by the encoded
//! arguments they reference. Without one, placeholders are read as plain strings.

use bson::{Bson, Document, Timestamp, oid::ObjectId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::json;

use crate::{
    binding::{BindingContext, parse_placeholder},
    error::{ExpressionError, ExpressionResult},
    scanner::{JsonScanner, Token, TokenKind},
};

/// Keys that mark a document as an extended JSON wrapper for a single BSON value.
const EXTENDED_JSON_KEYS: [&str; 15] = [
    "$oid",
    "$date",
    "$numberInt",
    "$numberLong",
    "$numberDouble",
    "$numberDecimal",
    "$binary",
    "$uuid",
    "$timestamp",
    "$regularExpression",
    "$symbol",
    "$code",
    "$minKey",
    "$maxKey",
    "$dbPointer",
];

/// Reads one document from relaxed extended JSON text.
///
/// # Example
///
/// ```ignore
/// use docbind_core::reader::JsonReader;
///
/// let document = JsonReader::new("{ $toUpper: $name }").read_document()?;
/// assert_eq!(document.get_str("$toUpper")?, "$name");
/// ```
#[derive(Debug)]
pub struct JsonReader<'a> {
    scanner: JsonScanner<'a>,
    binding: Option<BindingContext<'a>>,
    lookahead: Option<Token>,
}

impl<'a> JsonReader<'a> {
    /// Creates a reader over `source` with placeholder binding disabled.
    pub fn new(source: &'a str) -> Self {
        Self { scanner: JsonScanner::new(source), binding: None, lookahead: None }
    }

    /// Enables placeholder binding against `binding`.
    pub fn with_binding(mut self, binding: BindingContext<'a>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Reads the whole input as a single document.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Parse`] if the input is not exactly one document, or any binding
    /// error raised while substituting placeholders.
    pub fn read_document(mut self) -> ExpressionResult<Document> {
        let token = self.next()?;
        if token.kind != TokenKind::BeginObject {
            return Err(self.unexpected(&token, "'{'"));
        }

        let value = self.read_object(token.offset)?;

        let trailing = self.next()?;
        if trailing.kind != TokenKind::End {
            return Err(self.unexpected(&trailing, "end of input"));
        }

        match value {
            Bson::Document(document) => Ok(document),
            other => Err(self.error_at(
                token.offset,
                format!("expected a document, found extended JSON for {:?}", other.element_type()),
            )),
        }
    }

    fn next(&mut self) -> ExpressionResult<Token> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.scanner.next_token(),
        }
    }

    fn peek(&mut self) -> ExpressionResult<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.scanner.next_token()?);
        }
        Ok(self.lookahead.get_or_insert_with(|| Token { kind: TokenKind::End, offset: 0 }))
    }

    fn expect(&mut self, expected: TokenKind) -> ExpressionResult<Token> {
        let token = self.next()?;
        if token.kind != expected {
            return Err(self.unexpected(&token, &expected.to_string()));
        }
        Ok(token)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::parse_at(self.scanner.source(), offset, message)
    }

    fn unexpected(&self, token: &Token, expected: &str) -> ExpressionError {
        self.error_at(token.offset, format!("expected {expected}, found {}", token.kind))
    }

    fn read_value(&mut self, token: Token) -> ExpressionResult<Bson> {
        match token.kind {
            TokenKind::BeginObject => self.read_object(token.offset),
            TokenKind::BeginArray => self.read_array(),
            TokenKind::String(value) => self.read_string(value),
            TokenKind::Placeholder(raw) => self.read_string(raw),
            TokenKind::Number(number) => Ok(number.into()),
            TokenKind::Regex(regex) => self.read_regex(&regex.pattern, &regex.options, token.offset),
            TokenKind::Unquoted(word) => self.read_unquoted(word, token.offset),
            _ => Err(self.unexpected(&token, "a value")),
        }
    }

    fn read_string(&self, value: String) -> ExpressionResult<Bson> {
        match (self.binding, parse_placeholder(&value)) {
            (Some(binding), Some(index)) => binding.resolve(index),
            _ => Ok(Bson::String(value)),
        }
    }

    fn read_key(&self, token: Token) -> ExpressionResult<String> {
        let key = match token.kind {
            TokenKind::String(key) | TokenKind::Unquoted(key) | TokenKind::Placeholder(key) => key,
            _ => return Err(self.unexpected(&token, "a field name")),
        };

        match (self.binding, parse_placeholder(&key)) {
            (Some(binding), Some(index)) => binding.resolve_key(index),
            _ => Ok(key),
        }
    }

    fn read_object(&mut self, start: usize) -> ExpressionResult<Bson> {
        let mut document = Document::new();

        let mut token = self.next()?;
        if token.kind != TokenKind::EndObject {
            loop {
                let key = self.read_key(token)?;
                self.expect(TokenKind::Colon)?;
                let value_token = self.next()?;
                let value = self.read_value(value_token)?;
                document.insert(key, value);

                let separator = self.next()?;
                match separator.kind {
                    TokenKind::Comma => token = self.next()?,
                    TokenKind::EndObject => break,
                    _ => return Err(self.unexpected(&separator, "',' or '}'")),
                }
            }
        }

        self.convert_extended_json(document, start)
    }

    fn read_array(&mut self) -> ExpressionResult<Bson> {
        let mut values = Vec::new();

        let mut token = self.next()?;
        if token.kind == TokenKind::EndArray {
            return Ok(Bson::Array(values));
        }

        loop {
            values.push(self.read_value(token)?);

            let separator = self.next()?;
            match separator.kind {
                TokenKind::Comma => token = self.next()?,
                TokenKind::EndArray => return Ok(Bson::Array(values)),
                _ => return Err(self.unexpected(&separator, "',' or ']'")),
            }
        }
    }

    fn read_regex(&self, pattern: &str, options: &str, offset: usize) -> ExpressionResult<Bson> {
        let mut options = options.chars().collect::<Vec<_>>();
        options.sort_unstable();
        let options = options.into_iter().collect::<String>();

        Bson::try_from(json!({ "$regularExpression": { "pattern": pattern, "options": options } }))
            .map_err(|err| self.error_at(offset, format!("invalid regular expression: {err}")))
    }

    fn read_unquoted(&mut self, word: String, offset: usize) -> ExpressionResult<Bson> {
        match word.as_str() {
            "true" => Ok(Bson::Boolean(true)),
            "false" => Ok(Bson::Boolean(false)),
            "null" => Ok(Bson::Null),
            "undefined" => Ok(Bson::Undefined),
            "NaN" => Ok(Bson::Double(f64::NAN)),
            "Infinity" => Ok(Bson::Double(f64::INFINITY)),
            "MinKey" | "MaxKey" => {
                if self.peek()?.kind == TokenKind::LeftParen {
                    self.next()?;
                    self.expect(TokenKind::RightParen)?;
                }
                Ok(if word == "MinKey" { Bson::MinKey } else { Bson::MaxKey })
            }
            "new" => {
                let token = self.next()?;
                match token.kind {
                    TokenKind::Unquoted(constructor) if is_constructor(&constructor) => {
                        self.read_constructor(&constructor, token.offset)
                    }
                    _ => Err(self.unexpected(&token, "a constructor after 'new'")),
                }
            }
            constructor if is_constructor(constructor) && self.peek()?.kind == TokenKind::LeftParen => {
                self.read_constructor(constructor, offset)
            }
            _ => Ok(Bson::String(word)),
        }
    }

    fn read_constructor(&mut self, name: &str, offset: usize) -> ExpressionResult<Bson> {
        self.expect(TokenKind::LeftParen)?;

        let mut arguments = Vec::new();
        let mut token = self.next()?;
        if token.kind != TokenKind::RightParen {
            loop {
                arguments.push(self.read_value(token)?);

                let separator = self.next()?;
                match separator.kind {
                    TokenKind::Comma => token = self.next()?,
                    TokenKind::RightParen => break,
                    _ => return Err(self.unexpected(&separator, "',' or ')'")),
                }
            }
        }

        let invalid = |reason: &str| self.error_at(offset, format!("invalid {name}(): {reason}"));

        match (name, arguments.as_slice()) {
            ("ObjectId", [Bson::String(hex)]) => ObjectId::parse_str(hex)
                .map(Bson::ObjectId)
                .map_err(|err| invalid(&err.to_string())),
            ("ObjectId", [Bson::ObjectId(id)]) => Ok(Bson::ObjectId(*id)),
            ("ISODate" | "Date", []) => Ok(Bson::DateTime(bson::DateTime::now())),
            ("ISODate" | "Date", [Bson::String(text)]) => parse_date(text)
                .map(Bson::DateTime)
                .ok_or_else(|| invalid("unrecognized date format")),
            ("ISODate" | "Date", [Bson::DateTime(date)]) => Ok(Bson::DateTime(*date)),
            ("ISODate" | "Date", [millis]) => as_i64(millis)
                .map(|millis| Bson::DateTime(bson::DateTime::from_millis(millis)))
                .ok_or_else(|| invalid("expected a date string or milliseconds")),
            ("NumberInt", [value]) => as_i64(value)
                .and_then(|value| i32::try_from(value).ok())
                .map(Bson::Int32)
                .ok_or_else(|| invalid("expected a 32-bit integer")),
            ("NumberLong", [value]) => as_i64(value)
                .map(Bson::Int64)
                .ok_or_else(|| invalid("expected a 64-bit integer")),
            ("NumberDecimal", [value]) => {
                let text = match value {
                    Bson::String(text) => text.clone(),
                    Bson::Int32(value) => value.to_string(),
                    Bson::Int64(value) => value.to_string(),
                    Bson::Double(value) => value.to_string(),
                    Bson::Decimal128(_) => return Ok(value.clone()),
                    _ => return Err(invalid("expected a decimal string")),
                };
                Bson::try_from(json!({ "$numberDecimal": text })).map_err(|err| invalid(&err.to_string()))
            }
            ("UUID", [Bson::String(text)]) => bson::Uuid::parse_str(text)
                .map(Bson::from)
                .map_err(|err| invalid(&err.to_string())),
            ("BinData", [subtype, Bson::String(base64)]) => {
                let subtype = as_i64(subtype)
                    .and_then(|subtype| u8::try_from(subtype).ok())
                    .ok_or_else(|| invalid("expected a binary subtype between 0 and 255"))?;
                Bson::try_from(json!({ "$binary": { "base64": base64, "subType": format!("{subtype:02x}") } }))
                    .map_err(|err| invalid(&err.to_string()))
            }
            ("Timestamp", [time, increment]) => {
                let field = |value: &Bson| as_i64(value).and_then(|value| u32::try_from(value).ok());
                match (field(time), field(increment)) {
                    (Some(time), Some(increment)) => Ok(Bson::Timestamp(Timestamp { time, increment })),
                    _ => Err(invalid("expected two unsigned 32-bit integers")),
                }
            }
            _ => Err(invalid(&format!("unsupported arguments ({} given)", arguments.len()))),
        }
    }

    fn convert_extended_json(&self, document: Document, offset: usize) -> ExpressionResult<Bson> {
        let is_wrapper = document
            .keys()
            .next()
            .is_some_and(|key| EXTENDED_JSON_KEYS.contains(&key.as_str()));
        if !is_wrapper {
            return Ok(Bson::Document(document));
        }

        if document.len() == 1 {
            if let Some(value) = document.iter().next().and_then(|(key, value)| already_converted(key, value)) {
                return Ok(value);
            }
        }

        Bson::try_from(Bson::Document(document).into_relaxed_extjson())
            .map_err(|err| self.error_at(offset, format!("invalid extended JSON: {err}")))
    }
}

fn is_constructor(name: &str) -> bool {
    matches!(
        name,
        "ObjectId" | "ISODate" | "Date" | "NumberInt" | "NumberLong" | "NumberDecimal" | "UUID" | "BinData" | "Timestamp"
    )
}

/// Returns the value a single-key wrapper stands for when its payload already has that BSON type.
///
/// Nested wrappers (`{ $date: { $numberLong: '…' } }`) and bound arguments (`{ $oid: ?0 }`) reach
/// the outer wrapper as native values rather than extended JSON.
fn already_converted(key: &str, value: &Bson) -> Option<Bson> {
    match (key, value) {
        ("$oid", Bson::ObjectId(_))
        | ("$date", Bson::DateTime(_))
        | ("$numberInt", Bson::Int32(_))
        | ("$numberLong", Bson::Int64(_))
        | ("$numberDouble", Bson::Double(_))
        | ("$numberDecimal", Bson::Decimal128(_))
        | ("$binary" | "$uuid", Bson::Binary(_))
        | ("$timestamp", Bson::Timestamp(_))
        | ("$regularExpression", Bson::RegularExpression(_))
        | ("$symbol", Bson::Symbol(_))
        | ("$code", Bson::JavaScriptCode(_))
        | ("$dbPointer", Bson::DbPointer(_)) => Some(value.clone()),
        ("$numberLong", Bson::Int32(value)) => Some(Bson::Int64(i64::from(*value))),
        ("$date", Bson::Int32(_) | Bson::Int64(_)) => {
            as_i64(value).map(|millis| Bson::DateTime(bson::DateTime::from_millis(millis)))
        }
        _ => None,
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(value) => Some(i64::from(*value)),
        Bson::Int64(value) => Some(*value),
        Bson::Double(value) if value.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(value) => {
            Some(*value as i64)
        }
        Bson::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<bson::DateTime> {
    let text = text.trim();

    let parsed = DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|date| date.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        })?;

    Some(bson::DateTime::from_chrono(parsed))
}
