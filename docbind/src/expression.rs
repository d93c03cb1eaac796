//! Parameter-bindable MongoDB expressions.
//!
//! A [`BindableExpression`] pairs a relaxed extended JSON string with positional arguments and
//! resolves them into a [`Document`] on first use. Short operator fragments may omit the
//! surrounding braces:
//!
//! ```ignore
//! use docbind::{args, expression::BindableExpression};
//!
//! let expression = BindableExpression::new("$toUpper : '?0'")?.bind(args!["$name"]);
//! assert_eq!(expression.document()?, &bson::doc! { "$toUpper": "$name" });
//! ```

use bson::Document;
use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, OnceLock},
};

use docbind_core::{
    codec::{Argument, CodecRegistry, DocumentDecoder, default_registry},
    decoder::ParameterBindingDecoder,
    error::{ExpressionError, ExpressionResult},
};

/// Anything that renders to a MongoDB expression document.
pub trait MongoExpression {
    /// Returns the document form of this expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be resolved.
    fn to_document(&self) -> ExpressionResult<Document>;
}

impl MongoExpression for Document {
    fn to_document(&self) -> ExpressionResult<Document> {
        Ok(self.clone())
    }
}

/// An immutable expression string with positional arguments, resolved lazily into a document.
///
/// Resolution happens at most once per instance: the first successful call to
/// [`document`](Self::document) stores the result and later calls return it. Failures are not
/// stored, so a failed resolution is attempted again on the next call.
///
/// [`bind`](Self::bind) and [`with_registry`](Self::with_registry) derive new, unresolved
/// expressions and leave the receiver untouched.
#[derive(Debug, Clone)]
pub struct BindableExpression {
    expression: Arc<str>,
    arguments: Arc<[Argument]>,
    registry: Option<Arc<dyn CodecRegistry>>,
    target: OnceLock<Document>,
}

impl BindableExpression {
    /// Creates an expression without arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::InvalidExpression`] if `expression` is empty or blank.
    pub fn new(expression: impl Into<String>) -> ExpressionResult<Self> {
        Self::with_arguments(expression, Vec::<Argument>::new())
    }

    /// Creates an expression bound to `arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::InvalidExpression`] if `expression` is empty or blank.
    pub fn with_arguments<A>(
        expression: impl Into<String>,
        arguments: impl IntoIterator<Item = A>,
    ) -> ExpressionResult<Self>
    where
        A: Into<Argument>,
    {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(ExpressionError::InvalidExpression("expression must not be empty".to_string()));
        }

        Ok(Self {
            expression: Arc::from(expression),
            arguments: arguments.into_iter().map(Into::into).collect(),
            registry: None,
            target: OnceLock::new(),
        })
    }

    /// Returns a copy of this expression that encodes its arguments through `registry`.
    pub fn with_registry(&self, registry: Arc<dyn CodecRegistry>) -> Self {
        Self {
            expression: self.expression.clone(),
            arguments: self.arguments.clone(),
            registry: Some(registry),
            target: OnceLock::new(),
        }
    }

    /// Returns a copy of this expression bound to `arguments` instead of its current ones.
    pub fn bind<A>(&self, arguments: impl IntoIterator<Item = A>) -> Self
    where
        A: Into<Argument>,
    {
        Self {
            expression: self.expression.clone(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            registry: self.registry.clone(),
            target: OnceLock::new(),
        }
    }

    /// The raw expression text, as given.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The bound arguments.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// The registry set through [`with_registry`](Self::with_registry), if any.
    pub fn registry(&self) -> Option<&Arc<dyn CodecRegistry>> {
        self.registry.as_ref()
    }

    /// Returns whether the document has already been resolved and stored.
    pub fn is_resolved(&self) -> bool {
        self.target.get().is_some()
    }

    /// Resolves the expression, or returns the previously resolved document.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Parse`] for malformed text,
    /// [`ExpressionError::PlaceholderOutOfRange`] for placeholders without an argument, and any
    /// error raised while encoding arguments.
    pub fn document(&self) -> ExpressionResult<&Document> {
        if let Some(document) = self.target.get() {
            tracing::trace!(expression = %self.expression, "reusing resolved expression");
            return Ok(document);
        }

        let document = self.parse()?;
        Ok(self.target.get_or_init(|| document))
    }

    fn parse(&self) -> ExpressionResult<Document> {
        let expression = wrap_if_needed(&self.expression);
        tracing::debug!(
            expression = %expression,
            arguments = self.arguments.len(),
            registry = self.registry.is_some(),
            "resolving expression"
        );

        if self.arguments.is_empty() {
            return match &self.registry {
                None => ParameterBindingDecoder::default().decode(&expression),
                Some(registry) => match registry.document_decoder() {
                    Some(decoder) => decoder.decode(&expression),
                    None => ParameterBindingDecoder::new(registry.clone()).decode(&expression),
                },
            };
        }

        let registry = self.registry.clone().unwrap_or_else(default_registry);
        ParameterBindingDecoder::new(registry).decode_with_arguments(&expression, &self.arguments)
    }
}

impl MongoExpression for BindableExpression {
    fn to_document(&self) -> ExpressionResult<Document> {
        self.document().cloned()
    }
}

impl fmt::Display for BindableExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Wraps `expression` in braces unless it already is a braced document.
fn wrap_if_needed(expression: &str) -> Cow<'_, str> {
    let trimmed = expression.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Cow::Borrowed(expression);
    }
    Cow::Owned(format!("{{ {expression} }}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("$toUpper : $name", "{ $toUpper : $name }")]
    #[case("  a: 1  ", "{   a: 1   }")]
    fn test_wraps_bare_fragments(#[case] expression: &str, #[case] expected: &str) {
        assert_eq!(wrap_if_needed(expression), expected);
    }

    #[rstest]
    #[case("{ $toUpper : $name }")]
    #[case("  { a: 1 }\n")]
    fn test_does_not_rewrap_documents(#[case] expression: &str) {
        assert!(matches!(wrap_if_needed(expression), Cow::Borrowed(original) if original == expression));
    }

    #[rstest]
    #[case("")]
    #[case("   \n\t")]
    fn test_rejects_blank_expressions(#[case] expression: &str) {
        assert!(matches!(
            BindableExpression::new(expression),
            Err(ExpressionError::InvalidExpression(_))
        ));
    }

    #[rstest]
    fn test_display_shows_raw_text() {
        let expression = BindableExpression::new("$toUpper : $name").unwrap();
        assert_eq!(expression.to_string(), "$toUpper : $name");
    }
}
