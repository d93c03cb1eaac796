//! Positional placeholder resolution.
//!
//! A placeholder is a token of the form `?N`, where `N` is a zero-based index into the arguments an
//! expression was bound with. The reader hands every placeholder it meets to a [`BindingContext`],
//! which encodes the matching argument into BSON.

use bson::Bson;

use crate::{
    codec::{Argument, CodecRegistry},
    error::{ExpressionError, ExpressionResult},
};

/// Returns the index named by `token` if it is exactly `?<digits>`.
///
/// ```ignore
/// assert_eq!(parse_placeholder("?3"), Some(3));
/// assert_eq!(parse_placeholder("?3a"), None);
/// ```
pub fn parse_placeholder(token: &str) -> Option<usize> {
    let digits = token.strip_prefix('?')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The arguments and registry placeholders are resolved against.
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    arguments: &'a [Argument],
    registry: Option<&'a dyn CodecRegistry>,
}

impl<'a> BindingContext<'a> {
    /// Creates a context binding `arguments`, encoded through `registry` when one is given.
    pub fn new(arguments: &'a [Argument], registry: Option<&'a dyn CodecRegistry>) -> Self {
        Self { arguments, registry }
    }

    /// The bound arguments.
    pub fn arguments(&self) -> &'a [Argument] {
        self.arguments
    }

    /// Encodes the argument referenced by placeholder `?index`.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::PlaceholderOutOfRange`] if no argument exists at `index`, or
    /// any error raised while encoding the argument.
    pub fn resolve(&self, index: usize) -> ExpressionResult<Bson> {
        let argument = self.arguments.get(index).ok_or(ExpressionError::PlaceholderOutOfRange {
            index,
            available: self.arguments.len(),
        })?;

        tracing::trace!(index, type_name = argument.type_name(), "binding placeholder");
        argument.encode(self.registry)
    }

    /// Resolves placeholder `?index` used as a document key. The argument must encode to a string.
    pub fn resolve_key(&self, index: usize) -> ExpressionResult<String> {
        match self.resolve(index)? {
            Bson::String(key) => Ok(key),
            other => Err(ExpressionError::Binding(format!(
                "placeholder ?{index} is used as a key but is bound to {:?}",
                other.element_type()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("?0", Some(0))]
    #[case("?17", Some(17))]
    #[case("?", None)]
    #[case("?-1", None)]
    #[case("?1a", None)]
    #[case("a?1", None)]
    #[case(" ?1", None)]
    fn test_parse_placeholder(#[case] token: &str, #[case] expected: Option<usize>) {
        assert_eq!(parse_placeholder(token), expected);
    }

    #[rstest]
    fn test_resolve_out_of_range() {
        let arguments = vec![Argument::from("$name")];
        let context = BindingContext::new(&arguments, None);

        assert_eq!(context.resolve(0).unwrap(), Bson::String("$name".into()));
        assert_eq!(
            context.resolve(1).unwrap_err(),
            ExpressionError::PlaceholderOutOfRange { index: 1, available: 1 }
        );
    }

    #[rstest]
    fn test_resolve_key_requires_string() {
        let arguments = vec![Argument::from("field"), Argument::from(5_i32)];
        let context = BindingContext::new(&arguments, None);

        assert_eq!(context.resolve_key(0).unwrap(), "field");
        assert!(matches!(context.resolve_key(1), Err(ExpressionError::Binding(_))));
    }
}
