//! Document decoders backed by [`JsonReader`].

use bson::Document;
use std::sync::Arc;

use crate::{
    binding::BindingContext,
    codec::{Argument, CodecRegistry, DocumentDecoder},
    error::ExpressionResult,
    reader::JsonReader,
};

/// Decodes relaxed extended JSON, optionally substituting `?N` placeholders with bound arguments.
///
/// The registry, when present, supplies encoders for bound arguments. Decoding without arguments
/// reads placeholders as plain strings.
#[derive(Debug, Clone, Default)]
pub struct ParameterBindingDecoder {
    registry: Option<Arc<dyn CodecRegistry>>,
}

impl ParameterBindingDecoder {
    /// Creates a decoder that encodes arguments through `registry`.
    pub fn new(registry: Arc<dyn CodecRegistry>) -> Self {
        Self { registry: Some(registry) }
    }

    /// The registry arguments are encoded with, if any.
    pub fn registry(&self) -> Option<&Arc<dyn CodecRegistry>> {
        self.registry.as_ref()
    }

    /// Decodes `json`, binding placeholders against `arguments`.
    ///
    /// With no arguments this is equivalent to [`DocumentDecoder::decode`].
    pub fn decode_with_arguments(&self, json: &str, arguments: &[Argument]) -> ExpressionResult<Document> {
        let reader = JsonReader::new(json);
        if arguments.is_empty() {
            return reader.read_document();
        }

        reader
            .with_binding(BindingContext::new(arguments, self.registry.as_deref()))
            .read_document()
    }
}

impl DocumentDecoder for ParameterBindingDecoder {
    fn decode(&self, json: &str) -> ExpressionResult<Document> {
        JsonReader::new(json).read_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::TypeRegistry, error::ExpressionError};
    use bson::{Bson, doc};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn test_decode_without_arguments_keeps_placeholders() {
        let decoder = ParameterBindingDecoder::default();
        assert_eq!(decoder.decode_with_arguments("{ a: ?0 }", &[]).unwrap(), doc! { "a": "?0" });
    }

    #[rstest]
    fn test_decode_with_arguments_uses_registry() {
        let registry = TypeRegistry::builder()
            .encoder::<bool, _>(|flag| Ok(Bson::Int32(i32::from(*flag))))
            .build();
        let decoder = ParameterBindingDecoder::new(Arc::new(registry));

        assert_eq!(
            decoder.decode_with_arguments("{ active: ?0 }", &[Argument::from(true)]).unwrap(),
            doc! { "active": 1 }
        );
    }

    #[rstest]
    fn test_decode_reports_binding_errors() {
        let decoder = ParameterBindingDecoder::default();
        let err = decoder.decode_with_arguments("{ a: ?3 }", &[Argument::from(1)]).unwrap_err();

        assert_eq!(err, ExpressionError::PlaceholderOutOfRange { index: 3, available: 1 });
    }
}
