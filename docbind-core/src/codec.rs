//! Argument values and the codec registry consulted while binding them.
//!
//! Expressions are bound with positional [`Argument`]s of arbitrary type. When a placeholder is
//! substituted, the argument is encoded into [`Bson`]: a [`CodecRegistry`] may supply an
//! [`ArgumentEncoder`] for the argument's concrete type, otherwise the argument falls back to its
//! own serde-based encoding.
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::codec::{Argument, TypeRegistry};
//! use bson::Bson;
//!
//! struct Cents(i64);
//!
//! let registry = TypeRegistry::builder()
//!     .encoder::<Cents, _>(|cents| Ok(Bson::Double(cents.0 as f64 / 100.0)))
//!     .build();
//! ```

use bson::{Bson, Document, ser::serialize_to_bson};
use chrono::Utc;
use serde::Serialize;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt::{self, Debug},
    sync::{Arc, OnceLock},
};

use crate::error::{ExpressionError, ExpressionResult};

type DefaultEncodeFn = fn(&(dyn Any + Send + Sync)) -> ExpressionResult<Bson>;

/// A type-erased positional argument bound to an expression.
///
/// Arguments are reference counted, so cloning an argument (or an expression holding it) never
/// copies the underlying value.
#[derive(Clone)]
pub struct Argument {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    encode_default: DefaultEncodeFn,
}

impl Argument {
    /// Wraps a value as an argument.
    pub fn new<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            encode_default: encode_with_serde::<T>,
        }
    }

    /// The [`TypeId`] of the wrapped value, used as the registry lookup key.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The name of the wrapped value's type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the wrapped value if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Encodes the argument with its serde representation, ignoring any registry.
    pub fn encode_default(&self) -> ExpressionResult<Bson> {
        (self.encode_default)(self.value.as_ref())
    }

    /// Encodes the argument, preferring an encoder from `registry` for the argument's type.
    ///
    /// # Errors
    ///
    /// Returns [`ExpressionError::Configuration`] if the registry claims an encoder for the type
    /// but does not supply it, or [`ExpressionError::Encoding`] if encoding fails.
    pub fn encode(&self, registry: Option<&dyn CodecRegistry>) -> ExpressionResult<Bson> {
        let Some(registry) = registry else {
            return self.encode_default();
        };

        if !registry.has_encoder_for(self.type_id) {
            return self.encode_default();
        }

        match registry.encoder_for(self.type_id) {
            Some(encoder) => encoder.encode(self),
            None => {
                tracing::warn!(type_name = self.type_name, "registry advertises an encoder it cannot supply");
                Err(ExpressionError::Configuration(format!(
                    "registry has no usable encoder for {}",
                    self.type_name
                )))
            }
        }
    }
}

impl Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argument").field("type_name", &self.type_name).finish_non_exhaustive()
    }
}

impl<T: Serialize + Send + Sync + 'static> From<T> for Argument {
    fn from(value: T) -> Self {
        Argument::new(value)
    }
}

fn encode_with_serde<T: Serialize + 'static>(value: &(dyn Any + Send + Sync)) -> ExpressionResult<Bson> {
    let value = value.downcast_ref::<T>().ok_or_else(|| {
        ExpressionError::Encoding(format!("argument is not a {}", std::any::type_name::<T>()))
    })?;

    Ok(serialize_to_bson(value)?)
}

/// Encodes a bound argument into BSON.
///
/// Implemented for any `Fn(&Argument) -> ExpressionResult<Bson>` closure.
pub trait ArgumentEncoder: Send + Sync {
    /// Encodes `argument` into a BSON value.
    fn encode(&self, argument: &Argument) -> ExpressionResult<Bson>;
}

impl<F> ArgumentEncoder for F
where
    F: Fn(&Argument) -> ExpressionResult<Bson> + Send + Sync,
{
    fn encode(&self, argument: &Argument) -> ExpressionResult<Bson> {
        self(argument)
    }
}

/// Decodes expression text into a [`Document`].
pub trait DocumentDecoder: Send + Sync + Debug {
    /// Decodes `json` into a document.
    fn decode(&self, json: &str) -> ExpressionResult<Document>;
}

/// Lookup of type-specific codecs used while resolving expressions.
pub trait CodecRegistry: Send + Sync + Debug {
    /// Returns the encoder registered for `type_id`, if any.
    fn encoder_for(&self, type_id: TypeId) -> Option<Arc<dyn ArgumentEncoder>>;

    /// Returns whether an encoder is registered for `type_id`.
    fn has_encoder_for(&self, type_id: TypeId) -> bool {
        self.encoder_for(type_id).is_some()
    }

    /// Returns the decoder to use for unbound expressions, if the registry provides one.
    fn document_decoder(&self) -> Option<Arc<dyn DocumentDecoder>> {
        None
    }
}

/// A map-backed [`CodecRegistry`].
///
/// Lookups that miss fall through to an optional fallback registry.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    encoders: HashMap<TypeId, (&'static str, Arc<dyn ArgumentEncoder>)>,
    document_decoder: Option<Arc<dyn DocumentDecoder>>,
    fallback: Option<Arc<dyn CodecRegistry>>,
}

impl TypeRegistry {
    /// Creates a new registry builder.
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::new()
    }
}

impl Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("encoders", &self.encoders.values().map(|(name, _)| *name).collect::<Vec<_>>())
            .field("document_decoder", &self.document_decoder)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl CodecRegistry for TypeRegistry {
    fn encoder_for(&self, type_id: TypeId) -> Option<Arc<dyn ArgumentEncoder>> {
        self.encoders
            .get(&type_id)
            .map(|(_, encoder)| encoder.clone())
            .or_else(|| self.fallback.as_ref().and_then(|fallback| fallback.encoder_for(type_id)))
    }

    fn document_decoder(&self) -> Option<Arc<dyn DocumentDecoder>> {
        self.document_decoder
            .clone()
            .or_else(|| self.fallback.as_ref().and_then(|fallback| fallback.document_decoder()))
    }
}

/// Builder for [`TypeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistryBuilder {
    registry: TypeRegistry,
}

impl TypeRegistryBuilder {
    /// Creates an empty registry builder.
    pub fn new() -> Self {
        TypeRegistryBuilder { registry: TypeRegistry::default() }
    }

    /// Registers an encoder for arguments of type `T`, replacing any previous one.
    pub fn encoder<T, F>(mut self, encode: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> ExpressionResult<Bson> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let encoder = move |argument: &Argument| match argument.downcast_ref::<T>() {
            Some(value) => encode(value),
            None => Err(ExpressionError::Encoding(format!(
                "{} encoder received a {}",
                type_name,
                argument.type_name()
            ))),
        };
        self.registry
            .encoders
            .insert(TypeId::of::<T>(), (type_name, Arc::new(encoder)));
        self
    }

    /// Sets the decoder used for expressions resolved without arguments.
    pub fn document_decoder(mut self, decoder: impl DocumentDecoder + 'static) -> Self {
        self.registry.document_decoder = Some(Arc::new(decoder));
        self
    }

    /// Sets the registry consulted when this one has no matching codec.
    pub fn with_fallback(mut self, fallback: Arc<dyn CodecRegistry>) -> Self {
        self.registry.fallback = Some(fallback);
        self
    }

    /// Builds the registry.
    pub fn build(self) -> TypeRegistry {
        self.registry
    }
}

/// Returns the shared default registry.
///
/// It encodes `chrono::DateTime<Utc>` as a BSON date and `uuid::Uuid` as a BSON binary
/// (subtype 4), both of which serde would otherwise render as strings.
pub fn default_registry() -> Arc<dyn CodecRegistry> {
    static DEFAULT_REGISTRY: OnceLock<Arc<dyn CodecRegistry>> = OnceLock::new();

    DEFAULT_REGISTRY
        .get_or_init(|| {
            Arc::new(
                TypeRegistry::builder()
                    .encoder::<chrono::DateTime<Utc>, _>(|value| {
                        Ok(Bson::DateTime(bson::DateTime::from_chrono(*value)))
                    })
                    .encoder::<uuid::Uuid, _>(|value| Ok(Bson::from(bson::Uuid::from_bytes(value.into_bytes()))))
                    .build(),
            )
        })
        .clone()
}
