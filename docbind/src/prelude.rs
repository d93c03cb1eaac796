//! Convenient re-exports of commonly used types from docbind.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docbind::prelude::*;
//! ```
//!
//! This provides access to:
//! - Expressions and the `MongoExpression` trait
//! - Arguments, encoders and codec registries
//! - Error types

pub use docbind_core::{
    args,
    codec::{Argument, ArgumentEncoder, CodecRegistry, DocumentDecoder, TypeRegistry, TypeRegistryBuilder, default_registry},
    decoder::ParameterBindingDecoder,
    error::{ExpressionError, ExpressionResult},
};

pub use crate::expression::{BindableExpression, MongoExpression};
