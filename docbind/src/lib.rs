//! Main docbind crate providing parameter-bindable MongoDB expressions.
//!
//! This crate is the primary entry point for users of docbind. It re-exports the core types from
//! `docbind-core` and provides [`BindableExpression`](expression::BindableExpression), an
//! expression string with positional `?N` placeholders that resolves lazily into a BSON document.
//!
//! # Features
//!
//! - **Relaxed syntax** - Unquoted keys, single quotes, shell constructors and extended JSON
//! - **Placeholder binding** - `?0`, `'?1'` replaced by typed arguments
//! - **Pluggable encoding** - Codec registries decide how argument types become BSON
//! - **Lazy, memoized resolution** - Parsed at most once per expression, on first use
//!
//! # Quick Start
//!
//! ```ignore
//! use docbind::prelude::*;
//!
//! // Braces may be omitted for operator fragments
//! let expression = BindableExpression::new("$toUpper : $name")?;
//! assert_eq!(expression.document()?, &bson::doc! { "$toUpper": "$name" });
//!
//! // Bind positional arguments
//! let filter = BindableExpression::with_arguments(
//!     "{ age: { $gte: ?0 }, name: ?1 }",
//!     args![18, "Alice"],
//! )?;
//! let document = filter.to_document()?;
//! ```
//!
//! # Custom Encoding
//!
//! Argument types without a suitable serde representation can be given an encoder through a
//! registry:
//!
//! ```ignore
//! use docbind::prelude::*;
//! use std::sync::Arc;
//!
//! struct Cents(i64);
//!
//! let registry = TypeRegistry::builder()
//!     .encoder::<Cents, _>(|cents| Ok(bson::Bson::Double(cents.0 as f64 / 100.0)))
//!     .with_fallback(default_registry())
//!     .build();
//!
//! let expression = BindableExpression::new("{ price: { $lt: ?0 } }")?
//!     .with_registry(Arc::new(registry));
//! ```

pub mod expression;
pub mod prelude;

pub use docbind_core::{args, binding, codec, decoder, error, reader, scanner};

// Re-export BSON types for convenience
pub use bson;
