//! Core building blocks for parameter-bindable MongoDB expressions.
//!
//! This crate is the core of the docbind project and provides:
//!
//! - **Error handling** ([`error`]) - The error type and result alias shared by every stage
//! - **Arguments and codecs** ([`codec`]) - Type-erased arguments and the registry that encodes them
//! - **Scanning** ([`scanner`]) - Tokenization of relaxed MongoDB extended JSON
//! - **Reading** ([`reader`]) - Turning tokens into BSON documents
//! - **Placeholder binding** ([`binding`]) - Resolving `?N` placeholders against bound arguments
//! - **Decoders** ([`decoder`]) - The default, placeholder-aware document decoder
//!
//! # Example
//!
//! ```ignore
//! use docbind_core::{args, decoder::ParameterBindingDecoder};
//!
//! let document = ParameterBindingDecoder::default()
//!     .decode_with_arguments("{ $toUpper: ?0 }", &args!["$name"])?;
//! ```

pub mod binding;
pub mod codec;
pub mod decoder;
pub mod error;
mod macros;
pub mod reader;
pub mod scanner;
