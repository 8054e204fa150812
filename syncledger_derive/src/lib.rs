//! Derive macros for the `syncledger` crate.
//!
//! - `#[derive(BinaryCodec)]` emits canonical `Encode`/`Decode` impls.
//! - `#[derive(Error)]` emits `Display` and `std::error::Error` impls.

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` from `crate::types::encoding`.
///
/// Fields are written in declaration order; enum variants are prefixed with
/// a one-byte discriminant.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::expand(input)
}

/// Implements `Display` and `Error` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::expand(input)
}
