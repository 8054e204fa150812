//! `#[derive(Error)]` expansion.
//!
//! Each enum variant (or the struct itself) carries an `#[error("...")]`
//! message. Named fields are interpolated by name (`{field}`), tuple fields
//! by position (`{0}`, `{1}`).
//!
//! ```ignore
//! #[derive(Debug, Error)]
//! pub enum LedgerError {
//!     #[error("insufficient balance for {account}: have {available}, need {required}")]
//!     InsufficientBalance { account: AccountId, available: u128, required: u128 },
//!     #[error("decode failed: {0}")]
//!     Decode(DecodeError),
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

pub fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_input(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_input(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let message = message(&variant.attrs, &variant.ident)?;
                    let ident = &variant.ident;
                    Ok(display_arm(quote!(Self::#ident), &variant.fields, &message))
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = message(&input.attrs, name)?;
            let arm = display_arm(quote!(Self), &data.fields, &message);
            quote! {
                match self {
                    #arm
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds one `match` arm that writes `message` with the variant's fields bound.
///
/// Fields are bound as locals and picked up by inline format-argument capture,
/// so a message may mention any subset of them. Fields must not be named `f`.
fn display_arm(path: TokenStream2, fields: &Fields, message: &LitStr) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! {
            #path => write!(f, #message),
        },
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            quote! {
                #path { #(#idents),* } => write!(f, #message),
            }
        }
        Fields::Unnamed(unnamed) => {
            let count = unnamed.unnamed.len();
            let idents: Vec<_> = (0..count).map(|i| format_ident!("field_{}", i)).collect();
            let rewritten = LitStr::new(&positional_to_named(&message.value(), count), message.span());
            quote! {
                #path ( #(#idents),* ) => write!(f, #rewritten),
            }
        }
    }
}

fn message<T: quote::ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<LitStr> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| syn::Error::new_spanned(target, "missing #[error(\"...\")] attribute"))?;
    attr.parse_args::<LitStr>()
}

/// Rewrites `{0}`, `{1:?}` into `{field_0}`, `{field_1:?}` so every argument
/// can be passed by name.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{field_{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{field_{i}:"));
    }
    out
}
