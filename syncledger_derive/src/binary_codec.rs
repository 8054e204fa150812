//! `#[derive(BinaryCodec)]` expansion.
//!
//! The generated code refers to `crate::types::encoding`, so the derive is
//! only usable from inside the `syncledger` crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DeriveInput, Fields, parse_macro_input};

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

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => {
            let (bindings, pattern, constructor) = destructure(quote!(Self), &data.fields);
            let encode = quote! {
                let #pattern = self;
                #(crate::types::encoding::Encode::encode(#bindings, out);)*
            };
            let decode = quote! { Ok(#constructor) };
            (encode, decode)
        }
        Data::Enum(data) => expand_enum(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Returns the bound field names, a destructuring pattern rooted at `path`,
/// and a constructor that decodes every field in order.
fn destructure(path: TokenStream2, fields: &Fields) -> (Vec<syn::Ident>, TokenStream2, TokenStream2) {
    match fields {
        Fields::Named(named) => {
            let idents: Vec<syn::Ident> = named
                .named
                .iter()
                .filter_map(|f| f.ident.clone())
                .collect();
            let pattern = quote!(#path { #(#idents),* });
            let constructor = quote! {
                #path { #(#idents: crate::types::encoding::Decode::decode(input)?,)* }
            };
            (idents, pattern, constructor)
        }
        Fields::Unnamed(unnamed) => {
            let idents: Vec<syn::Ident> = (0..unnamed.unnamed.len())
                .map(|i| format_ident!("field_{}", i))
                .collect();
            let decoders = idents
                .iter()
                .map(|_| quote!(crate::types::encoding::Decode::decode(input)?));
            let pattern = quote!(#path ( #(#idents),* ));
            let constructor = quote!(#path ( #(#decoders),* ));
            (idents, pattern, constructor)
        }
        Fields::Unit => (Vec::new(), path.clone(), path),
    }
}

fn expand_enum(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    if data.variants.len() > u8::MAX as usize + 1 {
        return Err(syn::Error::new_spanned(
            &data.variants,
            "BinaryCodec supports at most 256 enum variants",
        ));
    }

    let mut encode_arms = Vec::with_capacity(data.variants.len());
    let mut decode_arms = Vec::with_capacity(data.variants.len());

    for (tag, variant) in data.variants.iter().enumerate() {
        if variant.discriminant.is_some() {
            return Err(syn::Error::new_spanned(
                variant,
                "BinaryCodec assigns tags by position; remove the explicit discriminant",
            ));
        }
        let tag = tag as u8;
        let ident = &variant.ident;
        let (bindings, pattern, constructor) = destructure(quote!(Self::#ident), &variant.fields);

        encode_arms.push(quote! {
            #pattern => {
                crate::types::encoding::Encode::encode(&#tag, out);
                #(crate::types::encoding::Encode::encode(#bindings, out);)*
            }
        });
        decode_arms.push(quote! {
            #tag => Ok(#constructor),
        });
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidValue),
        }
    };
    Ok((encode, decode))
}
