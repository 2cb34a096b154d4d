//! # Bindery Macros
//!
//! Procedural macros for the Bindery binding engine.
//!
//! ## Derives
//!
//! - `#[derive(Bind)]` lists a struct's fields for schema building
//!
//! ```ignore
//! #[derive(Default, Bind)]
//! struct Search {
//!     #[bind(r#"param:"q" len:"2-32""#)]
//!     keyword: String,
//!     #[bind(flatten)]
//!     paging: Paging,
//!     #[bind(skip)]
//!     cache_key: String,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive `bindery_core::Bind` for a struct with named fields
///
/// Field attributes:
///
/// - `#[bind("...")]` the field's tag string (`param:"name" len:"2-4"`)
/// - `#[bind(flatten)]` the field is itself `Bind`; its fields are inlined
/// - `#[bind(skip)]` the field is not bindable
///
/// A field without an attribute is bound under its own name with no rules.
#[proc_macro_derive(Bind, attributes(bind))]
pub fn derive_bind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

enum FieldAttr {
    Tag(LitStr),
    Flatten,
    Skip,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Bind can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Bind can only be derived for structs",
            ))
        }
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Bind cannot be derived for generic structs",
        ));
    }

    let mut calls = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        let name = ident.unraw().to_string();
        let call = match parse_attr(field)? {
            Some(FieldAttr::Skip) => continue,
            Some(FieldAttr::Flatten) => quote! {
                fields.flatten(#name, |s| &mut s.#ident);
            },
            Some(FieldAttr::Tag(tag)) => quote! {
                fields.field(#name, #tag, |s| &mut s.#ident);
            },
            None => quote! {
                fields.field(#name, "", |s| &mut s.#ident);
            },
        };
        calls.push(call);
    }

    let ty = &input.ident;
    Ok(quote! {
        impl ::bindery_core::Bind for #ty {
            fn describe(fields: &mut ::bindery_core::Fields<Self>) {
                #(#calls)*
            }
        }
    })
}

fn parse_attr(field: &syn::Field) -> syn::Result<Option<FieldAttr>> {
    let mut found = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("bind")) {
        if found.is_some() {
            return Err(syn::Error::new_spanned(attr, "duplicate #[bind] attribute"));
        }
        let parsed = if let Ok(tag) = attr.parse_args::<LitStr>() {
            FieldAttr::Tag(tag)
        } else {
            let word: syn::Ident = attr.parse_args()?;
            match word.to_string().as_str() {
                "flatten" => FieldAttr::Flatten,
                "skip" => FieldAttr::Skip,
                _ => {
                    return Err(syn::Error::new_spanned(
                        word,
                        "expected a tag string, `flatten` or `skip`",
                    ))
                }
            }
        };
        found = Some(parsed);
    }
    Ok(found)
}
