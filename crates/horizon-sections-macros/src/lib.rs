//! Procedural macros for Horizon Sections.
//!
//! This crate provides `#[derive(Entity)]`, which implements the
//! `horizon_sections::Entity` contract for a struct with named fields.
//!
//! # Attributes
//!
//! ## `#[entity(id)]`
//!
//! Marks the field holding the entity's unique value. Exactly one field must
//! carry it. Its type becomes `Entity::Id` and is never touched by
//! `update_from`.
//!
//! ## `#[entity(key)]` / `#[entity(key = "alias")]`
//!
//! Exposes the field through `Entity::field`, which the model uses to derive
//! section names. The lookup key is the field name unless an alias is given.
//! The field type must implement `Display`.
//!
//! ## `#[entity(skip_update)]`
//!
//! Excludes the field from `update_from`, so a re-fetched duplicate never
//! overwrites it.
//!
//! # Example
//!
//! ```ignore
//! use horizon_sections::prelude::*;
//!
//! #[derive(Debug, Clone, Entity)]
//! struct Contact {
//!     #[entity(id)]
//!     id: u64,
//!     #[entity(key)]
//!     name: String,
//!     #[entity(key = "country")]
//!     country_code: String,
//!     #[entity(skip_update)]
//!     selected: bool,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Type, parse_macro_input};

/// Derive the `Entity` trait.
///
/// This macro generates:
/// - `type Id` and `unique_value()` from the `#[entity(id)]` field
/// - `field()` matching every `#[entity(key)]` field
/// - `update_from()` copying every field except the id and
///   `#[entity(skip_update)]` fields
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_derive_entity(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Parsed `#[entity(...)]` information for one field.
struct FieldInfo {
    name: Ident,
    ty: Type,
    is_id: bool,
    key: Option<String>,
    skip_update: bool,
}

fn impl_derive_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive only supports structs",
            ));
        }
    };

    let mut infos = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        infos.push(parse_entity_field(field)?);
    }

    let mut ids = infos.iter().filter(|info| info.is_id);
    let id_field = match (ids.next(), ids.next()) {
        (Some(id), None) => id,
        (None, _) => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive requires exactly one `#[entity(id)]` field",
            ));
        }
        (Some(_), Some(second)) => {
            return Err(syn::Error::new_spanned(
                &second.name,
                "duplicate `#[entity(id)]` field",
            ));
        }
    };

    let mut seen_keys: Vec<&str> = Vec::new();
    for info in &infos {
        if let Some(key) = &info.key {
            if seen_keys.contains(&key.as_str()) {
                return Err(syn::Error::new_spanned(
                    &info.name,
                    format!("duplicate entity key `{key}`"),
                ));
            }
            seen_keys.push(key.as_str());
        }
    }

    let id_name = &id_field.name;
    let id_type = &id_field.ty;

    let key_arms = infos.iter().filter_map(|info| {
        let key = info.key.as_ref()?;
        let name = &info.name;
        Some(quote! {
            #key => ::std::option::Option::Some(::std::string::ToString::to_string(&self.#name)),
        })
    });

    let update_stmts = infos
        .iter()
        .filter(|info| !info.is_id && !info.skip_update)
        .map(|info| {
            let name = &info.name;
            quote! {
                self.#name = ::std::clone::Clone::clone(&other.#name);
            }
        });

    Ok(quote! {
        impl #impl_generics ::horizon_sections::Entity for #struct_name #ty_generics #where_clause {
            type Id = #id_type;

            fn unique_value(&self) -> Self::Id {
                ::std::clone::Clone::clone(&self.#id_name)
            }

            fn field(&self, key: &str) -> ::std::option::Option<::std::string::String> {
                match key {
                    #(#key_arms)*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn update_from(&mut self, other: &Self) {
                #(#update_stmts)*
            }
        }
    })
}

/// Parse the `#[entity(...)]` attributes on a field.
fn parse_entity_field(field: &Field) -> syn::Result<FieldInfo> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;

    let mut info = FieldInfo {
        name,
        ty: field.ty.clone(),
        is_id: false,
        key: None,
        skip_update: false,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                info.is_id = true;
                Ok(())
            } else if meta.path.is_ident("key") {
                let key = if meta.input.peek(syn::Token![=]) {
                    let alias: LitStr = meta.value()?.parse()?;
                    alias.value()
                } else {
                    info.name.to_string()
                };
                info.key = Some(key);
                Ok(())
            } else if meta.path.is_ident("skip_update") {
                info.skip_update = true;
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute, expected `id`, `key` or `skip_update`"))
            }
        })?;
    }

    if info.is_id && info.skip_update {
        return Err(syn::Error::new_spanned(
            &info.name,
            "`skip_update` is implied for the `#[entity(id)]` field",
        ));
    }

    Ok(info)
}
