//! Procedural macros for the couchlayer project.
//!
//! `#[derive(EntityFields)]` turns the named fields of an entity struct into
//! [`FieldRef`](../couchlayer/selector/struct.FieldRef.html) constants, so selectors and sorts
//! refer to fields by a checked name instead of a string literal:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, EntityFields)]
//! struct User {
//!     #[serde(flatten)]
//!     meta: EntityMeta,
//!     #[serde(rename = "emailAddress")]
//!     email: String,
//!     age: u32,
//! }
//!
//! let selector = Selector::create_with_property(User::EMAIL, "a@example.com")?;
//! assert_eq!(User::EMAIL.name(), "emailAddress");
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, Token, ext::IdentExt, parse_macro_input};

#[proc_macro_derive(EntityFields)]
pub fn derive_entity_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "EntityFields can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(name, "EntityFields can only be derived for structs"));
        }
    };

    let rename_all = ContainerAttrs::parse(&input.attrs)?.rename_all;

    let mut constants = Vec::new();
    for field in fields {
        let Some(ident) = &field.ident else { continue };
        let attrs = SerdeAttrs::parse(&field.attrs)?;
        if attrs.flatten || attrs.skip {
            continue;
        }

        let rust_name = ident.unraw().to_string();
        let stored_name = match (attrs.rename, rename_all) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => rule.apply_to_field(&rust_name),
            (None, None) => rust_name.clone(),
        };
        let constant = format_ident!("{}", rust_name.to_uppercase());
        let doc = format!("Selector field for `{stored_name}`.");

        constants.push(quote! {
            #[doc = #doc]
            pub const #constant: ::couchlayer::selector::FieldRef =
                ::couchlayer::selector::FieldRef::new(#stored_name);
        });
    }

    Ok(quote! {
        impl #impl_generics #name #ty_generics #where_clause {
            #(#constants)*
        }
    })
}

/// Case conversions accepted by `#[serde(rename_all = "...")]`, applied to snake_case field names.
#[derive(Clone, Copy)]
enum RenameRule {
    LowerCase,
    UpperCase,
    PascalCase,
    CamelCase,
    SnakeCase,
    ScreamingSnakeCase,
    KebabCase,
    ScreamingKebabCase,
}

impl RenameRule {
    fn from_lit(lit: &LitStr) -> syn::Result<Self> {
        let rule = match lit.value().as_str() {
            "lowercase" => RenameRule::LowerCase,
            "UPPERCASE" => RenameRule::UpperCase,
            "PascalCase" => RenameRule::PascalCase,
            "camelCase" => RenameRule::CamelCase,
            "snake_case" => RenameRule::SnakeCase,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnakeCase,
            "kebab-case" => RenameRule::KebabCase,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebabCase,
            other => {
                return Err(syn::Error::new_spanned(lit, format!("unknown rename rule `{other}`")));
            }
        };

        Ok(rule)
    }

    fn apply_to_field(self, field: &str) -> String {
        match self {
            RenameRule::LowerCase | RenameRule::SnakeCase => field.to_string(),
            RenameRule::UpperCase | RenameRule::ScreamingSnakeCase => field.to_ascii_uppercase(),
            RenameRule::PascalCase => {
                let mut pascal = String::with_capacity(field.len());
                let mut capitalize = true;
                for c in field.chars() {
                    if c == '_' {
                        capitalize = true;
                    } else if capitalize {
                        pascal.push(c.to_ascii_uppercase());
                        capitalize = false;
                    } else {
                        pascal.push(c);
                    }
                }
                pascal
            }
            RenameRule::CamelCase => {
                let pascal = RenameRule::PascalCase.apply_to_field(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => pascal,
                }
            }
            RenameRule::KebabCase => field.replace('_', "-"),
            RenameRule::ScreamingKebabCase => field.to_ascii_uppercase().replace('_', "-"),
        }
    }
}

#[derive(Default)]
struct ContainerAttrs {
    rename_all: Option<RenameRule>,
}

impl ContainerAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = ContainerAttrs::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    if meta.input.peek(Token![=]) {
                        let value: LitStr = meta.value()?.parse()?;
                        parsed.rename_all = Some(RenameRule::from_lit(&value)?);
                    } else {
                        meta.parse_nested_meta(|inner| {
                            let value: LitStr = inner.value()?.parse()?;
                            if inner.path.is_ident("serialize") {
                                parsed.rename_all = Some(RenameRule::from_lit(&value)?);
                            }
                            Ok(())
                        })?;
                    }
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}

fn skip_meta(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        syn::parenthesized!(_content in meta.input);
    }
    Ok(())
}

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    flatten: bool,
    skip: bool,
}

impl SerdeAttrs {
    fn parse(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut parsed = SerdeAttrs::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    if meta.input.peek(Token![=]) {
                        let value: LitStr = meta.value()?.parse()?;
                        parsed.rename = Some(value.value());
                    } else {
                        meta.parse_nested_meta(|inner| {
                            let value: LitStr = inner.value()?.parse()?;
                            if inner.path.is_ident("serialize") {
                                parsed.rename = Some(value.value());
                            }
                            Ok(())
                        })?;
                    }
                } else if meta.path.is_ident("flatten") {
                    parsed.flatten = true;
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    parsed.skip = true;
                } else {
                    skip_meta(&meta)?;
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}
