//! # graphwire Derive Macros
//!
//! This crate provides the `#[derive(Graph)]` macro for `graphwire`. It generates the
//! static type information the codec walks in place of runtime reflection.
//!
//! * On a struct with named fields: `Reflect`, describing the wire name, the embedded
//!   base, the declared fields and the encoding strategy.
//! * On a unit-only enum: `Reflect`, `EnumType`, `FieldValue` and `ArrayElement`.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Attribute, Data, DataEnum, DataStruct, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives the graphwire type description.
///
/// Container attributes: `#[graph(name = "...")]`, `#[graph(custom)]`,
/// `#[graph(externalizable)]`. Field attributes: `#[graph(base)]`, `#[graph(skip)]`.
#[proc_macro_derive(Graph, attributes(graph))]
pub fn derive_graph(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let expanded = match expand(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error(),
    };
    TokenStream::from(expanded)
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Graph cannot be derived for generic types",
        ));
    }
    let opts = parse_container_attributes(&input.attrs)?;
    let name = &input.ident;
    let wire_name = match &opts.name {
        Some(lit) => quote! { #lit },
        None => quote! { ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#name)) },
    };

    match &input.data {
        Data::Struct(ds) => generate_struct(name, &wire_name, &opts, ds),
        Data::Enum(de) => {
            if opts.custom || opts.externalizable {
                return Err(syn::Error::new(
                    name.span(),
                    "`custom` and `externalizable` apply to structs only",
                ));
            }
            generate_enum(name, &wire_name, de)
        }
        Data::Union(_) => Err(syn::Error::new(name.span(), "Graph does not support unions")),
    }
}

// --- Attribute Parsing ---

#[derive(Default)]
struct ContainerOpts {
    name: Option<LitStr>,
    custom: bool,
    externalizable: bool,
}

fn parse_container_attributes(attrs: &[Attribute]) -> syn::Result<ContainerOpts> {
    let mut opts = ContainerOpts::default();
    for attr in attrs {
        if attr.path().is_ident("graph") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let lit: LitStr = meta.value()?.parse()?;
                    if lit.value().is_empty() {
                        return Err(meta.error("the wire name cannot be empty"));
                    }
                    opts.name = Some(lit);
                    return Ok(());
                }
                if meta.path.is_ident("custom") {
                    opts.custom = true;
                    return Ok(());
                }
                if meta.path.is_ident("externalizable") {
                    opts.externalizable = true;
                    return Ok(());
                }
                Err(meta.error("Unknown graph attribute key. Supported: name, custom, externalizable"))
            })?;
        }
    }
    if opts.custom && opts.externalizable {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "`custom` and `externalizable` are mutually exclusive",
        ));
    }
    Ok(opts)
}

/// Parses field attributes. Returns (is_base, is_skipped).
fn parse_field_attributes(attrs: &[Attribute]) -> syn::Result<(bool, bool)> {
    let mut is_base = false;
    let mut is_skipped = false;
    for attr in attrs {
        if attr.path().is_ident("graph") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("base") {
                    is_base = true;
                    return Ok(());
                }
                if meta.path.is_ident("skip") {
                    is_skipped = true;
                    return Ok(());
                }
                Err(meta.error("Unknown graph field attribute. Supported: base, skip"))
            })?;
        }
    }
    if is_base && is_skipped {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "a base field cannot be skipped",
        ));
    }
    Ok((is_base, is_skipped))
}

// --- Generator: structs ---

fn generate_struct(
    name: &syn::Ident,
    wire_name: &proc_macro2::TokenStream,
    opts: &ContainerOpts,
    ds: &DataStruct,
) -> syn::Result<proc_macro2::TokenStream> {
    if opts.externalizable {
        return Ok(quote! {
            impl graphwire::Reflect for #name {
                fn describe(
                    _registry: &mut graphwire::TypeRegistry,
                ) -> graphwire::Result<graphwire::TypeInfo> {
                    ::core::result::Result::Ok(graphwire::TypeInfo::externalizable::<#name>(
                        #wire_name,
                        graphwire::rt::external_fns::<#name>(),
                    ))
                }
            }
        });
    }

    let named = match &ds.fields {
        Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
        Fields::Unit => Vec::new(),
        Fields::Unnamed(_) => {
            return Err(syn::Error::new(
                name.span(),
                "Graph supports structs with named fields only",
            ));
        }
    };

    let mut base = None;
    let mut fields = Vec::new();
    for field in named {
        let (is_base, is_skipped) = parse_field_attributes(&field.attrs)?;
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        if is_base {
            if base.is_some() {
                return Err(syn::Error::new(ident.span(), "at most one field can be the base"));
            }
            base = Some((ident, &field.ty));
        } else if !is_skipped {
            fields.push((ident, &field.ty));
        }
    }

    let base_expr = match base {
        Some((ident, ty)) => quote! {
            {
                registry.register::<#ty>()?;
                fn project(
                    obj: &dyn ::std::any::Any,
                ) -> graphwire::Result<&dyn ::std::any::Any> {
                    ::core::result::Result::Ok(&graphwire::rt::downcast_ref::<#name>(obj)?.#ident)
                }
                fn project_mut(
                    obj: &mut dyn ::std::any::Any,
                ) -> graphwire::Result<&mut dyn ::std::any::Any> {
                    ::core::result::Result::Ok(
                        &mut graphwire::rt::downcast_mut::<#name>(obj)?.#ident,
                    )
                }
                ::core::option::Option::Some(graphwire::registry::BaseLink {
                    type_id: ::std::any::TypeId::of::<#ty>(),
                    project,
                    project_mut,
                })
            }
        },
        None => quote! { ::core::option::Option::None },
    };

    let field_entries = fields.iter().map(|(ident, ty)| {
        let field_name = ident.unraw().to_string();
        quote! {
            {
                fn get(obj: &dyn ::std::any::Any) -> graphwire::Result<graphwire::Value> {
                    <#ty as graphwire::FieldValue>::to_value(
                        &graphwire::rt::downcast_ref::<#name>(obj)?.#ident,
                    )
                }
                fn set(
                    obj: &mut dyn ::std::any::Any,
                    value: graphwire::Value,
                ) -> graphwire::Result<()> {
                    graphwire::rt::downcast_mut::<#name>(obj)?.#ident =
                        <#ty as graphwire::FieldValue>::from_value(value)?;
                    ::core::result::Result::Ok(())
                }
                let key = <#ty as graphwire::FieldValue>::field_type(registry)?;
                fields.push(graphwire::registry::FieldInfo::new(#field_name, key, get, set));
            }
        }
    });

    let hook_expr = if opts.custom {
        quote! { ::core::option::Option::Some(graphwire::rt::hook_fns::<#name>()) }
    } else {
        quote! { ::core::option::Option::None }
    };

    Ok(quote! {
        impl graphwire::Reflect for #name {
            fn describe(
                registry: &mut graphwire::TypeRegistry,
            ) -> graphwire::Result<graphwire::TypeInfo> {
                let base = #base_expr;
                #[allow(unused_mut)]
                let mut fields = ::std::vec::Vec::new();
                #(#field_entries)*
                ::core::result::Result::Ok(graphwire::TypeInfo::plain::<#name>(
                    #wire_name,
                    base,
                    fields,
                    #hook_expr,
                ))
            }
        }
    })
}

// --- Generator: unit-only enums ---

fn generate_enum(
    name: &syn::Ident,
    wire_name: &proc_macro2::TokenStream,
    de: &DataEnum,
) -> syn::Result<proc_macro2::TokenStream> {
    let mut variants = Vec::new();
    for variant in &de.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.ident.span(),
                "Graph supports unit-only enums",
            ));
        }
        variants.push((&variant.ident, variant.ident.unraw().to_string()));
    }
    let names = variants.iter().map(|(_, n)| n);
    let to_name = variants.iter().map(|(ident, n)| quote! { Self::#ident => #n });
    let from_name = variants
        .iter()
        .map(|(ident, n)| quote! { #n => ::core::option::Option::Some(Self::#ident) });

    Ok(quote! {
        impl graphwire::Reflect for #name {
            fn describe(
                _registry: &mut graphwire::TypeRegistry,
            ) -> graphwire::Result<graphwire::TypeInfo> {
                ::core::result::Result::Ok(graphwire::TypeInfo::enumeration::<#name>(
                    #wire_name,
                    &[#(#names),*],
                ))
            }
        }

        impl graphwire::EnumType for #name {
            fn variant_name(&self) -> &'static str {
                match *self {
                    #(#to_name,)*
                }
            }

            fn from_variant_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#from_name,)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl graphwire::FieldValue for #name {
            fn field_type(
                registry: &mut graphwire::TypeRegistry,
            ) -> graphwire::Result<graphwire::TypeKey> {
                graphwire::rt::enum_field_type::<#name>(registry)
            }

            fn to_value(&self) -> graphwire::Result<graphwire::Value> {
                ::core::result::Result::Ok(graphwire::rt::enum_to_value(self))
            }

            fn from_value(value: graphwire::Value) -> graphwire::Result<Self> {
                graphwire::rt::enum_from_value(value)
            }
        }

        impl graphwire::ArrayElement for #name {
            fn element_key() -> graphwire::TypeKey {
                graphwire::TypeKey::of::<#name>()
            }

            fn register_element(registry: &mut graphwire::TypeRegistry) -> graphwire::Result<()> {
                registry.register::<#name>()?;
                ::core::result::Result::Ok(())
            }

            fn to_array(items: &[Self]) -> graphwire::Result<graphwire::ArrayData> {
                ::core::result::Result::Ok(graphwire::rt::enum_array(items))
            }

            fn from_array(data: &graphwire::ArrayData) -> graphwire::Result<::std::vec::Vec<Self>> {
                graphwire::rt::enum_elements(data)
            }
        }
    })
}
