//! # Parflight Derive Macros
//!
//! This crate provides the procedural macro for `parflight`. It automates
//! the implementation of the `EventShape` bridge that lets recorded events
//! decode straight into plain Rust structs.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `EventShape`, mapping a struct onto one recorded event type.
///
/// Field names double as the recorded field names; use
/// `#[parflight(rename = "...")]` where the Rust name differs (recorded
/// names are typically camelCase). The struct-level
/// `#[parflight(event = "...")]` sets the fully qualified event name used
/// by name-filtered iteration; without it the bare struct name is used,
/// which still decodes structurally but rarely matches a recorded name.
///
/// ```rust,ignore
/// #[derive(ParflightEvent)]
/// #[parflight(event = "jdk.ThreadSleep")]
/// struct ThreadSleep {
///     #[parflight(rename = "startTime")]
///     start_time: i64,
///     time: i64,
/// }
/// ```
#[proc_macro_derive(ParflightEvent, attributes(parflight))]
pub fn derive_parflight_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let event_name = match parse_event_name(&input.attrs) {
        Ok(event_name) => event_name,
        Err(e) => return e.to_compile_error().into(),
    };

    let data_struct = match input.data {
        Data::Struct(ds) => ds,
        _ => {
            return syn::Error::new(name.span(), "ParflightEvent only supports structs")
                .to_compile_error()
                .into();
        }
    };
    let named = match data_struct.fields {
        Fields::Named(fields) => fields.named,
        _ => {
            return syn::Error::new(name.span(), "ParflightEvent requires named fields")
                .to_compile_error()
                .into();
        }
    };

    let mut fields = Vec::new();
    for field in named {
        let recorded = match parse_field_rename(&field.attrs) {
            Ok(recorded) => recorded,
            Err(e) => return e.to_compile_error().into(),
        };
        let ident = field.ident.clone().unwrap();
        let recorded = recorded.unwrap_or_else(|| ident.to_string());
        fields.push(FieldSpec { ident, recorded });
    }

    let struct_name = name.to_string();
    let event_name = event_name.unwrap_or_else(|| struct_name.clone());
    let expanded = generate_event_shape(&name, &event_name, &struct_name, &fields);
    TokenStream::from(expanded)
}

// --- Internal Data Structures ---

struct FieldSpec {
    ident: syn::Ident,
    /// Name of the field as the recording declares it.
    recorded: String,
}

/// Parses the struct-level attribute. Returns the declared event name.
fn parse_event_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut event_name = None;
    for attr in attrs {
        if attr.path().is_ident("parflight") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("event") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    event_name = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown parflight attribute key. Supported on structs: event"))
            })?;
        }
    }
    Ok(event_name)
}

/// Parses one field's attributes. Returns the recorded-name override.
fn parse_field_rename(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs {
        if attr.path().is_ident("parflight") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    rename = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown parflight attribute key. Supported on fields: rename"))
            })?;
        }
    }
    Ok(rename)
}

// --- Generator: EventShape ---

fn generate_event_shape(
    name: &syn::Ident,
    event_name: &str,
    struct_name: &str,
    fields: &[FieldSpec],
) -> proc_macro2::TokenStream {
    let recorded_names = fields.iter().map(|f| f.recorded.as_str());

    // Slot indices follow FIELDS order; the runtime fills exactly these
    // slots and from_slots drains each one once.
    let build_fields = fields.iter().enumerate().map(|(slot, f)| {
        let ident = &f.ident;
        quote! {
            #ident: parflight::rt::FromValue::from_value(slots.take(#slot)?)?,
        }
    });

    quote! {
        impl parflight::rt::EventShape for #name {
            const EVENT_NAME: &'static str = #event_name;
            const STRUCT_NAME: &'static str = #struct_name;
            const FIELDS: &'static [&'static str] = &[#(#recorded_names),*];

            fn from_slots(slots: &mut parflight::rt::SlotBuffer) -> parflight::Result<Self> {
                Ok(Self {
                    #(#build_fields)*
                })
            }
        }
    }
}
