mod decode_column;
mod decode_table;

use decode_table::{TableMetadata, decode_table};
use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

#[proc_macro_derive(Entity, attributes(quarry))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let table = decode_table(parse_macro_input!(input as ItemStruct));
    let TableMetadata {
        item,
        columns,
        name: table_name,
        schema,
        database,
        user_defined_table,
    } = &table;
    let name = &item.ident;
    if !item.generics.params.is_empty() {
        panic!("`Entity` cannot be derived for generic structs");
    }
    let column_defs = columns.iter().map(|c| {
        let ty = &c.ty;
        let column = &c.name;
        let key = c.key;
        let identity = c.identity;
        let column_type = c
            .column_type
            .as_ref()
            .map(|v| quote!(.column_type(#v)));
        quote! {
            ::quarry::ColumnDef::new(#column, <#ty as ::quarry::AsValue>::as_empty_value())
                .nullable(<#ty as ::quarry::AsValue>::NULLABLE)
                .primary_key(#key)
                .identity(#identity)
                #column_type
        }
    });
    let database = database.as_ref().map(|v| quote!(.with_database(#v)));
    let user_defined_table = user_defined_table
        .as_ref()
        .map(|v| quote!(.with_user_defined_table(#v)));
    let values = columns.iter().map(|c| {
        let ident = &c.ident;
        quote!(::quarry::AsValue::as_value(::std::clone::Clone::clone(&self.#ident)))
    });
    let width = columns.len();
    let fields = columns.iter().map(|c| {
        let ident = &c.ident;
        quote!(#ident: ::quarry::next_value(values)?)
    });
    let constants = columns.iter().map(|c| {
        let ident = &c.ident;
        let ty = &c.ty;
        let column = &c.name;
        quote! {
            #[allow(non_upper_case_globals)]
            pub const #ident: ::quarry::Column<#name, #ty> = ::quarry::Column::new(#column);
        }
    });
    quote! {
        impl ::quarry::Entity for #name {
            fn metadata() -> &'static ::quarry::EntityMetadata {
                static METADATA: ::std::sync::LazyLock<::quarry::EntityMetadata> =
                    ::std::sync::LazyLock::new(|| {
                        ::quarry::EntityMetadata::new::<#name>(
                            ::quarry::TableRef::new(#schema, #table_name),
                            vec![#(#column_defs),*],
                        )
                        #database
                        #user_defined_table
                    });
                &METADATA
            }

            fn row(&self) -> ::quarry::Row {
                vec![#(#values),*].into_boxed_slice()
            }
        }

        impl ::quarry::FromRow for #name {
            fn width() -> usize {
                #width
            }

            fn from_values(
                values: &mut dyn ::std::iter::Iterator<Item = ::quarry::Value>,
            ) -> ::quarry::Result<Self> {
                Ok(Self {
                    #(#fields,)*
                })
            }
        }

        impl #name {
            #(#constants)*
        }
    }
    .into()
}
