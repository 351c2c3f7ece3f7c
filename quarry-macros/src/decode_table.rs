use crate::decode_column::{ColumnMetadata, decode_column};
use quote::ToTokens;
use syn::{Fields, ItemStruct, LitStr, parse::ParseBuffer};

pub(crate) struct TableMetadata {
    pub(crate) item: ItemStruct,
    pub(crate) columns: Vec<ColumnMetadata>,
    pub(crate) name: String,
    pub(crate) schema: String,
    pub(crate) database: Option<String>,
    pub(crate) user_defined_table: Option<String>,
}

pub(crate) fn decode_table(item: ItemStruct) -> TableMetadata {
    let Fields::Named(fields) = &item.fields else {
        panic!("`Entity` can be derived only for structs with named fields");
    };
    let columns = fields.named.iter().map(decode_column).collect();
    let mut name = item.ident.to_string();
    let mut schema = String::new();
    let mut database = None;
    let mut user_defined_table = None;
    for attr in &item.attrs {
        let meta = &attr.meta;
        if meta.path().is_ident("quarry") {
            let Ok(list) = meta.require_list() else {
                panic!("Error while parsing `quarry`, use it like: `#[quarry(attribute = value, ..)]`");
            };
            let _ = list.parse_nested_meta(|arg| {
                let Ok(value) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                    panic!(
                        "Error while parsing `{}`, use it like: `#[quarry({} = \"value\")]`",
                        arg.path.to_token_stream(),
                        arg.path.to_token_stream()
                    );
                };
                let value = value.value();
                if arg.path.is_ident("table") {
                    name = value;
                } else if arg.path.is_ident("schema") {
                    schema = value;
                } else if arg.path.is_ident("database") {
                    database = Some(value);
                } else if arg.path.is_ident("user_defined_table") {
                    user_defined_table = Some(value);
                } else {
                    panic!(
                        "Unknown attribute `{}` inside quarry macro",
                        arg.path.to_token_stream()
                    );
                }
                Ok(())
            });
        }
    }
    TableMetadata {
        item,
        columns,
        name,
        schema,
        database,
        user_defined_table,
    }
}
