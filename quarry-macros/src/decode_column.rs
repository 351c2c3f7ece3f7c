use convert_case::{Case, Casing};
use quote::ToTokens;
use syn::{Field, Ident, LitStr, Type, parse::ParseBuffer};

pub(crate) struct ColumnMetadata {
    pub(crate) ident: Ident,
    pub(crate) ty: Type,
    pub(crate) name: String,
    pub(crate) column_type: Option<String>,
    pub(crate) key: bool,
    pub(crate) identity: bool,
}

pub(crate) fn decode_column(field: &Field) -> ColumnMetadata {
    let ident = field
        .ident
        .clone()
        .expect("Field is expected to have a name");
    let mut name = ident.to_string();
    if name.starts_with('_') {
        name.remove(0);
    }
    let mut metadata = ColumnMetadata {
        ident,
        ty: field.ty.clone(),
        name: name.to_case(Case::Pascal),
        column_type: None,
        key: false,
        identity: false,
    };
    for attr in &field.attrs {
        let meta = &attr.meta;
        if meta.path().is_ident("quarry") {
            let Ok(list) = meta.require_list() else {
                panic!(
                    "Error while parsing `quarry`, use it like: `#[quarry(attribute = value, ...)]`",
                );
            };
            let _ = list.parse_nested_meta(|arg| {
                if arg.path.is_ident("name") {
                    let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                        panic!("Error while parsing `name`, use it like: `#[quarry(name = \"MyColumn\")]`");
                    };
                    metadata.name = v.value();
                } else if arg.path.is_ident("type") {
                    let Ok(v) = arg.value().and_then(ParseBuffer::parse::<LitStr>) else {
                        panic!("Error while parsing `type`, use it like: `#[quarry(type = \"NVARCHAR(50)\")]`");
                    };
                    metadata.column_type = Some(v.value());
                } else if arg.path.is_ident("key") {
                    let Err(..) = arg.value() else {
                        // value() is Err for Meta::Path
                        panic!("Error while parsing `key`, use it like: `#[quarry(key)]`");
                    };
                    metadata.key = true;
                } else if arg.path.is_ident("identity") {
                    let Err(..) = arg.value() else {
                        panic!("Error while parsing `identity`, use it like: `#[quarry(identity)]`");
                    };
                    metadata.identity = true;
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
    metadata
}
