use quarry_core::{SqlWriter, Value, writer::Context};

/// Generic dialect with sqlite storage classes.
///
/// Integer columns are declared `INTEGER` so that a single integer primary key aliases the rowid
/// and is generated on insert.
#[derive(Default, Debug, Clone, Copy)]
pub struct SqliteSqlWriter {}

impl SqlWriter for SqliteSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    fn write_value_type(&self, _context: &mut Context, out: &mut String, value: &Value, _key: bool) {
        match value {
            Value::Boolean(..)
            | Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..) => out.push_str("INTEGER"),
            Value::Float32(..) | Value::Float64(..) => out.push_str("REAL"),
            Value::Decimal(..) => out.push_str("NUMERIC"),
            Value::Blob(..) => out.push_str("BLOB"),
            Value::Char(..)
            | Value::Varchar(..)
            | Value::Date(..)
            | Value::Time(..)
            | Value::Timestamp(..)
            | Value::TimestampWithTimezone(..)
            | Value::Uuid(..) => out.push_str("TEXT"),
            _ => log::error!(
                "Unexpected quarry::Value, cannot get the sqlite type from {:?} variant",
                value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{ColumnDef, EntityMetadata, Fragment, TableRef};

    struct Note;

    #[test]
    fn integer_key_aliases_the_rowid() {
        let metadata = EntityMetadata::new::<Note>(
            TableRef::from("Note"),
            vec![
                ColumnDef::new("Id", Value::Int32(None))
                    .primary_key(true)
                    .identity(true),
                ColumnDef::new("Text", Value::Varchar(None)).nullable(true),
                ColumnDef::new("Price", Value::Decimal(None, 10, 2)),
            ],
        );
        let mut out = String::new();
        SqliteSqlWriter {}.write_create_table(
            &mut Context::new(Fragment::None, false),
            &mut out,
            &metadata,
            true,
        );
        assert_eq!(
            out,
            r#"CREATE TABLE IF NOT EXISTS "Note" ("Id" INTEGER PRIMARY KEY, "Text" TEXT, "Price" NUMERIC NOT NULL);"#
        );
    }
}
