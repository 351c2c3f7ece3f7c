use crate::Value;
use std::any::{TypeId, type_name};

/// Physical table reference.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl From<&str> for TableRef {
    /// Parses `schema.name` or a bare `name`.
    fn from(value: &str) -> Self {
        match value.split_once('.') {
            Some((schema, name)) => TableRef::new(schema, name),
            None => TableRef::new("", value),
        }
    }
}

/// Column definition: name, type prototype and key flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Typed null used as the type prototype.
    pub value: Value,
    pub nullable: bool,
    pub primary_key: bool,
    /// Generated by the database on insert.
    pub identity: bool,
    /// Overrides the SQL type the dialect would pick from `value`.
    pub column_type: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: value.as_null(),
            nullable: false,
            primary_key: false,
            identity: false,
            column_type: None,
        }
    }
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }
    pub fn identity(mut self, identity: bool) -> Self {
        self.identity = identity;
        self
    }
    pub fn column_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = Some(column_type.into());
        self
    }
}

/// Schema of a user-defined table type used as the row source of bulk statements.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedTable {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
}

/// Mapping from an entity type to its table.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    pub entity: TypeId,
    /// Short type name, used in messages.
    pub entity_name: &'static str,
    /// Fully qualified type name.
    pub type_path: &'static str,
    pub table: TableRef,
    /// Logical database used when a handle is created without naming one.
    pub database: Option<String>,
    pub columns: Vec<ColumnDef>,
    /// Name of the user-defined table type describing a bulk row.
    pub user_defined_table: Option<String>,
}

impl EntityMetadata {
    pub fn new<E: 'static>(table: TableRef, columns: Vec<ColumnDef>) -> Self {
        let entity_name = type_name::<E>();
        Self {
            entity: TypeId::of::<E>(),
            entity_name: entity_name.rsplit("::").next().unwrap_or(entity_name),
            type_path: entity_name,
            table,
            database: None,
            columns,
            user_defined_table: None,
        }
    }
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
    pub fn with_user_defined_table(mut self, name: impl Into<String>) -> Self {
        self.user_defined_table = Some(name.into());
        self
    }
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDef> + Clone {
        self.columns.iter().filter(|c| c.primary_key)
    }
    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }
    /// Columns written by an insert, identity columns are generated by the database.
    pub fn insertable(&self) -> impl Iterator<Item = &ColumnDef> + Clone {
        self.columns.iter().filter(|c| !c.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Member;

    #[test]
    fn table_ref_parsing() {
        assert_eq!(TableRef::from("dbo.Member"), TableRef::new("dbo", "Member"));
        assert_eq!(TableRef::from("Member"), TableRef::new("", "Member"));
    }

    #[test]
    fn metadata_accessors() {
        let metadata = EntityMetadata::new::<Member>(
            TableRef::from("Member"),
            vec![
                ColumnDef::new("Id", Value::Int32(Some(1)))
                    .primary_key(true)
                    .identity(true),
                ColumnDef::new("Name", Value::Varchar(None)).nullable(true),
            ],
        );
        assert_eq!(metadata.entity_name, "Member");
        assert!(metadata.columns[0].value.is_null());
        assert_eq!(metadata.column_index("Name"), Some(1));
        assert_eq!(metadata.primary_key().count(), 1);
        assert_eq!(
            metadata.insertable().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["Name"]
        );
    }
}
