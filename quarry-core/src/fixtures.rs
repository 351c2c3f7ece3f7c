//! Hand written entities for the unit tests, shaped like the derive output.
#![allow(non_upper_case_globals)]

use crate::{
    AsValue, Column, ColumnDef, Connection, DEFAULT_DATABASE, Driver, Entity, EntityMetadata,
    Error, Executor, FromRow, GenericSqlWriter, QueryDescriptor, QueryResult, Registry, Result,
    Row, RowLabeled, RowsAffected, TableRef, Value, next_value,
    stream::{self, Stream},
};
use std::{sync::LazyLock, time::Duration};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Member {
    pub id: i32,
    pub name: String,
    pub nickname: Option<String>,
    pub age: i16,
}

impl Member {
    pub const id: Column<Member, i32> = Column::new("Id");
    pub const name: Column<Member, String> = Column::new("Name");
    pub const nickname: Column<Member, Option<String>> = Column::new("Nickname");
    pub const age: Column<Member, i16> = Column::new("Age");
}

impl Entity for Member {
    fn metadata() -> &'static EntityMetadata {
        static METADATA: LazyLock<EntityMetadata> = LazyLock::new(|| {
            EntityMetadata::new::<Member>(
                TableRef::new("club", "Member"),
                vec![
                    ColumnDef::new("Id", Value::Int32(None)).primary_key(true),
                    ColumnDef::new("Name", Value::Varchar(None)),
                    ColumnDef::new("Nickname", Value::Varchar(None)).nullable(true),
                    ColumnDef::new("Age", Value::Int16(None)),
                ],
            )
        });
        &METADATA
    }

    fn row(&self) -> Row {
        Box::new([
            self.id.as_value(),
            self.name.clone().as_value(),
            self.nickname.clone().as_value(),
            self.age.as_value(),
        ])
    }
}

impl FromRow for Member {
    fn width() -> usize {
        4
    }
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
        Ok(Self {
            id: next_value(values)?,
            name: next_value(values)?,
            nickname: next_value(values)?,
            age: next_value(values)?,
        })
    }
}

/// Keyless entity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Visit {
    pub member_id: i32,
    pub room: String,
}

impl Visit {
    pub const member_id: Column<Visit, i32> = Column::new("MemberId");
    pub const room: Column<Visit, String> = Column::new("Room");
}

impl Entity for Visit {
    fn metadata() -> &'static EntityMetadata {
        static METADATA: LazyLock<EntityMetadata> = LazyLock::new(|| {
            EntityMetadata::new::<Visit>(
                TableRef::from("Visit"),
                vec![
                    ColumnDef::new("MemberId", Value::Int32(None)),
                    ColumnDef::new("Room", Value::Varchar(None)),
                ],
            )
        });
        &METADATA
    }

    fn row(&self) -> Row {
        Box::new([self.member_id.as_value(), self.room.clone().as_value()])
    }
}

impl FromRow for Visit {
    fn width() -> usize {
        2
    }
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
        Ok(Self {
            member_id: next_value(values)?,
            room: next_value(values)?,
        })
    }
}

pub(crate) fn descriptor<E: Entity>() -> QueryDescriptor {
    let root = Registry::new(false)
        .resolve::<E>(DEFAULT_DATABASE)
        .expect("Non strict registries resolve every entity");
    QueryDescriptor::new(root, DEFAULT_DATABASE.into())
}

/// Driver answering from the statement text: `SELECT` echoes the parameters as a row, `FAIL`
/// errors, `SLOW` sleeps first and anything else reports one affected row per parameter.
#[derive(Default)]
pub(crate) struct MockDriver;

impl Driver for MockDriver {
    type Connection = MockConnection;
    type SqlWriter = GenericSqlWriter;

    const NAME: &'static str = "mock";

    fn sql_writer(&self) -> GenericSqlWriter {
        GenericSqlWriter::new()
    }
}

pub(crate) struct MockConnection;

impl Executor for MockConnection {
    type Driver = MockDriver;

    fn run(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Stream<Item = Result<QueryResult>> + Send {
        let sql = sql.to_string();
        stream::once(async move {
            if sql.starts_with("FAIL") {
                return Err(Error::msg("syntax error"));
            }
            if sql.starts_with("SLOW") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            let result: QueryResult = if sql.starts_with("SELECT") {
                let labels = (1..=params.len()).map(|i| format!("c{}", i)).collect();
                RowLabeled::new(labels, params.into_boxed_slice()).into()
            } else {
                RowsAffected {
                    rows_affected: params.len() as u64,
                    last_affected_id: None,
                }
                .into()
            };
            Ok(result)
        })
    }
}

impl Connection for MockConnection {
    async fn connect(url: &str) -> Result<MockConnection> {
        match url.starts_with("mock://") {
            true => Ok(MockConnection),
            false => Err(Error::msg(format!("Cannot connect to `{}`", url))),
        }
    }
}
