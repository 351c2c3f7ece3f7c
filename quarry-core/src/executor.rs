use crate::{
    Driver, Result, Row, Value,
    future::TryFutureExt,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::{future::Future, sync::Arc};

/// Outcome of a modifying statement.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Backend-specific last inserted identifier when available.
    pub last_affected_id: Option<i64>,
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;

/// A result row with its corresponding column labels.
#[derive(Default, Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    /// Aligned by index with `labels`.
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Clone)]
pub enum QueryResult {
    Row(RowLabeled),
    Affected(RowsAffected),
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if elem.last_affected_id.is_some() {
                self.last_affected_id = elem.last_affected_id;
            }
        }
    }
}

impl From<RowLabeled> for Row {
    fn from(value: RowLabeled) -> Self {
        value.values
    }
}

impl From<RowLabeled> for QueryResult {
    fn from(value: RowLabeled) -> Self {
        QueryResult::Row(value)
    }
}

impl From<RowsAffected> for QueryResult {
    fn from(value: RowsAffected) -> Self {
        QueryResult::Affected(value)
    }
}

pub trait Executor: Send + Sized {
    type Driver: Driver;

    /// Send one statement with its parameters, in placeholder order, and stream every result.
    fn run(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the statement and return the rows.
    fn fetch(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(sql, params).filter_map(|v| async move {
            match v {
                Ok(QueryResult::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the statement and return the total number of rows affected.
    fn execute(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(sql, params)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryResult::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }

    /// Run a parameterless transaction statement (`BEGIN`, `COMMIT`, `ROLLBACK`).
    fn control(&mut self, sql: &str) -> impl Future<Output = Result<()>> + Send {
        self.execute(sql, Vec::new()).map_ok(|_| ())
    }
}
