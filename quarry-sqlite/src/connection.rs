use crate::{
    SqliteDriver,
    extract::{decode_value, encode_value},
};
use async_stream::try_stream;
use quarry_core::{
    Connection, Context, Driver, Error, Executor, QueryResult, Result, Row, RowLabeled, RowNames,
    RowsAffected, Value, stream::Stream,
};
use rusqlite::OpenFlags;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::spawn_blocking;

/// Connection to a sqlite database, statements run on the blocking thread pool.
pub struct SqliteConnection {
    connection: Arc<Mutex<rusqlite::Connection>>,
}

fn run_blocking(
    connection: &Mutex<rusqlite::Connection>,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<QueryResult>> {
    let connection = connection.lock().unwrap_or_else(PoisonError::into_inner);
    let mut statement = connection.prepare(sql)?;
    for (i, value) in params.into_iter().enumerate() {
        statement.raw_bind_parameter(i + 1, encode_value(value)?)?;
    }
    let labels: RowNames = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut result = Vec::new();
    {
        let mut rows = statement.raw_query();
        while let Some(row) = rows.next()? {
            let values = (0..labels.len())
                .map(|i| row.get_ref(i).map(decode_value))
                .collect::<rusqlite::Result<Row>>()?;
            result.push(RowLabeled::new(labels.clone(), values).into());
        }
    }
    if labels.is_empty() {
        let last_insert_rowid = connection.last_insert_rowid();
        result.push(
            RowsAffected {
                rows_affected: connection.changes() as u64,
                last_affected_id: (last_insert_rowid != 0).then_some(last_insert_rowid),
            }
            .into(),
        );
    }
    Ok(result)
}

impl Executor for SqliteConnection {
    type Driver = SqliteDriver;

    fn run(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Stream<Item = Result<QueryResult>> + Send {
        let connection = self.connection.clone();
        let sql = sql.to_string();
        try_stream! {
            let results = spawn_blocking(move || run_blocking(&connection, &sql, params))
                .await
                .map_err(Error::new)??;
            for result in results {
                yield result;
            }
        }
    }
}

impl Connection for SqliteConnection {
    /// Opens `sqlite://path?mode=rwc` style URLs, the path is handed to sqlite as a URI filename.
    async fn connect(url: &str) -> Result<SqliteConnection> {
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        let Some(path) = url.strip_prefix(&prefix) else {
            return Err(Error::msg(format!(
                "Expected sqlite connection url to start with `{}`",
                &prefix
            )));
        };
        let path = if path.starts_with("file:") || path == ":memory:" {
            path.to_string()
        } else {
            format!("file:{}", path)
        };
        let context = format!("Could not open the sqlite database `{}`", path);
        let connection = spawn_blocking(move || {
            rusqlite::Connection::open_with_flags(&path, OpenFlags::default())
        })
        .await?
        .context(context)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}
