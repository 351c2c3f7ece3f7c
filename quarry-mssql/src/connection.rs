use crate::{
    MssqlDriver,
    extract::{bind_value, decode_value},
};
use async_stream::try_stream;
use quarry_core::{
    Connection, Context, Driver, Error, Executor, QueryResult, Result, Row, RowLabeled, RowNames,
    RowsAffected, Value,
    stream::{Stream, TryStreamExt},
};
use std::{future::Future, sync::Arc};
use tiberius::{Client, Config, Query, QueryItem};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Connection to SQL Server over TDS.
pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
}

fn prepare(sql: &str, params: Vec<Value>) -> Result<Query<'static>> {
    let mut query = Query::new(sql.to_string());
    for value in params {
        bind_value(&mut query, value)?;
    }
    Ok(query)
}

impl Executor for MssqlConnection {
    type Driver = MssqlDriver;

    fn run(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Stream<Item = Result<QueryResult>> + Send {
        try_stream! {
            let query = prepare(sql, params)?;
            let mut stream = query.query(&mut self.client).await?;
            let mut labels = RowNames::from([]);
            while let Some(item) = stream.try_next().await? {
                match item {
                    QueryItem::Metadata(metadata) => {
                        labels = metadata
                            .columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                    }
                    QueryItem::Row(row) => {
                        let values = row.into_iter().map(decode_value).collect::<Result<Row>>()?;
                        yield RowLabeled::new(labels.clone(), values).into();
                    }
                }
            }
        }
    }

    /// Rows affected by the last statement of the batch, bulk batches stage their rows first.
    fn execute(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            let query = prepare(sql, params)?;
            let result = query.execute(&mut self.client).await?;
            Ok(RowsAffected {
                rows_affected: result.rows_affected().last().copied().unwrap_or_default(),
                last_affected_id: None,
            })
        }
    }

    /// Sent as a plain batch, a transaction opened inside `sp_executesql` would not outlive it.
    fn control(&mut self, sql: &str) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.client.simple_query(sql).await?.into_results().await?;
            Ok(())
        }
    }
}

impl Connection for MssqlConnection {
    /// Opens `mssql://` followed by an ADO.NET connection string, for example
    /// `mssql://server=tcp:localhost,1433;user=sa;password=..;TrustServerCertificate=true`.
    async fn connect(url: &str) -> Result<MssqlConnection> {
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        let Some(connection_string) = url.strip_prefix(&prefix) else {
            return Err(Error::msg(format!(
                "Expected SQL Server connection url to start with `{}`",
                &prefix
            )));
        };
        let config = Config::from_ado_string(connection_string)
            .context("Could not parse the SQL Server connection string")?;
        let address = config.get_addr();
        let tcp = TcpStream::connect(&address)
            .await
            .with_context(|| format!("Could not reach SQL Server at `{}`", address))?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .context("Could not log in to SQL Server")?;
        Ok(Self { client })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrong_url() {
        assert!(MssqlConnection::connect("sqlite://some_value").await.is_err());
    }

    #[test]
    fn parameters_follow_placeholder_order() {
        assert!(prepare("SELECT @P1, @P2", vec![Value::Int32(Some(1)), Value::Null]).is_ok());
    }
}
