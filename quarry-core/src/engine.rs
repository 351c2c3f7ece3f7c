use crate::{
    Connection, Pooled, QuarryError, Result, RowLabeled, RowsAffected, Value,
    stream::TryStreamExt, truncate_long,
};
use std::{fmt, sync::Arc, time::Duration};
use tokio::time::{error::Elapsed, timeout};

/// Hook receiving every statement and its bound parameters right before execution.
pub type OutputSql = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// Per handle execution settings.
#[derive(Clone, Default)]
pub struct ExecutionOptions {
    pub output_sql: Option<OutputSql>,
    /// Overrides the context timeout.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("output_sql", &self.output_sql.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runs statements on a pooled connection, applying the hook, the timeout and the error policy.
pub struct Engine<'a, C: Connection> {
    connection: Pooled<C>,
    options: &'a ExecutionOptions,
    timeout: Duration,
}

impl<'a, C: Connection> Engine<'a, C> {
    pub fn new(connection: Pooled<C>, options: &'a ExecutionOptions, default_timeout: Duration) -> Self {
        Self {
            connection,
            options,
            timeout: options.timeout.unwrap_or(default_timeout),
        }
    }

    /// The connection counts as broken until the statement completes, so that a dropped future
    /// never returns a connection with unread results to the pool.
    fn prepare(&mut self, sql: &str, params: &[Value]) {
        if let Some(output_sql) = &self.options.output_sql {
            output_sql(sql, params);
        }
        log::debug!("Executing: {}", truncate_long!(sql));
        self.connection.discard();
    }

    fn outcome<T>(
        &mut self,
        result: std::result::Result<Result<T>, Elapsed>,
        sql: &str,
        params: &[Value],
    ) -> Result<T> {
        let error = match result {
            Ok(Ok(v)) => {
                self.connection.keep();
                return Ok(v);
            }
            Ok(Err(e)) => e,
            Err(e) => crate::Error::new(e).context(format!(
                "The statement did not complete within {:?}",
                self.timeout
            )),
        };
        let error = QuarryError::execution(error, sql, params);
        log::error!("{:#}", error);
        Err(error)
    }

    pub async fn fetch(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<RowLabeled>> {
        self.prepare(sql, &params);
        let bound = params.clone();
        let result = timeout(
            self.timeout,
            self.connection.fetch(sql, params).try_collect::<Vec<_>>(),
        )
        .await;
        self.outcome(result, sql, &bound)
    }

    pub async fn execute(&mut self, sql: &str, params: Vec<Value>) -> Result<RowsAffected> {
        self.prepare(sql, &params);
        let bound = params.clone();
        let result = timeout(self.timeout, self.connection.execute(sql, params)).await;
        self.outcome(result, sql, &bound)
    }

    /// Transaction statement, the hook does not see it.
    pub async fn control(&mut self, sql: &str) -> Result<()> {
        log::debug!("Executing: {}", sql);
        self.connection.discard();
        let result = timeout(self.timeout, self.connection.control(sql)).await;
        self.outcome(result, sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pool, fixtures::MockConnection};
    use std::sync::Mutex;

    const URL: &str = "mock://engine";

    #[tokio::test]
    async fn hook_sees_statement_and_parameters() {
        let seen = Arc::new(Mutex::new(Vec::<(String, usize)>::new()));
        let captured = seen.clone();
        let options = ExecutionOptions {
            output_sql: Some(Arc::new(move |sql: &str, params: &[Value]| {
                captured
                    .lock()
                    .unwrap()
                    .push((sql.to_string(), params.len()));
            })),
            timeout: None,
        };
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut engine = Engine::new(
            pool.acquire(URL).await.unwrap(),
            &options,
            Duration::from_secs(1),
        );
        let rows = engine
            .fetch("SELECT ?1, ?2", vec![Value::Int32(Some(1)), Value::Varchar(Some("a".into()))])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c2"), Some(&Value::Varchar(Some("a".into()))));
        let affected = engine.execute("DELETE", vec![Value::Int32(Some(5))]).await.unwrap();
        assert_eq!(affected.rows_affected, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            [("SELECT ?1, ?2".to_string(), 2), ("DELETE".to_string(), 1)]
        );
        drop(engine);
        assert_eq!(pool.idle(URL), 1);
    }

    #[tokio::test]
    async fn failures_discard_the_connection() {
        let options = ExecutionOptions::default();
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut engine = Engine::new(
            pool.acquire(URL).await.unwrap(),
            &options,
            Duration::from_secs(1),
        );
        let error = engine
            .execute("FAIL", vec![Value::Int32(Some(3))])
            .await
            .expect_err("The statement fails");
        match error.downcast_ref::<QuarryError>() {
            Some(QuarryError::Execution {
                message,
                sql,
                params,
                ..
            }) => {
                assert!(message.contains("syntax error"));
                assert_eq!(sql, "FAIL");
                assert_eq!(*params, [Value::Int32(Some(3))]);
            }
            other => panic!("Unexpected error kind: {:?}", other),
        }
        drop(engine);
        assert_eq!(pool.idle(URL), 0);
    }

    #[tokio::test]
    async fn timeout_overrides_the_default() {
        let options = ExecutionOptions {
            output_sql: None,
            timeout: Some(Duration::from_millis(10)),
        };
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut engine = Engine::new(
            pool.acquire(URL).await.unwrap(),
            &options,
            Duration::from_secs(60),
        );
        let error = engine
            .execute("SLOW", vec![])
            .await
            .expect_err("The statement times out");
        assert!(matches!(
            error.downcast_ref::<QuarryError>(),
            Some(QuarryError::Execution { .. })
        ));
        assert!(format!("{:#}", error).contains("did not complete"));
    }

    #[tokio::test]
    async fn interrupted_statements_discard_the_connection() {
        let options = ExecutionOptions::default();
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut engine = Engine::new(
            pool.acquire(URL).await.unwrap(),
            &options,
            Duration::from_secs(60),
        );
        // The caller gives up on the statement after its first poll
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), engine.execute("SLOW", vec![])).await;
        assert!(abandoned.is_err());
        drop(engine);
        assert_eq!(pool.idle(URL), 0);
    }

    #[tokio::test]
    async fn transaction_statements_skip_the_hook() {
        let seen = Arc::new(Mutex::new(0));
        let captured = seen.clone();
        let options = ExecutionOptions {
            output_sql: Some(Arc::new(move |_: &str, _: &[Value]| {
                *captured.lock().unwrap() += 1;
            })),
            timeout: None,
        };
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut engine = Engine::new(
            pool.acquire(URL).await.unwrap(),
            &options,
            Duration::from_secs(1),
        );
        engine.control("BEGIN;").await.unwrap();
        engine.execute("DELETE", vec![]).await.unwrap();
        engine.control("COMMIT;").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
        drop(engine);
        assert_eq!(pool.idle(URL), 1);
    }
}
