#[cfg(test)]
mod tests {
    use quarry::{ColumnDef, DataAccessFactory, DataContext, Entity, Result, Value};
    use quarry_mssql::MssqlDriver;
    use quarry_tests::{execute_tests, init_logs};
    use std::{env, sync::Arc};
    use tokio::sync::Mutex;

    static MUTEX: Mutex<()> = Mutex::const_new(());

    /// Connection string of the test server, like
    /// `mssql://server=tcp:localhost,1433;user=sa;password=..;TrustServerCertificate=true`.
    const URL_VARIABLE: &str = "QUARRY_MSSQL_TEST";

    #[derive(Entity, Debug, Clone, PartialEq)]
    #[quarry(table = "Shelf", user_defined_table = "dbo.ShelfRow")]
    struct Shelf {
        #[quarry(key)]
        sku: String,
        quantity: i32,
    }

    fn factory() -> Option<DataAccessFactory<MssqlDriver>> {
        let Ok(url) = env::var(URL_VARIABLE) else {
            log::warn!("{} is not set, skipping the SQL Server tests", URL_VARIABLE);
            return None;
        };
        let factory = DataAccessFactory::with_context(
            MssqlDriver::new(),
            Arc::new(DataContext::builder().build()),
        );
        factory.add_connection_string("default", url);
        Some(factory)
    }

    #[tokio::test]
    async fn mssql() {
        init_logs();
        let _guard = MUTEX.lock().await;
        let Some(factory) = factory() else {
            return;
        };
        execute_tests(factory).await;
    }

    async fn table_type_rows(factory: &DataAccessFactory<MssqlDriver>) -> Result<()> {
        let shelves = factory.create::<Shelf>()?;
        shelves.drop_table(true).await?;
        shelves.create_table(false).await?;
        shelves.create_user_defined_table(true).await?;
        factory.add_user_defined_table(
            "dbo.ShelfRow",
            [
                ColumnDef::new("Sku", Value::Varchar(None)).primary_key(true),
                ColumnDef::new("Quantity", Value::Int32(None)),
            ],
        );

        let rows = (0..1500)
            .map(|i| Shelf {
                sku: format!("S-{:04}", i),
                quantity: i,
            })
            .collect::<Vec<_>>();
        let affected = shelves.bulk_insert(&rows).await?;
        assert_eq!(affected.rows_affected, 1500);

        let changed = rows
            .iter()
            .take(10)
            .map(|v| Shelf {
                quantity: -1,
                ..v.clone()
            })
            .collect::<Vec<_>>();
        let affected = shelves.bulk_update(&changed).await?;
        assert_eq!(affected.rows_affected, 10);
        assert_eq!(shelves.filter(Shelf::quantity.eq(-1)).count().await?, 10);

        let affected = shelves
            .bulk_upsert(&[Shelf {
                sku: "S-9999".into(),
                quantity: 1,
            }])
            .await?;
        assert_eq!(affected.rows_affected, 1);
        assert_eq!(shelves.count().await?, 1501);
        Ok(())
    }

    #[tokio::test]
    async fn table_types() {
        init_logs();
        let _guard = MUTEX.lock().await;
        let Some(factory) = factory() else {
            return;
        };
        table_type_rows(&factory)
            .await
            .expect("Table type scenario did not succeed");
    }
}
