#[cfg(test)]
mod tests {
    use indoc::indoc;
    use quarry::{
        ColumnDef, DataAccessFactory, DataContext, Entity, QuarryError, Result, RowValue,
        StatementKind, Value,
    };
    use quarry_mssql::MssqlDriver;
    use std::sync::Arc;

    #[derive(Entity, Debug, Clone)]
    #[quarry(schema = "club", table = "Member")]
    struct Member {
        #[quarry(key)]
        id: i32,
        name: String,
        age: i16,
    }

    #[derive(Entity, Debug, Clone)]
    struct Stock {
        #[quarry(key)]
        sku: String,
        quantity: i32,
    }

    #[derive(Entity, Debug, Clone)]
    #[quarry(user_defined_table = "dbo.ShelfRow")]
    struct Shelf {
        #[quarry(key)]
        sku: String,
        quantity: i32,
    }

    #[derive(Entity, Debug, Clone)]
    struct Note {
        #[quarry(key, identity)]
        id: i64,
        text: String,
    }

    fn factory() -> DataAccessFactory<MssqlDriver> {
        DataAccessFactory::with_context(
            MssqlDriver::new(),
            Arc::new(DataContext::builder().build()),
        )
    }

    fn flat(sql: &str) -> String {
        sql.trim().replace('\n', " ")
    }

    #[test]
    fn select_top() -> Result<()> {
        let members = factory().create::<Member>()?;
        let query = members
            .filter(Member::age.ge(30))
            .and(Member::name.starts_with("J"))?
            .order_by(Member::age)
            .take(10);
        let statement = query.compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT TOP (@P1) [t1].[Id], [t1].[Name], [t1].[Age]
                FROM [club].[Member] AS [t1]
                WHERE [t1].[Age] >= @P2 AND [t1].[Name] LIKE @P3 ESCAPE '\\'
                ORDER BY [t1].[Age] ASC;
            "})
        );
        assert_eq!(
            statement.bind(query.descriptor(), &[])?,
            vec![
                Value::Int64(Some(10)),
                Value::Int16(Some(30)),
                Value::Varchar(Some("J%".into())),
            ]
        );
        Ok(())
    }

    #[test]
    fn select_offset_fetch() -> Result<()> {
        let members = factory().create::<Member>()?;
        let statement = members
            .order_by_descending(Member::age)
            .skip(20)
            .take(10)
            .compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT [t1].[Id], [t1].[Name], [t1].[Age]
                FROM [club].[Member] AS [t1]
                ORDER BY [t1].[Age] DESC
                OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY;
            "})
        );

        // Ordered by the key when paged without an ordering
        let statement = members.skip(5).compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT [t1].[Id], [t1].[Name], [t1].[Age]
                FROM [club].[Member] AS [t1]
                ORDER BY [t1].[Id] ASC OFFSET @P1 ROWS;
            "})
        );
        Ok(())
    }

    #[test]
    fn count_and_exists() -> Result<()> {
        let members = factory().create::<Member>()?;
        let statement = members
            .filter(Member::age.lt(18))
            .dirty_read(true)
            .compile(StatementKind::Count)?;
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM [club].[Member] AS [t1] WITH (NOLOCK) WHERE [t1].[Age] < @P1;"
        );
        let statement = members
            .filter(Member::name.eq("Ada"))
            .compile(StatementKind::Exists)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT CASE WHEN EXISTS
                (SELECT 1 FROM [club].[Member] AS [t1] WHERE [t1].[Name] = @P1)
                THEN 1 ELSE 0 END;
            "})
        );
        Ok(())
    }

    #[test]
    fn bitwise_tests() -> Result<()> {
        let members = factory().create::<Member>()?;
        let query = members
            .filter(Member::age.bit_and(1).eq(0))
            .and(Member::age.has_flags(16))?;
        let statement = query.compile(StatementKind::Count)?;
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) FROM [club].[Member] AS [t1] WHERE ([t1].[Age] & @P1) = @P2 AND ([t1].[Age] & @P3) = @P4;"
        );
        assert_eq!(
            statement.bind(query.descriptor(), &[])?,
            vec![
                Value::Int16(Some(1)),
                Value::Int16(Some(0)),
                Value::Int16(Some(16)),
                Value::Int16(Some(16)),
            ]
        );
        Ok(())
    }

    #[test]
    fn grouped_average() -> Result<()> {
        let members = factory().create::<Member>()?;
        let statement = members
            .group_by(Member::name, Member::age.avg())?
            .compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT [t1].[Name], AVG(CAST([t1].[Age] AS FLOAT))
                FROM [club].[Member] AS [t1]
                GROUP BY [t1].[Name];
            "})
        );
        Ok(())
    }

    #[test]
    fn full_text() -> Result<()> {
        let members = factory().create::<Member>()?;
        let query = members.filter(Member::name.full_text("\"jo*\""));
        let statement = query.compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                SELECT [t1].[Id], [t1].[Name], [t1].[Age]
                FROM [club].[Member] AS [t1]
                WHERE CONTAINS([t1].[Name], @P1);
            "})
        );
        assert_eq!(
            statement.bind(query.descriptor(), &[])?,
            vec![Value::Varchar(Some("\"jo*\"".into()))]
        );
        Ok(())
    }

    #[test]
    fn update_and_delete() -> Result<()> {
        let members = factory().create::<Member>()?;
        let statement = members
            .filter(Member::id.eq(7))
            .set(Member::age, 40)
            .compile(StatementKind::Update)?;
        assert_eq!(
            statement.sql,
            "UPDATE [t1] SET [Age] = @P1 FROM [club].[Member] AS [t1] WHERE [t1].[Id] = @P2;"
        );
        let statement = members
            .filter(Member::age.ge(60))
            .compile(StatementKind::Delete)?;
        assert_eq!(
            statement.sql,
            "DELETE [t1] FROM [club].[Member] AS [t1] WHERE [t1].[Age] >= @P1;"
        );
        Ok(())
    }

    #[test]
    fn upsert_is_a_merge() -> Result<()> {
        let members = factory().create::<Member>()?;
        let statement = members
            .filter(Member::id.eq(100))
            .set(Member::name, "Zoe")
            .set(Member::age, 42)
            .compile(StatementKind::Upsert)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                MERGE [club].[Member] WITH (HOLDLOCK) AS [t1]
                USING (VALUES (@P1, @P2, @P3)) AS [s]([Name], [Age], [Id])
                ON [t1].[Id] = @P3
                WHEN MATCHED THEN UPDATE SET [Name] = @P1, [Age] = @P2
                WHEN NOT MATCHED THEN INSERT ([Name], [Age], [Id]) VALUES ([s].[Name], [s].[Age], [s].[Id]);
            "})
        );
        Ok(())
    }

    #[test]
    fn insert_outputs_identity() -> Result<()> {
        let notes = factory().create::<Note>()?;
        let statement = notes
            .returning(Note::id)?
            .compile(StatementKind::Insert { rows: 1 })?;
        assert_eq!(
            statement.sql,
            "INSERT INTO [Note] ([Text]) OUTPUT inserted.[Id] VALUES (@P1);"
        );
        Ok(())
    }

    #[test]
    fn bulk_upsert_with_values() -> Result<()> {
        let stocks = factory().create::<Stock>()?;
        let statement = stocks.compile(StatementKind::BulkUpsert { rows: 2 })?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                MERGE [Stock] WITH (HOLDLOCK) AS [t1]
                USING (VALUES (@P1, @P2), (@P3, @P4)) AS [s]([Sku], [Quantity])
                ON [t1].[Sku] = [s].[Sku]
                WHEN MATCHED THEN UPDATE SET [Quantity] = [s].[Quantity]
                WHEN NOT MATCHED THEN INSERT ([Sku], [Quantity]) VALUES ([s].[Sku], [s].[Quantity]);
            "})
        );
        Ok(())
    }

    #[test]
    fn bulk_update_with_table_type() -> Result<()> {
        let factory = factory();
        let shelves = factory.create::<Shelf>()?;
        let error = shelves
            .compile(StatementKind::BulkUpdate { rows: 2 })
            .expect_err("The table type is not registered yet");
        assert!(matches!(
            error.downcast_ref::<QuarryError>(),
            Some(QuarryError::Compilation(..))
        ));

        factory.add_user_defined_table(
            "dbo.ShelfRow",
            [
                ColumnDef::new("Sku", Value::Varchar(None)).primary_key(true),
                ColumnDef::new("Quantity", Value::Int32(None)),
            ],
        );
        let statement = factory
            .create::<Shelf>()?
            .filter(Shelf::sku.eq(RowValue))
            .set(Shelf::quantity, RowValue)
            .compile(StatementKind::BulkUpdate { rows: 2 })?;
        assert_eq!(
            statement.sql,
            flat(indoc! {"
                DECLARE @rows [dbo].[ShelfRow];
                INSERT INTO @rows ([Sku], [Quantity]) VALUES (@P1, @P2), (@P3, @P4);
                UPDATE [t1] SET [Quantity] = [s].[Quantity]
                FROM [Shelf] AS [t1] INNER JOIN @rows AS [s] ON [t1].[Sku] = [s].[Sku];
            "})
        );
        Ok(())
    }

    #[test]
    fn table_type_registration_replaces_statements() -> Result<()> {
        let factory = factory();
        factory.add_user_defined_table(
            "dbo.ShelfRow",
            [
                ColumnDef::new("Sku", Value::Varchar(None)).primary_key(true),
                ColumnDef::new("Quantity", Value::Int32(None)),
            ],
        );
        let shelves = factory.create::<Shelf>()?;
        let row = Shelf {
            sku: "A-1".into(),
            quantity: 3,
        };
        let statement = shelves.compile(StatementKind::BulkInsert { rows: 1 })?;
        assert!(
            statement
                .sql
                .contains("INSERT INTO @rows ([Sku], [Quantity]) VALUES (@P1, @P2);")
        );
        assert_eq!(
            statement.bind(shelves.descriptor(), &[row.row()])?,
            vec![Value::Varchar(Some("A-1".into())), Value::Int32(Some(3))]
        );

        factory.add_user_defined_table(
            "dbo.ShelfRow",
            [
                ColumnDef::new("Quantity", Value::Int32(None)),
                ColumnDef::new("Sku", Value::Varchar(None)).primary_key(true),
            ],
        );
        let statement = shelves.compile(StatementKind::BulkInsert { rows: 1 })?;
        assert!(
            statement
                .sql
                .contains("INSERT INTO @rows ([Quantity], [Sku]) VALUES (@P1, @P2);")
        );
        assert_eq!(
            statement.bind(shelves.descriptor(), &[row.row()])?,
            vec![Value::Int32(Some(3)), Value::Varchar(Some("A-1".into()))]
        );
        Ok(())
    }

    #[tokio::test]
    async fn take_zero_returns_nothing() -> Result<()> {
        // No connection string is registered, any round trip fails
        let members = factory().create::<Member>()?;
        assert!(members.skip(5).take(0).query().await?.is_empty());
        assert!(
            members
                .order_by(Member::age)
                .take(0)
                .query_one()
                .await?
                .is_none()
        );
        assert!(members.skip(5).take(1).query().await.is_err());
        Ok(())
    }
}
