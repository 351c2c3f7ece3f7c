#[cfg(test)]
mod tests {
    use indoc::indoc;
    use quarry::{
        DataAccess, DataAccessFactory, DataContext, Entity, GenericSqlWriter, Regroup, Result,
        RowValue, StatementKind, Value, compile, count_all,
    };
    use quarry_sqlite::SqliteDriver;
    use std::sync::Arc;

    #[derive(Entity, Debug, Clone)]
    #[quarry(schema = "shop")]
    struct Customer {
        #[quarry(key)]
        id: i32,
        name: String,
        city: Option<String>,
    }

    #[derive(Entity, Debug, Clone)]
    struct Purchase {
        #[quarry(key)]
        id: i32,
        customer_id: i32,
        total: f64,
    }

    #[derive(Entity, Debug, Clone)]
    struct Stock {
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

    fn factory() -> DataAccessFactory<SqliteDriver> {
        DataAccessFactory::with_context(
            SqliteDriver::new(),
            Arc::new(DataContext::builder().build()),
        )
    }

    /// Text of the statement in the generic dialect.
    fn generic<E: Entity>(handle: &DataAccess<E, SqliteDriver>, kind: StatementKind) -> Result<String> {
        let statement = compile(
            &GenericSqlWriter::new(),
            handle.context().registry(),
            handle.descriptor(),
            kind,
        )?;
        Ok(statement.sql)
    }

    fn flat(sql: &str) -> String {
        sql.trim().replace('\n', " ")
    }

    #[test]
    fn select_limit_offset() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let sql = generic(
            &customers
                .filter(Customer::city.is_null())
                .order_by(Customer::name)
                .skip(10)
                .take(5),
            StatementKind::Select,
        )?;
        assert_eq!(
            sql,
            flat(indoc! {r#"
                SELECT "t1"."Id", "t1"."Name", "t1"."City"
                FROM "shop"."Customer" AS "t1"
                WHERE "t1"."City" IS NULL
                ORDER BY "t1"."Name" ASC LIMIT ?1 OFFSET ?2;
            "#})
        );
        Ok(())
    }

    #[test]
    fn many_to_one_join() -> Result<()> {
        let purchases = factory().create::<Purchase>()?;
        let query = purchases
            .inner_join::<Customer>(Purchase::customer_id.eq(Customer::id))?
            .filter(Customer::name.eq("Grace"));
        assert_eq!(
            generic(&query, StatementKind::Select)?,
            flat(indoc! {r#"
                SELECT "t1"."Id", "t1"."CustomerId", "t1"."Total"
                FROM "Purchase" AS "t1"
                INNER JOIN "shop"."Customer" AS "t2" ON "t1"."CustomerId" = "t2"."Id"
                WHERE "t2"."Name" = ?1;
            "#})
        );
        Ok(())
    }

    #[test]
    fn nested_rows_are_ordered_by_key() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let query = customers.inner_join::<Vec<Purchase>>(Purchase::customer_id.eq(Customer::id))?;
        assert_eq!(
            generic(&query, StatementKind::SelectNested { position: 2 })?,
            flat(indoc! {r#"
                SELECT "t1"."Id", "t1"."Name", "t1"."City", "t2"."Id", "t2"."CustomerId", "t2"."Total"
                FROM "shop"."Customer" AS "t1"
                INNER JOIN "Purchase" AS "t2" ON "t2"."CustomerId" = "t1"."Id"
                ORDER BY "t1"."Id" ASC;
            "#})
        );
        Ok(())
    }

    #[test]
    fn collect_uses_window_aggregates() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let query = customers.group_by(Customer::city, (Customer::name.collect(), count_all()))?;
        let statement = query.compile(StatementKind::Select)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {r#"
                SELECT "t1"."City", "t1"."Name", COUNT(*) OVER (PARTITION BY "t1"."City")
                FROM "shop"."Customer" AS "t1"
                ORDER BY "t1"."City" ASC;
            "#})
        );
        assert_eq!(
            statement.regroup,
            Some(Regroup {
                keys: vec![0],
                collect: vec![1],
            })
        );
        Ok(())
    }

    #[test]
    fn distinct_count_is_wrapped() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        assert_eq!(
            generic(&customers.distinct(Customer::city)?, StatementKind::Count)?,
            flat(indoc! {r#"
                SELECT COUNT(*) FROM
                (SELECT DISTINCT "t1"."City" AS "c1" FROM "shop"."Customer" AS "t1") AS "c";
            "#})
        );
        Ok(())
    }

    #[test]
    fn membership() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let query = customers.filter(Customer::id.is_in([1, 2, 3]));
        assert_eq!(
            generic(&query, StatementKind::Count)?,
            r#"SELECT COUNT(*) FROM "shop"."Customer" AS "t1" WHERE "t1"."Id" IN (?1, ?2, ?3);"#
        );
        assert_eq!(
            generic(&customers.filter(Customer::id.is_in(Vec::<i32>::new())), StatementKind::Count)?,
            r#"SELECT COUNT(*) FROM "shop"."Customer" AS "t1" WHERE 1 = 0;"#
        );
        assert_eq!(
            generic(&customers.filter(Customer::id.not_in(Vec::<i32>::new())), StatementKind::Count)?,
            r#"SELECT COUNT(*) FROM "shop"."Customer" AS "t1" WHERE 1 = 1;"#
        );
        Ok(())
    }

    #[test]
    fn bitwise_tests() -> Result<()> {
        let stocks = factory().create::<Stock>()?;
        let query = stocks
            .filter(Stock::quantity.has_flags(4))
            .and(Stock::quantity.bit_and(3).ne(0))?;
        assert_eq!(
            generic(&query, StatementKind::Count)?,
            r#"SELECT COUNT(*) FROM "Stock" AS "t1" WHERE ("t1"."Quantity" & ?1) = ?2 AND ("t1"."Quantity" & ?3) <> ?4;"#
        );
        let statement = query.compile(StatementKind::Count)?;
        assert_eq!(
            statement.bind(query.descriptor(), &[])?,
            vec![
                Value::Int32(Some(4)),
                Value::Int32(Some(4)),
                Value::Int32(Some(3)),
                Value::Int32(Some(0)),
            ]
        );
        Ok(())
    }

    #[test]
    fn nested_logic_is_parenthesized() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let query = customers
            .filter(Customer::name.eq("Ada").or(Customer::name.eq("Grace")))
            .and(Customer::city.is_not_null())?;
        let statement = query.compile(StatementKind::Exists)?;
        assert_eq!(
            statement.sql,
            flat(indoc! {r#"
                SELECT CASE WHEN EXISTS
                (SELECT 1 FROM "shop"."Customer" AS "t1"
                WHERE ("t1"."Name" = ?1 OR "t1"."Name" = ?2) AND "t1"."City" IS NOT NULL)
                THEN 1 ELSE 0 END;
            "#})
        );
        assert_eq!(
            statement.bind(query.descriptor(), &[])?,
            vec![
                Value::Varchar(Some("Ada".into())),
                Value::Varchar(Some("Grace".into())),
            ]
        );
        Ok(())
    }

    #[test]
    fn upsert_on_conflict() -> Result<()> {
        let customers = factory().create::<Customer>()?;
        let query = customers
            .filter(Customer::id.eq(5))
            .set(Customer::name, "Ada");
        assert_eq!(
            generic(&query, StatementKind::Upsert)?,
            flat(indoc! {r#"
                INSERT INTO "shop"."Customer" AS "t1" ("Name", "Id") VALUES (?1, ?2)
                ON CONFLICT ("Id") DO UPDATE SET "Name" = ?1
                WHERE "t1"."Id" = ?2;
            "#})
        );
        Ok(())
    }

    #[test]
    fn conditional_insert() -> Result<()> {
        let notes = factory().create::<Note>()?;
        let query = notes.filter(Note::text.eq("hello"));
        assert_eq!(
            generic(&query, StatementKind::Insert { rows: 1 })?,
            flat(indoc! {r#"
                INSERT INTO "Note" ("Text") SELECT ?1
                WHERE NOT EXISTS (SELECT 1 FROM "Note" AS "t1" WHERE "t1"."Text" = ?2);
            "#})
        );
        assert_eq!(
            generic(&notes.returning(Note::id)?, StatementKind::Insert { rows: 2 })?,
            r#"INSERT INTO "Note" ("Text") VALUES (?1), (?2) RETURNING "Id";"#
        );
        Ok(())
    }

    #[test]
    fn bulk_statements() -> Result<()> {
        let stocks = factory().create::<Stock>()?;
        assert_eq!(
            generic(&stocks, StatementKind::BulkUpdate { rows: 2 })?,
            flat(indoc! {r#"
                WITH "s"("Sku", "Quantity") AS (VALUES (?1, ?2), (?3, ?4))
                UPDATE "Stock" AS "t1" SET "Quantity" = "s"."Quantity"
                FROM "s" WHERE "t1"."Sku" = "s"."Sku";
            "#})
        );
        assert_eq!(
            generic(&stocks, StatementKind::BulkUpsert { rows: 2 })?,
            flat(indoc! {r#"
                WITH "s"("Sku", "Quantity") AS (VALUES (?1, ?2), (?3, ?4))
                INSERT INTO "Stock" AS "t1" ("Sku", "Quantity")
                SELECT "s"."Sku", "s"."Quantity" FROM "s" WHERE true
                ON CONFLICT ("Sku") DO UPDATE SET "Quantity" = excluded."Quantity";
            "#})
        );
        let query = stocks
            .filter(Stock::sku.eq(RowValue))
            .set(Stock::quantity, 0);
        let statement = query.compile(StatementKind::BulkUpdate { rows: 1 })?;
        assert_eq!(
            statement.sql,
            flat(indoc! {r#"
                WITH "s"("Sku", "Quantity") AS (VALUES (?1, ?2))
                UPDATE "Stock" AS "t1" SET "Quantity" = ?3
                FROM "s" WHERE "t1"."Sku" = "s"."Sku";
            "#})
        );
        Ok(())
    }

    #[test]
    fn schema_statements() -> Result<()> {
        let stocks = factory().create::<Stock>()?;
        assert_eq!(
            generic(&stocks, StatementKind::CreateTable { if_not_exists: true })?,
            r#"CREATE TABLE IF NOT EXISTS "Stock" ("Sku" VARCHAR PRIMARY KEY, "Quantity" INTEGER NOT NULL);"#
        );
        assert_eq!(
            generic(&stocks, StatementKind::DropTable { if_exists: true })?,
            r#"DROP TABLE IF EXISTS "Stock";"#
        );
        Ok(())
    }
}
