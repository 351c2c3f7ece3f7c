use quarry_core::{
    AggregateFn, ColumnDef, Expr, ModifyStatement, SelectStatement, Slot, SqlWriter, TableRef,
    UserDefinedTable, Value, separated_by,
    writer::{Context, Fragment},
};
use std::fmt::Write;

/// Table variable holding the staged rows of bulk statements.
const ROWS_VARIABLE: &str = "@rows";

/// T-SQL dialect.
///
/// Paging uses `TOP` or `OFFSET .. FETCH`, upserts are `MERGE` statements and bulk rows are
/// staged into a table variable when the entity registers a user-defined table type.
#[derive(Default, Debug, Clone, Copy)]
pub struct MssqlSqlWriter {}

impl MssqlSqlWriter {
    /// `DECLARE` and fill the table variable, when the rows have a table type.
    fn write_row_prelude(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let Some(row_type) = value.row_type else {
            return;
        };
        out.push_str("DECLARE ");
        out.push_str(ROWS_VARIABLE);
        out.push(' ');
        self.write_table_ref(context, out, &row_type.table);
        out.push_str("; INSERT INTO ");
        out.push_str(ROWS_VARIABLE);
        out.push(' ');
        self.write_column_list(context, out, &value.columns);
        out.push(' ');
        self.write_values(context, out, &value.rows);
        out.push_str("; ");
    }

    /// The bulk rows as a source aliased `[s]`.
    fn write_row_reference(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &ModifyStatement,
    ) {
        match value.row_type {
            Some(..) => {
                out.push_str(ROWS_VARIABLE);
                out.push_str(" AS ");
                self.write_source_alias(context, out);
            }
            None => {
                out.push('(');
                self.write_values(context, out, &value.rows);
                out.push_str(") AS ");
                self.write_source_alias(context, out);
                self.write_column_list(context, out, &value.columns);
            }
        }
    }

    /// `IF OBJECT_ID(..) IS NULL ` style guard, `function` receives the quoted name.
    fn write_existence_guard(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &TableRef,
        function: &str,
        kind: Option<&str>,
    ) {
        let mut name = String::with_capacity(32);
        self.write_table_ref(context, &mut name, table);
        out.push_str("IF ");
        out.push_str(function);
        out.push_str("(N'");
        self.write_escaped(context, out, &name, '\'', "''");
        out.push('\'');
        if let Some(kind) = kind {
            out.push_str(", N'");
            out.push_str(kind);
            out.push('\'');
        }
        out.push_str(") IS NULL ");
    }

    /// `WHEN MATCHED` and `WHEN NOT MATCHED` clauses followed by the output and the terminator.
    fn write_merge_actions(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &ModifyStatement,
    ) {
        if !value.assignments.is_empty() {
            out.push_str(" WHEN MATCHED THEN UPDATE SET ");
            self.write_assignments(context, out, value);
        }
        let columns = value.insert_columns().collect::<Vec<_>>();
        out.push_str(" WHEN NOT MATCHED THEN INSERT ");
        self.write_column_list(context, out, &columns);
        out.push_str(" VALUES (");
        separated_by(
            out,
            &columns,
            |out, v| self.write_expr(context, out, &Expr::Source(*v)),
            ", ",
        );
        out.push(')');
        self.write_output(context, out, value);
        out.push(';');
    }

    fn write_merge_head(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        out.push_str("MERGE ");
        self.write_table_ref(context, out, value.table);
        out.push_str(" WITH (HOLDLOCK) AS ");
        self.write_alias(context, out, 1);
        out.push_str(" USING ");
    }
}

impl SqlWriter for MssqlSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn dialect(&self) -> &'static str {
        "mssql"
    }

    /// The server accepts 2100 parameters per request.
    fn parameter_limit(&self) -> usize {
        2000
    }

    fn row_limit(&self) -> usize {
        1000
    }

    fn supports_full_text(&self) -> bool {
        true
    }

    fn supports_user_defined_tables(&self) -> bool {
        true
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn write_identifier_quoted(&self, context: &mut Context, out: &mut String, value: &str) {
        out.push('[');
        self.write_escaped(context, out, value, ']', "]]");
        out.push(']');
    }

    fn write_table_hints(&self, _context: &mut Context, out: &mut String, dirty_read: bool) {
        if dirty_read {
            out.push_str(" WITH (NOLOCK)");
        }
    }

    fn write_placeholder(&self, context: &mut Context, out: &mut String, slot: Slot) {
        let index = context.bind(slot);
        let _ = write!(out, "@P{}", index);
    }

    fn write_aggregate(
        &self,
        context: &mut Context,
        out: &mut String,
        func: AggregateFn,
        arg: Option<&Expr>,
    ) {
        match (func, arg) {
            (AggregateFn::Avg, Some(arg)) => {
                out.push_str("AVG(CAST(");
                self.write_expr(context, out, arg);
                out.push_str(" AS FLOAT))");
            }
            (AggregateFn::Count, None) => out.push_str("COUNT(*)"),
            (func, arg) => {
                out.push_str(match func {
                    AggregateFn::Count => "COUNT",
                    AggregateFn::Sum => "SUM",
                    AggregateFn::Avg => "AVG",
                    AggregateFn::Min => "MIN",
                    AggregateFn::Max => "MAX",
                    AggregateFn::Collect => {
                        log::error!("Unexpected AggregateFn::Collect, it has no SQL counterpart");
                        ""
                    }
                });
                out.push('(');
                if let Some(arg) = arg {
                    self.write_expr(context, out, arg);
                }
                out.push(')');
            }
        }
    }

    fn write_full_text(
        &self,
        context: &mut Context,
        out: &mut String,
        expr: &Expr,
        pattern: &Expr,
        negated: bool,
    ) {
        if negated {
            out.push_str("NOT ");
        }
        out.push_str("CONTAINS(");
        self.write_expr(context, out, expr);
        out.push_str(", ");
        self.write_expr(context, out, pattern);
        out.push(')');
    }

    fn write_value_type(&self, _context: &mut Context, out: &mut String, value: &Value, key: bool) {
        match value {
            Value::Boolean(..) => out.push_str("BIT"),
            Value::Int8(..) | Value::Int16(..) => out.push_str("SMALLINT"),
            Value::Int32(..) | Value::UInt16(..) => out.push_str("INT"),
            Value::Int64(..) | Value::UInt32(..) => out.push_str("BIGINT"),
            Value::UInt8(..) => out.push_str("TINYINT"),
            Value::UInt64(..) => out.push_str("DECIMAL(20,0)"),
            Value::Float32(..) => out.push_str("REAL"),
            Value::Float64(..) => out.push_str("FLOAT"),
            Value::Decimal(.., 0, 0) => out.push_str("DECIMAL(38,10)"),
            Value::Decimal(.., precision, scale) => {
                let _ = write!(out, "DECIMAL({},{})", precision, scale);
            }
            Value::Char(..) => out.push_str("NCHAR(1)"),
            Value::Varchar(..) if key => out.push_str("NVARCHAR(450)"),
            Value::Varchar(..) => out.push_str("NVARCHAR(MAX)"),
            Value::Blob(..) if key => out.push_str("VARBINARY(900)"),
            Value::Blob(..) => out.push_str("VARBINARY(MAX)"),
            Value::Date(..) => out.push_str("DATE"),
            Value::Time(..) => out.push_str("TIME"),
            Value::Timestamp(..) => out.push_str("DATETIME2"),
            Value::TimestampWithTimezone(..) => out.push_str("DATETIMEOFFSET"),
            Value::Uuid(..) => out.push_str("UNIQUEIDENTIFIER"),
            _ => log::error!(
                "Unexpected quarry::Value, cannot get the T-SQL type from {:?} variant",
                value
            ),
        }
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN TRANSACTION;");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT TRANSACTION;");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK TRANSACTION;");
    }

    fn write_identity(&self, _context: &mut Context, out: &mut String) {
        out.push_str(" IDENTITY(1,1)");
    }

    fn write_select_head(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        out.push_str("SELECT ");
        if value.distinct {
            out.push_str("DISTINCT ");
        }
        if let (None, Some(take)) = (&value.skip, &value.take) {
            out.push_str("TOP (");
            self.write_expr(context, out, take);
            out.push_str(") ");
        }
    }

    fn write_paging(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        let Some(skip) = &value.skip else {
            return;
        };
        out.push_str(" OFFSET ");
        self.write_expr(context, out, skip);
        out.push_str(" ROWS");
        if let Some(take) = &value.take {
            out.push_str(" FETCH NEXT ");
            self.write_expr(context, out, take);
            out.push_str(" ROWS ONLY");
        }
    }

    fn write_output(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        if value.output.is_empty() {
            return;
        }
        out.push_str(" OUTPUT ");
        separated_by(
            out,
            &value.output,
            |out, v| {
                out.push_str("inserted.");
                self.write_identifier_quoted(context, out, &v.name);
            },
            ", ",
        );
    }

    fn write_returning(&self, _context: &mut Context, _out: &mut String, _value: &ModifyStatement) {}

    fn write_update(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        out.push_str("UPDATE ");
        self.write_alias(context, out, 1);
        out.push_str(" SET ");
        self.write_assignments(&mut context.switch_fragment(Fragment::SqlUpdateSet), out, value);
        out.push_str(" FROM ");
        self.write_table_ref(context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(context, out, 1);
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(context, out, filter);
        }
        out.push(';');
    }

    fn write_delete(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlDeleteFrom);
        out.push_str("DELETE ");
        self.write_alias(&mut context, out, 1);
        out.push_str(" FROM ");
        self.write_table_ref(&mut context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(&mut context, out, 1);
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(&mut context, out, filter);
        }
        out.push(';');
    }

    fn write_upsert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlMerge);
        self.write_merge_head(&mut context, out, value);
        out.push('(');
        self.write_values(&mut context, out, &value.rows);
        out.push_str(") AS ");
        self.write_source_alias(&mut context, out);
        self.write_column_list(&mut context, out, &value.columns);
        out.push_str(" ON ");
        match &value.filter {
            Some(filter) => self.write_condition(&mut context, out, filter),
            None => out.push_str("1 = 0"),
        }
        self.write_merge_actions(&mut context, out, value);
    }

    fn write_bulk_insert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        if value.row_type.is_none() {
            self.write_insert(context, out, value);
            return;
        }
        let mut context = context.switch_fragment(Fragment::SqlInsertInto);
        self.write_row_prelude(&mut context, out, value);
        out.push_str("INSERT INTO ");
        self.write_table_ref(&mut context, out, value.table);
        out.push(' ');
        let columns = value.insert_columns().collect::<Vec<_>>();
        self.write_column_list(&mut context, out, &columns);
        self.write_output(&mut context, out, value);
        out.push_str(" SELECT ");
        separated_by(
            out,
            &columns,
            |out, v| self.write_expr(&mut context, out, &Expr::Source(*v)),
            ", ",
        );
        out.push_str(" FROM ");
        self.write_row_reference(&mut context, out, value);
        out.push(';');
    }

    fn write_bulk_update(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        self.write_row_prelude(context, out, value);
        out.push_str("UPDATE ");
        self.write_alias(context, out, 1);
        out.push_str(" SET ");
        self.write_assignments(&mut context.switch_fragment(Fragment::SqlUpdateSet), out, value);
        out.push_str(" FROM ");
        self.write_table_ref(context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(context, out, 1);
        out.push_str(" INNER JOIN ");
        self.write_row_reference(context, out, value);
        out.push_str(" ON ");
        match &value.filter {
            Some(filter) => self.write_condition(context, out, filter),
            None => out.push_str("1 = 0"),
        }
        out.push(';');
    }

    fn write_bulk_upsert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlMerge);
        self.write_row_prelude(&mut context, out, value);
        self.write_merge_head(&mut context, out, value);
        self.write_row_reference(&mut context, out, value);
        out.push_str(" ON ");
        match &value.filter {
            Some(filter) => self.write_condition(&mut context, out, filter),
            None => out.push_str("1 = 0"),
        }
        self.write_merge_actions(&mut context, out, value);
    }

    fn write_create_table_head(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &TableRef,
        if_not_exists: bool,
    ) {
        if if_not_exists {
            self.write_existence_guard(context, out, table, "OBJECT_ID", Some("U"));
        }
        out.push_str("CREATE TABLE ");
        self.write_table_ref(context, out, table);
    }

    fn write_create_user_defined_table(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &UserDefinedTable,
        if_not_exists: bool,
    ) {
        let mut context = context.switch_fragment(Fragment::SqlCreateType);
        if if_not_exists {
            self.write_existence_guard(&mut context, out, &value.table, "TYPE_ID", None);
        }
        out.push_str("CREATE TYPE ");
        self.write_table_ref(&mut context, out, &value.table);
        out.push_str(" AS TABLE (");
        separated_by(
            out,
            &value.columns,
            |out, v: &ColumnDef| {
                self.write_identifier_quoted(&mut context, out, &v.name);
                out.push(' ');
                self.write_column_type(&mut context, out, v);
                if !v.nullable {
                    out.push_str(" NOT NULL");
                }
            },
            ", ",
        );
        out.push_str(");");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{EntityMetadata, ValueSource};

    struct Order;

    fn metadata() -> EntityMetadata {
        EntityMetadata::new::<Order>(
            TableRef::new("sales", "Order"),
            vec![
                ColumnDef::new("Id", Value::Int64(None))
                    .primary_key(true)
                    .identity(true),
                ColumnDef::new("Code", Value::Varchar(None)),
                ColumnDef::new("Note", Value::Varchar(None)).nullable(true),
                ColumnDef::new("Total", Value::Decimal(None, 12, 2)),
            ],
        )
    }

    #[test]
    fn brackets_are_doubled() {
        let mut out = String::new();
        MssqlSqlWriter {}.write_identifier_quoted(
            &mut Context::default(),
            &mut out,
            "odd]name",
        );
        assert_eq!(out, "[odd]]name]");
    }

    #[test]
    fn placeholders_are_named() {
        let writer = MssqlSqlWriter {};
        let mut context = Context::default();
        let mut out = String::new();
        writer.write_placeholder(&mut context, &mut out, Slot::Take);
        out.push(' ');
        writer.write_placeholder(&mut context, &mut out, Slot::Value(ValueSource::Filter(0)));
        out.push(' ');
        writer.write_placeholder(&mut context, &mut out, Slot::Take);
        assert_eq!(out, "@P1 @P2 @P1");
    }

    #[test]
    fn create_table() {
        let mut out = String::new();
        MssqlSqlWriter {}.write_create_table(
            &mut Context::new(Fragment::None, false),
            &mut out,
            &metadata(),
            true,
        );
        assert_eq!(
            out,
            "IF OBJECT_ID(N'[sales].[Order]', N'U') IS NULL CREATE TABLE [sales].[Order] \
            ([Id] BIGINT IDENTITY(1,1) PRIMARY KEY, [Code] NVARCHAR(MAX) NOT NULL, \
            [Note] NVARCHAR(MAX), [Total] DECIMAL(12,2) NOT NULL);"
        );
    }

    #[test]
    fn create_type() {
        let metadata = metadata();
        let table = UserDefinedTable {
            table: TableRef::new("sales", "Order'Row"),
            columns: metadata.columns[1..].to_vec(),
        };
        let mut out = String::new();
        MssqlSqlWriter {}.write_create_user_defined_table(
            &mut Context::new(Fragment::None, false),
            &mut out,
            &table,
            true,
        );
        assert_eq!(
            out,
            "IF TYPE_ID(N'[sales].[Order''Row]') IS NULL CREATE TYPE [sales].[Order'Row] AS TABLE \
            ([Code] NVARCHAR(MAX) NOT NULL, [Note] NVARCHAR(MAX), [Total] DECIMAL(12,2) NOT NULL);"
        );
    }
}
