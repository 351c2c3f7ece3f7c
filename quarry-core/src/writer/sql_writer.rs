use crate::{
    AggregateFn, ColumnDef, ComparisonOp, Condition, EntityMetadata, Expr, LogicalOp,
    ModifyStatement, Order, SelectItem, SelectStatement, Slot, Source, TableRef,
    UserDefinedTable, Value, possibly_parenthesized, separated_by,
    writer::{Context, Fragment},
};
use std::fmt::Write;

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = ::itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Dialect printer converting lowered statements into concrete SQL strings.
///
/// Every method has a default rendering in a generic dialect close to SQLite and PostgreSQL,
/// dialects override what differs.
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    /// Identifies the dialect in statement fingerprints.
    fn dialect(&self) -> &'static str {
        "generic"
    }

    /// Maximum number of parameters of a single statement.
    fn parameter_limit(&self) -> usize {
        999
    }

    /// Maximum number of rows of a single `VALUES` list.
    fn row_limit(&self) -> usize {
        usize::MAX
    }

    fn supports_full_text(&self) -> bool {
        false
    }

    fn supports_user_defined_tables(&self) -> bool {
        false
    }

    /// Whether upserts can match rows on identity columns.
    fn supports_merge(&self) -> bool {
        false
    }

    /// Escape occurrences of `search` char with `replace` while copying into buffer.
    fn write_escaped(
        &self,
        _context: &mut Context,
        out: &mut String,
        value: &str,
        search: char,
        replace: &str,
    ) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    /// Quote identifiers ("name") doubling inner quotes.
    fn write_identifier_quoted(&self, context: &mut Context, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(context, out, value, '"', "\"\"");
        out.push('"');
    }

    fn write_table_ref(&self, context: &mut Context, out: &mut String, value: &TableRef) {
        if !value.schema.is_empty() {
            self.write_identifier_quoted(context, out, &value.schema);
            out.push('.');
        }
        self.write_identifier_quoted(context, out, &value.name);
    }

    /// Alias of the source at `position` of the join chain.
    fn write_alias(&self, context: &mut Context, out: &mut String, position: u8) {
        let mut buffer = itoa::Buffer::new();
        let mut alias = String::with_capacity(4);
        alias.push('t');
        alias.push_str(buffer.format(position));
        self.write_identifier_quoted(context, out, &alias);
    }

    /// Alias of the bulk row source.
    fn write_source_alias(&self, context: &mut Context, out: &mut String) {
        self.write_identifier_quoted(context, out, "s");
    }

    /// Table hints following a source in `FROM`.
    fn write_table_hints(&self, _context: &mut Context, _out: &mut String, _dirty_read: bool) {}

    fn write_placeholder(&self, context: &mut Context, out: &mut String, slot: Slot) {
        let index = context.bind(slot);
        out.push('?');
        write_integer!(out, index);
    }

    fn write_column(&self, context: &mut Context, out: &mut String, position: u8, value: &ColumnDef) {
        if context.qualify_columns {
            self.write_alias(context, out, position);
            out.push('.');
        }
        self.write_identifier_quoted(context, out, &value.name);
    }

    fn write_expr(&self, context: &mut Context, out: &mut String, value: &Expr) {
        match value {
            Expr::Column { position, column } => {
                self.write_column(context, out, *position, column)
            }
            Expr::Source(column) => {
                if context.fragment == Fragment::SqlUpsertSet {
                    out.push_str("excluded.");
                } else {
                    self.write_source_alias(context, out);
                    out.push('.');
                }
                self.write_identifier_quoted(context, out, &column.name);
            }
            Expr::Param(slot) => self.write_placeholder(context, out, *slot),
            Expr::Literal(v) => out.push_str(v),
            Expr::Aggregate { func, arg } => {
                self.write_aggregate(context, out, *func, arg.as_deref())
            }
            Expr::Window {
                func,
                arg,
                partition,
            } => {
                self.write_aggregate(context, out, *func, arg.as_deref());
                out.push_str(" OVER (");
                if !partition.is_empty() {
                    out.push_str("PARTITION BY ");
                    separated_by(
                        out,
                        partition,
                        |out, v| self.write_expr(context, out, v),
                        ", ",
                    );
                }
                out.push(')');
            }
        }
    }

    fn write_aggregate(
        &self,
        context: &mut Context,
        out: &mut String,
        func: AggregateFn,
        arg: Option<&Expr>,
    ) {
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
        match arg {
            Some(v) => self.write_expr(context, out, v),
            None => out.push('*'),
        }
        out.push(')');
    }

    fn write_comparison_op(&self, _context: &mut Context, out: &mut String, op: ComparisonOp) {
        out.push_str(match op {
            ComparisonOp::Equal => " = ",
            ComparisonOp::NotEqual => " <> ",
            ComparisonOp::Less => " < ",
            ComparisonOp::LessEqual => " <= ",
            ComparisonOp::Greater => " > ",
            ComparisonOp::GreaterEqual => " >= ",
        });
    }

    fn write_condition(&self, context: &mut Context, out: &mut String, value: &Condition) {
        match value {
            Condition::Constant(true) => out.push_str("1 = 1"),
            Condition::Constant(false) => out.push_str("1 = 0"),
            Condition::Compare(lhs, op, rhs) => {
                self.write_expr(context, out, lhs);
                self.write_comparison_op(context, out, *op);
                self.write_expr(context, out, rhs);
            }
            Condition::IsNull(expr, negated) => {
                self.write_expr(context, out, expr);
                out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Logical(op, lhs, rhs) => {
                let nested = |v: &Condition| matches!(v, Condition::Logical(inner, ..) if inner != op);
                possibly_parenthesized!(out, nested(&**lhs), self.write_condition(context, out, lhs));
                out.push_str(match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                });
                possibly_parenthesized!(out, nested(&**rhs), self.write_condition(context, out, rhs));
            }
            Condition::In(expr, items, negated) => {
                self.write_expr(context, out, expr);
                out.push_str(if *negated { " NOT IN (" } else { " IN (" });
                separated_by(out, items, |out, v| self.write_expr(context, out, v), ", ");
                out.push(')');
            }
            Condition::Like(expr, pattern, negated) => {
                self.write_expr(context, out, expr);
                out.push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                self.write_expr(context, out, pattern);
                out.push_str(" ESCAPE '\\'");
            }
            Condition::FullText(expr, pattern, negated) => {
                self.write_full_text(context, out, expr, pattern, *negated)
            }
            Condition::Bitwise {
                expr,
                mask,
                op,
                value,
            } => {
                out.push('(');
                self.write_expr(context, out, expr);
                out.push_str(" & ");
                self.write_expr(context, out, mask);
                out.push(')');
                self.write_comparison_op(context, out, *op);
                self.write_expr(context, out, value);
            }
        }
    }

    fn write_full_text(
        &self,
        _context: &mut Context,
        _out: &mut String,
        _expr: &Expr,
        _pattern: &Expr,
        _negated: bool,
    ) {
        log::error!("Full-text search is not supported by the {} dialect", self.dialect());
    }

    /// Render the SQL type for a `Value` prototype.
    fn write_value_type(&self, _context: &mut Context, out: &mut String, value: &Value, _key: bool) {
        match value {
            Value::Boolean(..) => out.push_str("BOOLEAN"),
            Value::Int8(..) => out.push_str("TINYINT"),
            Value::Int16(..) => out.push_str("SMALLINT"),
            Value::Int32(..) => out.push_str("INTEGER"),
            Value::Int64(..) => out.push_str("BIGINT"),
            Value::UInt8(..) => out.push_str("SMALLINT"),
            Value::UInt16(..) => out.push_str("INTEGER"),
            Value::UInt32(..) => out.push_str("BIGINT"),
            Value::UInt64(..) => out.push_str("DECIMAL(20,0)"),
            Value::Float32(..) => out.push_str("REAL"),
            Value::Float64(..) => out.push_str("DOUBLE PRECISION"),
            Value::Decimal(.., precision, scale) => {
                out.push_str("DECIMAL");
                if (precision, scale) != (&0, &0) {
                    let _ = write!(out, "({},{})", precision, scale);
                }
            }
            Value::Char(..) => out.push_str("CHAR(1)"),
            Value::Varchar(..) => out.push_str("VARCHAR"),
            Value::Blob(..) => out.push_str("BLOB"),
            Value::Date(..) => out.push_str("DATE"),
            Value::Time(..) => out.push_str("TIME"),
            Value::Timestamp(..) => out.push_str("TIMESTAMP"),
            Value::TimestampWithTimezone(..) => out.push_str("TIMESTAMPTZ"),
            Value::Uuid(..) => out.push_str("UUID"),
            _ => log::error!(
                "Unexpected quarry::Value, variant {:?} is not a column type",
                value
            ),
        }
    }

    fn write_column_type(&self, context: &mut Context, out: &mut String, column: &ColumnDef) {
        match &column.column_type {
            Some(v) => out.push_str(v),
            None => self.write_value_type(context, out, &column.value, column.primary_key),
        }
    }

    /// Keyword making a column generated by the database.
    fn write_identity(&self, _context: &mut Context, _out: &mut String) {}

    fn write_select_item(&self, context: &mut Context, out: &mut String, value: &SelectItem) {
        self.write_expr(context, out, &value.expr);
        if let Some(alias) = &value.alias {
            out.push_str(" AS ");
            self.write_identifier_quoted(context, out, alias);
        }
    }

    fn write_select_head(&self, _context: &mut Context, out: &mut String, value: &SelectStatement) {
        out.push_str("SELECT ");
        if value.distinct {
            out.push_str("DISTINCT ");
        }
    }

    fn write_source(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &Source,
        dirty_read: bool,
    ) {
        self.write_table_ref(context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(context, out, value.position);
        self.write_table_hints(context, out, dirty_read);
    }

    fn write_from(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        out.push_str(" FROM ");
        for source in &value.sources {
            match &source.on {
                None => self.write_source(context, out, source, value.dirty_read),
                Some(on) => {
                    let mut context = context.switch_fragment(Fragment::SqlJoin);
                    out.push_str(" INNER JOIN ");
                    self.write_source(&mut context, out, source, value.dirty_read);
                    out.push_str(" ON ");
                    self.write_condition(&mut context, out, on);
                }
            }
        }
    }

    fn write_paging(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        if !value.is_paged() {
            return;
        }
        out.push_str(" LIMIT ");
        match &value.take {
            Some(v) => self.write_expr(context, out, v),
            None => out.push_str("-1"),
        }
        if let Some(skip) = &value.skip {
            out.push_str(" OFFSET ");
            self.write_expr(context, out, skip);
        }
    }

    /// SELECT without the terminator, usable as a subquery.
    fn write_query(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        let mut context = context.switch_fragment(Fragment::SqlSelect);
        self.write_select_head(&mut context, out, value);
        separated_by(
            out,
            &value.columns,
            |out, v| self.write_select_item(&mut context, out, v),
            ", ",
        );
        {
            let mut context = context.switch_fragment(Fragment::SqlSelectFrom);
            self.write_from(&mut context, out, value);
        }
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(
                &mut context.switch_fragment(Fragment::SqlSelectWhere),
                out,
                filter,
            );
        }
        if !value.group.is_empty() {
            out.push_str(" GROUP BY ");
            let mut context = context.switch_fragment(Fragment::SqlSelectGroupBy);
            separated_by(
                out,
                &value.group,
                |out, v| self.write_expr(&mut context, out, v),
                ", ",
            );
        }
        if !value.order.is_empty() {
            out.push_str(" ORDER BY ");
            let mut context = context.switch_fragment(Fragment::SqlSelectOrderBy);
            separated_by(
                out,
                &value.order,
                |out, (expr, order)| {
                    self.write_expr(&mut context, out, expr);
                    out.push_str(match order {
                        Order::Asc => " ASC",
                        Order::Desc => " DESC",
                    });
                },
                ", ",
            );
        }
        self.write_paging(&mut context, out, value);
    }

    fn write_select(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        self.write_query(context, out, value);
        out.push(';');
    }

    /// Count the rows of `value`, used when it is distinct, grouped or paged.
    fn write_count(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        out.push_str("SELECT COUNT(*) FROM (");
        self.write_query(context, out, value);
        out.push_str(") AS ");
        self.write_identifier_quoted(context, out, "c");
        out.push(';');
    }

    fn write_exists(&self, context: &mut Context, out: &mut String, value: &SelectStatement) {
        out.push_str("SELECT CASE WHEN EXISTS (");
        self.write_query(context, out, value);
        out.push_str(") THEN 1 ELSE 0 END;");
    }

    /// Clause listing the output columns placed before the inserted values.
    fn write_output(&self, _context: &mut Context, _out: &mut String, _value: &ModifyStatement) {}

    /// Clause listing the output columns placed at the end of the statement.
    fn write_returning(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        if value.output.is_empty() {
            return;
        }
        out.push_str(" RETURNING ");
        separated_by(
            out,
            &value.output,
            |out, v| self.write_identifier_quoted(context, out, &v.name),
            ", ",
        );
    }

    fn write_column_list(&self, context: &mut Context, out: &mut String, columns: &[&ColumnDef]) {
        out.push('(');
        separated_by(
            out,
            columns,
            |out, v| self.write_identifier_quoted(context, out, &v.name),
            ", ",
        );
        out.push(')');
    }

    fn write_values(&self, context: &mut Context, out: &mut String, rows: &[Vec<Expr>]) {
        let mut context = context.switch_fragment(Fragment::SqlInsertIntoValues);
        out.push_str("VALUES ");
        separated_by(
            out,
            rows,
            |out, row| {
                out.push('(');
                separated_by(out, row, |out, v| self.write_expr(&mut context, out, v), ", ");
                out.push(')');
            },
            ", ",
        );
    }

    fn write_insert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlInsertInto);
        out.push_str("INSERT INTO ");
        self.write_table_ref(&mut context, out, value.table);
        if value.columns.is_empty() {
            self.write_output(&mut context, out, value);
            out.push_str(" DEFAULT VALUES");
        } else {
            out.push(' ');
            self.write_column_list(&mut context, out, &value.columns);
            self.write_output(&mut context, out, value);
            match (&value.filter, value.rows.first()) {
                (Some(filter), Some(row)) => {
                    out.push_str(" SELECT ");
                    separated_by(out, row, |out, v| self.write_expr(&mut context, out, v), ", ");
                    out.push_str(" WHERE NOT EXISTS (SELECT 1 FROM ");
                    self.write_table_ref(&mut context, out, value.table);
                    out.push_str(" AS ");
                    self.write_alias(&mut context, out, 1);
                    out.push_str(" WHERE ");
                    self.write_condition(&mut context, out, filter);
                    out.push(')');
                }
                _ => {
                    out.push(' ');
                    self.write_values(&mut context, out, &value.rows);
                }
            }
        }
        self.write_returning(&mut context, out, value);
        out.push(';');
    }

    fn write_assignments(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        separated_by(
            out,
            &value.assignments,
            |out, (column, expr)| {
                self.write_identifier_quoted(context, out, &column.name);
                out.push_str(" = ");
                self.write_expr(context, out, expr);
            },
            ", ",
        );
    }

    fn write_update(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        out.push_str("UPDATE ");
        self.write_table_ref(context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(context, out, 1);
        out.push_str(" SET ");
        self.write_assignments(&mut context.switch_fragment(Fragment::SqlUpdateSet), out, value);
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(context, out, filter);
        }
        out.push(';');
    }

    fn write_delete(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlDeleteFrom);
        out.push_str("DELETE FROM ");
        self.write_table_ref(&mut context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(&mut context, out, 1);
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(&mut context, out, filter);
        }
        out.push(';');
    }

    fn write_on_conflict(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        out.push_str(" ON CONFLICT ");
        self.write_column_list(context, out, &value.keys);
        if value.assignments.is_empty() {
            out.push_str(" DO NOTHING");
            return;
        }
        out.push_str(" DO UPDATE SET ");
        self.write_assignments(&mut context.switch_fragment(Fragment::SqlUpsertSet), out, value);
    }

    fn write_upsert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlInsertInto);
        out.push_str("INSERT INTO ");
        self.write_table_ref(&mut context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(&mut context, out, 1);
        out.push(' ');
        self.write_column_list(&mut context, out, &value.columns);
        out.push(' ');
        self.write_values(&mut context, out, &value.rows);
        self.write_on_conflict(&mut context, out, value);
        if let (Some(filter), false) = (&value.filter, value.assignments.is_empty()) {
            out.push_str(" WHERE ");
            self.write_condition(&mut context, out, filter);
        }
        self.write_returning(&mut context, out, value);
        out.push(';');
    }

    /// `WITH "s"(..) AS (VALUES ..) ` naming the bulk rows.
    fn write_row_source(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        out.push_str("WITH ");
        self.write_source_alias(context, out);
        self.write_column_list(context, out, &value.columns);
        out.push_str(" AS (");
        self.write_values(context, out, &value.rows);
        out.push_str(") ");
    }

    fn write_bulk_insert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        self.write_insert(context, out, value);
    }

    fn write_bulk_update(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        self.write_row_source(context, out, value);
        out.push_str("UPDATE ");
        self.write_table_ref(context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(context, out, 1);
        out.push_str(" SET ");
        self.write_assignments(&mut context.switch_fragment(Fragment::SqlUpdateSet), out, value);
        out.push_str(" FROM ");
        self.write_source_alias(context, out);
        if let Some(filter) = &value.filter {
            out.push_str(" WHERE ");
            self.write_condition(context, out, filter);
        }
        out.push(';');
    }

    fn write_bulk_upsert(&self, context: &mut Context, out: &mut String, value: &ModifyStatement) {
        let mut context = context.switch_fragment(Fragment::SqlInsertInto);
        self.write_row_source(&mut context, out, value);
        out.push_str("INSERT INTO ");
        self.write_table_ref(&mut context, out, value.table);
        out.push_str(" AS ");
        self.write_alias(&mut context, out, 1);
        out.push(' ');
        let columns = value.insert_columns().collect::<Vec<_>>();
        self.write_column_list(&mut context, out, &columns);
        out.push_str(" SELECT ");
        separated_by(
            out,
            &columns,
            |out, v| self.write_expr(&mut context, out, &Expr::Source(*v)),
            ", ",
        );
        out.push_str(" FROM ");
        self.write_source_alias(&mut context, out);
        out.push_str(" WHERE true");
        self.write_on_conflict(&mut context, out, value);
        self.write_returning(&mut context, out, value);
        out.push(';');
    }

    fn write_create_table_column(
        &self,
        context: &mut Context,
        out: &mut String,
        column: &ColumnDef,
        inline_key: bool,
    ) {
        self.write_identifier_quoted(context, out, &column.name);
        out.push(' ');
        self.write_column_type(context, out, column);
        if column.identity {
            self.write_identity(context, out);
        }
        if !column.nullable && !(inline_key && column.primary_key) {
            out.push_str(" NOT NULL");
        }
        if inline_key && column.primary_key {
            out.push_str(" PRIMARY KEY");
        }
    }

    fn write_create_table_head(
        &self,
        context: &mut Context,
        out: &mut String,
        table: &TableRef,
        if_not_exists: bool,
    ) {
        out.push_str("CREATE TABLE ");
        if if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        self.write_table_ref(context, out, table);
    }

    fn write_create_table(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &EntityMetadata,
        if_not_exists: bool,
    ) {
        let mut context = context.switch_fragment(Fragment::SqlCreateTable);
        self.write_create_table_head(&mut context, out, &value.table, if_not_exists);
        out.push_str(" (");
        let inline_key = value.primary_key().count() == 1;
        separated_by(
            out,
            &value.columns,
            |out, v| self.write_create_table_column(&mut context, out, v, inline_key),
            ", ",
        );
        if !inline_key && value.has_primary_key() {
            out.push_str(", PRIMARY KEY ");
            self.write_column_list(&mut context, out, &value.primary_key().collect::<Vec<_>>());
        }
        out.push_str(");");
    }

    fn write_drop_table(
        &self,
        context: &mut Context,
        out: &mut String,
        value: &TableRef,
        if_exists: bool,
    ) {
        let mut context = context.switch_fragment(Fragment::SqlDropTable);
        out.push_str("DROP TABLE ");
        if if_exists {
            out.push_str("IF EXISTS ");
        }
        self.write_table_ref(&mut context, out, value);
        out.push(';');
    }

    fn write_create_user_defined_table(
        &self,
        _context: &mut Context,
        _out: &mut String,
        value: &UserDefinedTable,
        _if_not_exists: bool,
    ) {
        log::error!(
            "Cannot create the table type {}, the {} dialect has no user-defined table types",
            value.table.name,
            self.dialect()
        );
    }

    fn write_transaction_begin(&self, out: &mut String) {
        out.push_str("BEGIN;");
    }

    fn write_transaction_commit(&self, out: &mut String) {
        out.push_str("COMMIT;");
    }

    fn write_transaction_rollback(&self, out: &mut String) {
        out.push_str("ROLLBACK;");
    }
}

/// Fallback writer implementing the generic dialect.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub fn new() -> Self {
        Self
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
