use crate::{
    AggregateFn, ColumnDef, ColumnExpr, ComparisonOp, Condition, Expr, LogicalOp, MatchKind,
    ModifyStatement, Operand, Order, Predicate, Projection, ProjectionItem, QuarryError,
    QueryDescriptor, Registry, Result, Row, SelectItem, SelectStatement, Selection, Slot, Source,
    StatementKind, UserDefinedTable, Value, ValueSource, escape_like, truncate_long,
    writer::{Context, Fragment, SqlWriter},
};
use std::borrow::Cow;

/// SQL text and parameter layout produced for one descriptor shape.
///
/// Shared by every descriptor with the same fingerprint, the values are read from the descriptor
/// at execution time through [`CompiledStatement::bind`].
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub kind: StatementKind,
    pub sql: String,
    /// One entry per placeholder, in placeholder order.
    pub slots: Vec<Slot>,
    pub regroup: Option<Regroup>,
}

impl CompiledStatement {
    /// Resolve every slot against `descriptor` and the rows passed to the terminal operation.
    pub fn bind(&self, descriptor: &QueryDescriptor, rows: &[Row]) -> Result<Vec<Value>> {
        let filter = descriptor
            .filter
            .as_deref()
            .map(Predicate::values)
            .unwrap_or_default();
        let joins = descriptor
            .joins
            .iter()
            .map(|v| v.on.values())
            .collect::<Vec<_>>();
        let value = |source: &ValueSource| -> Result<&Value> {
            let found = match source {
                ValueSource::Filter(i) => filter.get(*i).copied(),
                ValueSource::Join(j, i) => joins.get(*j as usize).and_then(|v| v.get(*i)).copied(),
                ValueSource::Set(i) => match descriptor.set.get(*i).map(|v| &v.operand) {
                    Some(Operand::Value(v)) => Some(v),
                    _ => None,
                },
            };
            found.ok_or_else(|| {
                QuarryError::compilation(format!(
                    "the descriptor has no value for {:?}, it does not match the statement",
                    source
                ))
            })
        };
        self.slots
            .iter()
            .map(|slot| -> Result<Value> {
                Ok(match slot {
                    Slot::Value(source) => value(source)?.clone(),
                    Slot::Pattern(source, kind) => match value(source)? {
                        Value::Varchar(Some(v)) => Value::Varchar(Some(like_pattern(*kind, v))),
                        Value::Char(Some(v)) => {
                            Value::Varchar(Some(like_pattern(*kind, &v.to_string())))
                        }
                        v => v.clone(),
                    },
                    Slot::Skip => paging_value(descriptor.skip),
                    Slot::Take => paging_value(descriptor.take),
                    Slot::Row { row, column } => rows
                        .get(*row)
                        .and_then(|v| v.get(*column))
                        .cloned()
                        .ok_or_else(|| {
                            QuarryError::compilation(format!(
                                "the statement reads column {} of row {} but {} rows were provided",
                                column,
                                row,
                                rows.len()
                            ))
                        })?,
                })
            })
            .collect()
    }
}

fn paging_value(value: Option<u64>) -> Value {
    Value::Int64(Some(i64::try_from(value.unwrap_or(0)).unwrap_or(i64::MAX)))
}

fn like_pattern(kind: MatchKind, value: &str) -> String {
    let escaped = escape_like(value);
    match kind {
        MatchKind::Contains => format!("%{}%", escaped),
        MatchKind::StartsWith => format!("{}%", escaped),
        MatchKind::EndsWith => format!("%{}", escaped),
        MatchKind::FullText => value.to_string(),
    }
}

/// Folds consecutive rows sharing the grouping keys into one row, the `collect` columns become
/// lists of the values of every folded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Regroup {
    pub keys: Vec<usize>,
    pub collect: Vec<usize>,
}

impl Regroup {
    pub fn apply(&self, rows: impl IntoIterator<Item = Row>) -> Vec<Row> {
        let mut result: Vec<Row> = Vec::new();
        for mut row in rows {
            if let Some(last) = result.last_mut()
                && self.keys.iter().all(|&k| last.get(k) == row.get(k))
            {
                for &c in &self.collect {
                    if let (Some(Value::List(Some(list), ..)), Some(v)) =
                        (last.get_mut(c), row.get_mut(c))
                    {
                        list.push(std::mem::take(v));
                    }
                }
                continue;
            }
            for &c in &self.collect {
                if let Some(v) = row.get_mut(c) {
                    let prototype = v.as_null();
                    let first = std::mem::take(v);
                    *v = Value::List(Some(vec![first]), Box::new(prototype));
                }
            }
            result.push(row);
        }
        result
    }
}

/// Compile `descriptor` for the operation `kind`.
pub fn compile(
    writer: &dyn SqlWriter,
    registry: &Registry,
    descriptor: &QueryDescriptor,
    kind: StatementKind,
) -> Result<CompiledStatement> {
    let registered = match &descriptor.root.user_defined_table {
        Some(name) if writer.supports_user_defined_tables() => registry.user_defined_table(name),
        _ => None,
    };
    let lowering = Lowering {
        descriptor,
        writer,
        rows: matches!(
            kind,
            StatementKind::Insert { .. }
                | StatementKind::Update
                | StatementKind::Upsert
                | StatementKind::Delete
        ),
        row_type: registered.as_deref(),
    };
    let mut context = Context::new(Fragment::None, true);
    let mut sql = String::with_capacity(256);
    let mut regroup = None;
    match kind {
        StatementKind::Select | StatementKind::SelectOne | StatementKind::SelectNested { .. } => {
            let (statement, r) = lowering.select(kind)?;
            regroup = r;
            writer.write_select(&mut context, &mut sql, &statement);
        }
        StatementKind::Count => {
            let (statement, wrapped) = lowering.aggregate_query(false)?;
            if wrapped {
                writer.write_count(&mut context, &mut sql, &statement);
            } else {
                writer.write_select(&mut context, &mut sql, &statement);
            }
        }
        StatementKind::Exists => {
            let (statement, _) = lowering.aggregate_query(true)?;
            writer.write_exists(&mut context, &mut sql, &statement);
        }
        StatementKind::Insert { rows } => {
            writer.write_insert(&mut context, &mut sql, &lowering.insert(rows)?)
        }
        StatementKind::Update => writer.write_update(&mut context, &mut sql, &lowering.update()?),
        StatementKind::Upsert => writer.write_upsert(&mut context, &mut sql, &lowering.upsert()?),
        StatementKind::Delete => writer.write_delete(&mut context, &mut sql, &lowering.delete()?),
        StatementKind::BulkInsert { rows } => {
            let statement = lowering.bulk(kind, rows)?;
            writer.write_bulk_insert(&mut context, &mut sql, &statement);
        }
        StatementKind::BulkUpdate { rows } => {
            let statement = lowering.bulk(kind, rows)?;
            writer.write_bulk_update(&mut context, &mut sql, &statement);
        }
        StatementKind::BulkUpsert { rows } => {
            let statement = lowering.bulk(kind, rows)?;
            writer.write_bulk_upsert(&mut context, &mut sql, &statement);
        }
        StatementKind::CreateTable { if_not_exists } => {
            writer.write_create_table(&mut context, &mut sql, &descriptor.root, if_not_exists)
        }
        StatementKind::DropTable { if_exists } => {
            writer.write_drop_table(&mut context, &mut sql, &descriptor.root.table, if_exists)
        }
        StatementKind::CreateUserDefinedTable { if_not_exists } => {
            let root = &descriptor.root;
            let Some(name) = &root.user_defined_table else {
                return Err(QuarryError::compilation(format!(
                    "`{}` declares no user-defined table type",
                    root.entity_name
                )));
            };
            if !writer.supports_user_defined_tables() {
                return Err(QuarryError::compilation(format!(
                    "the {} dialect has no user-defined table types",
                    writer.dialect()
                )));
            }
            let derived;
            let table = match lowering.row_type {
                Some(v) => v,
                None => {
                    derived = UserDefinedTable {
                        table: name.as_str().into(),
                        columns: root
                            .columns
                            .iter()
                            .map(|c| c.clone().identity(false))
                            .collect(),
                    };
                    &derived
                }
            };
            writer.write_create_user_defined_table(&mut context, &mut sql, table, if_not_exists);
        }
    }
    log::trace!("Compiled {}: {}", kind.name(), truncate_long!(sql));
    Ok(CompiledStatement {
        kind,
        sql,
        slots: context.into_slots(),
        regroup,
    })
}

struct Lowering<'a> {
    descriptor: &'a QueryDescriptor,
    writer: &'a dyn SqlWriter,
    /// Whether operands can be bound from a row.
    rows: bool,
    row_type: Option<&'a UserDefinedTable>,
}

impl<'a> Lowering<'a> {
    fn resolve(&self, column: &ColumnExpr) -> Result<(u8, &'a ColumnDef)> {
        let descriptor: &'a QueryDescriptor = self.descriptor;
        let found = if column.position == 0 {
            descriptor.chain().find(|(_, m)| m.entity == column.entity)
        } else {
            descriptor
                .chain()
                .find(|(p, _)| *p == column.position)
                .filter(|(_, m)| m.entity == column.entity)
        };
        let Some((position, metadata)) = found else {
            return Err(QuarryError::compilation(format!(
                "`{}.{}` does not refer to an entity of the query",
                column.entity_name, column.name
            )));
        };
        match metadata.column(column.name) {
            Some(def) => Ok((position, def)),
            None => Err(QuarryError::compilation(format!(
                "`{}` has no column `{}`",
                metadata.entity_name, column.name
            ))),
        }
    }

    fn column(&self, column: &ColumnExpr) -> Result<Expr<'a>> {
        let (position, column) = self.resolve(column)?;
        Ok(Expr::Column { position, column })
    }

    fn root_column(&self, column: &ColumnExpr) -> Result<(usize, &'a ColumnDef)> {
        let (position, def) = self.resolve(column)?;
        let root = &self.descriptor.root;
        match root.column_index(&def.name) {
            Some(index) if position == 1 => Ok((index, def)),
            _ => Err(QuarryError::shape(format!(
                "`{}.{}` is not a column of `{}`",
                column.entity_name, column.name, root.entity_name
            ))),
        }
    }

    fn row_slot(&self, column: &ColumnExpr, row: usize) -> Result<Slot> {
        if !self.rows {
            return Err(QuarryError::shape(
                "values bound from a row are only accepted by row operations",
            ));
        }
        let (column, _) = self.root_column(column)?;
        Ok(Slot::Row { row, column })
    }

    fn operand(
        &self,
        column: &ColumnExpr,
        operand: &Operand,
        source: &dyn Fn(usize) -> ValueSource,
        counter: &mut usize,
    ) -> Result<Expr<'a>> {
        match operand {
            Operand::Value(..) => {
                let index = *counter;
                *counter += 1;
                Ok(Expr::Param(Slot::Value(source(index))))
            }
            Operand::Column(other) => self.column(other),
            Operand::Row => Ok(Expr::Param(self.row_slot(column, 0)?)),
        }
    }

    fn predicate(
        &self,
        predicate: &Predicate,
        source: &dyn Fn(usize) -> ValueSource,
        counter: &mut usize,
    ) -> Result<Condition<'a>> {
        Ok(match predicate {
            Predicate::Comparison {
                column,
                op,
                operand,
            } => {
                let lhs = self.column(column)?;
                match operand {
                    Operand::Value(v) if v.is_null() => {
                        *counter += 1;
                        match op {
                            ComparisonOp::Equal => Condition::IsNull(lhs, false),
                            ComparisonOp::NotEqual => Condition::IsNull(lhs, true),
                            _ => {
                                return Err(QuarryError::compilation(format!(
                                    "`{}` is compared with NULL using {:?}, only equality is defined",
                                    column.name, op
                                )));
                            }
                        }
                    }
                    _ => Condition::Compare(lhs, *op, self.operand(column, operand, source, counter)?),
                }
            }
            Predicate::Logical { op, lhs, rhs } => {
                let lhs = self.predicate(lhs, source, counter)?;
                let rhs = self.predicate(rhs, source, counter)?;
                Condition::Logical(*op, lhs.into(), rhs.into())
            }
            Predicate::Membership {
                column,
                set,
                negated,
            } => {
                let lhs = self.column(column)?;
                if set.is_empty() {
                    return Ok(Condition::Constant(*negated));
                }
                let mut items = Vec::with_capacity(set.len());
                for operand in set.iter() {
                    if matches!(operand, Operand::Row) {
                        return Err(QuarryError::shape("a membership set cannot be bound from a row"));
                    }
                    items.push(self.operand(column, operand, source, counter)?);
                }
                Condition::In(lhs, items, *negated)
            }
            Predicate::StringMatch {
                column,
                kind,
                pattern,
                negated,
            } => {
                let lhs = self.column(column)?;
                if !pattern.is_value() {
                    return Err(QuarryError::shape(format!(
                        "the pattern matched against `{}` must be a value",
                        column.name
                    )));
                }
                let index = *counter;
                *counter += 1;
                if *kind == MatchKind::FullText {
                    if !self.writer.supports_full_text() {
                        return Err(QuarryError::compilation(format!(
                            "the {} dialect does not support full-text search",
                            self.writer.dialect()
                        )));
                    }
                    Condition::FullText(lhs, Expr::Param(Slot::Value(source(index))), *negated)
                } else {
                    Condition::Like(lhs, Expr::Param(Slot::Pattern(source(index), *kind)), *negated)
                }
            }
            Predicate::BitwiseTest {
                column,
                mask,
                op,
                value,
            } => Condition::Bitwise {
                expr: self.column(column)?,
                mask: self.operand(column, mask, source, counter)?,
                op: *op,
                value: self.operand(column, value, source, counter)?,
            },
        })
    }

    fn filter(&self) -> Result<Option<Condition<'a>>> {
        self.descriptor
            .filter
            .as_deref()
            .map(|v| self.predicate(v, &ValueSource::Filter, &mut 0))
            .transpose()
    }

    fn sources(&self) -> Result<Vec<Source<'a>>> {
        let descriptor: &'a QueryDescriptor = self.descriptor;
        let mut sources = Vec::with_capacity(descriptor.joins.len() + 1);
        sources.push(Source {
            table: &descriptor.root.table,
            position: 1,
            on: None,
        });
        for (i, join) in descriptor.joins.iter().enumerate() {
            let on = self.predicate(&join.on, &|v| ValueSource::Join(i as u8, v), &mut 0)?;
            sources.push(Source {
                table: &join.target.table,
                position: join.position,
                on: Some(on),
            });
        }
        Ok(sources)
    }

    fn selection(&self, selection: &Selection) -> Result<Expr<'a>> {
        match selection {
            Selection::Column(column) => self.column(column),
            Selection::Aggregate(func, arg) => Ok(Expr::Aggregate {
                func: *func,
                arg: arg.as_ref().map(|c| self.column(c).map(Box::new)).transpose()?,
            }),
        }
    }

    fn item(&self, item: &ProjectionItem) -> Result<SelectItem<'a>> {
        Ok(SelectItem {
            expr: self.selection(&item.selection)?,
            alias: item.alias.map(Cow::Borrowed),
        })
    }

    fn entity_columns(&self, position: u8) -> Vec<SelectItem<'a>> {
        let descriptor: &'a QueryDescriptor = self.descriptor;
        descriptor
            .chain()
            .filter(|(p, _)| *p == position)
            .flat_map(|(position, metadata)| {
                metadata.columns.iter().map(move |column| SelectItem {
                    expr: Expr::Column { position, column },
                    alias: None,
                })
            })
            .collect()
    }

    fn root_key(&self) -> Vec<(Expr<'a>, Order)> {
        let descriptor: &'a QueryDescriptor = self.descriptor;
        descriptor
            .root
            .primary_key()
            .map(|column| (Expr::Column { position: 1, column }, Order::Asc))
            .collect()
    }

    /// Ordering used when the query is paged without one.
    fn default_order(&self, columns: &[SelectItem<'a>], group: &[Expr<'a>]) -> Result<Vec<(Expr<'a>, Order)>> {
        let descriptor = self.descriptor;
        if !group.is_empty() {
            return Ok(group.iter().map(|v| (v.clone(), Order::Asc)).collect());
        }
        if descriptor.distinct {
            return Ok(columns.iter().map(|v| (v.expr.clone(), Order::Asc)).collect());
        }
        let key = self.root_key();
        if key.is_empty() {
            return Err(
                QuarryError::PagingRequiresOrder(descriptor.root.entity_name.to_string()).into(),
            );
        }
        Ok(key)
    }

    /// User ordering, aggregates become window functions over `partition` when given.
    fn order(&self, group: &[Expr<'a>], partition: Option<&[Expr<'a>]>) -> Result<Vec<(Expr<'a>, Order)>> {
        let grouped = !group.is_empty() || partition.is_some();
        let mut result = Vec::with_capacity(self.descriptor.order.len());
        for item in self.descriptor.order.iter() {
            let expr = match &item.key {
                Selection::Aggregate(AggregateFn::Collect, ..) => {
                    return Err(QuarryError::compilation("cannot order by a collected column"));
                }
                Selection::Aggregate(func, arg) if partition.is_some() => Expr::Window {
                    func: *func,
                    arg: arg.as_ref().map(|c| self.column(c).map(Box::new)).transpose()?,
                    partition: partition.unwrap_or_default().to_vec(),
                },
                key => {
                    let expr = self.selection(key)?;
                    let keys = partition.unwrap_or(group);
                    if grouped && !key.is_aggregate() && !keys.contains(&expr) {
                        return Err(QuarryError::compilation(format!(
                            "cannot order a grouped query by `{}`, it is neither a grouping key nor an aggregate",
                            match key {
                                Selection::Column(c) => c.name,
                                _ => "?",
                            }
                        )));
                    }
                    expr
                }
            };
            result.push((expr, item.order));
        }
        Ok(result)
    }

    fn select(&self, kind: StatementKind) -> Result<(SelectStatement<'a>, Option<Regroup>)> {
        let descriptor = self.descriptor;
        let projection = descriptor.projection.as_deref();
        let mut columns;
        let mut group = Vec::new();
        let mut order;
        let mut regroup = None;
        let mut sql_paging = true;
        match projection {
            None => {
                columns = self.entity_columns(1);
                if let StatementKind::SelectNested { position } = kind {
                    if !descriptor.joins.iter().any(|v| v.position == position) {
                        return Err(QuarryError::shape(format!(
                            "there is no joined collection at position {}",
                            position
                        )));
                    }
                    columns.extend(self.entity_columns(position));
                }
                order = self.order(&[], None)?;
            }
            Some(Projection::Columns(items)) => {
                columns = Vec::with_capacity(items.len());
                for item in items {
                    columns.push(self.item(item)?);
                }
                order = self.order(&[], None)?;
            }
            Some(Projection::Grouped { keys, aggregates }) if projection.is_some_and(Projection::has_collect) => {
                columns = Vec::new();
                let mut partition = Vec::with_capacity(keys.len());
                for key in keys {
                    let item = self.item(key)?;
                    partition.push(item.expr.clone());
                    columns.push(item);
                }
                let mut collect = Vec::new();
                for item in aggregates {
                    let Selection::Aggregate(func, arg) = &item.selection else {
                        return Err(QuarryError::shape("`group_by` accepts only aggregates"));
                    };
                    let arg = arg.as_ref().map(|c| self.column(c)).transpose()?;
                    let expr = match (func, arg) {
                        (AggregateFn::Collect, Some(arg)) => {
                            collect.push(columns.len());
                            arg
                        }
                        (AggregateFn::Collect, None) => {
                            return Err(QuarryError::shape("`collect` requires a column"));
                        }
                        (func, arg) => Expr::Window {
                            func: *func,
                            arg: arg.map(Box::new),
                            partition: partition.clone(),
                        },
                    };
                    columns.push(SelectItem {
                        expr,
                        alias: item.alias.map(Cow::Borrowed),
                    });
                }
                order = self.order(&[], Some(&partition))?;
                order.extend(
                    partition
                        .iter()
                        .filter(|v| !order.iter().any(|(e, _)| e == *v))
                        .map(|v| (v.clone(), Order::Asc))
                        .collect::<Vec<_>>(),
                );
                regroup = Some(Regroup {
                    keys: (0..partition.len()).collect(),
                    collect,
                });
                sql_paging = false;
            }
            Some(Projection::Grouped { keys, aggregates }) => {
                columns = Vec::new();
                for key in keys {
                    let item = self.item(key)?;
                    group.push(item.expr.clone());
                    columns.push(item);
                }
                for item in aggregates {
                    columns.push(self.item(item)?);
                }
                order = self.order(&group, None)?;
            }
        }
        if let StatementKind::SelectNested { .. } = kind {
            let key = self.root_key();
            if key.is_empty() {
                return Err(QuarryError::compilation(format!(
                    "`{}` has no primary key to nest the joined rows under",
                    descriptor.root.entity_name
                )));
            }
            let missing = key
                .into_iter()
                .filter(|(e, _)| !order.iter().any(|(o, _)| o == e))
                .collect::<Vec<_>>();
            order.extend(missing);
            sql_paging = false;
        }
        let skip = (sql_paging && descriptor.skip.is_some()).then_some(Expr::Param(Slot::Skip));
        let take = if !sql_paging {
            None
        } else if kind == StatementKind::SelectOne {
            Some(Expr::Literal("1"))
        } else {
            descriptor.take.map(|_| Expr::Param(Slot::Take))
        };
        if order.is_empty() && sql_paging && descriptor.is_paged() {
            order = self.default_order(&columns, &group)?;
        }
        let statement = SelectStatement {
            sources: self.sources()?,
            columns,
            filter: self.filter()?,
            group,
            order,
            distinct: descriptor.distinct,
            skip,
            take,
            dirty_read: descriptor.dirty_read,
        };
        Ok((statement, regroup))
    }

    /// Statement counting or testing the rows, `true` when it must be wrapped as a subquery.
    fn aggregate_query(&self, exists: bool) -> Result<(SelectStatement<'a>, bool)> {
        let descriptor = self.descriptor;
        let projection = descriptor.projection.as_deref();
        let grouped = projection.is_some_and(Projection::is_grouped);
        let wrapped = descriptor.distinct || grouped || descriptor.is_paged();
        let mut statement = SelectStatement {
            sources: self.sources()?,
            columns: Vec::new(),
            filter: self.filter()?,
            group: Vec::new(),
            order: Vec::new(),
            distinct: descriptor.distinct,
            skip: None,
            take: None,
            dirty_read: descriptor.dirty_read,
        };
        if !wrapped {
            statement.columns.push(SelectItem {
                expr: if exists {
                    Expr::Literal("1")
                } else {
                    Expr::Aggregate {
                        func: AggregateFn::Count,
                        arg: None,
                    }
                },
                alias: None,
            });
            return Ok((statement, false));
        }
        match projection {
            None => statement.columns = self.entity_columns(1),
            Some(Projection::Columns(items)) => {
                for item in items {
                    statement.columns.push(self.item(item)?);
                }
            }
            Some(Projection::Grouped { keys, aggregates }) => {
                for key in keys {
                    let item = self.item(key)?;
                    statement.group.push(item.expr.clone());
                    statement.columns.push(item);
                }
                for item in aggregates.iter().filter(|v| !v.selection.is_collect()) {
                    statement.columns.push(self.item(item)?);
                }
            }
        }
        for (i, item) in statement.columns.iter_mut().enumerate() {
            item.alias = Some(Cow::Owned(format!("c{}", i + 1)));
        }
        if descriptor.is_paged() {
            statement.order = self.order(&statement.group, None)?;
            if statement.order.is_empty() {
                statement.order = self.default_order(&statement.columns, &statement.group)?;
            }
            statement.skip = descriptor.skip.map(|_| Expr::Param(Slot::Skip));
            statement.take = descriptor.take.map(|_| Expr::Param(Slot::Take));
        }
        Ok((statement, true))
    }

    fn reject_joins(&self, operation: &str) -> Result<()> {
        if self.descriptor.joins.is_empty() {
            Ok(())
        } else {
            Err(QuarryError::shape(format!(
                "`{}` cannot be combined with `inner_join`",
                operation
            )))
        }
    }

    fn output(&self) -> Result<Vec<&'a ColumnDef>> {
        let descriptor: &'a QueryDescriptor = self.descriptor;
        descriptor
            .output
            .iter()
            .map(|c| self.root_column(c).map(|(_, def)| def))
            .collect()
    }

    /// Value assigned by the `set` entry `index`, `None` for column operands.
    fn assigned(&self, index: usize, row: usize) -> Result<Option<Expr<'a>>> {
        let assignment = &self.descriptor.set[index];
        Ok(match &assignment.operand {
            Operand::Value(..) => Some(Expr::Param(Slot::Value(ValueSource::Set(index)))),
            Operand::Row => Some(Expr::Param(self.row_slot(&assignment.column, row)?)),
            Operand::Column(..) => None,
        })
    }

    fn assignments(&self) -> Result<Vec<(&'a ColumnDef, Expr<'a>)>> {
        let descriptor = self.descriptor;
        let mut result = Vec::with_capacity(descriptor.set.len());
        for (i, assignment) in descriptor.set.iter().enumerate() {
            let (_, column) = self.root_column(&assignment.column)?;
            let expr = match &assignment.operand {
                Operand::Column(other) => self.column(other)?,
                _ => self.assigned(i, 0)?.unwrap_or(Expr::Literal("NULL")),
            };
            result.push((column, expr));
        }
        Ok(result)
    }

    fn insert(&self, rows: usize) -> Result<ModifyStatement<'a>> {
        self.reject_joins("insert")?;
        let descriptor: &'a QueryDescriptor = self.descriptor;
        if rows > 1 && descriptor.filter.is_some() {
            return Err(QuarryError::shape("a conditional insert accepts a single row"));
        }
        let root = &descriptor.root;
        let mut statement = ModifyStatement::new(&root.table);
        if descriptor.set.is_empty() {
            let columns = root
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.identity);
            statement.columns = columns.clone().map(|(_, c)| c).collect();
            statement.rows = (0..rows)
                .map(|row| {
                    columns
                        .clone()
                        .map(|(column, _)| Expr::Param(Slot::Row { row, column }))
                        .collect()
                })
                .collect();
        } else {
            for assignment in descriptor.set.iter() {
                statement.columns.push(self.root_column(&assignment.column)?.1);
            }
            for row in 0..rows.max(1) {
                let mut values = Vec::with_capacity(descriptor.set.len());
                for i in 0..descriptor.set.len() {
                    let Some(expr) = self.assigned(i, row)? else {
                        return Err(QuarryError::shape(
                            "an inserted value cannot be read from another column",
                        ));
                    };
                    values.push(expr);
                }
                statement.rows.push(values);
            }
        }
        statement.filter = self.filter()?;
        statement.output = self.output()?;
        Ok(statement)
    }

    fn update(&self) -> Result<ModifyStatement<'a>> {
        self.reject_joins("update")?;
        let descriptor: &'a QueryDescriptor = self.descriptor;
        if descriptor.set.is_empty() {
            return Err(QuarryError::shape("`update` requires at least one `set`"));
        }
        let mut statement = ModifyStatement::new(&descriptor.root.table);
        statement.assignments = self.assignments()?;
        statement.filter = self.filter()?;
        Ok(statement)
    }

    fn delete(&self) -> Result<ModifyStatement<'a>> {
        self.reject_joins("delete")?;
        let descriptor: &'a QueryDescriptor = self.descriptor;
        let mut statement = ModifyStatement::new(&descriptor.root.table);
        statement.filter = self.filter()?;
        Ok(statement)
    }

    fn upsert(&self) -> Result<ModifyStatement<'a>> {
        self.reject_joins("upsert")?;
        let descriptor: &'a QueryDescriptor = self.descriptor;
        let Some(filter) = descriptor.filter.as_deref() else {
            return Err(QuarryError::shape("`upsert` requires a filter matching the existing row"));
        };
        if descriptor.set.is_empty() {
            return Err(QuarryError::shape("`upsert` requires at least one `set`"));
        }
        let mut statement = ModifyStatement::new(&descriptor.root.table);
        let mut values = Vec::new();
        for (i, assignment) in descriptor.set.iter().enumerate() {
            let Some(expr) = self.assigned(i, 0)? else {
                return Err(QuarryError::shape(
                    "an upserted value cannot be read from another column",
                ));
            };
            statement.columns.push(self.root_column(&assignment.column)?.1);
            values.push(expr);
        }
        for (column, operand, slot) in filter.equalities() {
            let expr = match operand {
                Operand::Value(..) => Expr::Param(Slot::Value(ValueSource::Filter(slot))),
                Operand::Row => Expr::Param(self.row_slot(column, 0)?),
                Operand::Column(..) => continue,
            };
            let (_, def) = self.root_column(column)?;
            statement.keys.push(def);
            if def.identity && !self.writer.supports_merge() {
                return Err(QuarryError::compilation(format!(
                    "the {} dialect cannot upsert matching on the identity column `{}`",
                    self.writer.dialect(),
                    def.name
                )));
            }
            if !def.identity && !statement.columns.contains(&def) {
                statement.columns.push(def);
                values.push(expr);
            }
        }
        if statement.keys.is_empty() {
            return Err(QuarryError::shape(
                "`upsert` requires `column.eq(value)` conditions identifying the row",
            ));
        }
        statement.rows.push(values);
        statement.assignments = self.assignments()?;
        statement.filter = self.filter()?;
        statement.output = self.output()?;
        Ok(statement)
    }

    fn bulk(&self, kind: StatementKind, rows: usize) -> Result<ModifyStatement<'a>> {
        self.reject_joins(kind.name())?;
        let descriptor: &'a QueryDescriptor = self.descriptor;
        let root = &descriptor.root;
        let insert = matches!(kind, StatementKind::BulkInsert { .. });
        let mut statement = ModifyStatement::new(&root.table);
        if insert && (descriptor.filter.is_some() || !descriptor.set.is_empty()) {
            return Err(QuarryError::shape(
                "`bulk_insert` takes every value from the rows, it accepts neither filters nor `set`",
            ));
        }
        if let Some(filter) = descriptor.filter.as_deref() {
            for conjunct in filter.conjuncts() {
                let Predicate::Comparison {
                    column,
                    op: ComparisonOp::Equal,
                    operand: Operand::Row,
                } = conjunct
                else {
                    return Err(QuarryError::shape(
                        "bulk operations accept only `column.eq(RowValue)` filters",
                    ));
                };
                statement.keys.push(self.root_column(column)?.1);
            }
        } else if !insert {
            statement.keys = root.primary_key().collect();
        }
        if !insert && statement.keys.is_empty() {
            return Err(QuarryError::compilation(format!(
                "`{}` has no primary key to match the rows on",
                root.entity_name
            )));
        }
        if matches!(kind, StatementKind::BulkUpsert { .. })
            && !self.writer.supports_merge()
            && let Some(key) = statement.keys.iter().find(|c| c.identity)
        {
            return Err(QuarryError::compilation(format!(
                "the {} dialect cannot upsert matching on the identity column `{}`",
                self.writer.dialect(),
                key.name
            )));
        }
        match (&root.user_defined_table, self.row_type) {
            (Some(name), None) if self.writer.supports_user_defined_tables() => {
                return Err(QuarryError::compilation(format!(
                    "the user-defined table type `{}` of `{}` is not registered",
                    name, root.entity_name
                )));
            }
            (_, Some(row_type)) => {
                for column in &row_type.columns {
                    let Some(def) = root.column(&column.name) else {
                        return Err(QuarryError::compilation(format!(
                            "the column `{}` of the table type `{}` is not a column of `{}`",
                            column.name, row_type.table.name, root.entity_name
                        )));
                    };
                    statement.columns.push(def);
                }
                statement.row_type = Some(row_type);
            }
            _ => {
                let keys = &statement.keys;
                statement.columns = root
                    .columns
                    .iter()
                    .filter(|c| !c.identity || keys.contains(c))
                    .collect();
            }
        }
        for key in &statement.keys {
            if !statement.columns.contains(key) {
                return Err(QuarryError::compilation(format!(
                    "the match column `{}` is missing from the bulk rows",
                    key.name
                )));
            }
        }
        let mut indexes = Vec::with_capacity(statement.columns.len());
        for column in &statement.columns {
            indexes.push(root.column_index(&column.name).unwrap_or_default());
        }
        statement.rows = (0..rows)
            .map(|row| {
                indexes
                    .iter()
                    .map(|&column| Expr::Param(Slot::Row { row, column }))
                    .collect()
            })
            .collect();
        if !insert {
            if descriptor.set.is_empty() {
                statement.assignments = statement
                    .columns
                    .iter()
                    .filter(|c| !c.identity && !statement.keys.contains(c))
                    .map(|c| (*c, Expr::Source(*c)))
                    .collect();
            } else {
                for (i, assignment) in descriptor.set.iter().enumerate() {
                    let (_, def) = self.root_column(&assignment.column)?;
                    let expr = match &assignment.operand {
                        Operand::Row if statement.columns.contains(&def) => Expr::Source(def),
                        Operand::Row => {
                            return Err(QuarryError::compilation(format!(
                                "the assigned column `{}` is missing from the bulk rows",
                                def.name
                            )));
                        }
                        Operand::Value(..) => Expr::Param(Slot::Value(ValueSource::Set(i))),
                        Operand::Column(other) => self.column(other)?,
                    };
                    statement.assignments.push((def, expr));
                }
            }
            statement.filter = statement
                .keys
                .iter()
                .map(|key| {
                    Condition::Compare(
                        Expr::Column {
                            position: 1,
                            column: key,
                        },
                        ComparisonOp::Equal,
                        Expr::Source(key),
                    )
                })
                .reduce(|lhs, rhs| Condition::Logical(LogicalOp::And, lhs.into(), rhs.into()));
        }
        statement.output = self.output()?;
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Entity, GenericSqlWriter, OrderItem, RowValue,
        fixtures::{Member, Visit, descriptor},
    };

    fn generic(descriptor: &QueryDescriptor, kind: StatementKind) -> Result<CompiledStatement> {
        compile(&GenericSqlWriter::new(), &Registry::new(false), descriptor, kind)
    }

    fn error_of(result: Result<CompiledStatement>) -> QuarryError {
        result
            .expect_err("The statement should not compile")
            .downcast::<QuarryError>()
            .expect("The error should be a QuarryError")
    }

    #[test]
    fn select_with_limit() {
        let descriptor = descriptor::<Member>()
            .with_filter(Member::age.ge(30))
            .with_order(OrderItem {
                key: Selection::Column(Member::name.expr()),
                order: Order::Asc,
            })
            .with_take(5);
        let statement = generic(&descriptor, StatementKind::Select).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"t1\".\"Id\", \"t1\".\"Name\", \"t1\".\"Nickname\", \"t1\".\"Age\" \
            FROM \"club\".\"Member\" AS \"t1\" WHERE \"t1\".\"Age\" >= ?1 \
            ORDER BY \"t1\".\"Name\" ASC LIMIT ?2;"
        );
        assert_eq!(
            statement.slots,
            [Slot::Value(ValueSource::Filter(0)), Slot::Take]
        );
        assert_eq!(
            statement.bind(&descriptor, &[]).unwrap(),
            [Value::Int16(Some(30)), Value::Int64(Some(5))]
        );
    }

    #[test]
    fn keyless_paging_requires_order() {
        let error = error_of(generic(
            &descriptor::<Visit>().with_take(3),
            StatementKind::Select,
        ));
        assert!(matches!(error, QuarryError::PagingRequiresOrder(name) if name == "Visit"));
    }

    #[test]
    fn patterns_are_escaped_when_bound() {
        let descriptor = descriptor::<Member>().with_filter(Member::name.contains("50%_off"));
        let statement = generic(&descriptor, StatementKind::Count).unwrap();
        assert!(statement.sql.ends_with("WHERE \"t1\".\"Name\" LIKE ?1 ESCAPE '\\';"));
        assert_eq!(
            statement.bind(&descriptor, &[]).unwrap(),
            [Value::Varchar(Some("%50\\%\\_off%".into()))]
        );
    }

    #[test]
    fn null_comparisons() {
        let statement = generic(
            &descriptor::<Member>().with_filter(Member::nickname.eq(None::<String>)),
            StatementKind::Count,
        )
        .unwrap();
        assert!(statement.sql.ends_with("WHERE \"t1\".\"Nickname\" IS NULL;"));
        assert!(statement.slots.is_empty());

        let error = error_of(generic(
            &descriptor::<Member>().with_filter(Member::nickname.gt(None::<String>)),
            StatementKind::Count,
        ));
        assert!(matches!(error, QuarryError::Compilation(..)));
    }

    #[test]
    fn row_values_need_row_operations() {
        let descriptor = descriptor::<Member>().with_filter(Member::id.eq(RowValue));
        let error = error_of(generic(&descriptor, StatementKind::Select));
        assert!(matches!(error, QuarryError::QueryShape(..)));
        assert!(generic(&descriptor, StatementKind::Delete).is_ok());
    }

    #[test]
    fn insert_binds_rows() {
        let descriptor = descriptor::<Member>();
        let statement = generic(&descriptor, StatementKind::Insert { rows: 2 }).unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"club\".\"Member\" (\"Id\", \"Name\", \"Nickname\", \"Age\") \
            VALUES (?1, ?2, ?3, ?4), (?5, ?6, ?7, ?8);"
        );
        let member = Member {
            id: 1,
            name: "Ada".into(),
            nickname: None,
            age: 36,
        };
        assert!(statement.bind(&descriptor, &[member.row()]).is_err());
        let values = statement
            .bind(&descriptor, &[member.row(), member.row()])
            .unwrap();
        assert_eq!(values.len(), 8);
        assert_eq!(values[4], Value::Int32(Some(1)));
        assert!(values[6].is_null());
    }

    #[test]
    fn regroup_folds_consecutive_rows() {
        let regroup = Regroup {
            keys: vec![0],
            collect: vec![1],
        };
        let row = |key: &str, value: i32| -> Row {
            Box::new([Value::Varchar(Some(key.into())), Value::Int32(Some(value))])
        };
        let rows = regroup.apply([row("a", 1), row("a", 2), row("b", 3)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0][1],
            Value::List(
                Some(vec![Value::Int32(Some(1)), Value::Int32(Some(2))]),
                Box::new(Value::Int32(None))
            )
        );
        assert_eq!(
            rows[1][1],
            Value::List(Some(vec![Value::Int32(Some(3))]), Box::new(Value::Int32(None)))
        );
    }
}
