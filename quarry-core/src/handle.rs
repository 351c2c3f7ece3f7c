use crate::{
    AsValue, Assignment, Cardinality, Column, ColumnDef, ColumnExpr, ComparisonOp,
    CompiledStatement, DataContext, Driver, Engine, Entity, Error, ExecutionOptions, FromRow,
    IntoOperand, IntoOrderKey, IntoProjection, LogicalOp, Operand, Order, OrderItem, Pool,
    Predicate, QuarryError, QueryDescriptor, Result, Row, RowsAffected, Selection, SqlWriter,
    StatementKind, Value, map_row,
};
use std::{
    collections::HashMap,
    marker::PhantomData,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

/// State shared by a factory and every handle it creates.
pub(crate) struct Shared<D: Driver> {
    pub(crate) writer: D::SqlWriter,
    pub(crate) context: Arc<DataContext>,
    pub(crate) pool: Arc<Pool<D::Connection>>,
    pub(crate) connection_strings: RwLock<HashMap<String, String>>,
}

impl<D: Driver> Shared<D> {
    pub(crate) fn new(driver: &D, context: Arc<DataContext>) -> Self {
        Self {
            writer: driver.sql_writer(),
            context,
            pool: Default::default(),
            connection_strings: Default::default(),
        }
    }

    fn connection_string(&self, database: &str) -> Result<String> {
        self.connection_strings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(database)
            .cloned()
            .ok_or_else(|| {
                Error::msg(format!(
                    "No connection string is registered for the logical database `{}`",
                    database
                ))
            })
    }
}

fn column_expr<E: Entity>(column: &'static ColumnDef) -> ColumnExpr {
    let metadata = E::metadata();
    ColumnExpr {
        entity: metadata.entity,
        entity_name: metadata.entity_name,
        name: column.name.as_str(),
        position: 1,
    }
}

/// Type of a member reachable through `inner_join`: an entity, or a collection of entities.
pub trait Navigation {
    type Target: Entity;
    const CARDINALITY: Cardinality;
}

impl<E: Entity> Navigation for E {
    type Target = E;
    const CARDINALITY: Cardinality = Cardinality::One;
}

impl<E: Entity> Navigation for Vec<E> {
    type Target = E;
    const CARDINALITY: Cardinality = Cardinality::Many;
}

/// Fluent, immutable access to the entity `E` through the driver `D`.
///
/// Every fluent method returns a new handle, the receiver keeps its own descriptor and can be
/// reused concurrently. Terminal methods compile the descriptor, execute it and map the results.
pub struct DataAccess<E: Entity, D: Driver> {
    shared: Arc<Shared<D>>,
    descriptor: QueryDescriptor,
    options: ExecutionOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, D: Driver> Clone for DataAccess<E, D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            descriptor: self.descriptor.clone(),
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, D: Driver> DataAccess<E, D> {
    pub(crate) fn new(shared: Arc<Shared<D>>, descriptor: QueryDescriptor) -> Self {
        Self {
            shared,
            descriptor,
            options: Default::default(),
            _entity: PhantomData,
        }
    }

    fn with(&self, descriptor: QueryDescriptor) -> Self {
        Self {
            shared: self.shared.clone(),
            descriptor,
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &Arc<DataContext> {
        &self.shared.context
    }

    pub fn filter(&self, predicate: Predicate) -> Self {
        self.with(self.descriptor.with_filter(predicate))
    }

    pub fn and(&self, predicate: Predicate) -> Result<Self> {
        Ok(self.with(self.descriptor.with_logical(LogicalOp::And, predicate)?))
    }

    pub fn or(&self, predicate: Predicate) -> Result<Self> {
        Ok(self.with(self.descriptor.with_logical(LogicalOp::Or, predicate)?))
    }

    /// Assign `value` to `column` in inserts, updates and upserts.
    pub fn set<T>(&self, column: Column<E, T>, value: impl IntoOperand<T>) -> Self {
        self.with(self.descriptor.with_set(Assignment {
            column: column.expr(),
            operand: value.into_operand(),
        }))
    }

    /// Join the entity reached through the member of type `N`, `Vec<T>` members join a collection.
    pub fn inner_join<N: Navigation>(&self, on: Predicate) -> Result<Self> {
        let target = self
            .shared
            .context
            .registry()
            .resolve::<N::Target>(&self.descriptor.database)?;
        Ok(self.with(self.descriptor.with_join(target, on, N::CARDINALITY)?))
    }

    pub fn order_by(&self, key: impl IntoOrderKey) -> Self {
        self.with(self.descriptor.with_order(OrderItem {
            key: key.into_order_key(),
            order: Order::Asc,
        }))
    }

    pub fn order_by_descending(&self, key: impl IntoOrderKey) -> Self {
        self.with(self.descriptor.with_order(OrderItem {
            key: key.into_order_key(),
            order: Order::Desc,
        }))
    }

    pub fn then_by(&self, key: impl IntoOrderKey) -> Result<Self> {
        Ok(self.with(self.descriptor.with_then_order(OrderItem {
            key: key.into_order_key(),
            order: Order::Asc,
        })?))
    }

    pub fn then_by_descending(&self, key: impl IntoOrderKey) -> Result<Self> {
        Ok(self.with(self.descriptor.with_then_order(OrderItem {
            key: key.into_order_key(),
            order: Order::Desc,
        })?))
    }

    pub fn select(&self, items: impl IntoProjection) -> Result<Self> {
        Ok(self.with(self.descriptor.with_select(items.projection())?))
    }

    pub fn group_by(&self, keys: impl IntoProjection, aggregates: impl IntoProjection) -> Result<Self> {
        Ok(self.with(
            self.descriptor
                .with_group(keys.projection(), aggregates.projection())?,
        ))
    }

    pub fn distinct(&self, keys: impl IntoProjection) -> Result<Self> {
        Ok(self.with(self.descriptor.with_distinct(keys.projection())?))
    }

    pub fn skip(&self, skip: u64) -> Self {
        self.with(self.descriptor.with_skip(skip))
    }

    pub fn take(&self, take: u64) -> Self {
        self.with(self.descriptor.with_take(take))
    }

    /// Columns returned by `insert_returning`, `upsert_returning` and `bulk_upsert_returning`.
    pub fn returning(&self, columns: impl IntoProjection) -> Result<Self> {
        let mut output = Vec::new();
        for item in columns.projection() {
            match item.selection {
                Selection::Column(column) if item.alias.is_none() => output.push(column),
                _ => {
                    return Err(QuarryError::shape(
                        "`returning` accepts only plain columns of the entity",
                    ));
                }
            }
        }
        Ok(self.with(self.descriptor.with_output(output)?))
    }

    /// Read uncommitted data.
    pub fn dirty_read(&self, dirty_read: bool) -> Self {
        self.with(self.descriptor.with_dirty_read(dirty_read))
    }

    pub fn output_sql(&self, hook: impl Fn(&str, &[Value]) + Send + Sync + 'static) -> Self {
        let mut result = self.clone();
        result.options.output_sql = Some(Arc::new(hook));
        result
    }

    pub fn timeout(&self, timeout: Duration) -> Self {
        let mut result = self.clone();
        result.options.timeout = Some(timeout);
        result
    }

    /// Compiled statement for the operation `kind`, without executing it.
    pub fn compile(&self, kind: StatementKind) -> Result<Arc<CompiledStatement>> {
        self.shared
            .context
            .compile(&self.shared.writer, &self.descriptor, kind)
    }

    async fn engine(&self) -> Result<Engine<'_, D::Connection>> {
        let database = &self.descriptor.database;
        let url = self.shared.connection_string(database)?;
        let connection = self.shared.pool.acquire(&url).await.map_err(|e| {
            e.context(format!(
                "Could not connect to the logical database `{}`",
                database
            ))
        })?;
        Ok(Engine::new(
            connection,
            &self.options,
            self.shared.context.timeout(),
        ))
    }

    fn page<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.descriptor.skip.unwrap_or(0) as usize)
            .take(self.descriptor.take.map_or(usize::MAX, |v| v as usize))
            .collect()
    }

    async fn fetch_with(
        &self,
        descriptor: &QueryDescriptor,
        kind: StatementKind,
        rows: &[Row],
    ) -> Result<Vec<Row>> {
        let mut engine = self.engine().await?;
        self.fetch_on(&mut engine, descriptor, kind, rows).await
    }

    async fn fetch_on(
        &self,
        engine: &mut Engine<'_, D::Connection>,
        descriptor: &QueryDescriptor,
        kind: StatementKind,
        rows: &[Row],
    ) -> Result<Vec<Row>> {
        let statement = self
            .shared
            .context
            .compile(&self.shared.writer, descriptor, kind)?;
        let params = statement.bind(descriptor, rows)?;
        let result = engine
            .fetch(&statement.sql, params)
            .await?
            .into_iter()
            .map(Row::from);
        Ok(match &statement.regroup {
            Some(regroup) => self.page(regroup.apply(result)),
            None => result.collect(),
        })
    }

    async fn fetch(&self, kind: StatementKind, rows: &[Row]) -> Result<Vec<Row>> {
        self.fetch_with(&self.descriptor, kind, rows).await
    }

    async fn execute_with(
        &self,
        descriptor: &QueryDescriptor,
        kind: StatementKind,
        rows: &[Row],
    ) -> Result<RowsAffected> {
        let mut engine = self.engine().await?;
        self.execute_on(&mut engine, descriptor, kind, rows).await
    }

    async fn execute_on(
        &self,
        engine: &mut Engine<'_, D::Connection>,
        descriptor: &QueryDescriptor,
        kind: StatementKind,
        rows: &[Row],
    ) -> Result<RowsAffected> {
        let statement = self
            .shared
            .context
            .compile(&self.shared.writer, descriptor, kind)?;
        let params = statement.bind(descriptor, rows)?;
        engine.execute(&statement.sql, params).await
    }

    async fn begin(&self, engine: &mut Engine<'_, D::Connection>) -> Result<()> {
        let mut sql = String::new();
        self.shared.writer.write_transaction_begin(&mut sql);
        engine.control(&sql).await
    }

    /// Commit on success, otherwise roll back and return the original error.
    async fn finish<T>(
        &self,
        engine: &mut Engine<'_, D::Connection>,
        result: Result<T>,
    ) -> Result<T> {
        let mut sql = String::new();
        match result {
            Ok(value) => {
                self.shared.writer.write_transaction_commit(&mut sql);
                engine.control(&sql).await?;
                Ok(value)
            }
            Err(error) => {
                self.shared.writer.write_transaction_rollback(&mut sql);
                if let Err(e) = engine.control(&sql).await {
                    log::error!("Could not roll back after a failed batch: {:#}", e);
                }
                Err(error)
            }
        }
    }

    async fn execute(&self, kind: StatementKind, rows: &[Row]) -> Result<RowsAffected> {
        self.execute_with(&self.descriptor, kind, rows).await
    }

    /// Rows of the root entity.
    pub async fn query(&self) -> Result<Vec<E>> {
        self.query_as::<E>().await
    }

    /// Rows mapped positionally into `R`: a tuple, a scalar or another entity shaped like the
    /// projection.
    pub async fn query_as<R: FromRow>(&self) -> Result<Vec<R>> {
        if self.descriptor.take == Some(0) {
            return Ok(Vec::new());
        }
        self.fetch(StatementKind::Select, &[])
            .await?
            .into_iter()
            .map(map_row)
            .collect()
    }

    pub async fn query_one(&self) -> Result<Option<E>> {
        self.query_one_as::<E>().await
    }

    pub async fn query_one_as<R: FromRow>(&self) -> Result<Option<R>> {
        if self.descriptor.take == Some(0) {
            return Ok(None);
        }
        self.fetch(StatementKind::SelectOne, &[])
            .await?
            .into_iter()
            .next()
            .map(map_row)
            .transpose()
    }

    pub async fn query_map<R: FromRow, T>(&self, f: impl FnMut(R) -> T) -> Result<Vec<T>> {
        Ok(self.query_as::<R>().await?.into_iter().map(f).collect())
    }

    /// Fold the rows into `seed` after materialization.
    pub async fn query_fold<R: FromRow, A>(&self, seed: A, f: impl FnMut(A, R) -> A) -> Result<A> {
        Ok(self.query_as::<R>().await?.into_iter().fold(seed, f))
    }

    /// Root entities with the rows of the joined collection of `C` nested under each of them.
    ///
    /// Paging applies to the root entities.
    pub async fn query_nested<C: Entity>(&self) -> Result<Vec<(E, Vec<C>)>> {
        let Some(join) = self.descriptor.joins.iter().find(|v| {
            v.cardinality == Cardinality::Many && v.target.entity == C::metadata().entity
        }) else {
            return Err(QuarryError::shape(format!(
                "`query_nested` requires an `inner_join::<Vec<{}>>`",
                C::metadata().entity_name
            )));
        };
        let root = &self.descriptor.root;
        let width = root.columns.len();
        let keys = root
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let rows = self
            .fetch(
                StatementKind::SelectNested {
                    position: join.position,
                },
                &[],
            )
            .await?;
        let mut groups: Vec<(Row, Vec<Row>)> = Vec::new();
        for row in rows {
            let mut values = row.into_vec();
            let child = values.split_off(width.min(values.len()));
            match groups.last_mut() {
                Some((parent, children)) if keys.iter().all(|&k| parent.get(k) == values.get(k)) => {
                    children.push(child.into())
                }
                _ => groups.push((values.into(), vec![child.into()])),
            }
        }
        self.page(groups)
            .into_iter()
            .map(|(parent, children)| {
                Ok((
                    map_row::<E>(parent)?,
                    children.into_iter().map(map_row).collect::<Result<_>>()?,
                ))
            })
            .collect()
    }

    async fn scalar(&self, kind: StatementKind) -> Result<Value> {
        let row = self.fetch(kind, &[]).await?.into_iter().next();
        match row.and_then(|v| v.into_vec().into_iter().next()) {
            Some(value) => Ok(value),
            None => Err(QuarryError::mapping(format!(
                "`{}` returned no value",
                kind.name()
            ))),
        }
    }

    pub async fn count(&self) -> Result<u64> {
        u64::try_from_value(self.scalar(StatementKind::Count).await?)
    }

    pub async fn exists(&self) -> Result<bool> {
        bool::try_from_value(self.scalar(StatementKind::Exists).await?)
    }

    /// Insert `row`, or only the `set` columns when there are some. With a filter the row is
    /// inserted only when no existing row matches it.
    pub async fn insert(&self, row: &E) -> Result<RowsAffected> {
        self.execute(StatementKind::Insert { rows: 1 }, &[row.row()])
            .await
    }

    /// Output columns of the write, the configured ones or else the identity or key columns.
    fn output_descriptor(&self) -> Result<QueryDescriptor> {
        if !self.descriptor.output.is_empty() {
            return Ok(self.descriptor.clone());
        }
        let metadata = E::metadata();
        let identity = metadata.columns.iter().filter(|c| c.identity);
        let columns = if identity.clone().next().is_some() {
            identity.map(column_expr::<E>).collect()
        } else {
            metadata.primary_key().map(column_expr::<E>).collect()
        };
        self.descriptor.with_output(columns)
    }

    /// Insert `row` and return the output columns, `None` when a conditional insert was skipped.
    pub async fn insert_returning<R: FromRow>(&self, row: &E) -> Result<Option<R>> {
        let descriptor = self.output_descriptor()?;
        self.fetch_with(&descriptor, StatementKind::Insert { rows: 1 }, &[row.row()])
            .await?
            .into_iter()
            .next()
            .map(map_row)
            .transpose()
    }

    /// Rows per statement when every row binds `width` parameters.
    fn chunk_size(&self, width: usize) -> usize {
        let writer = &self.shared.writer;
        let fixed = self.descriptor.filter.as_ref().map_or(0, |v| v.value_count())
            + self.descriptor.set.len();
        let available = writer.parameter_limit().saturating_sub(fixed);
        (available / width.max(1)).min(writer.row_limit()).max(1)
    }

    /// Rows split by the parameter limit, every chunk in one transaction when there are several.
    async fn batched(
        &self,
        descriptor: &QueryDescriptor,
        rows: Vec<Row>,
        kind: impl Fn(usize) -> StatementKind,
    ) -> Result<RowsAffected> {
        let size = self.chunk_size(descriptor.root.columns.len());
        if rows.is_empty() {
            return Ok(RowsAffected::default());
        }
        if rows.len() <= size {
            return self.execute_with(descriptor, kind(rows.len()), &rows).await;
        }
        let mut engine = self.engine().await?;
        self.begin(&mut engine).await?;
        let result = async {
            let mut total = RowsAffected::default();
            for chunk in rows.chunks(size) {
                let affected = self
                    .execute_on(&mut engine, descriptor, kind(chunk.len()), chunk)
                    .await?;
                total.extend([affected]);
            }
            Ok::<_, Error>(total)
        }
        .await;
        self.finish(&mut engine, result).await
    }

    /// Multi-row insert, split when the rows exceed the parameter limit.
    pub async fn insert_many<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<RowsAffected> {
        let rows = rows.into_iter().map(Entity::row).collect();
        self.batched(&self.descriptor, rows, |rows| StatementKind::Insert {
            rows,
        })
        .await
    }

    /// Update the filtered rows with the `set` values.
    pub async fn update(&self) -> Result<RowsAffected> {
        self.execute(StatementKind::Update, &[]).await
    }

    /// Update matching on the primary key unless a filter is present, assigning every other
    /// column unless `set` is present.
    fn row_update_descriptor(&self) -> Result<QueryDescriptor> {
        let metadata = E::metadata();
        let mut descriptor = self.descriptor.clone();
        if descriptor.filter.is_none() {
            if !metadata.has_primary_key() {
                return Err(QuarryError::shape(format!(
                    "`{}` has no primary key, `update_row` requires a filter",
                    metadata.entity_name
                )));
            }
            for key in metadata.primary_key() {
                descriptor = descriptor.with_filter(Predicate::Comparison {
                    column: column_expr::<E>(key),
                    op: ComparisonOp::Equal,
                    operand: Operand::Row,
                });
            }
        }
        if descriptor.set.is_empty() {
            for c in metadata.columns.iter().filter(|c| !c.primary_key && !c.identity) {
                descriptor = descriptor.with_set(Assignment {
                    column: column_expr::<E>(c),
                    operand: Operand::Row,
                });
            }
        }
        Ok(descriptor)
    }

    pub async fn update_row(&self, row: &E) -> Result<RowsAffected> {
        let descriptor = self.row_update_descriptor()?;
        self.execute_with(&descriptor, StatementKind::Update, &[row.row()])
            .await
    }

    /// One statement per row, compiled once, in a single transaction.
    pub async fn update_rows<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<RowsAffected> {
        let descriptor = self.row_update_descriptor()?;
        let rows = rows.into_iter().map(Entity::row).collect::<Vec<_>>();
        match rows.len() {
            0 => return Ok(RowsAffected::default()),
            1 => return self.execute_with(&descriptor, StatementKind::Update, &rows).await,
            _ => {}
        }
        let mut engine = self.engine().await?;
        self.begin(&mut engine).await?;
        let result = async {
            let mut total = RowsAffected::default();
            for row in rows {
                let affected = self
                    .execute_on(&mut engine, &descriptor, StatementKind::Update, &[row])
                    .await?;
                total.extend([affected]);
            }
            Ok::<_, Error>(total)
        }
        .await;
        self.finish(&mut engine, result).await
    }

    /// Update the row matched by the filter equalities or insert it.
    pub async fn upsert(&self) -> Result<RowsAffected> {
        self.execute(StatementKind::Upsert, &[]).await
    }

    pub async fn upsert_returning<R: FromRow>(&self) -> Result<Option<R>> {
        let descriptor = self.output_descriptor()?;
        self.fetch_with(&descriptor, StatementKind::Upsert, &[])
            .await?
            .into_iter()
            .next()
            .map(map_row)
            .transpose()
    }

    pub async fn delete(&self) -> Result<RowsAffected> {
        self.execute(StatementKind::Delete, &[]).await
    }

    pub async fn bulk_insert<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<RowsAffected> {
        let rows = rows.into_iter().map(Entity::row).collect();
        self.batched(&self.descriptor, rows, |rows| StatementKind::BulkInsert {
            rows,
        })
        .await
    }

    /// Update every row matched on the row-bound filter columns, or the primary key.
    pub async fn bulk_update<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<RowsAffected> {
        let rows = rows.into_iter().map(Entity::row).collect();
        self.batched(&self.descriptor, rows, |rows| StatementKind::BulkUpdate {
            rows,
        })
        .await
    }

    /// Update the rows that exist and insert the others, matching like `bulk_update`.
    pub async fn bulk_upsert<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<RowsAffected> {
        let rows = rows.into_iter().map(Entity::row).collect();
        self.batched(&self.descriptor, rows, |rows| StatementKind::BulkUpsert {
            rows,
        })
        .await
    }

    pub async fn bulk_upsert_returning<'a, R: FromRow>(
        &self,
        rows: impl IntoIterator<Item = &'a E>,
    ) -> Result<Vec<R>> {
        let descriptor = self.output_descriptor()?;
        let rows = rows.into_iter().map(Entity::row).collect::<Vec<_>>();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let size = self.chunk_size(descriptor.root.columns.len());
        let mut engine = self.engine().await?;
        let chunked = rows.len() > size;
        if chunked {
            self.begin(&mut engine).await?;
        }
        let result = async {
            let mut result = Vec::with_capacity(rows.len());
            for chunk in rows.chunks(size) {
                let kind = StatementKind::BulkUpsert { rows: chunk.len() };
                for row in self.fetch_on(&mut engine, &descriptor, kind, chunk).await? {
                    result.push(map_row(row)?);
                }
            }
            Ok::<_, Error>(result)
        }
        .await;
        match chunked {
            true => self.finish(&mut engine, result).await,
            false => result,
        }
    }

    pub async fn create_table(&self, if_not_exists: bool) -> Result<()> {
        self.execute(StatementKind::CreateTable { if_not_exists }, &[])
            .await
            .map(|_| ())
    }

    pub async fn drop_table(&self, if_exists: bool) -> Result<()> {
        self.execute(StatementKind::DropTable { if_exists }, &[])
            .await
            .map(|_| ())
    }

    pub async fn create_user_defined_table(&self, if_not_exists: bool) -> Result<()> {
        self.execute(StatementKind::CreateUserDefinedTable { if_not_exists }, &[])
            .await
            .map(|_| ())
    }
}
