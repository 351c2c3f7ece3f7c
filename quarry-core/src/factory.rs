use crate::{
    ColumnDef, DEFAULT_DATABASE, DataAccess, DataContext, Driver, Entity, QueryDescriptor, Result,
    TableRef, handle::Shared,
};
use std::sync::{Arc, PoisonError};

/// Entry point creating [`DataAccess`] handles for one driver.
///
/// ```ignore
/// let factory = DataAccessFactory::new(MssqlDriver::new());
/// factory.add_connection_string("Members", "server=tcp:localhost,1433;...");
/// let members = factory.create::<Member>()?.filter(Member::age.ge(30)).query().await?;
/// ```
pub struct DataAccessFactory<D: Driver> {
    shared: Arc<Shared<D>>,
}

impl<D: Driver> Clone for DataAccessFactory<D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<D: Driver> DataAccessFactory<D> {
    /// Factory sharing the process wide [`DataContext`].
    pub fn new(driver: D) -> Self {
        Self::with_context(driver, DataContext::global())
    }

    pub fn with_context(driver: D, context: Arc<DataContext>) -> Self {
        Self {
            shared: Arc::new(Shared::new(&driver, context)),
        }
    }

    pub fn context(&self) -> &Arc<DataContext> {
        &self.shared.context
    }

    /// Connection string of the logical database `name`, replacing any previous one.
    pub fn add_connection_string(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        log::debug!("Adding the connection string of the logical database {}", name);
        self.shared
            .connection_strings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value.into());
    }

    /// Register the table type used as the row source of bulk statements.
    pub fn add_user_defined_table(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) {
        self.shared
            .context
            .register_user_defined_table(name, columns);
    }

    /// Map `E` to `table` when accessed through the logical `database`.
    pub fn set_table_override<E: Entity>(
        &self,
        database: &str,
        table: impl Into<TableRef>,
    ) -> Result<()> {
        self.shared
            .context
            .registry()
            .set_table_override::<E>(database, table.into())
    }

    /// Handle on the logical database declared by the entity, or the default one.
    pub fn create<E: Entity>(&self) -> Result<DataAccess<E, D>> {
        let database = E::metadata()
            .database
            .as_deref()
            .unwrap_or(DEFAULT_DATABASE);
        self.create_for::<E>(database)
    }

    pub fn create_for<E: Entity>(&self, database: &str) -> Result<DataAccess<E, D>> {
        let root = self.shared.context.registry().resolve::<E>(database)?;
        Ok(DataAccess::new(
            self.shared.clone(),
            QueryDescriptor::new(root, database.into()),
        ))
    }
}
