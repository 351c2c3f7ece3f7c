use crate::{
    ColumnDef, Entity, EntityMetadata, QuarryError, Result, TableRef, UserDefinedTable,
};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

/// Logical database used when neither the caller nor the entity names one.
pub const DEFAULT_DATABASE: &str = "default";

/// Process scoped entity metadata.
///
/// Entities are registered explicitly with [`Registry::register`] or, unless the registry is
/// strict, on their first resolution from the metadata generated by `#[derive(Entity)]`.
#[derive(Debug, Default)]
pub struct Registry {
    strict: bool,
    entities: RwLock<HashMap<TypeId, Arc<EntityMetadata>>>,
    overrides: RwLock<HashMap<(TypeId, String), Arc<EntityMetadata>>>,
    user_defined_tables: RwLock<HashMap<String, Arc<UserDefinedTable>>>,
}

impl Registry {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Default::default()
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn register<E: Entity>(&self) {
        self.register_metadata(E::metadata().clone());
    }

    pub fn register_metadata(&self, metadata: EntityMetadata) {
        log::debug!(
            "Registering entity {} as table {}",
            metadata.entity_name,
            metadata.table.name
        );
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities.insert(metadata.entity, Arc::new(metadata));
    }

    /// Map the entity to a different table when used through the logical `database`.
    pub fn set_table_override<E: Entity>(&self, database: &str, table: TableRef) -> Result<()> {
        let base = self.base::<E>()?;
        let metadata = EntityMetadata {
            table,
            ..(*base).clone()
        };
        let mut overrides = self.overrides.write().unwrap_or_else(PoisonError::into_inner);
        overrides.insert((metadata.entity, database.to_string()), Arc::new(metadata));
        Ok(())
    }

    pub fn register_user_defined_table(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) {
        let table = UserDefinedTable {
            table: name.into(),
            columns: columns.into_iter().collect(),
        };
        let mut tables = self
            .user_defined_tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tables.insert(name.to_string(), Arc::new(table));
    }

    pub fn user_defined_table(&self, name: &str) -> Option<Arc<UserDefinedTable>> {
        let tables = self
            .user_defined_tables
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        tables.get(name).cloned()
    }

    fn base<E: Entity>(&self) -> Result<Arc<EntityMetadata>> {
        let id = TypeId::of::<E>();
        if let Some(metadata) = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return Ok(metadata.clone());
        }
        if self.strict {
            return Err(QuarryError::UnknownEntity(E::metadata().entity_name.to_string()).into());
        }
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entities
            .entry(id)
            .or_insert_with(|| Arc::new(E::metadata().clone()))
            .clone())
    }

    /// Metadata of `E` as seen from the logical `database`.
    pub fn resolve<E: Entity>(&self, database: &str) -> Result<Arc<EntityMetadata>> {
        let base = self.base::<E>()?;
        let overrides = self.overrides.read().unwrap_or_else(PoisonError::into_inner);
        Ok(overrides
            .get(&(base.entity, database.to_string()))
            .cloned()
            .unwrap_or(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Member;

    #[test]
    fn strict_registry_requires_registration() {
        let registry = Registry::new(true);
        let error = registry
            .resolve::<Member>(DEFAULT_DATABASE)
            .expect_err("Member is not registered")
            .downcast::<QuarryError>()
            .unwrap();
        assert!(matches!(error, QuarryError::UnknownEntity(name) if name == "Member"));
        registry.register::<Member>();
        assert_eq!(
            registry.resolve::<Member>(DEFAULT_DATABASE).unwrap().table,
            TableRef::new("club", "Member")
        );
    }

    #[test]
    fn overrides_apply_to_one_database() {
        let registry = Registry::new(false);
        registry
            .set_table_override::<Member>("archive", TableRef::from("old.Member"))
            .unwrap();
        let archived = registry.resolve::<Member>("archive").unwrap();
        let current = registry.resolve::<Member>(DEFAULT_DATABASE).unwrap();
        assert_eq!(archived.table, TableRef::new("old", "Member"));
        assert_eq!(current.table, TableRef::new("club", "Member"));
        assert_eq!(archived.columns, current.columns);
        assert!(Arc::ptr_eq(
            &current,
            &registry.resolve::<Member>(DEFAULT_DATABASE).unwrap()
        ));
    }

    #[test]
    fn user_defined_tables() {
        let registry = Registry::new(false);
        assert!(registry.user_defined_table("dbo.MemberRow").is_none());
        registry.register_user_defined_table(
            "dbo.MemberRow",
            [ColumnDef::new("Id", crate::Value::Int32(None)).primary_key(true)],
        );
        let table = registry.user_defined_table("dbo.MemberRow").unwrap();
        assert_eq!(table.table, TableRef::new("dbo", "MemberRow"));
        assert_eq!(table.columns.len(), 1);
    }
}
