use crate::{CompiledStatement, Fingerprint, Result};
use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

/// Compiled statements keyed by descriptor shape.
///
/// Compilation runs outside the lock: concurrent misses on the same shape may compile twice, the
/// first statement inserted is kept and every caller receives it.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: RwLock<HashMap<Fingerprint, Arc<CompiledStatement>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatementCache {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CompiledStatement>> {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned()
    }

    pub fn get_or_compile(
        &self,
        fingerprint: Fingerprint,
        compile: impl FnOnce() -> Result<CompiledStatement>,
    ) -> Result<Arc<CompiledStatement>> {
        if let Some(statement) = self.get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("Statement cache hit for {}", statement.kind.name());
            return Ok(statement);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let statement = Arc::new(compile()?);
        let mut statements = self
            .statements
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(statements.entry(fingerprint).or_insert(statement).clone())
    }

    pub fn len(&self) -> usize {
        self.statements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.statements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        GenericSqlWriter, Registry, StatementKind, compile,
        fixtures::{Member, descriptor},
    };

    #[test]
    fn compiles_once_per_shape() {
        let cache = StatementCache::new();
        let registry = Registry::new(false);
        let writer = GenericSqlWriter::new();
        let descriptor = descriptor::<Member>().with_filter(Member::age.ge(18));
        let fingerprint = || Fingerprint::new("generic", &descriptor, &StatementKind::Select);
        let first = cache
            .get_or_compile(fingerprint(), || {
                compile(&writer, &registry, &descriptor, StatementKind::Select)
            })
            .unwrap();
        let second = cache
            .get_or_compile(fingerprint(), || panic!("The statement is already cached"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = StatementCache::new();
        let descriptor = descriptor::<Member>();
        let fingerprint = || Fingerprint::new("generic", &descriptor, &StatementKind::Update);
        assert!(
            cache
                .get_or_compile(fingerprint(), || Err(crate::Error::msg("no")))
                .is_err()
        );
        assert!(cache.is_empty());
        assert!(cache.get(&fingerprint()).is_none());
        assert_eq!(cache.misses(), 1);
    }
}
