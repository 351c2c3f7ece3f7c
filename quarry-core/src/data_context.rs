use crate::{
    ColumnDef, CompiledStatement, Fingerprint, QueryDescriptor, Registry, Result, SqlWriter,
    StatementCache, StatementKind, compile,
};
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static GLOBAL: LazyLock<Arc<DataContext>> = LazyLock::new(|| Arc::new(DataContext::default()));

/// Process scoped state shared by every handle: entity metadata and compiled statements.
///
/// Applications usually rely on [`DataContext::global`], tests build isolated contexts.
#[derive(Debug)]
pub struct DataContext {
    registry: Registry,
    cache: StatementCache,
    timeout: Duration,
}

impl Default for DataContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DataContext {
    pub fn builder() -> DataContextBuilder {
        DataContextBuilder {
            strict: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn global() -> Arc<DataContext> {
        GLOBAL.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register the table type and drop the statements compiled against a previous definition.
    pub fn register_user_defined_table(
        &self,
        name: &str,
        columns: impl IntoIterator<Item = ColumnDef>,
    ) {
        self.registry.register_user_defined_table(name, columns);
        self.cache.clear();
    }

    /// Cached statement for the shape of `descriptor`, compiled on the first request.
    pub fn compile(
        &self,
        writer: &dyn SqlWriter,
        descriptor: &QueryDescriptor,
        kind: StatementKind,
    ) -> Result<Arc<CompiledStatement>> {
        let fingerprint = Fingerprint::new(writer.dialect(), descriptor, &kind);
        self.cache.get_or_compile(fingerprint, || {
            compile(writer, &self.registry, descriptor, kind)
        })
    }
}

#[derive(Debug, Clone)]
pub struct DataContextBuilder {
    strict: bool,
    timeout: Duration,
}

impl DataContextBuilder {
    /// Require explicit registration of every entity.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> DataContext {
        DataContext {
            registry: Registry::new(self.strict),
            cache: StatementCache::new(),
            timeout: self.timeout,
        }
    }
}
