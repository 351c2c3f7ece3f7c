use crate::{Connection, Result};
use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, PoisonError},
};

/// Idle connections grouped by connection string.
#[derive(Debug)]
pub struct Pool<C> {
    idle: Mutex<HashMap<String, Vec<C>>>,
    max_idle: usize,
}

impl<C: Connection> Default for Pool<C> {
    fn default() -> Self {
        Self::new(16)
    }
}

impl<C: Connection> Pool<C> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Default::default(),
            max_idle,
        }
    }

    /// Reuse an idle connection to `url` or open a new one.
    pub async fn acquire(self: &Arc<Self>, url: &str) -> Result<Pooled<C>> {
        let idle = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(url)
            .and_then(Vec::pop);
        let connection = match idle {
            Some(connection) => connection,
            None => C::connect(url).await?,
        };
        Ok(Pooled {
            connection: Some(connection),
            url: url.to_string(),
            pool: self.clone(),
            broken: false,
        })
    }

    pub fn idle(&self, url: &str) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .map_or(0, Vec::len)
    }

    fn release(&self, url: String, connection: C) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let connections = idle.entry(url).or_default();
        if connections.len() < self.max_idle {
            connections.push(connection);
        }
    }
}

/// Connection borrowed from a [`Pool`], returned to it on drop unless marked broken.
pub struct Pooled<C: Connection> {
    connection: Option<C>,
    url: String,
    pool: Arc<Pool<C>>,
    broken: bool,
}

impl<C: Connection> Pooled<C> {
    /// Discard the connection instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.broken = true;
    }

    /// Return the connection to the pool on drop, undoing [`Pooled::discard`].
    pub fn keep(&mut self) {
        self.broken = false;
    }
}

impl<C: Connection> Deref for Pooled<C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("the connection is taken only on drop"))
    }
}

impl<C: Connection> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("the connection is taken only on drop"))
    }
}

impl<C: Connection> Drop for Pooled<C> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.broken {
            log::warn!("Discarding a pooled connection after an error or an interrupted statement");
            return;
        }
        self.pool.release(std::mem::take(&mut self.url), connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MockConnection;

    #[tokio::test]
    async fn connections_are_reused_per_url() {
        let pool = Arc::new(Pool::<MockConnection>::new(1));
        let first = pool.acquire("mock://a").await.unwrap();
        let second = pool.acquire("mock://a").await.unwrap();
        assert_eq!(pool.idle("mock://a"), 0);
        drop(first);
        drop(second);
        // Only `max_idle` connections are kept
        assert_eq!(pool.idle("mock://a"), 1);
        assert_eq!(pool.idle("mock://b"), 0);

        let reused = pool.acquire("mock://a").await.unwrap();
        assert_eq!(pool.idle("mock://a"), 0);
        drop(reused);
        assert_eq!(pool.idle("mock://a"), 1);
    }

    #[tokio::test]
    async fn discarded_connections_are_dropped() {
        let pool = Arc::new(Pool::<MockConnection>::new(4));
        let mut connection = pool.acquire("mock://a").await.unwrap();
        connection.discard();
        drop(connection);
        assert_eq!(pool.idle("mock://a"), 0);
    }

    #[tokio::test]
    async fn connect_errors_propagate() {
        let pool = Arc::new(Pool::<MockConnection>::default());
        let error = pool
            .acquire("other://a")
            .await
            .err()
            .expect("The url is rejected");
        assert!(error.to_string().contains("other://a"));
    }
}
