use crate::{Executor, Result};
use std::future::Future;

pub trait Connection: Executor + 'static {
    /// Open a connection to the given URL or connection string.
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send;
}
