mod as_value;
mod cache;
mod compiler;
mod connection;
mod data_context;
mod descriptor;
mod driver;
mod engine;
mod entity;
mod error;
mod executor;
mod expression;
mod factory;
mod fingerprint;
#[cfg(test)]
mod fixtures;
mod handle;
mod metadata;
mod pool;
mod registry;
mod statement;
mod util;
mod value;
pub mod writer;

pub use ::anyhow::Context;
pub use as_value::*;
pub use cache::*;
pub use compiler::*;
pub use connection::*;
pub use data_context::*;
pub use descriptor::*;
pub use driver::*;
pub use engine::*;
pub use entity::*;
pub use error::*;
pub use executor::*;
pub use expression::*;
pub use factory::*;
pub use fingerprint::*;
pub use handle::*;
pub use metadata::*;
pub use pool::*;
pub use registry::*;
pub use statement::*;
pub use util::*;
pub use value::*;
pub use writer::{Fragment, GenericSqlWriter, SqlWriter};
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
