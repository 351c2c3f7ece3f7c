mod bulk;
mod concurrency;
mod kinds;
mod members;
mod notes;
mod purchases;
mod shapes;

use crate::{
    bulk::bulk, concurrency::concurrency, kinds::kinds, members::members, notes::notes,
    purchases::purchases, shapes::shapes,
};
use log::LevelFilter;
use quarry::{DataAccessFactory, Driver};
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Runs every scenario against the `default` logical database of the factory.
pub async fn execute_tests<D: Driver>(factory: DataAccessFactory<D>) {
    shapes(&factory).await;
    members(&factory)
        .await
        .expect("Members scenario did not succeed");
    bulk(&factory).await.expect("Bulk scenario did not succeed");
    purchases(&factory)
        .await
        .expect("Purchases scenario did not succeed");
    notes(&factory).await.expect("Notes scenario did not succeed");
    kinds(&factory).await.expect("Kinds scenario did not succeed");
    concurrency(&factory)
        .await
        .expect("Concurrency scenario did not succeed");
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
