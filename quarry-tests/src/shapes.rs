use quarry::{
    DataAccessFactory, DataContext, Driver, Entity, QuarryError, StatementKind, count_all,
    error_kind,
};
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "LogLine")]
pub struct LogLine {
    pub level: i32,
    pub message: String,
}

fn kind_of(error: quarry::Error) -> String {
    match error_kind(&error) {
        Some(QuarryError::UnknownEntity(..)) => "UnknownEntity",
        Some(QuarryError::QueryShape(..)) => "QueryShape",
        Some(QuarryError::PagingRequiresOrder(..)) => "PagingRequiresOrder",
        Some(QuarryError::Compilation(..)) => "Compilation",
        Some(QuarryError::Execution { .. }) => "Execution",
        Some(QuarryError::Mapping(..)) => "Mapping",
        None => "Other",
    }
    .to_string()
}

/// Shapes rejected before reaching the database, and the statement cache.
pub async fn shapes<D: Driver>(factory: &DataAccessFactory<D>) {
    let _lock = MUTEX.lock().await;
    let lines = factory
        .create::<LogLine>()
        .expect("Could not create the LogLine handle");

    // Paging needs an order and there is no key to fall back to
    let error = lines.take(5).query().await.expect_err("Paging without order");
    assert_eq!(kind_of(error), "PagingRequiresOrder");
    assert!(
        lines
            .order_by(LogLine::level)
            .take(5)
            .compile(StatementKind::Select)
            .is_ok()
    );
    assert!(
        lines
            .group_by(LogLine::level, count_all())
            .expect("Grouping on a column")
            .skip(1)
            .compile(StatementKind::Select)
            .is_ok(),
        "Grouping keys order a paged grouped query"
    );

    // Illegal compositions
    assert_eq!(
        kind_of(lines.then_by(LogLine::level).err().expect("then_by first")),
        "QueryShape"
    );
    assert_eq!(
        kind_of(lines.and(LogLine::level.eq(1)).err().expect("and first")),
        "QueryShape"
    );
    assert_eq!(
        kind_of(
            lines
                .select(LogLine::level)
                .and_then(|v| v.select(LogLine::message))
                .err()
                .expect("select twice")
        ),
        "QueryShape"
    );
    assert_eq!(
        kind_of(
            lines
                .select((LogLine::level, count_all()))
                .err()
                .expect("aggregate without grouping")
        ),
        "QueryShape"
    );
    assert_eq!(
        kind_of(
            lines
                .group_by(LogLine::level, count_all())
                .expect("Grouping on a column")
                .order_by(LogLine::message)
                .compile(StatementKind::Select)
                .err()
                .expect("order by a column outside the grouping")
        ),
        "Compilation"
    );
    assert_eq!(
        kind_of(lines.update().await.expect_err("update without set")),
        "QueryShape"
    );
    assert_eq!(
        kind_of(
            lines
                .returning(count_all())
                .err()
                .expect("returning an aggregate")
        ),
        "QueryShape"
    );

    // Same shape, one statement
    let first = lines
        .filter(LogLine::level.eq(1))
        .compile(StatementKind::Select)
        .expect("Could not compile");
    let second = lines
        .filter(LogLine::level.eq(2))
        .compile(StatementKind::Select)
        .expect("Could not compile");
    assert!(Arc::ptr_eq(&first, &second));
    let other = lines
        .filter(LogLine::level.ne(2))
        .compile(StatementKind::Select)
        .expect("Could not compile");
    assert!(!Arc::ptr_eq(&first, &other));
    let widened = lines
        .filter(LogLine::level.is_in([1, 2, 3]))
        .compile(StatementKind::Select)
        .expect("Could not compile");
    let narrowed = lines
        .filter(LogLine::level.is_in([1, 2]))
        .compile(StatementKind::Select)
        .expect("Could not compile");
    assert_ne!(widened.sql, narrowed.sql);

    // Strict registries resolve only registered entities
    let context = Arc::new(DataContext::builder().strict(true).build());
    let strict = DataAccessFactory::with_context(D::default(), context.clone());
    assert_eq!(
        kind_of(strict.create::<LogLine>().err().expect("not registered")),
        "UnknownEntity"
    );
    context.registry().register::<LogLine>();
    assert!(strict.create::<LogLine>().is_ok());
    assert!(context.cache().is_empty());
}
