use quarry::{DataAccessFactory, Driver, Entity, Result};
use std::sync::LazyLock;
use tokio::{sync::Mutex, task::JoinSet};

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Visitor")]
pub struct Visitor {
    #[quarry(key)]
    pub id: i32,
    pub name: String,
    pub visits: i32,
}

pub async fn concurrency<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let visitors = factory.create::<Visitor>()?;

    // Setup
    visitors.drop_table(true).await?;
    visitors.create_table(false).await?;
    let seeded = (1..=40)
        .map(|i| Visitor {
            id: i,
            name: format!("Visitor{}", i),
            visits: i % 7,
        })
        .collect::<Vec<_>>();
    visitors.insert_many(&seeded).await?;

    // The same query from many tasks at once
    let query = visitors.filter(Visitor::visits.ge(3)).order_by(Visitor::id);
    let cached = factory.context().cache().len();
    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let query = query.clone();
        tasks.spawn(async move { query.query().await });
    }
    let mut results = Vec::with_capacity(16);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined??);
    }
    let expected = seeded
        .iter()
        .filter(|v| v.visits >= 3)
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(results.len(), 16);
    assert!(results.iter().all(|v| *v == expected));
    assert_eq!(factory.context().cache().len(), cached + 1);

    Ok(())
}
