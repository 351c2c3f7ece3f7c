use quarry::{DataAccessFactory, Driver, Entity, QuarryError, Result, error_kind};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Customer")]
pub struct Customer {
    #[quarry(key)]
    pub id: i32,
    pub name: String,
    pub city: Option<String>,
}

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Purchase")]
pub struct Purchase {
    #[quarry(key)]
    pub id: i32,
    pub customer_id: i32,
    pub total: f64,
}

pub async fn purchases<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let customers = factory.create::<Customer>()?;
    let purchases = factory.create::<Purchase>()?;

    // Setup
    purchases.drop_table(true).await?;
    customers.drop_table(true).await?;
    customers.create_table(true).await?;
    purchases.create_table(true).await?;

    let people = [
        Customer {
            id: 1,
            name: "Ada".into(),
            city: Some("London".into()),
        },
        Customer {
            id: 2,
            name: "Linus".into(),
            city: None,
        },
        Customer {
            id: 3,
            name: "Grace".into(),
            city: Some("New York".into()),
        },
    ];
    customers.insert_many(&people).await?;
    let bought = [(1, 1, 12.5), (2, 1, 7.25), (3, 3, 99.0), (4, 1, 0.5), (5, 3, 1.0)]
        .map(|(id, customer_id, total)| Purchase {
            id,
            customer_id,
            total,
        });
    purchases.bulk_insert(&bought).await?;

    // Null checks
    assert_eq!(customers.filter(Customer::city.is_null()).count().await?, 1);
    assert_eq!(
        customers
            .filter(Customer::city.eq(None::<String>))
            .query_one()
            .await?
            .map(|c| c.id),
        Some(2)
    );

    // One to many
    let with_purchases =
        customers.inner_join::<Vec<Purchase>>(Purchase::customer_id.eq(Customer::id))?;
    let nested = with_purchases.query_nested::<Purchase>().await?;
    assert_eq!(nested.len(), 2, "Inner join drops customers without purchases");
    assert_eq!(nested[0].0, people[0]);
    assert_eq!(
        nested[0].1.iter().map(|p| p.id).collect::<Vec<_>>(),
        [1, 2, 4]
    );
    assert_eq!(nested[1].0.name, "Grace");
    assert_eq!(nested[1].1.len(), 2);
    let paged = with_purchases.skip(1).take(1).query_nested::<Purchase>().await?;
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].0.id, 3);

    // Filters on the joined entity
    let big_spenders = with_purchases
        .filter(Purchase::total.gt(10.0))
        .distinct(Customer::name)?
        .order_by(Customer::name)
        .query_as::<String>()
        .await?;
    assert_eq!(big_spenders, ["Ada", "Grace"]);
    let totals = with_purchases
        .group_by(Customer::name, Purchase::total.sum())?
        .order_by(Customer::name)
        .query_as::<(String, f64)>()
        .await?;
    assert_eq!(
        totals,
        [("Ada".to_string(), 20.25), ("Grace".to_string(), 100.0)]
    );

    // Many to one
    let owners = purchases
        .inner_join::<Customer>(Customer::id.eq(Purchase::customer_id))?
        .filter(Customer::name.eq("Grace"))
        .order_by(Purchase::id)
        .query()
        .await?;
    assert_eq!(owners.iter().map(|p| p.id).collect::<Vec<_>>(), [3, 5]);

    // A join must reference the joined entity
    let error = customers
        .inner_join::<Vec<Purchase>>(Customer::id.eq(1))
        .err()
        .expect("A join condition without the joined entity is rejected");
    assert!(matches!(error_kind(&error), Some(QuarryError::QueryShape(..))));
    let error = customers
        .query_nested::<Purchase>()
        .await
        .err()
        .expect("Nesting requires a joined collection");
    assert!(matches!(error_kind(&error), Some(QuarryError::QueryShape(..))));

    Ok(())
}
