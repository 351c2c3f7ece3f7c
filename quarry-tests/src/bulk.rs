use crate::silent_logs;
use quarry::{DataAccessFactory, Driver, Entity, Result, RowValue};
use rust_decimal::Decimal;
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Stock")]
pub struct Stock {
    #[quarry(key)]
    pub sku: String,
    pub quantity: i32,
    pub price: Decimal,
}

fn stock(sku: &str, quantity: i32, price: Decimal) -> Stock {
    Stock {
        sku: sku.into(),
        quantity,
        price,
    }
}

pub async fn bulk<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let stocks = factory.create::<Stock>()?;

    // Setup
    stocks.drop_table(true).await?;
    stocks.create_table(true).await?;

    // Insert
    let initial = vec![
        stock("A-1", 10, Decimal::new(125, 1)),
        stock("B-2", 0, Decimal::new(325, 2)),
        stock("C-3", 7, Decimal::new(1, 0)),
    ];
    let affected = stocks.bulk_insert(&initial).await?;
    assert_eq!(affected.rows_affected, 3);
    assert_eq!(stocks.order_by(Stock::sku).query().await?, initial);

    // Update on the primary key
    let restocked = vec![stock("A-1", 20, Decimal::new(125, 1)), stock("B-2", 5, Decimal::new(3, 0))];
    let affected = stocks.bulk_update(&restocked).await?;
    assert_eq!(affected.rows_affected, 2);
    assert_eq!(
        stocks
            .filter(Stock::sku.eq("B-2"))
            .query_one()
            .await?
            .map(|s| (s.quantity, s.price)),
        Some((5, Decimal::new(3, 0)))
    );

    // Update only the quantity, matching on the row-bound key
    let affected = stocks
        .filter(Stock::sku.eq(RowValue))
        .set(Stock::quantity, RowValue)
        .bulk_update(&[stock("C-3", 8, Decimal::new(999, 0))])
        .await?;
    assert_eq!(affected.rows_affected, 1);
    assert_eq!(
        stocks.filter(Stock::sku.eq("C-3")).query_one().await?,
        Some(stock("C-3", 8, Decimal::new(1, 0)))
    );

    // Upsert: one update, one insert
    let merged = vec![stock("A-1", 21, Decimal::new(125, 1)), stock("D-4", 1, Decimal::new(5, 1))];
    let affected = stocks.bulk_upsert(&merged).await?;
    assert_eq!(affected.rows_affected, 2);
    assert_eq!(stocks.count().await?, 4);
    let all = stocks.order_by(Stock::sku).query().await?;
    assert_eq!(all[0], merged[0]);
    assert_eq!(all[3], merged[1]);

    let skus = stocks
        .bulk_upsert_returning::<String>(&[stock("D-4", 2, Decimal::new(5, 1)), stock("E-5", 3, Decimal::new(2, 0))])
        .await?;
    assert_eq!(skus.len(), 2);
    assert!(skus.contains(&"D-4".to_string()));
    assert!(skus.contains(&"E-5".to_string()));
    assert_eq!(stocks.count().await?, 5);

    // Per row updates
    let affected = stocks
        .update_rows(&[stock("A-1", 0, Decimal::new(1, 0)), stock("Z-9", 0, Decimal::new(1, 0))])
        .await?;
    assert_eq!(affected.rows_affected, 1);
    assert_eq!(stocks.filter(Stock::quantity.eq(0)).count().await?, 1);

    // More rows than one statement can bind, a duplicate key in the last chunk fails them all
    stocks.delete().await?;
    let mut many = (0..1000)
        .map(|i| stock(&format!("M-{:04}", i), i, Decimal::new(i as i64, 2)))
        .collect::<Vec<_>>();
    many.push(stock("M-0000", 0, Decimal::new(0, 0)));
    let result;
    silent_logs! {
        result = stocks.insert_many(&many).await;
    }
    assert!(result.is_err());
    assert_eq!(stocks.count().await?, 0);

    many.pop();
    let affected = stocks.insert_many(&many).await?;
    assert_eq!(affected.rows_affected, 1000);
    assert_eq!(stocks.count().await?, 1000);
    assert_eq!(
        stocks.filter(Stock::sku.eq("M-0999")).query_one().await?,
        Some(many[999].clone())
    );

    Ok(())
}
