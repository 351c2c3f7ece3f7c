use quarry::{DataAccessFactory, Driver, Entity, Result};
use rust_decimal::Decimal;
use std::sync::LazyLock;
use time::{
    Date, OffsetDateTime,
    macros::{date, datetime},
};
use tokio::sync::Mutex;
use uuid::Uuid;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Kind")]
pub struct Kind {
    #[quarry(key)]
    pub id: Uuid,
    pub flag: bool,
    pub small: u8,
    pub letter: char,
    pub ratio: f32,
    pub day: Date,
    pub at: Option<OffsetDateTime>,
    pub amount: Option<Decimal>,
    pub payload: Box<[u8]>,
}

pub async fn kinds<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let kinds = factory.create::<Kind>()?;

    // Setup
    kinds.drop_table(true).await?;
    kinds.create_table(true).await?;

    let full = Kind {
        id: Uuid::new_v4(),
        flag: true,
        small: 255,
        letter: 'q',
        ratio: 0.5,
        day: date!(2024 - 02 - 29),
        at: Some(datetime!(2025-03-14 15:09:26 UTC)),
        amount: Some(Decimal::new(-1525, 2)),
        payload: [0xde, 0xad, 0xbe, 0xef].into(),
    };
    let empty = Kind {
        id: Uuid::new_v4(),
        flag: false,
        small: 0,
        letter: ' ',
        ratio: -2.0,
        day: date!(1999 - 12 - 31),
        at: None,
        amount: None,
        payload: [].into(),
    };
    kinds.insert_many([&full, &empty]).await?;

    let found = kinds.filter(Kind::id.eq(full.id)).query_one().await?;
    assert_eq!(found, Some(full.clone()));
    let found = kinds.filter(Kind::id.eq(empty.id)).query_one().await?;
    assert_eq!(found, Some(empty.clone()));

    assert_eq!(
        kinds
            .filter(Kind::day.gt(date!(2000 - 01 - 01)))
            .select(Kind::id)?
            .query_as::<Uuid>()
            .await?,
        [full.id]
    );
    assert_eq!(kinds.filter(Kind::amount.is_not_null()).count().await?, 1);
    assert_eq!(kinds.filter(Kind::flag.eq(false)).count().await?, 1);

    // Bitwise tests
    let found = kinds.filter(Kind::small.has_flags(0x81)).query_one().await?;
    assert_eq!(found.map(|v| v.id), Some(full.id));
    let found = kinds
        .filter(Kind::small.bit_and(0x0f).eq(0))
        .query_one()
        .await?;
    assert_eq!(found.map(|v| v.id), Some(empty.id));
    assert_eq!(kinds.filter(Kind::small.bit_and(2).ne(0)).count().await?, 1);

    Ok(())
}
