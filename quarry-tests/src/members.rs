use quarry::{DataAccessFactory, Driver, Entity, Result, count_all};
use std::{collections::HashSet, sync::LazyLock};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Member")]
pub struct Member {
    #[quarry(key)]
    pub id: i32,
    pub name: String,
    pub phone: String,
    pub age: i16,
}

const NAMES: [&str; 5] = ["John", "Mary", "Jane", "Luke", "Jack"];

pub async fn members<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let members = factory.create::<Member>()?;

    // Setup
    members.drop_table(true).await?;
    members.create_table(false).await?;

    // Insert and read back
    let kevin = Member {
        id: 99,
        name: "Kevin".into(),
        phone: "0000-000000".into(),
        age: 88,
    };
    let affected = members.insert(&kevin).await?;
    assert_eq!(affected.rows_affected, 1);
    assert_eq!(
        members.filter(Member::id.eq(99)).query_one().await?,
        Some(kevin.clone())
    );
    assert_eq!(members.filter(Member::id.eq(98)).query_one().await?, None);

    // Seed
    let seeded = (1..=50)
        .map(|i| Member {
            id: i,
            name: format!("{}{}", NAMES[i as usize % NAMES.len()], i),
            phone: format!("555-{:04}", i),
            age: (18 + i % 40) as i16,
        })
        .collect::<Vec<_>>();
    let affected = members.insert_many(&seeded).await?;
    assert_eq!(affected.rows_affected, 50);
    assert_eq!(members.count().await?, 51);

    // Filter, order and take
    let expected = seeded
        .iter()
        .chain([&kevin])
        .filter(|m| m.age >= 30 && m.name.starts_with('J'))
        .count();
    let adult_jays = members
        .filter(Member::age.ge(30))
        .and(Member::name.starts_with("J"))?
        .order_by(Member::age)
        .take(10)
        .query()
        .await?;
    assert_eq!(adult_jays.len(), expected.min(10));
    assert!(
        adult_jays
            .iter()
            .all(|m| m.age >= 30 && m.name.starts_with('J'))
    );
    assert!(adult_jays.windows(2).all(|w| w[0].age <= w[1].age));

    // Membership
    let picked = members
        .filter(Member::id.is_in([3, 1, 2]))
        .order_by(Member::id)
        .query()
        .await?;
    assert_eq!(picked.iter().map(|m| m.id).collect::<Vec<_>>(), [1, 2, 3]);
    assert_eq!(members.filter(Member::id.not_in([1, 2, 3])).count().await?, 48);
    assert_eq!(
        members.filter(Member::id.is_in(Vec::<i32>::new())).count().await?,
        0
    );
    assert_eq!(
        members.filter(Member::id.not_in(Vec::<i32>::new())).count().await?,
        51
    );
    assert!(members.filter(Member::name.eq("Kevin")).exists().await?);
    assert!(!members.filter(Member::name.eq("Nobody")).exists().await?);

    // Paging falls back to the primary key order
    let page = members.skip(10).take(5).query().await?;
    assert_eq!(
        page.iter().map(|m| m.id).collect::<Vec<_>>(),
        [11, 12, 13, 14, 15]
    );
    let last = members.order_by_descending(Member::id).take(1).query().await?;
    assert_eq!(last.first().map(|m| m.id), Some(99));

    // Derived handles leave the original untouched
    let adults = members.filter(Member::age.ge(30));
    let before = adults.count().await?;
    let narrowed = adults.and(Member::name.starts_with("J"))?;
    assert!(narrowed.count().await? <= before);
    assert_eq!(adults.count().await?, before);
    assert!(members.descriptor().filter.is_none());

    // Same shape, different values: one compilation
    let cache = members.context().cache();
    members.filter(Member::id.eq(1)).query_one().await?;
    let misses = cache.misses();
    let second = members.filter(Member::id.eq(2)).query_one().await?;
    assert_eq!(cache.misses(), misses);
    assert_eq!(second.map(|m| m.id), Some(2));

    // Projections
    let names = members
        .filter(Member::id.le(3))
        .order_by(Member::id)
        .select(Member::name)?
        .query_as::<String>()
        .await?;
    assert_eq!(names, ["Mary1", "Jane2", "Luke3"]);
    let (oldest, youngest, total) = members
        .select((Member::age.max(), Member::age.min(), count_all()))?
        .query_one_as::<(i16, i16, i64)>()
        .await?
        .expect("An aggregate query returns one row");
    assert_eq!((oldest, youngest, total), (88, 18, 51));
    let ages = members
        .select(Member::age)?
        .query_fold(0_i64, |acc, age: i16| acc + age as i64)
        .await?;
    assert_eq!(
        ages,
        seeded.iter().chain([&kevin]).map(|m| m.age as i64).sum::<i64>()
    );

    // Grouping
    let groups = members
        .group_by(Member::age, count_all())?
        .order_by(Member::age)
        .query_as::<(i16, i64)>()
        .await?;
    assert_eq!(groups.iter().map(|(_, c)| c).sum::<i64>(), 51);
    assert!(groups.windows(2).all(|w| w[0].0 < w[1].0));
    let collected = members
        .group_by(Member::age, Member::name.collect())?
        .query_as::<(i16, Vec<String>)>()
        .await?;
    assert_eq!(collected.len(), groups.len());
    assert_eq!(
        collected.iter().map(|(age, _)| *age).collect::<HashSet<_>>().len(),
        collected.len()
    );
    for (age, names) in &collected {
        let expected = seeded
            .iter()
            .chain([&kevin])
            .filter(|m| m.age == *age)
            .map(|m| m.name.clone())
            .collect::<HashSet<_>>();
        assert_eq!(names.iter().cloned().collect::<HashSet<_>>(), expected);
    }
    let distinct = members.distinct(Member::age)?.query_as::<i16>().await?;
    assert_eq!(distinct.len(), groups.len());

    // Update
    let affected = members
        .filter(Member::id.eq(99))
        .set(Member::age, 89)
        .update()
        .await?;
    assert_eq!(affected.rows_affected, 1);
    assert_eq!(
        members
            .filter(Member::id.eq(99))
            .query_one()
            .await?
            .map(|m| m.age),
        Some(89)
    );
    let changed = Member {
        phone: "1111-111111".into(),
        ..kevin.clone()
    };
    members.update_row(&changed).await?;
    assert_eq!(
        members.filter(Member::id.eq(99)).query_one().await?,
        Some(changed)
    );

    // Upsert
    let zoe = members
        .filter(Member::id.eq(100))
        .set(Member::name, "Zoe")
        .set(Member::phone, "2222-222222");
    zoe.set(Member::age, 41).upsert().await?;
    assert_eq!(members.count().await?, 52);
    zoe.set(Member::age, 42).upsert().await?;
    assert_eq!(members.count().await?, 52);
    assert_eq!(
        members
            .filter(Member::id.eq(100))
            .query_one()
            .await?
            .map(|m| m.age),
        Some(42)
    );

    // Delete
    let affected = members.filter(Member::age.ge(60)).delete().await?;
    assert_eq!(affected.rows_affected, 1);
    let affected = members.filter(Member::id.le(10)).delete().await?;
    assert_eq!(affected.rows_affected, 10);
    assert_eq!(members.count().await?, 41);

    Ok(())
}
