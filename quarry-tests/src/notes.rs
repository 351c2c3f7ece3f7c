use quarry::{DataAccessFactory, Driver, Entity, QuarryError, Result, error_kind};
use std::sync::{Arc, LazyLock};
use time::{PrimitiveDateTime, macros::datetime};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Entity, Debug, Clone, PartialEq)]
#[quarry(table = "Note")]
pub struct Note {
    #[quarry(key, identity)]
    pub id: i64,
    pub text: String,
    pub written: PrimitiveDateTime,
}

fn note(text: &str) -> Note {
    Note {
        id: 0,
        text: text.into(),
        written: datetime!(2025-03-14 15:09:26),
    }
}

pub async fn notes<D: Driver>(factory: &DataAccessFactory<D>) -> Result<()> {
    let _lock = MUTEX.lock().await;
    let notes = factory.create::<Note>()?;

    // Setup
    notes.drop_table(true).await?;
    notes.create_table(true).await?;

    // Generated keys
    let first = notes
        .insert_returning::<i64>(&note("first"))
        .await?
        .expect("An insert returns the generated key");
    let second = notes
        .insert_returning::<i64>(&note("second"))
        .await?
        .expect("An insert returns the generated key");
    assert!(first > 0);
    assert!(second > first);
    let stored = notes
        .filter(Note::id.eq(second))
        .query_one()
        .await?
        .expect("The inserted note is found by its key");
    assert_eq!(
        stored,
        Note {
            id: second,
            ..note("second")
        }
    );

    // Conditional insert
    let guarded = notes.filter(Note::text.eq("first"));
    assert_eq!(guarded.insert(&note("first")).await?.rows_affected, 0);
    assert_eq!(
        guarded.insert_returning::<i64>(&note("first")).await?,
        None
    );
    let third = notes
        .filter(Note::text.eq("third"))
        .returning(Note::text)?
        .insert_returning::<String>(&note("third"))
        .await?;
    assert_eq!(third.as_deref(), Some("third"));
    assert_eq!(notes.count().await?, 3);

    // Only some columns
    let affected = notes
        .set(Note::text, "fourth")
        .set(Note::written, datetime!(2025-01-01 00:00:00))
        .insert(&note("ignored"))
        .await?;
    assert_eq!(affected.rows_affected, 1);
    assert!(notes.filter(Note::text.eq("fourth")).exists().await?);
    assert!(!notes.filter(Note::text.eq("ignored")).exists().await?);

    // Upsert on an identity column needs a merge statement
    let upserted = notes
        .filter(Note::id.eq(first))
        .set(Note::text, "edited")
        .upsert()
        .await;
    match upserted {
        Ok(affected) => {
            assert_eq!(affected.rows_affected, 1);
            assert!(notes.filter(Note::text.eq("edited")).exists().await?);
        }
        Err(error) => {
            assert!(matches!(
                error_kind(&error),
                Some(QuarryError::Compilation(..))
            ));
        }
    }

    // Statement hook and options
    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let hooked = {
        let seen = seen.clone();
        notes
            .dirty_read(true)
            .output_sql(move |sql, _params| {
                seen.lock().expect("Hook lock poisoned").push(sql.to_string())
            })
    };
    assert_eq!(hooked.filter(Note::id.eq(first)).count().await?, 1);
    let seen = seen.lock().expect("Hook lock poisoned");
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("COUNT(*)"));

    // Unknown logical database
    let broken = factory
        .create_for::<Note>("missing")
        .expect("Entities resolve for any logical database");
    let error = broken.count().await.err().expect("No connection string");
    assert!(format!("{:#}", error).contains("missing"));

    Ok(())
}
