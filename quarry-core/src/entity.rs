use crate::{AsValue, EntityMetadata, QuarryError, Result, Value};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Owned row values, positionally aligned with a column list.
pub type Row = Box<[Value]>;

/// A type mapped to a table.
///
/// Usually implemented through `#[derive(Entity)]`, which also generates one typed
/// [`crate::Column`] constant per field.
pub trait Entity: FromRow + Send + Sync + 'static {
    /// Static description of the table, shared by every handle.
    fn metadata() -> &'static EntityMetadata;

    /// Values of every column, in [`EntityMetadata::columns`] order.
    fn row(&self) -> Row;
}

/// Positional conversion from a result row.
///
/// Rows are mapped by position only, following the output column order recorded by the compiler.
pub trait FromRow: Sized {
    /// Number of columns consumed.
    fn width() -> usize;
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self>;
}

/// Take the next value of a row and convert it.
pub fn next_value<T: AsValue>(values: &mut dyn Iterator<Item = Value>) -> Result<T> {
    let Some(value) = values.next() else {
        return Err(QuarryError::mapping(format!(
            "the row has fewer columns than required by {}",
            std::any::type_name::<T>()
        )));
    };
    T::try_from_value(value)
}

macro_rules! impl_from_row_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                fn width() -> usize {
                    1
                }
                fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
                    next_value(values)
                }
            }
        )+
    };
}

impl_from_row_scalar!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    char,
    String,
    Box<[u8]>,
    Decimal,
    Date,
    Time,
    PrimitiveDateTime,
    OffsetDateTime,
    Uuid,
);

impl<T: AsValue> FromRow for Option<T> {
    fn width() -> usize {
        1
    }
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
        next_value(values)
    }
}

/// A collected column, produced by the `collect` aggregate.
impl<T: AsValue> FromRow for Vec<T> {
    fn width() -> usize {
        1
    }
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
        match values.next() {
            Some(Value::List(Some(list), ..)) => list.into_iter().map(T::try_from_value).collect(),
            Some(Value::List(None, ..)) | Some(Value::Null) => Ok(Vec::new()),
            Some(v) => Ok(vec![T::try_from_value(v)?]),
            None => Err(QuarryError::mapping(
                "the row has fewer columns than required by the collected column",
            )),
        }
    }
}

impl FromRow for Row {
    fn width() -> usize {
        0
    }
    fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
        Ok(values.collect())
    }
}

macro_rules! impl_from_row_tuple {
    ($($name:ident),+) => {
        impl<$($name: FromRow),+> FromRow for ($($name,)+) {
            fn width() -> usize {
                0 $(+ $name::width())+
            }
            fn from_values(values: &mut dyn Iterator<Item = Value>) -> Result<Self> {
                Ok(($($name::from_values(values)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(A);
impl_from_row_tuple!(A, B);
impl_from_row_tuple!(A, B, C);
impl_from_row_tuple!(A, B, C, D);
impl_from_row_tuple!(A, B, C, D, E);
impl_from_row_tuple!(A, B, C, D, E, F);
impl_from_row_tuple!(A, B, C, D, E, F, G);
impl_from_row_tuple!(A, B, C, D, E, F, G, H);

/// Map a full row checking its width first, a width of zero accepts any row.
pub fn map_row<R: FromRow>(values: Row) -> Result<R> {
    let width = R::width();
    if width != 0 && width != values.len() {
        return Err(QuarryError::mapping(format!(
            "{} expects {} columns but the row has {}",
            std::any::type_name::<R>(),
            width,
            values.len()
        )));
    }
    R::from_values(&mut values.into_vec().into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Value>) -> Row {
        values.into_boxed_slice()
    }

    #[test]
    fn tuples_map_positionally() {
        let (id, name, age): (i32, String, Option<i16>) = map_row(row(vec![
            Value::Int64(Some(1)),
            Value::Varchar(Some("John".into())),
            Value::Null,
        ]))
        .unwrap();
        assert_eq!((id, name.as_str(), age), (1, "John", None));
    }

    #[test]
    fn width_mismatch_is_a_mapping_error() {
        let error = map_row::<(i32, i32)>(row(vec![Value::Int32(Some(1))])).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<QuarryError>(),
            Some(QuarryError::Mapping(..))
        ));
    }

    #[test]
    fn collected_lists() {
        let (age, names): (i32, Vec<String>) = map_row(row(vec![
            Value::Int32(Some(30)),
            Value::List(
                Some(vec![
                    Value::Varchar(Some("Ann".into())),
                    Value::Varchar(Some("Bob".into())),
                ]),
                Box::new(Value::Varchar(None)),
            ),
        ]))
        .unwrap();
        assert_eq!(age, 30);
        assert_eq!(names, ["Ann", "Bob"]);
    }
}
