use quarry_core::{Error, Result, Value};
use rust_decimal::Decimal;
use tiberius::{ColumnData, FromSql, Query};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

/// Bind `value` as the next `@PN` parameter of `query`.
pub(crate) fn bind_value(query: &mut Query<'_>, value: Value) -> Result<()> {
    match value {
        Value::Null => query.bind(Option::<i32>::None),
        Value::Boolean(v) => query.bind(v),
        Value::Int8(v) => query.bind(v.map(i16::from)),
        Value::Int16(v) => query.bind(v),
        Value::Int32(v) => query.bind(v),
        Value::Int64(v) => query.bind(v),
        Value::UInt8(v) => query.bind(v),
        Value::UInt16(v) => query.bind(v.map(i32::from)),
        Value::UInt32(v) => query.bind(v.map(i64::from)),
        Value::UInt64(v) => query.bind(v.map(Decimal::from)),
        Value::Float32(v) => query.bind(v),
        Value::Float64(v) => query.bind(v),
        Value::Decimal(v, ..) => query.bind(v),
        Value::Char(v) => query.bind(v.map(String::from)),
        Value::Varchar(v) => query.bind(v),
        Value::Blob(v) => query.bind(v.map(Vec::from)),
        Value::Date(v) => query.bind(v),
        Value::Time(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::TimestampWithTimezone(v) => query.bind(v),
        Value::Uuid(v) => query.bind(v),
        v => {
            return Err(Error::msg(format!(
                "Cannot bind {:?} as a SQL Server parameter",
                v
            )));
        }
    }
    Ok(())
}

pub(crate) fn decode_value(data: ColumnData<'static>) -> Result<Value> {
    Ok(match data {
        ColumnData::U8(v) => Value::UInt8(v),
        ColumnData::I16(v) => Value::Int16(v),
        ColumnData::I32(v) => Value::Int32(v),
        ColumnData::I64(v) => Value::Int64(v),
        ColumnData::F32(v) => Value::Float32(v),
        ColumnData::F64(v) => Value::Float64(v),
        ColumnData::Bit(v) => Value::Boolean(v),
        ColumnData::Guid(v) => Value::Uuid(v),
        ColumnData::String(v) => Value::Varchar(v.map(|v| v.into_owned())),
        ColumnData::Binary(v) => Value::Blob(v.map(|v| v.into_owned().into_boxed_slice())),
        ColumnData::Numeric(..) => Value::Decimal(Decimal::from_sql(&data)?, 0, 0),
        ColumnData::Date(..) => Value::Date(Date::from_sql(&data)?),
        ColumnData::Time(..) => Value::Time(Time::from_sql(&data)?),
        ColumnData::DateTime(..) | ColumnData::SmallDateTime(..) | ColumnData::DateTime2(..) => {
            Value::Timestamp(PrimitiveDateTime::from_sql(&data)?)
        }
        ColumnData::DateTimeOffset(..) => {
            Value::TimestampWithTimezone(OffsetDateTime::from_sql(&data)?)
        }
        data => {
            return Err(Error::msg(format!(
                "Unsupported SQL Server column data {:?}",
                data
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use time::macros::{date, datetime, time};
    use uuid::Uuid;

    #[test]
    fn scalars_decode() {
        assert_eq!(
            decode_value(ColumnData::I32(Some(7))).unwrap(),
            Value::Int32(Some(7))
        );
        assert_eq!(
            decode_value(ColumnData::String(Some(Cow::Borrowed("text")))).unwrap(),
            Value::Varchar(Some("text".into()))
        );
        assert_eq!(
            decode_value(ColumnData::Bit(None)).unwrap(),
            Value::Boolean(None)
        );
        let id = Uuid::nil();
        assert_eq!(
            decode_value(ColumnData::Guid(Some(id))).unwrap(),
            Value::Uuid(Some(id))
        );
    }

    #[test]
    fn unsupported_values_are_rejected() {
        let mut query = Query::new("SELECT @P1");
        assert!(bind_value(&mut query, Value::List(None, Box::new(Value::Int32(None)))).is_err());
        assert!(bind_value(&mut query, Value::UInt64(Some(u64::MAX))).is_ok());
    }

    #[test]
    fn typed_values_bind() {
        let mut query = Query::new("SELECT 1");
        for value in [
            Value::UInt8(Some(255)),
            Value::Decimal(Some(Decimal::new(1234, 2)), 10, 2),
            Value::Decimal(None, 10, 2),
            Value::Date(Some(date!(2024 - 02 - 29))),
            Value::Time(Some(time!(23:59:58))),
            Value::Timestamp(Some(datetime!(2024-02-29 23:59:58))),
            Value::TimestampWithTimezone(Some(datetime!(2024-02-29 23:59:58 +02:00))),
            Value::Timestamp(None),
            Value::Uuid(Some(Uuid::nil())),
        ] {
            assert!(bind_value(&mut query, value).is_ok());
        }
    }
}
