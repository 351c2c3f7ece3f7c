use quarry_core::{Error, Result, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use time::{format_description::well_known::Rfc3339, macros::format_description};

/// Parameter in the sqlite storage classes, dates are stored as ISO 8601 text.
pub(crate) fn encode_value(value: Value) -> Result<SqliteValue> {
    if value.is_null() {
        return Ok(SqliteValue::Null);
    }
    Ok(match value {
        Value::Boolean(Some(v)) => SqliteValue::Integer(v as i64),
        Value::Int8(Some(v)) => SqliteValue::Integer(v.into()),
        Value::Int16(Some(v)) => SqliteValue::Integer(v.into()),
        Value::Int32(Some(v)) => SqliteValue::Integer(v.into()),
        Value::Int64(Some(v)) => SqliteValue::Integer(v),
        Value::UInt8(Some(v)) => SqliteValue::Integer(v.into()),
        Value::UInt16(Some(v)) => SqliteValue::Integer(v.into()),
        Value::UInt32(Some(v)) => SqliteValue::Integer(v.into()),
        Value::UInt64(Some(v)) => SqliteValue::Integer(i64::try_from(v).map_err(|_| {
            Error::msg(format!("{} does not fit a sqlite integer", v))
        })?),
        Value::Float32(Some(v)) => SqliteValue::Real(v.into()),
        Value::Float64(Some(v)) => SqliteValue::Real(v),
        Value::Decimal(Some(v), ..) => SqliteValue::Text(v.to_string()),
        Value::Char(Some(v)) => SqliteValue::Text(v.to_string()),
        Value::Varchar(Some(v)) => SqliteValue::Text(v),
        Value::Blob(Some(v)) => SqliteValue::Blob(v.into_vec()),
        Value::Date(Some(v)) => SqliteValue::Text(v.format(format_description!("[year]-[month]-[day]"))?),
        Value::Time(Some(v)) => SqliteValue::Text(
            v.format(format_description!("[hour]:[minute]:[second].[subsecond]"))?,
        ),
        Value::Timestamp(Some(v)) => SqliteValue::Text(v.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"
        ))?),
        Value::TimestampWithTimezone(Some(v)) => SqliteValue::Text(v.format(&Rfc3339)?),
        Value::Uuid(Some(v)) => SqliteValue::Text(v.hyphenated().to_string()),
        v => {
            return Err(Error::msg(format!(
                "Cannot bind {:?} as a sqlite parameter",
                v
            )));
        }
    })
}

pub(crate) fn decode_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int64(Some(v)),
        ValueRef::Real(v) => Value::Float64(Some(v)),
        ValueRef::Text(v) => Value::Varchar(Some(String::from_utf8_lossy(v).into_owned())),
        ValueRef::Blob(v) => Value::Blob(Some(v.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn dates_are_text() {
        assert_eq!(
            encode_value(Value::Date(Some(date!(2024 - 02 - 29)))).unwrap(),
            SqliteValue::Text("2024-02-29".into())
        );
        assert_eq!(
            encode_value(Value::Timestamp(Some(datetime!(2024-02-29 10:30:00)))).unwrap(),
            SqliteValue::Text("2024-02-29 10:30:00.0".into())
        );
    }

    #[test]
    fn typed_nulls_bind_null() {
        assert_eq!(encode_value(Value::Int32(None)).unwrap(), SqliteValue::Null);
        assert_eq!(encode_value(Value::Varchar(None)).unwrap(), SqliteValue::Null);
    }

    #[test]
    fn large_unsigned_is_rejected() {
        assert!(encode_value(Value::UInt64(Some(u64::MAX))).is_err());
        assert_eq!(
            encode_value(Value::UInt64(Some(7))).unwrap(),
            SqliteValue::Integer(7)
        );
    }
}
