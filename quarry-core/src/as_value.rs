use crate::{QuarryError, Result, Value};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::str::FromStr;
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::well_known::Rfc3339,
    macros::format_description,
};
use uuid::Uuid;

/// Conversion between Rust types and [`Value`].
///
/// Conversions back from a value are lenient: drivers may return a wider integer, a float for a
/// decimal or the textual form of a date (sqlite stores those as text).
pub trait AsValue: Sized {
    /// Whether `NULL` maps to a valid instance.
    const NULLABLE: bool = false;
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value) -> crate::Error {
    QuarryError::mapping(format!(
        "cannot convert {:?} into {}",
        value,
        std::any::type_name::<T>()
    ))
}

fn text(value: &Value) -> Option<&str> {
    match value {
        Value::Varchar(Some(v)) => Some(v.as_str()),
        _ => None,
    }
}

macro_rules! impl_from_value {
    ($source:ty, $variant:ident) => {
        impl From<$source> for Value {
            fn from(value: $source) -> Self {
                Value::$variant(Some(value))
            }
        }
    };
}

macro_rules! impl_as_value_integer {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl AsValue for $source {
                fn as_empty_value() -> Value {
                    Value::$variant(None)
                }
                fn as_value(self) -> Value {
                    Value::$variant(Some(self))
                }
                fn try_from_value(value: Value) -> Result<Self> {
                    if let Value::$variant(Some(v)) = value {
                        return Ok(v);
                    }
                    let widened = match &value {
                        Value::Float64(Some(v)) if v.fract() == 0.0 => Some(*v as i128),
                        Value::Varchar(Some(v)) => v.trim().parse::<i128>().ok(),
                        v => v.as_i128(),
                    };
                    widened
                        .and_then(|v| <$source>::try_from(v).ok())
                        .ok_or_else(|| mismatch::<$source>(&value))
                }
            }
            impl_from_value!($source, $variant);
        )+
    };
}

impl_as_value_integer!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
);

macro_rules! impl_as_value_float {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl AsValue for $source {
                fn as_empty_value() -> Value {
                    Value::$variant(None)
                }
                fn as_value(self) -> Value {
                    Value::$variant(Some(self))
                }
                fn try_from_value(value: Value) -> Result<Self> {
                    match &value {
                        Value::Float32(Some(v)) => Ok(*v as $source),
                        Value::Float64(Some(v)) => Ok(*v as $source),
                        Value::Decimal(Some(v), ..) => v
                            .to_f64()
                            .map(|v| v as $source)
                            .ok_or_else(|| mismatch::<$source>(&value)),
                        Value::Varchar(Some(v)) => v
                            .trim()
                            .parse::<$source>()
                            .map_err(|_| mismatch::<$source>(&value)),
                        v => v
                            .as_i128()
                            .map(|v| v as $source)
                            .ok_or_else(|| mismatch::<$source>(&value)),
                    }
                }
            }
            impl_from_value!($source, $variant);
        )+
    };
}

impl_as_value_float!(f32 => Float32, f64 => Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Boolean(Some(v)) => Ok(*v),
            v => match v.as_i128() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(mismatch::<bool>(&value)),
            },
        }
    }
}
impl_from_value!(bool, Boolean);

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None, 0, 0)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self), 0, 0)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Decimal(Some(v), ..) => Ok(*v),
            Value::Float32(Some(v)) => {
                Decimal::try_from(*v).map_err(|_| mismatch::<Decimal>(&value))
            }
            Value::Float64(Some(v)) => {
                Decimal::try_from(*v).map_err(|_| mismatch::<Decimal>(&value))
            }
            Value::Varchar(Some(v)) => {
                Decimal::from_str(v.trim()).map_err(|_| mismatch::<Decimal>(&value))
            }
            v => v
                .as_i128()
                .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
                .ok_or_else(|| mismatch::<Decimal>(&value)),
        }
    }
}
impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(Some(value), 0, 0)
    }
}

impl AsValue for char {
    fn as_empty_value() -> Value {
        Value::Char(None)
    }
    fn as_value(self) -> Value {
        Value::Char(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Char(Some(v)) => Ok(*v),
            Value::Varchar(Some(v)) => {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(mismatch::<char>(&value)),
                }
            }
            _ => Err(mismatch::<char>(&value)),
        }
    }
}
impl_from_value!(char, Char);

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) => Ok(v),
            Value::Char(Some(v)) => Ok(v.into()),
            Value::Uuid(Some(v)) => Ok(v.to_string()),
            v => Err(mismatch::<String>(&v)),
        }
    }
}
impl_from_value!(String, Varchar);
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            Value::Varchar(Some(v)) => Ok(v.into_bytes().into_boxed_slice()),
            v => Err(mismatch::<Box<[u8]>>(&v)),
        }
    }
}
impl_from_value!(Box<[u8]>, Blob);

impl AsValue for Date {
    fn as_empty_value() -> Value {
        Value::Date(None)
    }
    fn as_value(self) -> Value {
        Value::Date(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Date(Some(v)) => Ok(*v),
            Value::Timestamp(Some(v)) => Ok(v.date()),
            v => text(v)
                .and_then(|v| Date::parse(v.trim(), format_description!("[year]-[month]-[day]")).ok())
                .ok_or_else(|| mismatch::<Date>(&value)),
        }
    }
}
impl_from_value!(Date, Date);

impl AsValue for Time {
    fn as_empty_value() -> Value {
        Value::Time(None)
    }
    fn as_value(self) -> Value {
        Value::Time(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Time(Some(v)) => Ok(*v),
            v => text(v)
                .and_then(|v| {
                    Time::parse(
                        v.trim(),
                        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
                    )
                    .ok()
                })
                .ok_or_else(|| mismatch::<Time>(&value)),
        }
    }
}
impl_from_value!(Time, Time);

impl AsValue for PrimitiveDateTime {
    fn as_empty_value() -> Value {
        Value::Timestamp(None)
    }
    fn as_value(self) -> Value {
        Value::Timestamp(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Timestamp(Some(v)) => Ok(*v),
            Value::TimestampWithTimezone(Some(v)) => {
                let v = v.to_offset(time::UtcOffset::UTC);
                Ok(PrimitiveDateTime::new(v.date(), v.time()))
            }
            v => text(v)
                .and_then(|v| {
                    PrimitiveDateTime::parse(
                        &v.trim().replacen('T', " ", 1),
                        format_description!(
                            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
                        ),
                    )
                    .ok()
                })
                .ok_or_else(|| mismatch::<PrimitiveDateTime>(&value)),
        }
    }
}
impl_from_value!(PrimitiveDateTime, Timestamp);

impl AsValue for OffsetDateTime {
    fn as_empty_value() -> Value {
        Value::TimestampWithTimezone(None)
    }
    fn as_value(self) -> Value {
        Value::TimestampWithTimezone(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::TimestampWithTimezone(Some(v)) => Ok(*v),
            Value::Timestamp(Some(v)) => Ok(v.assume_utc()),
            v => text(v)
                .and_then(|v| OffsetDateTime::parse(v.trim(), &Rfc3339).ok())
                .ok_or_else(|| mismatch::<OffsetDateTime>(&value)),
        }
    }
}
impl_from_value!(OffsetDateTime, TimestampWithTimezone);

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Uuid(Some(v)) => Ok(*v),
            Value::Varchar(Some(v)) => Uuid::parse_str(v.trim()).map_err(|_| mismatch::<Uuid>(&value)),
            Value::Blob(Some(v)) => Uuid::from_slice(v).map_err(|_| mismatch::<Uuid>(&value)),
            _ => Err(mismatch::<Uuid>(&value)),
        }
    }
}
impl_from_value!(Uuid, Uuid);

impl<T: AsValue> AsValue for Option<T> {
    const NULLABLE: bool = true;
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::try_from_value(value).map(Some)
        }
    }
}

impl<T: AsValue> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.as_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn integers_are_widened_and_checked() {
        assert_eq!(i32::try_from_value(Value::Int64(Some(42))).unwrap(), 42);
        assert_eq!(u8::try_from_value(Value::Int32(Some(255))).unwrap(), 255);
        assert!(u8::try_from_value(Value::Int32(Some(256))).is_err());
        assert!(i8::try_from_value(Value::Int64(Some(-129))).is_err());
        assert_eq!(i64::try_from_value(Value::Varchar(Some(" 7 ".into()))).unwrap(), 7);
    }

    #[test]
    fn floats_and_decimals() {
        assert_eq!(f64::try_from_value(Value::Int64(Some(3))).unwrap(), 3.0);
        assert_eq!(
            Decimal::try_from_value(Value::Varchar(Some("12.50".into()))).unwrap(),
            Decimal::new(1250, 2)
        );
        assert_eq!(
            f32::try_from_value(Value::Decimal(Some(Decimal::new(25, 1)), 0, 0)).unwrap(),
            2.5
        );
    }

    #[test]
    fn booleans_from_integers() {
        assert!(bool::try_from_value(Value::Int64(Some(1))).unwrap());
        assert!(!bool::try_from_value(Value::UInt8(Some(0))).unwrap());
        assert!(bool::try_from_value(Value::Int64(Some(2))).is_err());
    }

    #[test]
    fn dates_from_text() {
        assert_eq!(
            Date::try_from_value(Value::Varchar(Some("2024-02-29".into()))).unwrap(),
            date!(2024 - 02 - 29)
        );
        assert_eq!(
            Time::try_from_value(Value::Varchar(Some("10:30:00".into()))).unwrap(),
            time!(10:30:00)
        );
        assert_eq!(
            PrimitiveDateTime::try_from_value(Value::Varchar(Some(
                "2024-02-29T10:30:00.5".into()
            )))
            .unwrap(),
            datetime!(2024-02-29 10:30:00.5)
        );
    }

    #[test]
    fn options_map_nulls() {
        assert_eq!(Option::<i32>::try_from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::try_from_value(Value::Int32(None)).unwrap(), None);
        assert_eq!(
            Option::<String>::try_from_value(Value::Varchar(Some("x".into()))).unwrap(),
            Some("x".into())
        );
        assert!(i32::try_from_value(Value::Null).is_err());
        assert_eq!(Some(5i16).as_value(), Value::Int16(Some(5)));
        assert!(Option::<i16>::None.as_value().same_type(&Value::Int16(None)));
    }
}
