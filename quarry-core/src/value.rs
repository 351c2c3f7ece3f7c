use rust_decimal::Decimal;
use std::fmt::{self, Display};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Dynamically typed value exchanged with the drivers.
///
/// Every variant carries its payload as an `Option` so that a typed `NULL` keeps the column type,
/// which drivers need in order to bind a parameter of the right SQL type.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>, /* prec: */ u8, /* scale: */ u8),
    Char(Option<char>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    List(Option<Vec<Value>>, /* type: */ Box<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l, ..), Self::Decimal(r, ..)) => l == r,
            (Self::Char(l), Self::Char(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::List(l, ..), Self::List(r, ..)) => l == r,
            _ => self.is_null() && other.is_null(),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(.., l), Self::List(.., r)) => l.same_type(r),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v, ..) => v.is_none(),
            Value::Char(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::List(v, ..) => v.is_none(),
        }
    }

    /// The same variant with the payload removed.
    pub fn as_null(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::UInt8(..) => Value::UInt8(None),
            Value::UInt16(..) => Value::UInt16(None),
            Value::UInt32(..) => Value::UInt32(None),
            Value::UInt64(..) => Value::UInt64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(_, prec, scale) => Value::Decimal(None, *prec, *scale),
            Value::Char(..) => Value::Char(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(None),
            Value::Uuid(..) => Value::Uuid(None),
            Value::List(_, ty) => Value::List(None, ty.clone()),
        }
    }

    /// Widened integer payload, used by lenient conversions.
    pub(crate) fn as_i128(&self) -> Option<i128> {
        Some(match self {
            Value::Boolean(Some(v)) => *v as i128,
            Value::Int8(Some(v)) => *v as i128,
            Value::Int16(Some(v)) => *v as i128,
            Value::Int32(Some(v)) => *v as i128,
            Value::Int64(Some(v)) => *v as i128,
            Value::UInt8(Some(v)) => *v as i128,
            Value::UInt16(Some(v)) => *v as i128,
            Value::UInt32(Some(v)) => *v as i128,
            Value::UInt64(Some(v)) => *v as i128,
            Value::Decimal(Some(v), ..) if v.fract().is_zero() => v.mantissa() / 10i128.pow(v.scale()),
            _ => return None,
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        macro_rules! display {
            ($v:expr) => {
                match $v {
                    Some(v) => write!(f, "{}", v),
                    None => f.write_str("NULL"),
                }
            };
        }
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(v) => display!(v),
            Value::Int8(v) => display!(v),
            Value::Int16(v) => display!(v),
            Value::Int32(v) => display!(v),
            Value::Int64(v) => display!(v),
            Value::UInt8(v) => display!(v),
            Value::UInt16(v) => display!(v),
            Value::UInt32(v) => display!(v),
            Value::UInt64(v) => display!(v),
            Value::Float32(v) => display!(v),
            Value::Float64(v) => display!(v),
            Value::Decimal(v, ..) => display!(v),
            Value::Char(v) => display!(v.map(|c| format!("'{}'", c))),
            Value::Varchar(v) => display!(v.as_ref().map(|s| format!("'{}'", s))),
            Value::Blob(v) => display!(v.as_ref().map(|b| format!("<{} bytes>", b.len()))),
            Value::Date(v) => display!(v),
            Value::Time(v) => display!(v),
            Value::Timestamp(v) => display!(v),
            Value::TimestampWithTimezone(v) => display!(v),
            Value::Uuid(v) => display!(v),
            Value::List(v, ..) => match v {
                Some(v) => {
                    f.write_str("[")?;
                    for (i, v) in v.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    f.write_str("]")
                }
                None => f.write_str("NULL"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_nulls_are_equal() {
        assert_eq!(Value::Int32(None), Value::Null);
        assert_eq!(Value::Varchar(None), Value::Int64(None));
        assert_ne!(Value::Int32(Some(1)), Value::Int32(None));
        assert_ne!(Value::Int32(Some(1)), Value::Int64(Some(1)));
    }

    #[test]
    fn as_null_keeps_the_type() {
        let value = Value::Decimal(Some(Decimal::new(15, 1)), 10, 2);
        assert!(value.as_null().is_null());
        assert!(value.as_null().same_type(&value));
    }

    #[test]
    fn widened_integers() {
        assert_eq!(Value::UInt64(Some(u64::MAX)).as_i128(), Some(u64::MAX as i128));
        assert_eq!(Value::Decimal(Some(Decimal::new(300, 2)), 0, 0).as_i128(), Some(3));
        assert_eq!(Value::Decimal(Some(Decimal::new(301, 2)), 0, 0).as_i128(), None);
        assert_eq!(Value::Varchar(Some("1".into())).as_i128(), None);
    }
}
