use crate::{AsValue, Column, Entity, Value};
use std::any::TypeId;

/// Resolved reference to a column of an entity taking part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnExpr {
    pub entity: TypeId,
    pub entity_name: &'static str,
    pub name: &'static str,
    /// 1-based position in the join chain, 0 picks the first occurrence of the entity.
    pub position: u8,
}

/// Right hand side of a predicate or of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(ColumnExpr),
    /// Bound from the row object passed to the terminal operation.
    Row,
}

impl Operand {
    pub fn is_value(&self) -> bool {
        matches!(self, Operand::Value(..))
    }
}

/// Marker for values bound from the row object at execution time.
///
/// `Member::name.eq(RowValue)` in a bulk update declares `Name` as a match key, `set(Member::age,
/// RowValue)` assigns the age carried by each row.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowValue;

/// Anything usable where a `T` is expected on the right hand side of a predicate.
pub trait IntoOperand<T> {
    fn into_operand(self) -> Operand;
}

impl<T: AsValue> IntoOperand<T> for T {
    fn into_operand(self) -> Operand {
        Operand::Value(self.as_value())
    }
}

impl<T: AsValue> IntoOperand<Option<T>> for T {
    fn into_operand(self) -> Operand {
        Operand::Value(self.as_value())
    }
}

impl IntoOperand<String> for &str {
    fn into_operand(self) -> Operand {
        Operand::Value(Value::Varchar(Some(self.into())))
    }
}

impl IntoOperand<Option<String>> for &str {
    fn into_operand(self) -> Operand {
        Operand::Value(Value::Varchar(Some(self.into())))
    }
}

impl<T> IntoOperand<T> for RowValue {
    fn into_operand(self) -> Operand {
        Operand::Row
    }
}

impl<E: Entity, T> IntoOperand<T> for Column<E, T> {
    fn into_operand(self) -> Operand {
        Operand::Column(self.expr())
    }
}

impl<E: Entity, T> IntoOperand<Option<T>> for Column<E, T> {
    fn into_operand(self) -> Operand {
        Operand::Column(self.expr())
    }
}

impl<E: Entity, T> IntoOperand<T> for Column<E, Option<T>> {
    fn into_operand(self) -> Operand {
        Operand::Column(self.expr())
    }
}
