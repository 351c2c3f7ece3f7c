use crate::{
    AggregateFn, AggregateItem, AsValue, ColumnExpr, ComparisonOp, Entity, IntoOperand,
    MatchKind, Operand, Predicate, ProjectionItem, Selection,
};
use rust_decimal::Decimal;
use std::{any::TypeId, marker::PhantomData, sync::Arc};

/// Typed column of the entity `E` holding values of type `T`.
///
/// The derive macro generates one constant per field, e.g. `Member::age`, so predicates read as
/// `Member::age.ge(30) & Member::name.starts_with("J")`.
pub struct Column<E, T> {
    name: &'static str,
    position: u8,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Clone for Column<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<E, T> Copy for Column<E, T> {}

impl<E, T> Column<E, T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            position: 0,
            _marker: PhantomData,
        }
    }

    /// The same column taken from the entity at the given position of the join chain, root is 1.
    pub const fn at(self, position: u8) -> Self {
        Self { position, ..self }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: Entity, T> Column<E, T> {
    pub fn expr(&self) -> ColumnExpr {
        ColumnExpr {
            entity: TypeId::of::<E>(),
            entity_name: E::metadata().entity_name,
            name: self.name,
            position: self.position,
        }
    }

    fn compare(self, op: ComparisonOp, operand: Operand) -> Predicate {
        Predicate::Comparison {
            column: self.expr(),
            op,
            operand,
        }
    }

    pub fn eq(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::Equal, value.into_operand())
    }
    pub fn ne(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::NotEqual, value.into_operand())
    }
    pub fn lt(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::Less, value.into_operand())
    }
    pub fn le(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::LessEqual, value.into_operand())
    }
    pub fn gt(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::Greater, value.into_operand())
    }
    pub fn ge(self, value: impl IntoOperand<T>) -> Predicate {
        self.compare(ComparisonOp::GreaterEqual, value.into_operand())
    }

    pub fn count(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Count, Some(self.expr()))
    }
    pub fn collect(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Collect, Some(self.expr()))
    }
    pub fn min(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Min, Some(self.expr()))
    }
    pub fn max(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Max, Some(self.expr()))
    }

    /// Project the column under a different output name.
    pub fn as_(self, alias: &'static str) -> ProjectionItem {
        ProjectionItem {
            selection: Selection::Column(self.expr()),
            alias: Some(alias),
        }
    }
}

impl<E: Entity, T: AsValue> Column<E, T> {
    pub fn is_null(self) -> Predicate {
        self.compare(ComparisonOp::Equal, Operand::Value(T::as_empty_value()))
    }
    pub fn is_not_null(self) -> Predicate {
        self.compare(ComparisonOp::NotEqual, Operand::Value(T::as_empty_value()))
    }

    fn membership<V: IntoOperand<T>>(
        self,
        values: impl IntoIterator<Item = V>,
        negated: bool,
    ) -> Predicate {
        Predicate::Membership {
            column: self.expr(),
            set: values.into_iter().map(IntoOperand::into_operand).collect::<Arc<[_]>>(),
            negated,
        }
    }
    /// `column IN (..)`, an empty set matches nothing.
    pub fn is_in<V: IntoOperand<T>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        self.membership(values, false)
    }
    /// `column NOT IN (..)`, an empty set matches everything.
    pub fn not_in<V: IntoOperand<T>>(self, values: impl IntoIterator<Item = V>) -> Predicate {
        self.membership(values, true)
    }
}

/// Types usable with the string matching predicates.
pub trait Text {}
impl Text for String {}
impl Text for Option<String> {}

impl<E: Entity, T: Text> Column<E, T> {
    fn matching(self, kind: MatchKind, pattern: Operand, negated: bool) -> Predicate {
        Predicate::StringMatch {
            column: self.expr(),
            kind,
            pattern,
            negated,
        }
    }
    pub fn contains(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::Contains, pattern.into_operand(), false)
    }
    pub fn not_contains(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::Contains, pattern.into_operand(), true)
    }
    pub fn starts_with(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::StartsWith, pattern.into_operand(), false)
    }
    pub fn not_starts_with(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::StartsWith, pattern.into_operand(), true)
    }
    pub fn ends_with(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::EndsWith, pattern.into_operand(), false)
    }
    pub fn not_ends_with(self, pattern: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::EndsWith, pattern.into_operand(), true)
    }
    /// Full-text search condition, the column must be covered by a full-text index.
    pub fn full_text(self, condition: impl IntoOperand<String>) -> Predicate {
        self.matching(MatchKind::FullText, condition.into_operand(), false)
    }
}

/// Types usable with aggregates producing numbers.
pub trait Numeric {}
/// Types usable with bitwise tests.
pub trait Integral: Numeric {}

macro_rules! impl_numeric {
    (integral: $($ty:ty),+; other: $($other:ty),+) => {
        $(
            impl Numeric for $ty {}
            impl Numeric for Option<$ty> {}
            impl Integral for $ty {}
            impl Integral for Option<$ty> {}
        )+
        $(
            impl Numeric for $other {}
            impl Numeric for Option<$other> {}
        )+
    };
}
impl_numeric!(integral: i8, i16, i32, i64, u8, u16, u32, u64; other: f32, f64, Decimal);

impl<E: Entity, T: Numeric> Column<E, T> {
    pub fn sum(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Sum, Some(self.expr()))
    }
    pub fn avg(self) -> AggregateItem {
        AggregateItem::new(AggregateFn::Avg, Some(self.expr()))
    }
}

impl<E: Entity, T: Integral> Column<E, T> {
    /// `column & mask`, compared through [`Masked::eq`] or [`Masked::ne`].
    pub fn bit_and(self, mask: impl IntoOperand<T>) -> Masked<E, T> {
        Masked {
            column: self,
            mask: mask.into_operand(),
        }
    }
    /// Every bit of `mask` is set.
    pub fn has_flags(self, mask: T) -> Predicate
    where
        T: AsValue + Clone,
    {
        self.bit_and(mask.clone()).eq(mask)
    }
}

pub struct Masked<E, T> {
    column: Column<E, T>,
    mask: Operand,
}

impl<E: Entity, T: Integral> Masked<E, T> {
    fn test(self, op: ComparisonOp, value: Operand) -> Predicate {
        Predicate::BitwiseTest {
            column: self.column.expr(),
            mask: self.mask,
            op,
            value,
        }
    }
    pub fn eq(self, value: impl IntoOperand<T>) -> Predicate {
        self.test(ComparisonOp::Equal, value.into_operand())
    }
    pub fn ne(self, value: impl IntoOperand<T>) -> Predicate {
        self.test(ComparisonOp::NotEqual, value.into_operand())
    }
}
