use crate::{Column, ColumnExpr, Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Sequence of the grouped raw values.
    Collect,
}

/// Something a query can output: a column or an aggregate over a column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    Column(ColumnExpr),
    /// A `None` column counts rows.
    Aggregate(AggregateFn, Option<ColumnExpr>),
}

impl Selection {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Selection::Aggregate(..))
    }
    pub fn is_collect(&self) -> bool {
        matches!(self, Selection::Aggregate(AggregateFn::Collect, ..))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub selection: Selection,
    pub alias: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateItem {
    pub func: AggregateFn,
    pub column: Option<ColumnExpr>,
}

impl AggregateItem {
    pub fn new(func: AggregateFn, column: Option<ColumnExpr>) -> Self {
        Self { func, column }
    }
    pub fn as_(self, alias: &'static str) -> ProjectionItem {
        ProjectionItem {
            selection: Selection::Aggregate(self.func, self.column),
            alias: Some(alias),
        }
    }
}

/// `COUNT(*)`.
pub fn count_all() -> AggregateItem {
    AggregateItem::new(AggregateFn::Count, None)
}

/// Anything that can be listed in `select`, `group_by` or `distinct`.
pub trait IntoProjection {
    fn into_projection(self, out: &mut Vec<ProjectionItem>);

    fn projection(self) -> Vec<ProjectionItem>
    where
        Self: Sized,
    {
        let mut result = Vec::new();
        self.into_projection(&mut result);
        result
    }
}

impl IntoProjection for () {
    fn into_projection(self, _out: &mut Vec<ProjectionItem>) {}
}

impl IntoProjection for ProjectionItem {
    fn into_projection(self, out: &mut Vec<ProjectionItem>) {
        out.push(self);
    }
}

impl IntoProjection for AggregateItem {
    fn into_projection(self, out: &mut Vec<ProjectionItem>) {
        out.push(ProjectionItem {
            selection: Selection::Aggregate(self.func, self.column),
            alias: None,
        });
    }
}

impl<E: Entity, T> IntoProjection for Column<E, T> {
    fn into_projection(self, out: &mut Vec<ProjectionItem>) {
        out.push(ProjectionItem {
            selection: Selection::Column(self.expr()),
            alias: None,
        });
    }
}

impl IntoProjection for Vec<ProjectionItem> {
    fn into_projection(self, out: &mut Vec<ProjectionItem>) {
        out.extend(self);
    }
}

macro_rules! impl_into_projection_tuple {
    ($($name:ident),+) => {
        impl<$($name: IntoProjection),+> IntoProjection for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_projection(self, out: &mut Vec<ProjectionItem>) {
                let ($($name,)+) = self;
                $($name.into_projection(out);)+
            }
        }
    };
}

impl_into_projection_tuple!(A);
impl_into_projection_tuple!(A, B);
impl_into_projection_tuple!(A, B, C);
impl_into_projection_tuple!(A, B, C, D);
impl_into_projection_tuple!(A, B, C, D, E);
impl_into_projection_tuple!(A, B, C, D, E, F);
impl_into_projection_tuple!(A, B, C, D, E, F, G);
impl_into_projection_tuple!(A, B, C, D, E, F, G, H);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub key: Selection,
    pub order: Order,
}

/// Ordering keys: columns and aggregates.
pub trait IntoOrderKey {
    fn into_order_key(self) -> Selection;
}

impl<E: Entity, T> IntoOrderKey for Column<E, T> {
    fn into_order_key(self) -> Selection {
        Selection::Column(self.expr())
    }
}

impl IntoOrderKey for AggregateItem {
    fn into_order_key(self) -> Selection {
        Selection::Aggregate(self.func, self.column)
    }
}
