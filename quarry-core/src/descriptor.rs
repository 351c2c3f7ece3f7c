use crate::{
    ColumnExpr, EntityMetadata, LogicalOp, Operand, OrderItem, Predicate, ProjectionItem,
    QuarryError, Result,
};
use std::{any::TypeId, sync::Arc};

/// Whether a joined navigation holds one entity or a collection of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub target: Arc<EntityMetadata>,
    /// Position of the target in the chain, the root is 1.
    pub position: u8,
    /// Conjunction of equalities.
    pub on: Arc<Predicate>,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Columns(Vec<ProjectionItem>),
    Grouped {
        keys: Vec<ProjectionItem>,
        aggregates: Vec<ProjectionItem>,
    },
}

impl Projection {
    pub fn items(&self) -> impl Iterator<Item = &ProjectionItem> + Clone {
        let (a, b): (&[ProjectionItem], &[ProjectionItem]) = match self {
            Projection::Columns(v) => (v, &[]),
            Projection::Grouped { keys, aggregates } => (keys, aggregates),
        };
        a.iter().chain(b.iter())
    }
    pub fn is_grouped(&self) -> bool {
        matches!(self, Projection::Grouped { .. })
    }
    pub fn has_collect(&self) -> bool {
        self.items().any(|v| v.selection.is_collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnExpr,
    pub operand: Operand,
}

/// Accumulated, unexecuted representation of a query or command.
///
/// Every field is either small or reference counted: deriving a new descriptor clones the
/// unchanged parts by bumping reference counts.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub root: Arc<EntityMetadata>,
    pub database: Arc<str>,
    pub joins: Arc<[JoinSpec]>,
    pub filter: Option<Arc<Predicate>>,
    pub projection: Option<Arc<Projection>>,
    pub distinct: bool,
    pub set: Arc<[Assignment]>,
    pub order: Arc<[OrderItem]>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Columns returned by modifying statements.
    pub output: Arc<[ColumnExpr]>,
    pub dirty_read: bool,
}

impl QueryDescriptor {
    pub fn new(root: Arc<EntityMetadata>, database: Arc<str>) -> Self {
        Self {
            root,
            database,
            joins: Arc::new([]),
            filter: None,
            projection: None,
            distinct: false,
            set: Arc::new([]),
            order: Arc::new([]),
            skip: None,
            take: None,
            output: Arc::new([]),
            dirty_read: false,
        }
    }

    /// Entity type at each position of the join chain, root first.
    pub fn chain(&self) -> impl Iterator<Item = (u8, &Arc<EntityMetadata>)> {
        std::iter::once((1, &self.root)).chain(self.joins.iter().map(|j| (j.position, &j.target)))
    }

    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }

    pub fn with_filter(&self, predicate: Predicate) -> Self {
        let filter = match &self.filter {
            Some(current) => Predicate::Logical {
                op: LogicalOp::And,
                lhs: current.clone(),
                rhs: predicate.into(),
            },
            None => predicate,
        };
        Self {
            filter: Some(filter.into()),
            ..self.clone()
        }
    }

    pub fn with_logical(&self, op: LogicalOp, predicate: Predicate) -> Result<Self> {
        let Some(current) = &self.filter else {
            return Err(QuarryError::shape(match op {
                LogicalOp::And => "`and` requires a previous `filter`",
                LogicalOp::Or => "`or` requires a previous `filter`",
            }));
        };
        Ok(Self {
            filter: Some(
                Predicate::Logical {
                    op,
                    lhs: current.clone(),
                    rhs: predicate.into(),
                }
                .into(),
            ),
            ..self.clone()
        })
    }

    pub fn with_join(
        &self,
        target: Arc<EntityMetadata>,
        on: Predicate,
        cardinality: Cardinality,
    ) -> Result<Self> {
        let position = self.joins.len() as u8 + 2;
        let entity = target.entity;
        let resolves = |column: &ColumnExpr| {
            if column.position != 0 {
                return column.position <= position;
            }
            column.entity == entity || self.chain().any(|(_, m)| m.entity == column.entity)
        };
        let references_target = |column: &ColumnExpr| {
            column.position == position
                || (column.position == 0
                    && column.entity == entity
                    && !self.chain().any(|(_, m)| m.entity == entity))
        };
        let mut touches_target = false;
        for conjunct in on.conjuncts() {
            let Predicate::Comparison {
                column,
                op: crate::ComparisonOp::Equal,
                operand,
            } = conjunct
            else {
                return Err(QuarryError::shape(
                    "a join condition must be a conjunction of equalities",
                ));
            };
            let mut check = |column: &ColumnExpr| -> Result<()> {
                if !resolves(column) {
                    return Err(QuarryError::shape(format!(
                        "the join condition references `{}.{}` which is not part of the join chain",
                        column.entity_name, column.name
                    )));
                }
                touches_target |= references_target(column);
                Ok(())
            };
            check(column)?;
            match operand {
                Operand::Column(other) => check(other)?,
                Operand::Row => {
                    return Err(QuarryError::shape(
                        "a join condition cannot be bound from a row",
                    ));
                }
                Operand::Value(..) => {}
            }
        }
        if !touches_target {
            return Err(QuarryError::shape(format!(
                "the join condition does not reference the joined entity `{}`",
                target.entity_name
            )));
        }
        let mut joins = self.joins.to_vec();
        joins.push(JoinSpec {
            target,
            position,
            on: on.into(),
            cardinality,
        });
        Ok(Self {
            joins: joins.into(),
            ..self.clone()
        })
    }

    pub fn with_set(&self, assignment: Assignment) -> Self {
        let mut set: Vec<_> = self
            .set
            .iter()
            .filter(|v| v.column.name != assignment.column.name)
            .cloned()
            .collect();
        set.push(assignment);
        Self {
            set: set.into(),
            ..self.clone()
        }
    }

    /// Replace the ordering with `item`.
    pub fn with_order(&self, item: OrderItem) -> Self {
        Self {
            order: Arc::new([item]),
            ..self.clone()
        }
    }

    /// Append a secondary ordering key.
    pub fn with_then_order(&self, item: OrderItem) -> Result<Self> {
        if self.order.is_empty() {
            return Err(QuarryError::shape("`then_by` requires a previous `order_by`"));
        }
        let mut order = self.order.to_vec();
        order.push(item);
        Ok(Self {
            order: order.into(),
            ..self.clone()
        })
    }

    pub fn with_select(&self, items: Vec<ProjectionItem>) -> Result<Self> {
        if let Some(projection) = &self.projection {
            return Err(QuarryError::shape(if projection.is_grouped() {
                "`select` cannot be combined with `group_by`"
            } else if self.distinct {
                "`select` cannot be combined with `distinct`"
            } else {
                "`select` was already specified"
            }));
        }
        if items.is_empty() {
            return Err(QuarryError::shape("`select` requires at least one column"));
        }
        let aggregates = items.iter().filter(|v| v.selection.is_aggregate()).count();
        if aggregates != 0 && aggregates != items.len() {
            return Err(QuarryError::shape(
                "mixing aggregates and plain columns requires `group_by`",
            ));
        }
        if items.iter().any(|v| v.selection.is_collect()) {
            return Err(QuarryError::shape("`collect` requires `group_by`"));
        }
        Ok(Self {
            projection: Some(Projection::Columns(items).into()),
            ..self.clone()
        })
    }

    pub fn with_group(
        &self,
        keys: Vec<ProjectionItem>,
        aggregates: Vec<ProjectionItem>,
    ) -> Result<Self> {
        if self.distinct {
            return Err(QuarryError::shape("`group_by` cannot be combined with `distinct`"));
        }
        if let Some(projection) = &self.projection {
            return Err(QuarryError::shape(if projection.is_grouped() {
                "`group_by` was already specified"
            } else {
                "`group_by` cannot be combined with a non aggregate `select`"
            }));
        }
        if keys.is_empty() {
            return Err(QuarryError::shape("`group_by` requires at least one key"));
        }
        if keys.iter().any(|v| v.selection.is_aggregate()) {
            return Err(QuarryError::shape("a grouping key cannot be an aggregate"));
        }
        if aggregates.iter().any(|v| !v.selection.is_aggregate()) {
            return Err(QuarryError::shape(
                "`group_by` accepts only aggregates besides the grouping keys",
            ));
        }
        Ok(Self {
            projection: Some(Projection::Grouped { keys, aggregates }.into()),
            ..self.clone()
        })
    }

    pub fn with_distinct(&self, items: Vec<ProjectionItem>) -> Result<Self> {
        if self.projection.as_ref().is_some_and(|v| v.is_grouped()) {
            return Err(QuarryError::shape("`distinct` cannot be combined with `group_by`"));
        }
        if self.projection.is_some() {
            return Err(QuarryError::shape("`distinct` cannot be combined with `select`"));
        }
        if items.is_empty() || items.iter().any(|v| v.selection.is_aggregate()) {
            return Err(QuarryError::shape("`distinct` requires one or more plain columns"));
        }
        Ok(Self {
            projection: Some(Projection::Columns(items).into()),
            distinct: true,
            ..self.clone()
        })
    }

    pub fn with_skip(&self, skip: u64) -> Self {
        Self {
            skip: Some(skip),
            ..self.clone()
        }
    }

    pub fn with_take(&self, take: u64) -> Self {
        Self {
            take: Some(take),
            ..self.clone()
        }
    }

    pub fn with_output(&self, output: Vec<ColumnExpr>) -> Result<Self> {
        if let Some(column) = output.iter().find(|c| c.entity != self.root.entity) {
            return Err(QuarryError::shape(format!(
                "the output column `{}.{}` does not belong to `{}`",
                column.entity_name, column.name, self.root.entity_name
            )));
        }
        Ok(Self {
            output: output.into(),
            ..self.clone()
        })
    }

    pub fn with_dirty_read(&self, dirty_read: bool) -> Self {
        Self {
            dirty_read,
            ..self.clone()
        }
    }

    pub fn root_type(&self) -> TypeId {
        self.root.entity
    }
}
