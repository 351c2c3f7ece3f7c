use crate::{
    AggregateFn, ColumnDef, ComparisonOp, LogicalOp, MatchKind, Order, TableRef, UserDefinedTable,
};
use std::borrow::Cow;

/// Where a bound value comes from in the descriptor.
///
/// Indexes follow [`crate::Predicate::for_each_operand`] order for predicates and the assignment
/// order for `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    Filter(usize),
    /// Join index in the descriptor, value index in its condition.
    Join(u8, usize),
    Set(usize),
}

/// A parameter of a compiled statement, resolved to a value at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Value(ValueSource),
    /// String value escaped and wrapped in `%` according to the match kind.
    Pattern(ValueSource, MatchKind),
    Skip,
    Take,
    /// Column of one of the rows passed to the terminal operation.
    Row { row: usize, column: usize },
}

/// Operation a descriptor is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    SelectOne,
    /// Root entity columns followed by the columns of the joined collection at `position`.
    SelectNested { position: u8 },
    Count,
    Exists,
    /// Single or multi row insert, conditional on the filter when there is one.
    Insert { rows: usize },
    Update,
    Upsert,
    Delete,
    BulkInsert { rows: usize },
    BulkUpdate { rows: usize },
    BulkUpsert { rows: usize },
    CreateTable { if_not_exists: bool },
    DropTable { if_exists: bool },
    CreateUserDefinedTable { if_not_exists: bool },
}

impl StatementKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::SelectOne => "select_one",
            StatementKind::SelectNested { .. } => "select_nested",
            StatementKind::Count => "count",
            StatementKind::Exists => "exists",
            StatementKind::Insert { .. } => "insert",
            StatementKind::Update => "update",
            StatementKind::Upsert => "upsert",
            StatementKind::Delete => "delete",
            StatementKind::BulkInsert { .. } => "bulk_insert",
            StatementKind::BulkUpdate { .. } => "bulk_update",
            StatementKind::BulkUpsert { .. } => "bulk_upsert",
            StatementKind::CreateTable { if_not_exists: true } => "create_table_if_not_exists",
            StatementKind::CreateTable { .. } => "create_table",
            StatementKind::DropTable { if_exists: true } => "drop_table_if_exists",
            StatementKind::DropTable { .. } => "drop_table",
            StatementKind::CreateUserDefinedTable { if_not_exists: true } => {
                "create_type_if_not_exists"
            }
            StatementKind::CreateUserDefinedTable { .. } => "create_type",
        }
    }

    /// Number of rows bound by the statement, also the position for nested selects.
    pub fn rows(&self) -> usize {
        match self {
            StatementKind::SelectNested { position } => *position as usize,
            StatementKind::Insert { rows }
            | StatementKind::BulkInsert { rows }
            | StatementKind::BulkUpdate { rows }
            | StatementKind::BulkUpsert { rows } => *rows,
            _ => 0,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            StatementKind::Select
                | StatementKind::SelectOne
                | StatementKind::SelectNested { .. }
                | StatementKind::Count
                | StatementKind::Exists
        )
    }

    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            StatementKind::BulkInsert { .. }
                | StatementKind::BulkUpdate { .. }
                | StatementKind::BulkUpsert { .. }
        )
    }
}

/// Scalar expression of a lowered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'a> {
    /// Column of the source at `position`, written as `alias.column`.
    Column { position: u8, column: &'a ColumnDef },
    /// Column of the bulk row source.
    Source(&'a ColumnDef),
    Param(Slot),
    Literal(&'static str),
    /// A `None` argument counts rows.
    Aggregate {
        func: AggregateFn,
        arg: Option<Box<Expr<'a>>>,
    },
    /// Aggregate evaluated per partition while keeping every row.
    Window {
        func: AggregateFn,
        arg: Option<Box<Expr<'a>>>,
        partition: Vec<Expr<'a>>,
    },
}

/// Boolean expression of a lowered statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<'a> {
    Constant(bool),
    Compare(Expr<'a>, ComparisonOp, Expr<'a>),
    /// `IS NULL`, or `IS NOT NULL` when negated.
    IsNull(Expr<'a>, bool),
    Logical(LogicalOp, Box<Condition<'a>>, Box<Condition<'a>>),
    In(Expr<'a>, Vec<Expr<'a>>, bool),
    Like(Expr<'a>, Expr<'a>, bool),
    FullText(Expr<'a>, Expr<'a>, bool),
    Bitwise {
        expr: Expr<'a>,
        mask: Expr<'a>,
        op: ComparisonOp,
        value: Expr<'a>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source<'a> {
    pub table: &'a TableRef,
    pub position: u8,
    /// `None` for the root.
    pub on: Option<Condition<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem<'a> {
    pub expr: Expr<'a>,
    pub alias: Option<Cow<'a, str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement<'a> {
    pub sources: Vec<Source<'a>>,
    pub columns: Vec<SelectItem<'a>>,
    pub filter: Option<Condition<'a>>,
    pub group: Vec<Expr<'a>>,
    pub order: Vec<(Expr<'a>, Order)>,
    pub distinct: bool,
    pub skip: Option<Expr<'a>>,
    pub take: Option<Expr<'a>>,
    pub dirty_read: bool,
}

impl SelectStatement<'_> {
    pub fn is_paged(&self) -> bool {
        self.skip.is_some() || self.take.is_some()
    }
}

/// Insert, update, upsert, delete and their bulk versions.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyStatement<'a> {
    pub table: &'a TableRef,
    pub filter: Option<Condition<'a>>,
    pub assignments: Vec<(&'a ColumnDef, Expr<'a>)>,
    /// Inserted columns, or the columns of the bulk row source.
    pub columns: Vec<&'a ColumnDef>,
    /// Values of `columns`, one entry per row.
    pub rows: Vec<Vec<Expr<'a>>>,
    /// Columns matching the rows to their targets.
    pub keys: Vec<&'a ColumnDef>,
    pub output: Vec<&'a ColumnDef>,
    /// Table type the bulk rows are staged into.
    pub row_type: Option<&'a UserDefinedTable>,
}

impl<'a> ModifyStatement<'a> {
    pub fn new(table: &'a TableRef) -> Self {
        Self {
            table,
            filter: None,
            assignments: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            keys: Vec::new(),
            output: Vec::new(),
            row_type: None,
        }
    }

    /// Columns inserted from the row source, identity columns excluded.
    pub fn insert_columns(&self) -> impl Iterator<Item = &'a ColumnDef> + '_ {
        self.columns.iter().copied().filter(|c| !c.identity)
    }
}
