use crate::{
    ColumnDef, ColumnExpr, EntityMetadata, Operand, OrderItem, Predicate, Projection,
    ProjectionItem, QueryDescriptor, Selection, StatementKind,
};
use std::{any::TypeId, io::Write};

/// Structural identity of a descriptor, bound values excluded.
///
/// The encoding is exact rather than hashed: two descriptors share a fingerprint only when they
/// compile to the same statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Box<[u8]>);

impl Fingerprint {
    pub fn new(dialect: &str, descriptor: &QueryDescriptor, kind: &StatementKind) -> Self {
        let mut out = Encoder(Vec::with_capacity(256));
        out.str(dialect);
        out.kind(kind);
        out.entity(&descriptor.root);
        out.str(&descriptor.database);
        out.0.push(descriptor.joins.len() as u8);
        for join in descriptor.joins.iter() {
            out.entity(&join.target);
            out.0.push(join.position);
            out.0.push(join.cardinality as u8);
            out.predicate(&join.on);
        }
        match &descriptor.filter {
            Some(filter) => {
                out.0.push(1);
                out.predicate(filter);
            }
            None => out.0.push(0),
        }
        match descriptor.projection.as_deref() {
            None => out.0.push(0),
            Some(Projection::Columns(items)) => {
                out.0.push(1);
                out.items(items);
            }
            Some(Projection::Grouped { keys, aggregates }) => {
                out.0.push(2);
                out.items(keys);
                out.items(aggregates);
            }
        }
        out.0.push(descriptor.distinct as u8);
        out.len(descriptor.set.len());
        for assignment in descriptor.set.iter() {
            out.column(&assignment.column);
            out.operand(&assignment.operand);
        }
        out.len(descriptor.order.len());
        for OrderItem { key, order } in descriptor.order.iter() {
            out.selection(key);
            out.0.push(*order as u8);
        }
        out.0.push(descriptor.skip.is_some() as u8);
        out.0.push(descriptor.take.is_some() as u8);
        out.len(descriptor.output.len());
        for column in descriptor.output.iter() {
            out.column(column);
        }
        out.0.push(descriptor.dirty_read as u8);
        Fingerprint(out.0.into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

struct Encoder(Vec<u8>);

impl Encoder {
    fn len(&mut self, len: usize) {
        self.0.extend_from_slice(&(len as u32).to_le_bytes());
    }
    fn str(&mut self, value: &str) {
        self.len(value.len());
        self.0.extend_from_slice(value.as_bytes());
    }
    fn type_id(&mut self, id: TypeId) {
        // Writing into a vector cannot fail
        let _ = write!(self.0, "{:?};", id);
    }
    fn entity(&mut self, metadata: &EntityMetadata) {
        self.type_id(metadata.entity);
        self.str(metadata.type_path);
        self.str(&metadata.table.schema);
        self.str(&metadata.table.name);
        self.str(metadata.user_defined_table.as_deref().unwrap_or_default());
        self.len(metadata.columns.len());
        for column in &metadata.columns {
            self.column_def(column);
        }
    }
    fn column_def(&mut self, column: &ColumnDef) {
        self.str(&column.name);
        let _ = write!(self.0, "{:?};", column.value);
        self.0.extend_from_slice(&[
            column.nullable as u8,
            column.primary_key as u8,
            column.identity as u8,
        ]);
        self.str(column.column_type.as_deref().unwrap_or_default());
    }
    fn kind(&mut self, kind: &StatementKind) {
        self.str(kind.name());
        self.len(kind.rows());
    }
    fn column(&mut self, column: &ColumnExpr) {
        self.type_id(column.entity);
        self.str(column.name);
        self.0.push(column.position);
    }
    fn operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Value(v) => self.0.push(if v.is_null() { b'n' } else { b'v' }),
            Operand::Column(column) => {
                self.0.push(b'c');
                self.column(column);
            }
            Operand::Row => self.0.push(b'r'),
        }
    }
    fn selection(&mut self, selection: &Selection) {
        match selection {
            Selection::Column(column) => {
                self.0.push(b'c');
                self.column(column);
            }
            Selection::Aggregate(func, column) => {
                self.0.push(b'a');
                self.0.push(*func as u8);
                match column {
                    Some(column) => self.column(column),
                    None => self.0.push(b'*'),
                }
            }
        }
    }
    fn items(&mut self, items: &[ProjectionItem]) {
        self.len(items.len());
        for item in items {
            self.selection(&item.selection);
            self.str(item.alias.unwrap_or_default());
        }
    }
    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Comparison {
                column,
                op,
                operand,
            } => {
                self.0.extend_from_slice(&[b'C', *op as u8]);
                self.column(column);
                self.operand(operand);
            }
            Predicate::Logical { op, lhs, rhs } => {
                self.0.extend_from_slice(&[b'L', *op as u8]);
                self.predicate(lhs);
                self.predicate(rhs);
            }
            Predicate::Membership {
                column,
                set,
                negated,
            } => {
                self.0.extend_from_slice(&[b'M', *negated as u8]);
                self.column(column);
                self.len(set.len());
                for operand in set.iter() {
                    self.operand(operand);
                }
            }
            Predicate::StringMatch {
                column,
                kind,
                pattern,
                negated,
            } => {
                self.0.extend_from_slice(&[b'S', *kind as u8, *negated as u8]);
                self.column(column);
                self.operand(pattern);
            }
            Predicate::BitwiseTest {
                column,
                mask,
                op,
                value,
            } => {
                self.0.extend_from_slice(&[b'B', *op as u8]);
                self.column(column);
                self.operand(mask);
                self.operand(value);
            }
        }
    }
}
