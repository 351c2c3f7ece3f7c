use crate::{ColumnExpr, Operand, Value};
use std::{
    ops::{BitAnd, BitOr},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Contains,
    StartsWith,
    EndsWith,
    FullText,
}

/// Boolean expression tree, never evaluated in process.
///
/// Subtrees are reference counted so combining predicates and cloning descriptors shares them.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        column: ColumnExpr,
        op: ComparisonOp,
        operand: Operand,
    },
    Logical {
        op: LogicalOp,
        lhs: Arc<Predicate>,
        rhs: Arc<Predicate>,
    },
    Membership {
        column: ColumnExpr,
        set: Arc<[Operand]>,
        negated: bool,
    },
    StringMatch {
        column: ColumnExpr,
        kind: MatchKind,
        pattern: Operand,
        negated: bool,
    },
    BitwiseTest {
        column: ColumnExpr,
        mask: Operand,
        op: ComparisonOp,
        value: Operand,
    },
}

impl Predicate {
    pub fn and(self, rhs: Predicate) -> Predicate {
        Predicate::Logical {
            op: LogicalOp::And,
            lhs: self.into(),
            rhs: rhs.into(),
        }
    }

    pub fn or(self, rhs: Predicate) -> Predicate {
        Predicate::Logical {
            op: LogicalOp::Or,
            lhs: self.into(),
            rhs: rhs.into(),
        }
    }

    /// Operands in depth first order: left before right, mask before value.
    ///
    /// The position of a bound value in this order identifies its parameter slot.
    pub fn for_each_operand<'a>(&'a self, f: &mut impl FnMut(&'a ColumnExpr, &'a Operand)) {
        match self {
            Predicate::Comparison {
                column, operand, ..
            } => f(column, operand),
            Predicate::Logical { lhs, rhs, .. } => {
                lhs.for_each_operand(f);
                rhs.for_each_operand(f);
            }
            Predicate::Membership { column, set, .. } => {
                for v in set.iter() {
                    f(column, v);
                }
            }
            Predicate::StringMatch {
                column, pattern, ..
            } => f(column, pattern),
            Predicate::BitwiseTest {
                column,
                mask,
                value,
                ..
            } => {
                f(column, mask);
                f(column, value);
            }
        }
    }

    /// Bound values in slot order.
    pub fn values(&self) -> Vec<&Value> {
        let mut result = Vec::new();
        self.for_each_operand(&mut |_, operand| {
            if let Operand::Value(v) = operand {
                result.push(v);
            }
        });
        result
    }

    pub fn value_count(&self) -> usize {
        let mut count = 0;
        self.for_each_operand(&mut |_, operand| count += operand.is_value() as usize);
        count
    }

    /// Flatten the top level conjunction.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        fn collect<'a>(predicate: &'a Predicate, out: &mut Vec<&'a Predicate>) {
            match predicate {
                Predicate::Logical {
                    op: LogicalOp::And,
                    lhs,
                    rhs,
                } => {
                    collect(lhs, out);
                    collect(rhs, out);
                }
                _ => out.push(predicate),
            }
        }
        let mut result = Vec::new();
        collect(self, &mut result);
        result
    }

    /// Top level `column = operand` conjuncts with the slot index of each bound value.
    pub fn equalities(&self) -> Vec<(&ColumnExpr, &Operand, usize)> {
        let mut slot = 0;
        let mut result = Vec::new();
        for conjunct in self.conjuncts() {
            if let Predicate::Comparison {
                column,
                op: ComparisonOp::Equal,
                operand,
            } = conjunct
            {
                match operand {
                    Operand::Value(v) if v.is_null() => {}
                    _ => result.push((column, operand, slot)),
                }
            }
            slot += conjunct.value_count();
        }
        result
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;
    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Predicate;
    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}
