//! Translatable filter expressions.
//!
//! # Responsibility
//! - Represent the server-evaluable form of a specification.
//! - Evaluate that form in memory with exactly the semantics the SQL
//!   rendering has.
//!
//! # Invariants
//! - Evaluation is two-valued: a comparison with a `Null` operand is false,
//!   and only `IsNull` matches nulls. `Not` negates that two-valued
//!   result, so `Not(Eq)` matches rows whose column is null.
//! - `Null` entries inside `In`/`NotIn` lists are ignored.
//! - Text operators only match text values and compare bytes.

use crate::model::entity::{Entity, Record};
use crate::model::value::Value;
use std::cmp::Ordering;
use std::ops::{BitAnd, BitOr, Not};

/// Ordering comparison operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
        }
    }
}

/// Substring operator over text columns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// Boolean expression over entity columns.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    True,
    False,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    NotIn {
        column: String,
        values: Vec<Value>,
    },
    Text {
        column: String,
        op: TextOp,
        pattern: String,
    },
    IsNull {
        column: String,
    },
    IsNotNull {
        column: String,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl Filter {
    fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lte, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gte, value)
    }

    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::NotIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Text {
            column: column.into(),
            op: TextOp::Contains,
            pattern: pattern.into(),
        }
    }

    pub fn starts_with(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Text {
            column: column.into(),
            op: TextOp::StartsWith,
            pattern: pattern.into(),
        }
    }

    pub fn ends_with(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Text {
            column: column.into(),
            op: TextOp::EndsWith,
            pattern: pattern.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull {
            column: column.into(),
        }
    }

    /// Conjunction, flattening nested `And` nodes.
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction, flattening nested `Or` nodes.
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Column names referenced anywhere in this expression, in visit order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::True | Self::False => {}
            Self::Compare { column, .. }
            | Self::In { column, .. }
            | Self::NotIn { column, .. }
            | Self::Text { column, .. }
            | Self::IsNull { column }
            | Self::IsNotNull { column } => out.push(column.as_str()),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            Self::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Evaluates against an entity. Unknown columns read as `Null`.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        self.evaluate(&|column| entity.field(column))
    }

    /// Evaluates against a raw record. Absent columns read as `Null`.
    pub fn matches_record(&self, record: &Record) -> bool {
        self.evaluate(&|column| record.get(column).cloned())
    }

    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        let read = |column: &str| lookup(column).unwrap_or(Value::Null);
        match self {
            Self::True => true,
            Self::False => false,
            Self::Compare { column, op, value } => read(column)
                .filter_cmp(value)
                .is_some_and(|ordering| op.holds(ordering)),
            Self::In { column, values } => {
                let current = read(column);
                !current.is_null() && values.iter().any(|candidate| same(&current, candidate))
            }
            Self::NotIn { column, values } => {
                let current = read(column);
                !current.is_null() && !values.iter().any(|candidate| same(&current, candidate))
            }
            Self::Text {
                column,
                op,
                pattern,
            } => match read(column) {
                Value::Text(text) => match op {
                    TextOp::Contains => text.contains(pattern.as_str()),
                    TextOp::StartsWith => text.starts_with(pattern.as_str()),
                    TextOp::EndsWith => text.ends_with(pattern.as_str()),
                },
                _ => false,
            },
            Self::IsNull { column } => read(column).is_null(),
            Self::IsNotNull { column } => !read(column).is_null(),
            Self::And(items) => items.iter().all(|item| item.evaluate(lookup)),
            Self::Or(items) => items.iter().any(|item| item.evaluate(lookup)),
            Self::Not(inner) => !inner.evaluate(lookup),
        }
    }
}

fn same(current: &Value, candidate: &Value) -> bool {
    current.filter_cmp(candidate) == Some(Ordering::Equal)
}

impl BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl Not for Filter {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }
}
