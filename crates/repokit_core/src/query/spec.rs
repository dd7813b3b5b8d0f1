//! Composable specifications.
//!
//! # Responsibility
//! - Decide whether one entity matches (`is_satisfied_by`).
//! - Produce the equivalent translatable `Filter` for server-side evaluation.
//!
//! # Invariants
//! - Evaluation is pure and short-circuits left to right.
//! - For every translatable spec `s` and entity `e`:
//!   `s.is_satisfied_by(e) == s.to_filter()?.matches(e)`.
//! - Translation failures carry the path of the offending sub-expression.

use crate::model::entity::Entity;
use crate::query::filter::Filter;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

/// A sub-expression that has no translation to the backend query form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationError {
    /// Location inside the specification tree, e.g. `$.and[1].not`.
    pub path: String,
    /// The offending node, e.g. ``predicate `is_vip` `` or ``column `x` ``.
    pub subject: String,
    pub reason: String,
}

impl TranslationError {
    pub fn new(
        path: impl Into<String>,
        subject: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

impl Display for TranslationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot translate {} at `{}`: {}",
            self.subject, self.path, self.reason
        )
    }
}

impl Error for TranslationError {}

/// User-defined specification leaf.
pub trait Specification<E>: Send + Sync {
    fn is_satisfied_by(&self, entity: &E) -> bool;

    fn to_filter(&self) -> Result<Filter, TranslationError>;
}

type PredicateFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Specification tree over entities of type `E`.
pub enum Spec<E> {
    Filter(Filter),
    /// Opaque in-memory predicate; has no translation.
    Predicate {
        name: Arc<str>,
        test: PredicateFn<E>,
    },
    Custom(Arc<dyn Specification<E>>),
    Named {
        name: Arc<str>,
        inner: Box<Spec<E>>,
    },
    And(Box<Spec<E>>, Box<Spec<E>>),
    Or(Box<Spec<E>>, Box<Spec<E>>),
    Not(Box<Spec<E>>),
}

impl<E> Clone for Spec<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Filter(filter) => Self::Filter(filter.clone()),
            Self::Predicate { name, test } => Self::Predicate {
                name: Arc::clone(name),
                test: Arc::clone(test),
            },
            Self::Custom(inner) => Self::Custom(Arc::clone(inner)),
            Self::Named { name, inner } => Self::Named {
                name: Arc::clone(name),
                inner: inner.clone(),
            },
            Self::And(left, right) => Self::And(left.clone(), right.clone()),
            Self::Or(left, right) => Self::Or(left.clone(), right.clone()),
            Self::Not(inner) => Self::Not(inner.clone()),
        }
    }
}

impl<E> Debug for Spec<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter(filter) => f.debug_tuple("Filter").field(filter).finish(),
            Self::Predicate { name, .. } => f.debug_tuple("Predicate").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Named { name, inner } => f
                .debug_struct("Named")
                .field("name", name)
                .field("inner", inner)
                .finish(),
            Self::And(left, right) => f.debug_tuple("And").field(left).field(right).finish(),
            Self::Or(left, right) => f.debug_tuple("Or").field(left).field(right).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
        }
    }
}

impl<E> Spec<E> {
    /// Matches every entity.
    pub fn all() -> Self {
        Self::Filter(Filter::True)
    }

    pub fn filter(filter: Filter) -> Self {
        Self::Filter(filter)
    }

    pub fn predicate(
        name: impl Into<Arc<str>>,
        test: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    pub fn custom(spec: impl Specification<E> + 'static) -> Self {
        Self::Custom(Arc::new(spec))
    }

    /// Labels this spec; the label shows up in translation error paths.
    pub fn named(self, name: impl Into<Arc<str>>) -> Self {
        Self::Named {
            name: name.into(),
            inner: Box::new(self),
        }
    }

    pub fn and(self, other: impl Into<Spec<E>>) -> Self {
        Self::And(Box::new(self), Box::new(other.into()))
    }

    pub fn or(self, other: impl Into<Spec<E>>) -> Self {
        Self::Or(Box::new(self), Box::new(other.into()))
    }
}

impl<E: Entity> Spec<E> {
    /// Folds specs into one conjunction; `None` for an empty input.
    pub fn conjunction(specs: impl IntoIterator<Item = Spec<E>>) -> Option<Self> {
        specs.into_iter().reduce(|left, right| left.and(right))
    }

    fn translate(&self, path: &str) -> Result<Filter, TranslationError> {
        match self {
            Self::Filter(filter) => {
                let schema = E::schema();
                if let Some(column) = filter
                    .columns()
                    .into_iter()
                    .find(|column| !schema.has_column(column))
                {
                    return Err(TranslationError::new(
                        path,
                        format!("column `{column}`"),
                        format!("`{}` declares no such column", schema.table),
                    ));
                }
                Ok(filter.clone())
            }
            Self::Predicate { name, .. } => Err(TranslationError::new(
                path,
                format!("predicate `{name}`"),
                "opaque predicates only evaluate in memory",
            )),
            Self::Custom(inner) => inner.to_filter().map_err(|err| TranslationError {
                path: format!("{path}{}", err.path.trim_start_matches('$')),
                ..err
            }),
            Self::Named { name, inner } => inner.translate(&format!("{path}.{name}")),
            Self::And(left, right) => Ok(left
                .translate(&format!("{path}.and[0]"))?
                .and(right.translate(&format!("{path}.and[1]"))?)),
            Self::Or(left, right) => Ok(left
                .translate(&format!("{path}.or[0]"))?
                .or(right.translate(&format!("{path}.or[1]"))?)),
            Self::Not(inner) => Ok(!inner.translate(&format!("{path}.not"))?),
        }
    }
}

impl<E: Entity> Specification<E> for Spec<E> {
    fn is_satisfied_by(&self, entity: &E) -> bool {
        match self {
            Self::Filter(filter) => filter.matches(entity),
            Self::Predicate { test, .. } => test(entity),
            Self::Custom(inner) => inner.is_satisfied_by(entity),
            Self::Named { inner, .. } => inner.is_satisfied_by(entity),
            Self::And(left, right) => left.is_satisfied_by(entity) && right.is_satisfied_by(entity),
            Self::Or(left, right) => left.is_satisfied_by(entity) || right.is_satisfied_by(entity),
            Self::Not(inner) => !inner.is_satisfied_by(entity),
        }
    }

    fn to_filter(&self) -> Result<Filter, TranslationError> {
        self.translate("$")
    }
}

impl<E> From<Filter> for Spec<E> {
    fn from(value: Filter) -> Self {
        Self::Filter(value)
    }
}

impl<E> BitAnd for Spec<E> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl<E> BitOr for Spec<E> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl<E> Not for Spec<E> {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}
