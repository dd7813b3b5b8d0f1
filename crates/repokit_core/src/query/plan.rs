//! Query builder and the fixed-order execution plan.
//!
//! # Responsibility
//! - Collect specification, sort sequence, paging and configuration for one
//!   read.
//! - Compile them into a `QueryPlan` whose stage order callers cannot change.
//! - Execute a plan over in-memory entities.
//!
//! # Invariants
//! - Stages always run as: before customization, filter, sort, page, load
//!   hints, after customization, tracking.
//! - Paging sees filtered and sorted rows only; filters added by the after
//!   customization narrow the page and never shift it.

use crate::model::entity::Entity;
use crate::query::config::{validate_navigation, QueryConfig, Scope, Tracking};
use crate::query::paging::{PageRequest, PagingWindow};
use crate::query::sort::{SortSequence, Sorting};
use crate::query::spec::{Spec, Specification};
use crate::repo::error::RepoResult;
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};

/// One step of the query pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BeforeCustomization,
    Filter,
    Sort,
    Page,
    LoadHints,
    AfterCustomization,
    Tracking,
}

/// The pipeline, in execution order.
pub const PIPELINE: [Stage; 7] = [
    Stage::BeforeCustomization,
    Stage::Filter,
    Stage::Sort,
    Stage::Page,
    Stage::LoadHints,
    Stage::AfterCustomization,
    Stage::Tracking,
];

/// Caller-facing description of one read.
pub struct Query<E> {
    spec: Option<Spec<E>>,
    sorting: SortSequence,
    page: Option<PageRequest>,
    config: QueryConfig<E>,
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            sorting: self.sorting.clone(),
            page: self.page,
            config: self.config.clone(),
        }
    }
}

impl<E> Debug for Query<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("spec", &self.spec)
            .field("sorting", &self.sorting)
            .field("page", &self.page)
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Query<E> {
    /// Every entity, backend default order, no paging.
    pub fn new() -> Self {
        Self {
            spec: None,
            sorting: SortSequence::new(),
            page: None,
            config: QueryConfig::new(),
        }
    }

    pub fn matching(spec: impl Into<Spec<E>>) -> Self {
        Self::new().filter(spec)
    }

    /// Adds a filter; several filters combine with AND.
    pub fn filter(self, spec: impl Into<Spec<E>>) -> Self {
        let spec = spec.into();
        Self {
            spec: Some(match self.spec {
                Some(existing) => existing.and(spec),
                None => spec,
            }),
            ..self
        }
    }

    /// Appends a lower-precedence sort directive.
    pub fn sort_by(self, sorting: Sorting) -> Self {
        Self {
            sorting: self.sorting.then(sorting),
            ..self
        }
    }

    /// Replaces the whole sort sequence.
    pub fn sorted(self, sorting: SortSequence) -> Self {
        Self { sorting, ..self }
    }

    pub fn paged(self, page: PageRequest) -> Self {
        Self {
            page: Some(page),
            ..self
        }
    }

    pub fn with_config(self, config: QueryConfig<E>) -> Self {
        Self { config, ..self }
    }

    pub fn spec(&self) -> Option<&Spec<E>> {
        self.spec.as_ref()
    }

    pub fn page(&self) -> Option<PageRequest> {
        self.page
    }

    pub fn config(&self) -> &QueryConfig<E> {
        &self.config
    }

    /// Resolves customizations and validates columns and load hints.
    pub fn compile(&self) -> RepoResult<QueryPlan<E>> {
        let (base_filters, base_includes) = match self.config.before() {
            Some(customize) => customize(Scope::new()).into_parts(),
            None => (Vec::new(), BTreeSet::new()),
        };
        let (post_filters, post_includes) = match self.config.after() {
            Some(customize) => customize(Scope::new()).into_parts(),
            None => (Vec::new(), BTreeSet::new()),
        };

        let sorting = if self.sorting.is_empty() {
            self.config.sorting().clone()
        } else {
            self.sorting.clone()
        };
        sorting.validate::<E>()?;

        let mut includes = self.config.properties().clone();
        includes.extend(base_includes);
        includes.extend(post_includes);
        for path in &includes {
            validate_navigation::<E>(path)?;
        }

        Ok(QueryPlan {
            base: Spec::conjunction(base_filters),
            filter: self.spec.clone(),
            sorting,
            window: self.page.map(|page| page.window()),
            includes,
            post_filter: Spec::conjunction(post_filters),
            tracking: self.config.tracking(),
            tag: self.config.tag().map(str::to_string),
        })
    }
}

/// Compiled, backend-neutral read plan.
pub struct QueryPlan<E> {
    base: Option<Spec<E>>,
    filter: Option<Spec<E>>,
    sorting: SortSequence,
    window: Option<PagingWindow>,
    includes: BTreeSet<String>,
    post_filter: Option<Spec<E>>,
    tracking: Tracking,
    tag: Option<String>,
}

impl<E> Debug for QueryPlan<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlan")
            .field("base", &self.base)
            .field("filter", &self.filter)
            .field("sorting", &self.sorting)
            .field("window", &self.window)
            .field("includes", &self.includes)
            .field("post_filter", &self.post_filter)
            .field("tracking", &self.tracking)
            .field("tag", &self.tag)
            .finish()
    }
}

impl<E: Entity> QueryPlan<E> {
    pub fn stages(&self) -> &'static [Stage] {
        &PIPELINE
    }

    /// Filters contributed by the before customization.
    pub fn base(&self) -> Option<&Spec<E>> {
        self.base.as_ref()
    }

    pub fn filter(&self) -> Option<&Spec<E>> {
        self.filter.as_ref()
    }

    /// Base and query filters combined: everything that runs before paging.
    pub fn selection(&self) -> Option<Spec<E>> {
        Spec::conjunction(self.base.iter().chain(self.filter.iter()).cloned())
    }

    pub fn sorting(&self) -> &SortSequence {
        &self.sorting
    }

    pub fn window(&self) -> Option<PagingWindow> {
        self.window
    }

    pub fn includes(&self) -> &BTreeSet<String> {
        &self.includes
    }

    pub fn post_filter(&self) -> Option<&Spec<E>> {
        self.post_filter.as_ref()
    }

    pub fn tracking(&self) -> Tracking {
        self.tracking
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Same plan returning at most `limit` rows from the start of its
    /// window. Plans with an after filter keep their window, so the filter
    /// still sees the full page.
    pub fn limited(&self, limit: u64) -> Self {
        let window = if self.post_filter.is_some() {
            self.window
        } else {
            Some(
                self.window
                    .unwrap_or(PagingWindow {
                        skip: 0,
                        take: u64::MAX,
                    })
                    .narrowed(limit),
            )
        };
        Self {
            base: self.base.clone(),
            filter: self.filter.clone(),
            sorting: self.sorting.clone(),
            window,
            includes: self.includes.clone(),
            post_filter: self.post_filter.clone(),
            tracking: self.tracking,
            tag: self.tag.clone(),
        }
    }

    /// Runs every stage except tracking over `items`, in pipeline order.
    ///
    /// `load` receives each result and each requested load hint.
    pub fn run_in_memory<I, L>(&self, items: I, mut load: L) -> RepoResult<Vec<E>>
    where
        I: IntoIterator<Item = E>,
        L: FnMut(&mut E, &str) -> RepoResult<()>,
    {
        let mut rows: Vec<E> = items
            .into_iter()
            .filter(|entity| {
                self.base
                    .as_ref()
                    .map_or(true, |spec| spec.is_satisfied_by(entity))
            })
            .filter(|entity| {
                self.filter
                    .as_ref()
                    .map_or(true, |spec| spec.is_satisfied_by(entity))
            })
            .collect();

        self.sorting.apply(&mut rows);

        if let Some(window) = self.window {
            rows = window.apply(rows);
        }

        for entity in &mut rows {
            for path in &self.includes {
                load(entity, path)?;
            }
        }

        if let Some(post) = &self.post_filter {
            rows.retain(|entity| post.is_satisfied_by(entity));
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::{Query, PIPELINE};
    use crate::model::entity::{Entity, EntitySchema, Record};
    use crate::model::value::Value;
    use crate::query::config::QueryConfig;
    use crate::query::filter::Filter;
    use crate::query::paging::PageRequest;
    use crate::query::sort::Sorting;
    use crate::repo::error::RepoResult;

    static ROW_SCHEMA: EntitySchema = EntitySchema {
        table: "rows",
        key: "id",
        columns: &["id", "rank"],
        version: None,
        audit: None,
        navigations: &[],
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        rank: Option<i64>,
    }

    impl Entity for Row {
        type Key = i64;

        fn schema() -> &'static EntitySchema {
            &ROW_SCHEMA
        }

        fn key(&self) -> i64 {
            self.id
        }

        fn set_key(&mut self, key: i64) {
            self.id = key;
        }

        fn field(&self, column: &str) -> Option<Value> {
            match column {
                "id" => Some(self.id.into()),
                "rank" => Some(self.rank.into()),
                _ => None,
            }
        }

        fn from_record(record: &Record) -> RepoResult<Self> {
            Ok(Self {
                id: record.read("id")?,
                rank: record.read_or_null("rank")?,
            })
        }
    }

    fn rows() -> Vec<Row> {
        [(1, Some(3)), (2, None), (3, Some(1)), (4, Some(2)), (5, Some(3))]
            .into_iter()
            .map(|(id, rank)| Row { id, rank })
            .collect()
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|row| row.id).collect()
    }

    #[test]
    fn stages_filter_then_sort_then_page() {
        let plan = Query::<Row>::matching(Filter::is_not_null("rank"))
            .sort_by(Sorting::desc("rank"))
            .paged(PageRequest::page(1, 2).unwrap())
            .compile()
            .unwrap();
        assert_eq!(plan.stages(), &PIPELINE);

        let page = plan.run_in_memory(rows(), |_, _| Ok(())).unwrap();
        assert_eq!(ids(&page), vec![4, 3]);
    }

    #[test]
    fn query_sort_overrides_the_config_default() {
        let config = QueryConfig::<Row>::new().with_sorting(Sorting::asc("rank").into());
        let by_default = Query::new().with_config(config.clone()).compile().unwrap();
        assert_eq!(
            ids(&by_default.run_in_memory(rows(), |_, _| Ok(())).unwrap()),
            vec![3, 4, 1, 5, 2]
        );

        let explicit = Query::new()
            .sort_by(Sorting::desc("id"))
            .with_config(config)
            .compile()
            .unwrap();
        assert_eq!(
            ids(&explicit.run_in_memory(rows(), |_, _| Ok(())).unwrap()),
            vec![5, 4, 3, 2, 1]
        );
    }

    #[test]
    fn limited_keeps_the_window_when_an_after_filter_exists() {
        let plain = Query::<Row>::new()
            .paged(PageRequest::page(1, 3).unwrap())
            .compile()
            .unwrap()
            .limited(1);
        let window = plain.window().unwrap();
        assert_eq!((window.skip, window.take), (3, 1));

        let narrowed = Query::<Row>::new()
            .paged(PageRequest::page(0, 3).unwrap())
            .with_config(
                QueryConfig::<Row>::new()
                    .with_after_customization(|scope| scope.filter(Filter::eq("rank", 1))),
            )
            .compile()
            .unwrap()
            .limited(1);
        assert_eq!(narrowed.window().map(|window| window.take), Some(3));
        let found = narrowed.run_in_memory(rows(), |_, _| Ok(())).unwrap();
        assert_eq!(ids(&found), vec![3]);
    }
}
