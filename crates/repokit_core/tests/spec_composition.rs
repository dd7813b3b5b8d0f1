mod common;

use common::{names, open_store, sample_customers, seed, Customer};
use repokit_core::db::SqliteSet;
use repokit_core::{
    Filter, MemorySet, Query, Reader, RepoError, Sorting, Spec, Specification, StoreConfig,
    TranslationError,
};

fn gold() -> Spec<Customer> {
    Spec::filter(Filter::eq("tier", "gold"))
}

fn high_score() -> Spec<Customer> {
    Spec::filter(Filter::gte("score", 70))
}

#[test]
fn and_is_satisfied_only_when_both_sides_are() {
    let both = gold().and(high_score());
    for item in sample_customers() {
        assert_eq!(
            both.is_satisfied_by(&item),
            gold().is_satisfied_by(&item) && high_score().is_satisfied_by(&item),
            "customer {}",
            item.name
        );
    }
}

#[test]
fn memory_and_sqlite_agree_on_composed_filters() {
    let conn = open_store();
    seed(&conn, sample_customers(), Vec::new());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    let memory = MemorySet::with_items(sample_customers()).unwrap();

    let specs = vec![
        gold().and(high_score()),
        gold().or(Spec::filter(Filter::lt("score", 50))),
        !gold(),
        Spec::filter(Filter::ne("tier", "gold")),
        Spec::filter(Filter::in_list("score", [Some(40), None])),
        Spec::filter(Filter::not_in_list("tier", ["gold"])),
        Spec::filter(Filter::starts_with("name", "D") | Filter::ends_with("name", "an")),
        Spec::filter(Filter::contains("name", "") & Filter::is_null("score")),
    ];

    for spec in specs {
        let query = Query::matching(spec.clone()).sort_by(Sorting::asc("id"));
        let from_memory = memory.fetch(&query).unwrap();
        let from_sqlite = sqlite.fetch(&query).unwrap();
        assert_eq!(
            names(&from_memory),
            names(&from_sqlite),
            "spec {spec:?}"
        );
    }
}

#[test]
fn negated_comparison_matches_null_columns() {
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let rows = memory
        .fetch(&Query::matching(!gold()).sort_by(Sorting::asc("id")))
        .unwrap();
    assert_eq!(names(&rows), vec!["Brian", "Chen", "Eli"]);

    let rows = memory
        .fetch(&Query::matching(Spec::filter(Filter::ne("tier", "gold"))))
        .unwrap();
    assert_eq!(names(&rows), vec!["Brian", "Eli"]);
}

#[test]
fn predicate_specs_run_in_memory_but_not_in_sql() {
    let long_name = Spec::predicate("long_name", |item: &Customer| item.name.len() > 3);
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let rows = memory
        .fetch(&Query::matching(long_name.clone().and(gold())))
        .unwrap();
    assert_eq!(names(&rows), vec!["Dana"]);

    let conn = open_store();
    seed(&conn, sample_customers(), Vec::new());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    let err = sqlite
        .fetch(&Query::matching(gold().and(long_name.named("vip"))))
        .unwrap_err();
    match err {
        RepoError::Translation(err) => {
            assert_eq!(err.path, "$.and[1].vip");
            assert_eq!(err.subject, "predicate `long_name`");
            assert_eq!(err.reason, "opaque predicates only evaluate in memory");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Name match that only knows how to express its exact form in SQL.
struct NameLike {
    pattern: &'static str,
}

impl Specification<Customer> for NameLike {
    fn is_satisfied_by(&self, entity: &Customer) -> bool {
        entity.name.starts_with(self.pattern)
    }

    fn to_filter(&self) -> Result<Filter, TranslationError> {
        Err(TranslationError::new(
            "$.or[1]",
            format!("pattern `{}`", self.pattern),
            "prefix matching is not translated",
        ))
    }
}

#[test]
fn custom_spec_errors_are_rebased_onto_the_enclosing_path() {
    let spec = gold().or(!Spec::custom(NameLike { pattern: "E" }));
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let rows = memory.fetch(&Query::matching(spec.clone())).unwrap();
    assert_eq!(names(&rows), vec!["Ada", "Brian", "Chen", "Dana"]);

    let err = spec.to_filter().unwrap_err();
    assert_eq!(err.path, "$.or[1].not.or[1]");
    assert_eq!(err.subject, "pattern `E`");

    let top_level = Spec::<Customer>::custom(NameLike { pattern: "A" })
        .to_filter()
        .unwrap_err();
    assert_eq!(top_level.path, "$.or[1]");
}

#[test]
fn unknown_columns_fail_translation_and_never_match_in_memory() {
    let unknown = Spec::filter(Filter::eq("nickname", "A"));
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    assert!(memory.fetch(&Query::matching(unknown.clone())).unwrap().is_empty());

    let conn = open_store();
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    assert!(matches!(
        sqlite.fetch(&Query::matching(unknown)),
        Err(RepoError::Translation(_))
    ));
}

#[test]
fn evaluation_agrees_with_the_translated_filter() {
    let specs = vec![
        !(gold() | high_score()),
        gold() & !Spec::filter(Filter::is_null("score")),
        Spec::filter(Filter::True).named("everyone"),
    ];
    for spec in specs {
        let filter = spec.to_filter().unwrap();
        for item in sample_customers() {
            assert_eq!(spec.is_satisfied_by(&item), filter.matches(&item));
        }
    }
}
