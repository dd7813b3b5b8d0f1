mod common;

use common::{customer, names, open_store, sample_customers, seed, Customer};
use repokit_core::db::SqliteSet;
use repokit_core::{
    MemorySet, PageRequest, Query, QueryConfig, Reader, RepoError, SortSequence, Sorting, Spec,
    StoreConfig,
};

fn twenty_customers() -> Vec<Customer> {
    (1..=20)
        .map(|id| {
            let score = if id % 6 == 0 { None } else { Some((id * 7) % 11) };
            customer(id, &format!("c{id:02}"), None, score)
        })
        .collect()
}

fn ids(customers: &[Customer]) -> Vec<i64> {
    customers.iter().map(|item| item.id).collect()
}

fn by_score_then_name() -> SortSequence {
    SortSequence::new()
        .then(Sorting::desc("score"))
        .then(Sorting::asc("name"))
}

#[test]
fn applying_a_sort_twice_keeps_the_order() {
    let mut once = twenty_customers();
    by_score_then_name().apply(&mut once);
    let mut twice = once.clone();
    by_score_then_name().apply(&mut twice);
    assert_eq!(ids(&once), ids(&twice));
}

#[test]
fn nulls_sort_last_in_both_directions() {
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let conn = open_store();
    seed(&conn, sample_customers(), Vec::new());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());

    for sorting in [Sorting::asc("score"), Sorting::desc("score")] {
        let query = Query::<Customer>::new().sort_by(sorting.clone());
        let from_memory = memory.fetch(&query).unwrap();
        let from_sqlite = sqlite.fetch(&query).unwrap();
        assert_eq!(from_memory.last().map(|item| item.id), Some(3), "{sorting:?}");
        assert_eq!(ids(&from_memory), ids(&from_sqlite), "{sorting:?}");
    }
}

#[test]
fn consecutive_pages_are_disjoint_and_cover_the_sorted_list() {
    let memory = MemorySet::with_items(twenty_customers()).unwrap();
    let conn = open_store();
    seed(&conn, twenty_customers(), Vec::new());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    let config = QueryConfig::new().with_sorting(by_score_then_name());

    let mut sorted = twenty_customers();
    by_score_then_name().apply(&mut sorted);

    for reader in [&memory as &dyn Reader<Customer>, &sqlite as &dyn Reader<Customer>] {
        let first = reader
            .get_paged(Spec::all(), PageRequest::page(0, 10).unwrap(), &config)
            .unwrap();
        let second = reader
            .get_paged(Spec::all(), PageRequest::page(1, 10).unwrap(), &config)
            .unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 10);
        assert!(first.iter().all(|item| !second.contains(item)));

        let mut joined = first;
        joined.extend(second);
        assert_eq!(ids(&joined), ids(&sorted));
    }
}

#[test]
fn key_descending_with_limit_returns_the_top_keys() {
    let items = vec![
        customer(1, "A", None, None),
        customer(2, "B", None, None),
        customer(3, "C", None, None),
    ];
    let memory = MemorySet::with_items(items.clone()).unwrap();
    let conn = open_store();
    seed(&conn, items, Vec::new());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());

    let query = Query::<Customer>::new()
        .sort_by(Sorting::desc("id"))
        .paged(PageRequest::limit(2).unwrap());
    assert_eq!(names(&memory.fetch(&query).unwrap()), vec!["C", "B"]);
    assert_eq!(names(&sqlite.fetch(&query).unwrap()), vec!["C", "B"]);
}

#[test]
fn page_beyond_the_end_is_empty() {
    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let page = memory
        .get_paged(
            Spec::all(),
            PageRequest::page(3, 2).unwrap(),
            &QueryConfig::new(),
        )
        .unwrap();
    assert!(page.is_empty());
}

#[test]
fn invalid_paging_and_sort_columns_are_rejected() {
    assert!(matches!(
        PageRequest::page(-1, 10),
        Err(RepoError::InvalidArgument(_))
    ));
    assert!(matches!(
        PageRequest::limit(0),
        Err(RepoError::InvalidArgument(_))
    ));

    let memory = MemorySet::with_items(sample_customers()).unwrap();
    let err = memory
        .fetch(&Query::new().sort_by(Sorting::asc("nickname")))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}

#[test]
fn sqlite_enforces_the_configured_page_cap() {
    let conn = open_store();
    seed(&conn, twenty_customers(), Vec::new());
    let config = StoreConfig {
        max_page_size: Some(5),
        ..StoreConfig::default()
    };
    let sqlite = SqliteSet::<Customer>::new(&conn, &config);

    let err = sqlite
        .fetch(&Query::new().paged(PageRequest::page(0, 6).unwrap()))
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
    let page = sqlite
        .fetch(&Query::new().paged(PageRequest::page(1, 5).unwrap()))
        .unwrap();
    assert_eq!(ids(&page), vec![6, 7, 8, 9, 10]);
}
