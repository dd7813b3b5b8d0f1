mod common;

use common::{
    names, open_store, order_record, sample_customers, sample_orders, seed, Customer,
};
use repokit_core::db::SqliteSet;
use repokit_core::{
    Filter, MemorySet, PageRequest, Query, QueryConfig, Reader, RepoError, Sorting, Spec, Stage,
    StoreConfig, Tracking, PIPELINE,
};

fn memory() -> MemorySet<Customer> {
    let set = MemorySet::with_items(sample_customers()).unwrap();
    set.relate("orders", sample_orders().iter().map(order_record))
        .unwrap();
    set
}

#[test]
fn compiled_plans_always_run_the_fixed_pipeline() {
    let plan = Query::<Customer>::matching(Filter::eq("tier", "gold"))
        .with_config(QueryConfig::new().no_tracking().with_tag("report").unwrap())
        .compile()
        .unwrap();
    assert_eq!(plan.stages(), &PIPELINE);
    assert_eq!(plan.stages().first(), Some(&Stage::BeforeCustomization));
    assert_eq!(plan.stages().last(), Some(&Stage::Tracking));
    assert_eq!(plan.tracking(), Tracking::NoTracking);
    assert_eq!(plan.tag(), Some("report"));
}

#[test]
fn before_customization_filters_ahead_of_paging() {
    let config = QueryConfig::<Customer>::new()
        .with_before_customization(|scope| scope.filter(Filter::is_not_null("tier")))
        .with_sorting(Sorting::asc("id").into());
    let query = Query::new()
        .paged(PageRequest::page(0, 2).unwrap())
        .with_config(config);

    let conn = open_store();
    seed(&conn, sample_customers(), sample_orders());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());

    assert_eq!(names(&memory().fetch(&query).unwrap()), vec!["Ada", "Brian"]);
    assert_eq!(names(&sqlite.fetch(&query).unwrap()), vec!["Ada", "Brian"]);
}

#[test]
fn after_customization_narrows_the_page_without_shifting_it() {
    let config = QueryConfig::<Customer>::new()
        .with_sorting(Sorting::asc("id").into())
        .with_after_customization(|scope| {
            scope.filter(Spec::predicate("has_orders", |item: &Customer| {
                !item.orders.is_empty()
            }))
            .include("orders")
        });
    let query = Query::new()
        .paged(PageRequest::page(0, 3).unwrap())
        .with_config(config);

    let conn = open_store();
    seed(&conn, sample_customers(), sample_orders());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());

    // Page holds customers 1..=3; only Ada has orders among them.
    for rows in [memory().fetch(&query).unwrap(), sqlite.fetch(&query).unwrap()] {
        assert_eq!(names(&rows), vec!["Ada"]);
        assert_eq!(rows[0].orders.len(), 2);
    }
    assert_eq!(memory().count(&query).unwrap(), 1);
    assert_eq!(sqlite.count(&query).unwrap(), 1);
}

#[test]
fn load_hints_attach_related_rows_in_order() {
    let config = QueryConfig::new().with_properties(["orders"]).unwrap();
    let conn = open_store();
    seed(&conn, sample_customers(), sample_orders());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    let memory = memory();

    for reader in [&memory as &dyn Reader<Customer>, &sqlite as &dyn Reader<Customer>] {
        let ada = reader.get(&1, &config).unwrap().unwrap();
        let order_ids: Vec<i64> = ada.orders.iter().map(|item| item.id).collect();
        assert_eq!(order_ids, vec![10, 11]);

        let chen = reader.get(&3, &config).unwrap().unwrap();
        assert!(chen.orders.is_empty());
    }
}

#[test]
fn unknown_load_hints_are_rejected_up_front() {
    assert!(matches!(
        QueryConfig::<Customer>::new().with_properties(["invoices"]),
        Err(RepoError::InvalidArgument(_))
    ));
    let query = Query::<Customer>::new().with_config(
        QueryConfig::<Customer>::new().with_after_customization(|scope| scope.include("invoices")),
    );
    assert!(matches!(
        memory().fetch(&query),
        Err(RepoError::InvalidArgument(_))
    ));
}

#[test]
fn read_helpers_agree_across_backends() {
    let conn = open_store();
    seed(&conn, sample_customers(), sample_orders());
    let sqlite = SqliteSet::<Customer>::new(&conn, &StoreConfig::default());
    let memory = memory();

    let gold = Query::<Customer>::matching(Filter::eq("tier", "gold"));
    let nobody = Query::<Customer>::matching(Filter::eq("name", "Zed"));
    let scored = Spec::filter(Filter::is_not_null("score"));

    for reader in [&memory as &dyn Reader<Customer>, &sqlite as &dyn Reader<Customer>] {
        assert_eq!(reader.count(&gold).unwrap(), 2);
        assert!(reader.any(&gold).unwrap());
        assert!(!reader.any(&nobody).unwrap());
        assert!(reader.all(&gold, &scored).unwrap());
        assert!(reader.all(&nobody, &Spec::filter(Filter::False)).unwrap());
        assert!(!reader
            .all(&Query::new(), &scored)
            .unwrap());

        assert_eq!(
            reader
                .first(&gold.clone().sort_by(Sorting::desc("score")))
                .unwrap()
                .map(|item| item.name),
            Some("Ada".to_string())
        );
        assert!(matches!(
            reader.single(&gold),
            Err(RepoError::MultipleResults { table: "customers" })
        ));
        assert!(reader.single(&nobody).unwrap().is_none());
        assert!(reader.get(&42, &QueryConfig::new()).unwrap().is_none());
    }

    let gold_ids = sqlite
        .fetch_mapped(&gold.sort_by(Sorting::asc("id")), |item| item.id)
        .unwrap();
    assert_eq!(gold_ids, vec![1, 4]);
    let first_name = memory
        .first_mapped(&Query::new().sort_by(Sorting::desc("name")), |item| item.name)
        .unwrap();
    assert_eq!(first_name.as_deref(), Some("Eli"));
}
