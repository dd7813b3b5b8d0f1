//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `repokit_core` linkage.
//! - Run one paged query against an in-memory store so the SQLite adapter is
//!   exercised end to end.
//! - Keep output deterministic for quick local sanity checks.

use log::error;
use repokit_core::db::{open_db_in_memory, Migration, MigrationSet, SqliteUnitOfWork};
use repokit_core::{
    Entity, EntitySchema, Filter, PageRequest, Reader, Record, RepoResult, Sorting, Spec,
    StoreConfig, UnitOfWork, Value, Writer,
};
use std::process::ExitCode;

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    title: "create_tasks",
    sql: "CREATE TABLE tasks (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        priority INTEGER
    );",
}];

static TASK_SCHEMA: EntitySchema = EntitySchema {
    table: "tasks",
    key: "id",
    columns: &["id", "title", "priority"],
    version: None,
    audit: None,
    navigations: &[],
};

#[derive(Debug, Clone)]
struct Task {
    id: i64,
    title: String,
    priority: Option<i64>,
}

impl Entity for Task {
    type Key = i64;

    fn schema() -> &'static EntitySchema {
        &TASK_SCHEMA
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
            "title" => Some(self.title.as_str().into()),
            "priority" => Some(self.priority.into()),
            _ => None,
        }
    }

    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            id: record.read("id")?,
            title: record.read("title")?,
            priority: record.read_or_null("priority")?,
        })
    }
}

fn demo() -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let config = StoreConfig::default();
    let conn = open_db_in_memory(&config, &MigrationSet::new(MIGRATIONS.iter().copied())?)?;
    let uow = SqliteUnitOfWork::new(&conn, &config);
    let tasks = uow.repository::<Task>();
    for (id, title, priority) in [
        (1, "write tests", Some(2)),
        (2, "review", None),
        (3, "ship", Some(1)),
        (4, "triage", Some(3)),
    ] {
        tasks.add(Task {
            id,
            title: title.to_string(),
            priority,
        })?;
    }
    uow.commit()?;

    let page = tasks.get_paged(
        Spec::filter(Filter::is_not_null("priority")),
        PageRequest::page(0, 2)?,
        &repokit_core::QueryConfig::new().with_sorting(Sorting::asc("priority").into()),
    )?;
    Ok(page.into_iter().map(|task| task.title).collect())
}

fn main() -> ExitCode {
    println!("repokit_core ping={}", repokit_core::ping());
    println!("repokit_core version={}", repokit_core::core_version());
    match demo() {
        Ok(titles) => {
            println!("repokit_core demo_page={}", titles.join(","));
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_demo module=cli status=error error={err}");
            eprintln!("repokit_core demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}
