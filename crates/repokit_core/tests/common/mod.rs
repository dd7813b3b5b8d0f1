#![allow(dead_code)]

use repokit_core::db::{open_db_in_memory, Migration, MigrationSet, SqliteUnitOfWork};
use repokit_core::{
    AuditColumns, Entity, EntitySchema, Navigation, Record, RepoError, RepoResult, StoreConfig,
    UnitOfWork, Value, Writer,
};
use rusqlite::Connection;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        title: "create_customers",
        sql: "CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            tier TEXT,
            score INTEGER,
            created_by TEXT,
            created_at INTEGER,
            updated_by TEXT,
            updated_at INTEGER,
            row_version INTEGER NOT NULL DEFAULT 1
        );",
    },
    Migration {
        version: 2,
        title: "create_orders",
        sql: "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
            total REAL NOT NULL
        );",
    },
];

static CUSTOMER_SCHEMA: EntitySchema = EntitySchema {
    table: "customers",
    key: "id",
    columns: &[
        "id",
        "name",
        "tier",
        "score",
        "created_by",
        "created_at",
        "updated_by",
        "updated_at",
    ],
    version: Some("row_version"),
    audit: Some(AuditColumns {
        created_by: "created_by",
        created_at: "created_at",
        updated_by: "updated_by",
        updated_at: "updated_at",
    }),
    navigations: &[Navigation {
        name: "orders",
        table: "orders",
        foreign_key: "customer_id",
        columns: &["id", "customer_id", "total"],
    }],
};

static ORDER_SCHEMA: EntitySchema = EntitySchema {
    table: "orders",
    key: "id",
    columns: &["id", "customer_id", "total"],
    version: None,
    audit: None,
    navigations: &[],
};

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub tier: Option<String>,
    pub score: Option<i64>,
    pub created_by: Option<String>,
    pub created_at: Option<i64>,
    pub updated_by: Option<String>,
    pub updated_at: Option<i64>,
    pub orders: Vec<Order>,
}

impl Entity for Customer {
    type Key = i64;

    fn schema() -> &'static EntitySchema {
        &CUSTOMER_SCHEMA
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
            "name" => Some(self.name.as_str().into()),
            "tier" => Some(self.tier.clone().into()),
            "score" => Some(self.score.into()),
            "created_by" => Some(self.created_by.clone().into()),
            "created_at" => Some(self.created_at.into()),
            "updated_by" => Some(self.updated_by.clone().into()),
            "updated_at" => Some(self.updated_at.into()),
            _ => None,
        }
    }

    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            id: record.read("id")?,
            name: record.read("name")?,
            tier: record.read_or_null("tier")?,
            score: record.read_or_null("score")?,
            created_by: record.read_or_null("created_by")?,
            created_at: record.read_or_null("created_at")?,
            updated_by: record.read_or_null("updated_by")?,
            updated_at: record.read_or_null("updated_at")?,
            orders: Vec::new(),
        })
    }

    fn attach(&mut self, navigation: &str, related: Vec<Record>) -> RepoResult<()> {
        match navigation {
            "orders" => {
                self.orders = related
                    .iter()
                    .map(Order::from_record)
                    .collect::<RepoResult<_>>()?;
                Ok(())
            }
            other => Err(RepoError::InvalidArgument(format!(
                "unknown navigation `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total: f64,
}

impl Entity for Order {
    type Key = i64;

    fn schema() -> &'static EntitySchema {
        &ORDER_SCHEMA
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
            "customer_id" => Some(self.customer_id.into()),
            "total" => Some(self.total.into()),
            _ => None,
        }
    }

    fn from_record(record: &Record) -> RepoResult<Self> {
        Ok(Self {
            id: record.read("id")?,
            customer_id: record.read("customer_id")?,
            total: record.read("total")?,
        })
    }
}

pub fn customer(id: i64, name: &str, tier: Option<&str>, score: Option<i64>) -> Customer {
    Customer {
        id,
        name: name.to_string(),
        tier: tier.map(str::to_string),
        score,
        created_by: None,
        created_at: None,
        updated_by: None,
        updated_at: None,
        orders: Vec::new(),
    }
}

pub fn order(id: i64, customer_id: i64, total: f64) -> Order {
    Order {
        id,
        customer_id,
        total,
    }
}

/// Five customers with mixed tiers and a null score.
pub fn sample_customers() -> Vec<Customer> {
    vec![
        customer(1, "Ada", Some("gold"), Some(90)),
        customer(2, "Brian", Some("silver"), Some(40)),
        customer(3, "Chen", None, None),
        customer(4, "Dana", Some("gold"), Some(70)),
        customer(5, "Eli", Some("bronze"), Some(40)),
    ]
}

pub fn sample_orders() -> Vec<Order> {
    vec![
        order(10, 1, 25.0),
        order(11, 1, 5.5),
        order(12, 4, 12.0),
    ]
}

pub fn migrations() -> MigrationSet {
    MigrationSet::new(MIGRATIONS.iter().copied()).unwrap()
}

pub fn open_store() -> Connection {
    open_db_in_memory(&StoreConfig::default(), &migrations()).unwrap()
}

/// Inserts customers and orders through a committed unit of work.
pub fn seed(conn: &Connection, customers: Vec<Customer>, orders: Vec<Order>) {
    let uow = SqliteUnitOfWork::new(conn, &StoreConfig::default());
    let customer_repo = uow.repository::<Customer>();
    for item in customers {
        customer_repo.add(item).unwrap();
    }
    let order_repo = uow.repository::<Order>();
    for item in orders {
        order_repo.add(item).unwrap();
    }
    uow.commit().unwrap();
}

pub fn names(customers: &[Customer]) -> Vec<&str> {
    customers.iter().map(|item| item.name.as_str()).collect()
}

pub fn order_record(item: &Order) -> Record {
    item.to_record()
}
