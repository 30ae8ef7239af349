#![allow(dead_code)]

use northwind_core::NorthwindRepository;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// In-memory repository bound to `session`.
pub fn repo_for(session: Uuid) -> NorthwindRepository {
    let mut repo = NorthwindRepository::open_in_memory().unwrap();
    repo.set_user_session_id(session);
    repo
}

fn owner(session: Option<Uuid>) -> Option<String> {
    session.map(|id| id.to_string())
}

pub fn insert_customer(conn: &Connection, name: &str, session: Option<Uuid>) -> Uuid {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO customers (customer_id, company_name, user_session_id)
         VALUES (?1, ?2, ?3);",
        params![id.to_string(), name, owner(session)],
    )
    .unwrap();
    id
}

pub fn insert_order(
    conn: &Connection,
    customer_id: Option<Uuid>,
    order_date: Option<&str>,
    session: Option<Uuid>,
) -> i64 {
    conn.execute(
        "INSERT INTO orders (customer_id, order_date, user_session_id)
         VALUES (?1, ?2, ?3);",
        params![customer_id.map(|id| id.to_string()), order_date, owner(session)],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_product(conn: &Connection, name: &str, session: Option<Uuid>) -> i64 {
    conn.execute(
        "INSERT INTO products (product_name, user_session_id) VALUES (?1, ?2);",
        params![name, owner(session)],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_order_detail(
    conn: &Connection,
    order_id: i64,
    product_id: i64,
    session: Option<Uuid>,
) {
    conn.execute(
        "INSERT INTO order_details (order_id, product_id, unit_price, quantity, user_session_id)
         VALUES (?1, ?2, 10.0, 1, ?3);",
        params![order_id, product_id, owner(session)],
    )
    .unwrap();
}

pub fn insert_international_order(conn: &Connection, order_id: i64, session: Option<Uuid>) {
    conn.execute(
        "INSERT INTO international_orders (order_id, customs_description, user_session_id)
         VALUES (?1, 'Books', ?2);",
        params![order_id, owner(session)],
    )
    .unwrap();
}

pub fn insert_employee(conn: &Connection, last_name: &str, session: Option<Uuid>) -> i64 {
    conn.execute(
        "INSERT INTO employees (last_name, first_name, user_session_id)
         VALUES (?1, 'Test', ?2);",
        params![last_name, owner(session)],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn insert_user(
    conn: &Connection,
    user_name: &str,
    email: Option<&str>,
    session: Option<Uuid>,
) -> i64 {
    conn.execute(
        "INSERT INTO users (user_name, first_name, last_name, email, user_session_id)
         VALUES (?1, 'First', 'Last', ?2, ?3);",
        params![user_name, email, owner(session)],
    )
    .unwrap();
    conn.last_insert_rowid()
}

pub fn grant_role(conn: &Connection, user_id: i64, role: &str) {
    conn.execute(
        "INSERT INTO user_roles (user_id, role_id)
         SELECT ?1, id FROM roles WHERE name = ?2;",
        params![user_id, role],
    )
    .unwrap();
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}
