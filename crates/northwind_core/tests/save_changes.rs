mod common;

use common::{count_rows, insert_customer, insert_product, repo_for};
use northwind_core::{EntityState, SaveError, UserSessionId};
use serde_json::{json, Value};
use uuid::Uuid;

fn entity(type_name: &str, state: &str, mut values: Value) -> Value {
    values["entityAspect"] = json!({
        "entityTypeName": format!("{type_name}:#Northwind.Models"),
        "entityState": state
    });
    values
}

fn bundle(entities: Vec<Value>) -> Value {
    json!({ "entities": entities, "saveOptions": {} })
}

fn stored_owner(conn: &rusqlite::Connection, table: &str, key: &str, id: &str) -> Option<String> {
    conn.query_row(
        &format!("SELECT user_session_id FROM {table} WHERE {key} = ?1;"),
        [id],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn added_entities_are_stamped_with_current_session() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let customer_id = Uuid::new_v4();

    let result = repo
        .save_changes(&bundle(vec![entity(
            "Customer",
            "Added",
            json!({ "CustomerID": customer_id, "CompanyName": "Acme" }),
        )]))
        .unwrap();

    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0]["$type"], "Customer");
    assert_eq!(result.entities[0]["UserSessionId"], mine.to_string());
    assert_eq!(
        stored_owner(
            repo.provider().connection(),
            "customers",
            "customer_id",
            &customer_id.to_string()
        ),
        Some(mine.to_string())
    );

    assert_eq!(repo.count(&repo.customers()).unwrap(), 1);
    repo.set_user_session_id(Uuid::new_v4());
    assert_eq!(repo.count(&repo.customers()).unwrap(), 0);
}

#[test]
fn generated_keys_are_mapped_and_foreign_keys_fixed_up() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let product = insert_product(repo.provider().connection(), "Chai", None);
    let customer_id = Uuid::new_v4();

    let result = repo
        .save_changes(&bundle(vec![
            entity(
                "OrderDetail",
                "Added",
                json!({
                    "OrderID": -1,
                    "ProductID": product,
                    "UnitPrice": 18.0,
                    "Quantity": 2,
                    "Discount": 0.0
                }),
            ),
            entity(
                "Order",
                "Added",
                json!({
                    "OrderID": -1,
                    "CustomerID": customer_id,
                    "OrderDate": "1998-02-03T00:00:00Z"
                }),
            ),
            entity(
                "Customer",
                "Added",
                json!({ "CustomerID": customer_id, "CompanyName": "Acme" }),
            ),
        ]))
        .unwrap();

    assert_eq!(result.key_mappings.len(), 1);
    let mapping = &result.key_mappings[0];
    assert_eq!(mapping.entity_type_name, "Order");
    assert_eq!(mapping.temp_value, json!(-1));
    let real_id = mapping.real_value.as_i64().unwrap();
    assert!(real_id > 0);

    let orders = repo.load(&repo.orders_and_details()).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, real_id);
    assert_eq!(orders[0].customer_id, Some(customer_id));
    assert_eq!(orders[0].row_version, 0);
    assert_eq!(orders[0].order_details.len(), 1);
    assert_eq!(orders[0].order_details[0].order_id, real_id);
}

#[test]
fn self_referencing_rows_insert_parent_before_child() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);

    let result = repo
        .save_changes(&bundle(vec![
            entity(
                "Employee",
                "Added",
                json!({
                    "EmployeeID": -2,
                    "LastName": "Leverling",
                    "FirstName": "Janet",
                    "ReportsToEmployeeID": -1
                }),
            ),
            entity(
                "Employee",
                "Added",
                json!({ "EmployeeID": -1, "LastName": "Fuller", "FirstName": "Andrew" }),
            ),
        ]))
        .unwrap();

    assert_eq!(result.key_mappings.len(), 2);
    let real_key = |temp: i64| {
        result
            .key_mappings
            .iter()
            .find(|mapping| mapping.temp_value == json!(temp))
            .and_then(|mapping| mapping.real_value.as_i64())
            .unwrap()
    };
    let manager = real_key(-1);
    let report = real_key(-2);

    let employees = repo.load(&repo.employees()).unwrap();
    assert_eq!(employees.len(), 2);
    let janet = employees
        .iter()
        .find(|employee| employee.employee_id == report)
        .unwrap();
    assert_eq!(janet.last_name, "Leverling");
    assert_eq!(janet.reports_to_employee_id, Some(manager));
}

#[test]
fn save_guard_hooks_register_once() {
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let mut repo = repo_for(first);
    assert!(repo.save_guard().is_none());
    assert_eq!(repo.provider().hook_counts(), (0, 0, 0));

    repo.save_changes(&bundle(vec![entity(
        "Customer",
        "Added",
        json!({ "CustomerID": Uuid::new_v4(), "CompanyName": "First" }),
    )]))
    .unwrap();

    repo.set_user_session_id(second);
    let late_customer = Uuid::new_v4();
    repo.save_changes(&bundle(vec![entity(
        "Customer",
        "Added",
        json!({ "CustomerID": late_customer, "CompanyName": "Second" }),
    )]))
    .unwrap();

    assert_eq!(repo.provider().hook_counts(), (1, 1, 1));
    assert_eq!(
        repo.save_guard().map(|guard| guard.user_session_id()),
        Some(UserSessionId::new(first))
    );
    assert_eq!(
        stored_owner(
            repo.provider().connection(),
            "customers",
            "customer_id",
            &late_customer.to_string()
        ),
        Some(first.to_string())
    );
}

#[test]
fn modified_rows_bump_row_version_and_detect_conflicts() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let customer_id = insert_customer(repo.provider().connection(), "Acme", Some(mine));

    let modified = entity(
        "Customer",
        "Modified",
        json!({ "CustomerID": customer_id, "CompanyName": "Acme Renamed", "RowVersion": 0 }),
    );
    let result = repo.save_changes(&bundle(vec![modified.clone()])).unwrap();
    assert_eq!(result.entities[0]["RowVersion"], 1);

    let customer = repo.first(&repo.customers()).unwrap().unwrap();
    assert_eq!(customer.company_name, "Acme Renamed");
    assert_eq!(customer.row_version, 1);

    let err = repo.save_changes(&bundle(vec![modified])).unwrap_err();
    assert!(matches!(
        err,
        SaveError::Concurrency {
            entity_type: "Customer",
            ..
        }
    ));
}

#[test]
fn deleted_rows_are_removed() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let customer_id = insert_customer(repo.provider().connection(), "Acme", Some(mine));

    repo.save_changes(&bundle(vec![entity(
        "Customer",
        "Deleted",
        json!({ "CustomerID": customer_id, "RowVersion": 0 }),
    )]))
    .unwrap();

    assert_eq!(count_rows(repo.provider().connection(), "customers"), 0);
}

#[test]
fn baseline_and_foreign_rows_cannot_be_changed() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let conn = repo.provider().connection();
    let baseline = insert_customer(conn, "Baseline", None);
    let foreign = insert_customer(conn, "Foreign", Some(Uuid::new_v4()));

    let err = repo
        .save_changes(&bundle(vec![entity(
            "Customer",
            "Modified",
            json!({ "CustomerID": baseline, "CompanyName": "Changed" }),
        )]))
        .unwrap_err();
    assert!(err.to_string().contains("baseline"));

    let err = repo
        .save_changes(&bundle(vec![entity(
            "Customer",
            "Deleted",
            json!({ "CustomerID": foreign }),
        )]))
        .unwrap_err();
    assert!(err.to_string().contains("another session"));
    assert_eq!(count_rows(repo.provider().connection(), "customers"), 2);
}

#[test]
fn reference_entities_are_read_only() {
    let mut repo = repo_for(Uuid::new_v4());
    let err = repo
        .save_changes(&bundle(vec![entity(
            "Region",
            "Added",
            json!({ "RegionID": 5, "RegionDescription": "Central" }),
        )]))
        .unwrap_err();
    assert!(matches!(
        err,
        SaveError::Validation {
            entity_type: "Region",
            ..
        }
    ));
}

#[test]
fn added_rows_cannot_reference_other_session_parents() {
    let mut repo = repo_for(Uuid::new_v4());
    let conn = repo.provider().connection();
    let foreign = insert_customer(conn, "Foreign", Some(Uuid::new_v4()));

    let err = repo
        .save_changes(&bundle(vec![entity(
            "Order",
            "Added",
            json!({ "OrderID": -1, "CustomerID": foreign }),
        )]))
        .unwrap_err();
    assert!(err.to_string().contains("owned by another session"));
    assert_eq!(count_rows(repo.provider().connection(), "orders"), 0);
}

#[test]
fn failed_save_rolls_back_whole_bundle() {
    let mine = Uuid::new_v4();
    let mut repo = repo_for(mine);
    let existing = insert_customer(repo.provider().connection(), "Existing", Some(mine));

    let err = repo
        .save_changes(&bundle(vec![
            entity(
                "Customer",
                "Added",
                json!({ "CustomerID": Uuid::new_v4(), "CompanyName": "New" }),
            ),
            entity(
                "Customer",
                "Modified",
                json!({ "CustomerID": existing, "CompanyName": "Stale", "RowVersion": 7 }),
            ),
        ]))
        .unwrap_err();

    assert!(matches!(err, SaveError::Concurrency { .. }));
    let conn = repo.provider().connection();
    assert_eq!(count_rows(conn, "customers"), 1);
    let name: String = conn
        .query_row("SELECT company_name FROM customers;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "Existing");
}

#[test]
fn unchanged_entities_are_skipped() {
    let mut repo = repo_for(Uuid::new_v4());
    let result = repo
        .save_changes(&bundle(vec![entity(
            "Customer",
            "Unchanged",
            json!({ "CustomerID": Uuid::new_v4(), "CompanyName": "Same" }),
        )]))
        .unwrap();

    assert!(result.entities.is_empty());
    assert_eq!(count_rows(repo.provider().connection(), "customers"), 0);
}

#[test]
fn malformed_bundles_are_rejected() {
    let mut repo = repo_for(Uuid::new_v4());

    let err = repo.save_changes(&json!({ "changes": [] })).unwrap_err();
    assert!(matches!(err, SaveError::InvalidBundle(_)));

    let err = repo
        .save_changes(&bundle(vec![entity("Shipper", "Added", json!({}))]))
        .unwrap_err();
    assert!(matches!(err, SaveError::UnknownEntityType(name) if name.starts_with("Shipper")));

    let err = repo
        .save_changes(&bundle(vec![entity(
            "Customer",
            "Added",
            json!({ "CustomerID": "not-a-guid", "CompanyName": "Acme" }),
        )]))
        .unwrap_err();
    assert!(matches!(err, SaveError::Validation { .. }));
}

#[test]
fn entity_state_uses_bundle_spelling() {
    let state: EntityState = serde_json::from_value(json!("Modified")).unwrap();
    assert_eq!(state, EntityState::Modified);
}
