mod common;

use common::{insert_customer, insert_order, insert_order_detail, insert_product, repo_for};
use uuid::Uuid;

#[test]
fn orders_for_product_keeps_orders_with_matching_detail() {
    let mine = Uuid::new_v4();
    let theirs = Uuid::new_v4();
    let repo = repo_for(mine);
    let conn = repo.provider().connection();
    let chai = insert_product(conn, "Chai", None);
    let chang = insert_product(conn, "Chang", None);

    let with_chai = insert_order(conn, None, None, None);
    let with_chang = insert_order(conn, None, None, Some(mine));
    let chai_hidden_detail = insert_order(conn, None, None, None);
    insert_order_detail(conn, with_chai, chai, None);
    insert_order_detail(conn, with_chang, chang, Some(mine));
    insert_order_detail(conn, chai_hidden_detail, chai, Some(theirs));

    let orders = repo.load(&repo.orders_for_product(chai)).unwrap();
    let ids: Vec<i64> = orders.iter().map(|order| order.order_id).collect();
    assert_eq!(ids, [with_chai]);
    assert_eq!(orders[0].order_details.len(), 1);
    assert_eq!(orders[0].order_details[0].product_id, chai);
}

#[test]
fn orders_for_product_zero_returns_every_visible_order() {
    let mine = Uuid::new_v4();
    let repo = repo_for(mine);
    let conn = repo.provider().connection();
    let chai = insert_product(conn, "Chai", None);
    let with_detail = insert_order(conn, None, None, None);
    insert_order_detail(conn, with_detail, chai, None);
    insert_order(conn, None, None, Some(mine));
    insert_order(conn, None, None, Some(Uuid::new_v4()));

    let all = repo.load(&repo.orders_for_product(0)).unwrap();
    let filtered = repo.load(&repo.orders_for_product(chai)).unwrap();
    assert_eq!(all.len(), 2);
    assert!(filtered.len() <= all.len());
    assert!(filtered
        .iter()
        .all(|order| all.iter().any(|o| o.order_id == order.order_id)));
}

#[test]
fn orders_and_customers_attach_visible_customer() {
    let mine = Uuid::new_v4();
    let repo = repo_for(mine);
    let conn = repo.provider().connection();
    let acme = insert_customer(conn, "Acme", Some(mine));
    insert_order(conn, Some(acme), None, Some(mine));
    insert_order(conn, None, None, None);

    let orders = repo.load(&repo.orders_and_customers()).unwrap();
    assert_eq!(orders.len(), 2);
    let with_customer = orders
        .iter()
        .find(|order| order.customer_id == Some(acme))
        .unwrap();
    assert_eq!(
        with_customer.customer.as_ref().map(|c| c.company_name.as_str()),
        Some("Acme")
    );
    assert!(orders
        .iter()
        .any(|order| order.customer_id.is_none() && order.customer.is_none()));
}

#[test]
fn orders_and_details_hide_other_session_detail_lines() {
    let mine = Uuid::new_v4();
    let repo = repo_for(mine);
    let conn = repo.provider().connection();
    let chai = insert_product(conn, "Chai", None);
    let chang = insert_product(conn, "Chang", None);
    let aniseed = insert_product(conn, "Aniseed Syrup", None);
    let order = insert_order(conn, None, None, None);
    insert_order_detail(conn, order, chai, None);
    insert_order_detail(conn, order, chang, Some(mine));
    insert_order_detail(conn, order, aniseed, Some(Uuid::new_v4()));

    let orders = repo.load(&repo.orders_and_details()).unwrap();
    assert_eq!(orders.len(), 1);
    let mut products: Vec<i64> = orders[0]
        .order_details
        .iter()
        .map(|detail| detail.product_id)
        .collect();
    products.sort();
    assert_eq!(products, [chai, chang]);
}

#[test]
fn order_serializes_with_client_property_names() {
    let repo = repo_for(Uuid::new_v4());
    let conn = repo.provider().connection();
    insert_order(conn, None, Some("1998-01-15 00:00:00"), None);

    let order = repo.first(&repo.orders()).unwrap().unwrap();
    let json = serde_json::to_value(&order).unwrap();
    assert!(json.get("OrderID").is_some());
    assert!(json.get("RowVersion").is_some());
    assert_eq!(json.get("UserSessionId"), Some(&serde_json::Value::Null));
}
