//! Entity and projection shapes returned by repository queries.
//!
//! Serialized names follow the client-facing property names recorded in
//! `model::meta`. Navigation collections stay empty unless a query includes
//! them.

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Category {
    #[serde(rename = "CategoryID")]
    pub category_id: i64,
    pub category_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Region {
    #[serde(rename = "RegionID")]
    pub region_id: i64,
    pub region_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Territory {
    #[serde(rename = "TerritoryID")]
    pub territory_id: i64,
    pub territory_description: String,
    #[serde(rename = "RegionID")]
    pub region_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Supplier {
    #[serde(rename = "SupplierID")]
    pub supplier_id: i64,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Customer {
    #[serde(rename = "CustomerID")]
    pub customer_id: Uuid,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub fax: Option<String>,
    pub row_version: i32,
    pub user_session_id: Option<Uuid>,
    /// Populated only when the query includes orders.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Employee {
    #[serde(rename = "EmployeeID")]
    pub employee_id: i64,
    pub last_name: String,
    pub first_name: String,
    pub title: Option<String>,
    pub birth_date: Option<NaiveDateTime>,
    pub hire_date: Option<NaiveDateTime>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "ReportsToEmployeeID")]
    pub reports_to_employee_id: Option<i64>,
    pub user_session_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmployeeTerritory {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "EmployeeID")]
    pub employee_id: i64,
    #[serde(rename = "TerritoryID")]
    pub territory_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: i64,
    pub product_name: String,
    #[serde(rename = "SupplierID")]
    pub supplier_id: Option<i64>,
    #[serde(rename = "CategoryID")]
    pub category_id: Option<i64>,
    pub quantity_per_unit: Option<String>,
    pub unit_price: Option<f64>,
    pub units_in_stock: Option<i32>,
    pub discontinued: bool,
    pub user_session_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    #[serde(rename = "OrderID")]
    pub order_id: i64,
    #[serde(rename = "CustomerID")]
    pub customer_id: Option<Uuid>,
    #[serde(rename = "EmployeeID")]
    pub employee_id: Option<i64>,
    pub order_date: Option<NaiveDateTime>,
    pub required_date: Option<NaiveDateTime>,
    pub shipped_date: Option<NaiveDateTime>,
    pub freight: Option<f64>,
    pub ship_name: Option<String>,
    pub ship_city: Option<String>,
    pub ship_country: Option<String>,
    pub row_version: i32,
    pub user_session_id: Option<Uuid>,
    /// Populated only when the query includes the customer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Box<Customer>>,
    /// Populated only when the query includes order details.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_details: Vec<OrderDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderDetail {
    #[serde(rename = "OrderID")]
    pub order_id: i64,
    #[serde(rename = "ProductID")]
    pub product_id: i64,
    pub unit_price: f64,
    pub quantity: i32,
    pub discount: f64,
    pub user_session_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternationalOrder {
    #[serde(rename = "OrderID")]
    pub order_id: i64,
    pub customs_description: String,
    pub excise_tax: f64,
    pub row_version: i32,
    pub user_session_id: Option<Uuid>,
}

/// Restricted user view.
///
/// `email` and `roles` are filled only by single-user lookups; list queries
/// leave them `None` and they are then absent from serialized output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserPartial {
    pub id: i64,
    pub user_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}
