//! Row mapping and include loading for every queryable shape.

use crate::model::entities::{
    Category, Customer, Employee, EmployeeTerritory, InternationalOrder, Order, OrderDetail,
    Product, Region, Supplier, Territory, UserPartial,
};
use crate::model::meta::EntityKind;
use crate::model::session::UserSessionId;
use crate::repo::query::{EntityQuery, Filter, Include, QuerySource, Queryable};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Parent keys bound per include query; stays far below SQLite's variable cap.
pub(crate) const INCLUDE_BATCH_SIZE: usize = 500;

/// Loads `base` restricted to `column IN keys`, one batch of keys at a time.
fn load_for_keys<T: Queryable + Clone>(
    base: &EntityQuery<T>,
    column: &'static str,
    keys: Vec<Value>,
    conn: &Connection,
) -> RepoResult<Vec<T>> {
    let mut loaded = Vec::new();
    for batch in keys.chunks(INCLUDE_BATCH_SIZE) {
        let query = base.clone().filter(Filter::In {
            column,
            values: batch.to_vec(),
        });
        loaded.extend(query.load(conn)?);
    }
    Ok(loaded)
}

fn parse_uuid(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{text}` in {column}")))
}

fn parse_optional_uuid(row: &Row<'_>, column: &str) -> RepoResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{text}` in {column}"))
        }),
        None => Ok(None),
    }
}

fn uuid_value(id: Uuid) -> Value {
    Value::Text(id.hyphenated().to_string())
}

fn unsupported<T: Queryable>(include: Include) -> RepoError {
    RepoError::UnsupportedInclude {
        table: T::source().table,
        include,
    }
}

impl Queryable for Category {
    fn source() -> QuerySource {
        EntityKind::Category.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            category_id: row.get("category_id")?,
            category_name: row.get("category_name")?,
            description: row.get("description")?,
        })
    }
}

impl Queryable for Region {
    fn source() -> QuerySource {
        EntityKind::Region.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            region_id: row.get("region_id")?,
            region_description: row.get("region_description")?,
        })
    }
}

impl Queryable for Territory {
    fn source() -> QuerySource {
        EntityKind::Territory.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            territory_id: row.get("territory_id")?,
            territory_description: row.get("territory_description")?,
            region_id: row.get("region_id")?,
        })
    }
}

impl Queryable for Supplier {
    fn source() -> QuerySource {
        EntityKind::Supplier.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            supplier_id: row.get("supplier_id")?,
            company_name: row.get("company_name")?,
            contact_name: row.get("contact_name")?,
            city: row.get("city")?,
            country: row.get("country")?,
        })
    }
}

impl Queryable for Customer {
    fn source() -> QuerySource {
        EntityKind::Customer.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            customer_id: parse_uuid(row, "customer_id")?,
            company_name: row.get("company_name")?,
            contact_name: row.get("contact_name")?,
            contact_title: row.get("contact_title")?,
            address: row.get("address")?,
            city: row.get("city")?,
            region: row.get("region")?,
            postal_code: row.get("postal_code")?,
            country: row.get("country")?,
            phone: row.get("phone")?,
            fax: row.get("fax")?,
            row_version: row.get("row_version")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
            orders: Vec::new(),
        })
    }

    fn load_includes(
        rows: &mut [Self],
        includes: &[Include],
        scope: Option<UserSessionId>,
        conn: &Connection,
    ) -> RepoResult<()> {
        for include in includes {
            let year = match include {
                Include::Orders => None,
                Include::OrdersInYear(year) => Some(*year),
                other => return Err(unsupported::<Self>(*other)),
            };

            let ids = rows.iter().map(|c| uuid_value(c.customer_id)).collect();
            let mut query = EntityQuery::<Order>::new().with_scope(scope);
            if let Some(year) = year {
                query = query.filter(Filter::InYear {
                    column: "order_date",
                    year,
                });
            }

            let mut by_customer: HashMap<Uuid, Vec<Order>> = HashMap::new();
            for order in load_for_keys(&query, "customer_id", ids, conn)? {
                if let Some(customer_id) = order.customer_id {
                    by_customer.entry(customer_id).or_default().push(order);
                }
            }
            for customer in rows.iter_mut() {
                customer.orders = by_customer.remove(&customer.customer_id).unwrap_or_default();
            }
        }
        Ok(())
    }
}

impl Queryable for Employee {
    fn source() -> QuerySource {
        EntityKind::Employee.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            employee_id: row.get("employee_id")?,
            last_name: row.get("last_name")?,
            first_name: row.get("first_name")?,
            title: row.get("title")?,
            birth_date: row.get("birth_date")?,
            hire_date: row.get("hire_date")?,
            city: row.get("city")?,
            country: row.get("country")?,
            reports_to_employee_id: row.get("reports_to_employee_id")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
        })
    }
}

impl Queryable for EmployeeTerritory {
    fn source() -> QuerySource {
        EntityKind::EmployeeTerritory.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            employee_id: row.get("employee_id")?,
            territory_id: row.get("territory_id")?,
        })
    }
}

impl Queryable for Product {
    fn source() -> QuerySource {
        EntityKind::Product.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            product_id: row.get("product_id")?,
            product_name: row.get("product_name")?,
            supplier_id: row.get("supplier_id")?,
            category_id: row.get("category_id")?,
            quantity_per_unit: row.get("quantity_per_unit")?,
            unit_price: row.get("unit_price")?,
            units_in_stock: row.get("units_in_stock")?,
            discontinued: row.get("discontinued")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
        })
    }
}

impl Queryable for Order {
    fn source() -> QuerySource {
        EntityKind::Order.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            order_id: row.get("order_id")?,
            customer_id: parse_optional_uuid(row, "customer_id")?,
            employee_id: row.get("employee_id")?,
            order_date: row.get("order_date")?,
            required_date: row.get("required_date")?,
            shipped_date: row.get("shipped_date")?,
            freight: row.get("freight")?,
            ship_name: row.get("ship_name")?,
            ship_city: row.get("ship_city")?,
            ship_country: row.get("ship_country")?,
            row_version: row.get("row_version")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
            customer: None,
            order_details: Vec::new(),
        })
    }

    fn load_includes(
        rows: &mut [Self],
        includes: &[Include],
        scope: Option<UserSessionId>,
        conn: &Connection,
    ) -> RepoResult<()> {
        for include in includes {
            match include {
                Include::Customer => {
                    let mut ids: Vec<Uuid> = rows.iter().filter_map(|o| o.customer_id).collect();
                    ids.sort_unstable();
                    ids.dedup();
                    let query = EntityQuery::<Customer>::new().with_scope(scope);
                    let keys = ids.into_iter().map(uuid_value).collect();
                    let customers: HashMap<Uuid, Customer> =
                        load_for_keys(&query, "customer_id", keys, conn)?
                            .into_iter()
                            .map(|customer| (customer.customer_id, customer))
                            .collect();
                    for order in rows.iter_mut() {
                        order.customer = order
                            .customer_id
                            .and_then(|id| customers.get(&id))
                            .map(|customer| Box::new(customer.clone()));
                    }
                }
                Include::OrderDetails => {
                    let ids = rows.iter().map(|o| Value::Integer(o.order_id)).collect();
                    let mut by_order: HashMap<i64, Vec<OrderDetail>> = HashMap::new();
                    let query = EntityQuery::<OrderDetail>::new().with_scope(scope);
                    let details = load_for_keys(&query, "order_id", ids, conn)?;
                    for detail in details {
                        by_order.entry(detail.order_id).or_default().push(detail);
                    }
                    for order in rows.iter_mut() {
                        order.order_details = by_order.remove(&order.order_id).unwrap_or_default();
                    }
                }
                other => return Err(unsupported::<Self>(*other)),
            }
        }
        Ok(())
    }
}

impl Queryable for OrderDetail {
    fn source() -> QuerySource {
        EntityKind::OrderDetail.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            order_id: row.get("order_id")?,
            product_id: row.get("product_id")?,
            unit_price: row.get("unit_price")?,
            quantity: row.get("quantity")?,
            discount: row.get("discount")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
        })
    }
}

impl Queryable for InternationalOrder {
    fn source() -> QuerySource {
        EntityKind::InternationalOrder.meta().into()
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            order_id: row.get("order_id")?,
            customs_description: row.get("customs_description")?,
            excise_tax: row.get("excise_tax")?,
            row_version: row.get("row_version")?,
            user_session_id: parse_optional_uuid(row, "user_session_id")?,
        })
    }
}

impl Queryable for UserPartial {
    /// Reads only the non-sensitive user columns.
    fn source() -> QuerySource {
        QuerySource {
            table: EntityKind::User.meta().table,
            select_list: "id, user_name, first_name, last_name".to_string(),
            session_scoped: true,
            order_by: "id".to_string(),
        }
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_name: row.get("user_name")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: None,
            roles: None,
        })
    }
}
