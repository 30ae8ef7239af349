//! Storage metadata for every entity the context knows about.
//!
//! # Responsibility
//! - Map client-facing property names to table columns and data types.
//! - Record keys, key generation, concurrency columns and session scoping.
//! - Describe navigation properties for the metadata document.
//!
//! # Invariants
//! - `EntityKind` declaration order is parent-first: inserts follow it and
//!   deletes run in reverse.
//! - Every session-scoped entity has a nullable `UserSessionId` column.

use serde::Serialize;

/// Property name of the session-ownership column on every saveable entity.
pub const SESSION_PROPERTY: &str = "UserSessionId";
/// Column name of the session-ownership column on every saveable entity.
pub const SESSION_COLUMN: &str = "user_session_id";

/// Every entity type reachable through the persistence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Category,
    Region,
    Territory,
    Supplier,
    Customer,
    Employee,
    EmployeeTerritory,
    Product,
    Order,
    OrderDetail,
    InternationalOrder,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Category,
        EntityKind::Region,
        EntityKind::Territory,
        EntityKind::Supplier,
        EntityKind::Customer,
        EntityKind::Employee,
        EntityKind::EmployeeTerritory,
        EntityKind::Product,
        EntityKind::Order,
        EntityKind::OrderDetail,
        EntityKind::InternationalOrder,
        EntityKind::User,
    ];

    /// Short type name used in save bundles and metadata.
    pub fn name(self) -> &'static str {
        self.meta().name
    }

    pub fn meta(self) -> &'static EntityMeta {
        match self {
            Self::Category => &CATEGORY,
            Self::Region => &REGION,
            Self::Territory => &TERRITORY,
            Self::Supplier => &SUPPLIER,
            Self::Customer => &CUSTOMER,
            Self::Employee => &EMPLOYEE,
            Self::EmployeeTerritory => &EMPLOYEE_TERRITORY,
            Self::Product => &PRODUCT,
            Self::Order => &ORDER,
            Self::OrderDetail => &ORDER_DETAIL,
            Self::InternationalOrder => &INTERNATIONAL_ORDER,
            Self::User => &USER,
        }
    }

    /// Resolves a bundle type name such as `Customer:#Northwind.Models`.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let short = type_name
            .split_once(':')
            .map_or(type_name, |(short, _)| short)
            .trim();
        Self::ALL.into_iter().find(|kind| kind.name() == short)
    }
}

/// Scalar storage type of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    Guid,
    Int32,
    Int64,
    Decimal,
    String,
    DateTime,
    Boolean,
}

/// One scalar property and the column that stores it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMeta {
    pub property: &'static str,
    pub column: &'static str,
    pub data_type: DataType,
    pub nullable: bool,
    /// Entity whose key this column refers to.
    pub references: Option<EntityKind>,
}

/// Relationship from one entity to another.
#[derive(Debug, Clone, Copy)]
pub struct NavigationMeta {
    pub name: &'static str,
    pub target: EntityKind,
    pub is_scalar: bool,
    /// Property names of the foreign key, on whichever side owns it.
    pub foreign_keys: &'static [&'static str],
}

/// Storage description of one entity type.
#[derive(Debug)]
pub struct EntityMeta {
    pub kind: EntityKind,
    pub name: &'static str,
    pub table: &'static str,
    /// Key columns in declaration order.
    pub keys: &'static [&'static str],
    /// Whether the single key column is assigned by the database.
    pub key_generated: bool,
    pub concurrency_column: Option<&'static str>,
    pub session_scoped: bool,
    /// Identity tables are hidden from the client metadata document.
    pub exposed_in_metadata: bool,
    pub columns: &'static [ColumnMeta],
    pub navigations: &'static [NavigationMeta],
}

impl EntityMeta {
    pub fn column(&self, column: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|meta| meta.column == column)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &'static ColumnMeta> + '_ {
        self.keys.iter().filter_map(|key| self.column(key))
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.keys.contains(&column)
    }

    /// Comma-separated select list in declaration order.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|meta| meta.column)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

const fn col(
    property: &'static str,
    column: &'static str,
    data_type: DataType,
    nullable: bool,
) -> ColumnMeta {
    ColumnMeta {
        property,
        column,
        data_type,
        nullable,
        references: None,
    }
}

const fn fk(
    property: &'static str,
    column: &'static str,
    data_type: DataType,
    nullable: bool,
    target: EntityKind,
) -> ColumnMeta {
    ColumnMeta {
        property,
        column,
        data_type,
        nullable,
        references: Some(target),
    }
}

const fn nav(
    name: &'static str,
    target: EntityKind,
    is_scalar: bool,
    foreign_keys: &'static [&'static str],
) -> NavigationMeta {
    NavigationMeta {
        name,
        target,
        is_scalar,
        foreign_keys,
    }
}

const SESSION: ColumnMeta = col(SESSION_PROPERTY, SESSION_COLUMN, DataType::Guid, true);
const ROW_VERSION: ColumnMeta = col("RowVersion", "row_version", DataType::Int32, false);

static CATEGORY: EntityMeta = EntityMeta {
    kind: EntityKind::Category,
    name: "Category",
    table: "categories",
    keys: &["category_id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: false,
    exposed_in_metadata: true,
    columns: &[
        col("CategoryID", "category_id", DataType::Int32, false),
        col("CategoryName", "category_name", DataType::String, false),
        col("Description", "description", DataType::String, true),
    ],
    navigations: &[nav("Products", EntityKind::Product, false, &["CategoryID"])],
};

static REGION: EntityMeta = EntityMeta {
    kind: EntityKind::Region,
    name: "Region",
    table: "regions",
    keys: &["region_id"],
    key_generated: false,
    concurrency_column: None,
    session_scoped: false,
    exposed_in_metadata: true,
    columns: &[
        col("RegionID", "region_id", DataType::Int32, false),
        col("RegionDescription", "region_description", DataType::String, false),
    ],
    navigations: &[nav("Territories", EntityKind::Territory, false, &["RegionID"])],
};

static TERRITORY: EntityMeta = EntityMeta {
    kind: EntityKind::Territory,
    name: "Territory",
    table: "territories",
    keys: &["territory_id"],
    key_generated: false,
    concurrency_column: None,
    session_scoped: false,
    exposed_in_metadata: true,
    columns: &[
        col("TerritoryID", "territory_id", DataType::Int32, false),
        col(
            "TerritoryDescription",
            "territory_description",
            DataType::String,
            false,
        ),
        fk("RegionID", "region_id", DataType::Int32, false, EntityKind::Region),
    ],
    navigations: &[nav("Region", EntityKind::Region, true, &["RegionID"])],
};

static SUPPLIER: EntityMeta = EntityMeta {
    kind: EntityKind::Supplier,
    name: "Supplier",
    table: "suppliers",
    keys: &["supplier_id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: false,
    exposed_in_metadata: true,
    columns: &[
        col("SupplierID", "supplier_id", DataType::Int32, false),
        col("CompanyName", "company_name", DataType::String, false),
        col("ContactName", "contact_name", DataType::String, true),
        col("City", "city", DataType::String, true),
        col("Country", "country", DataType::String, true),
    ],
    navigations: &[nav("Products", EntityKind::Product, false, &["SupplierID"])],
};

static CUSTOMER: EntityMeta = EntityMeta {
    kind: EntityKind::Customer,
    name: "Customer",
    table: "customers",
    keys: &["customer_id"],
    key_generated: false,
    concurrency_column: Some("row_version"),
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        col("CustomerID", "customer_id", DataType::Guid, false),
        col("CompanyName", "company_name", DataType::String, false),
        col("ContactName", "contact_name", DataType::String, true),
        col("ContactTitle", "contact_title", DataType::String, true),
        col("Address", "address", DataType::String, true),
        col("City", "city", DataType::String, true),
        col("Region", "region", DataType::String, true),
        col("PostalCode", "postal_code", DataType::String, true),
        col("Country", "country", DataType::String, true),
        col("Phone", "phone", DataType::String, true),
        col("Fax", "fax", DataType::String, true),
        ROW_VERSION,
        SESSION,
    ],
    navigations: &[nav("Orders", EntityKind::Order, false, &["CustomerID"])],
};

static EMPLOYEE: EntityMeta = EntityMeta {
    kind: EntityKind::Employee,
    name: "Employee",
    table: "employees",
    keys: &["employee_id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        col("EmployeeID", "employee_id", DataType::Int32, false),
        col("LastName", "last_name", DataType::String, false),
        col("FirstName", "first_name", DataType::String, false),
        col("Title", "title", DataType::String, true),
        col("BirthDate", "birth_date", DataType::DateTime, true),
        col("HireDate", "hire_date", DataType::DateTime, true),
        col("City", "city", DataType::String, true),
        col("Country", "country", DataType::String, true),
        fk(
            "ReportsToEmployeeID",
            "reports_to_employee_id",
            DataType::Int32,
            true,
            EntityKind::Employee,
        ),
        SESSION,
    ],
    navigations: &[
        nav("Orders", EntityKind::Order, false, &["EmployeeID"]),
        nav("Manager", EntityKind::Employee, true, &["ReportsToEmployeeID"]),
        nav(
            "EmployeeTerritories",
            EntityKind::EmployeeTerritory,
            false,
            &["EmployeeID"],
        ),
    ],
};

static EMPLOYEE_TERRITORY: EntityMeta = EntityMeta {
    kind: EntityKind::EmployeeTerritory,
    name: "EmployeeTerritory",
    table: "employee_territories",
    keys: &["id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: false,
    exposed_in_metadata: true,
    columns: &[
        col("ID", "id", DataType::Int32, false),
        fk(
            "EmployeeID",
            "employee_id",
            DataType::Int32,
            false,
            EntityKind::Employee,
        ),
        fk(
            "TerritoryID",
            "territory_id",
            DataType::Int32,
            false,
            EntityKind::Territory,
        ),
    ],
    navigations: &[
        nav("Employee", EntityKind::Employee, true, &["EmployeeID"]),
        nav("Territory", EntityKind::Territory, true, &["TerritoryID"]),
    ],
};

static PRODUCT: EntityMeta = EntityMeta {
    kind: EntityKind::Product,
    name: "Product",
    table: "products",
    keys: &["product_id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        col("ProductID", "product_id", DataType::Int32, false),
        col("ProductName", "product_name", DataType::String, false),
        fk(
            "SupplierID",
            "supplier_id",
            DataType::Int32,
            true,
            EntityKind::Supplier,
        ),
        fk(
            "CategoryID",
            "category_id",
            DataType::Int32,
            true,
            EntityKind::Category,
        ),
        col("QuantityPerUnit", "quantity_per_unit", DataType::String, true),
        col("UnitPrice", "unit_price", DataType::Decimal, true),
        col("UnitsInStock", "units_in_stock", DataType::Int32, true),
        col("Discontinued", "discontinued", DataType::Boolean, false),
        SESSION,
    ],
    navigations: &[
        nav("Category", EntityKind::Category, true, &["CategoryID"]),
        nav("Supplier", EntityKind::Supplier, true, &["SupplierID"]),
    ],
};

static ORDER: EntityMeta = EntityMeta {
    kind: EntityKind::Order,
    name: "Order",
    table: "orders",
    keys: &["order_id"],
    key_generated: true,
    concurrency_column: Some("row_version"),
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        col("OrderID", "order_id", DataType::Int32, false),
        fk(
            "CustomerID",
            "customer_id",
            DataType::Guid,
            true,
            EntityKind::Customer,
        ),
        fk(
            "EmployeeID",
            "employee_id",
            DataType::Int32,
            true,
            EntityKind::Employee,
        ),
        col("OrderDate", "order_date", DataType::DateTime, true),
        col("RequiredDate", "required_date", DataType::DateTime, true),
        col("ShippedDate", "shipped_date", DataType::DateTime, true),
        col("Freight", "freight", DataType::Decimal, true),
        col("ShipName", "ship_name", DataType::String, true),
        col("ShipCity", "ship_city", DataType::String, true),
        col("ShipCountry", "ship_country", DataType::String, true),
        ROW_VERSION,
        SESSION,
    ],
    navigations: &[
        nav("Customer", EntityKind::Customer, true, &["CustomerID"]),
        nav("Employee", EntityKind::Employee, true, &["EmployeeID"]),
        nav("OrderDetails", EntityKind::OrderDetail, false, &["OrderID"]),
        nav(
            "InternationalOrder",
            EntityKind::InternationalOrder,
            true,
            &["OrderID"],
        ),
    ],
};

static ORDER_DETAIL: EntityMeta = EntityMeta {
    kind: EntityKind::OrderDetail,
    name: "OrderDetail",
    table: "order_details",
    keys: &["order_id", "product_id"],
    key_generated: false,
    concurrency_column: None,
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        fk("OrderID", "order_id", DataType::Int32, false, EntityKind::Order),
        fk(
            "ProductID",
            "product_id",
            DataType::Int32,
            false,
            EntityKind::Product,
        ),
        col("UnitPrice", "unit_price", DataType::Decimal, false),
        col("Quantity", "quantity", DataType::Int32, false),
        col("Discount", "discount", DataType::Decimal, false),
        SESSION,
    ],
    navigations: &[
        nav("Order", EntityKind::Order, true, &["OrderID"]),
        nav("Product", EntityKind::Product, true, &["ProductID"]),
    ],
};

static INTERNATIONAL_ORDER: EntityMeta = EntityMeta {
    kind: EntityKind::InternationalOrder,
    name: "InternationalOrder",
    table: "international_orders",
    keys: &["order_id"],
    key_generated: false,
    concurrency_column: Some("row_version"),
    session_scoped: true,
    exposed_in_metadata: true,
    columns: &[
        fk("OrderID", "order_id", DataType::Int32, false, EntityKind::Order),
        col(
            "CustomsDescription",
            "customs_description",
            DataType::String,
            false,
        ),
        col("ExciseTax", "excise_tax", DataType::Decimal, false),
        ROW_VERSION,
        SESSION,
    ],
    navigations: &[nav("Order", EntityKind::Order, true, &["OrderID"])],
};

static USER: EntityMeta = EntityMeta {
    kind: EntityKind::User,
    name: "User",
    table: "users",
    keys: &["id"],
    key_generated: true,
    concurrency_column: None,
    session_scoped: true,
    exposed_in_metadata: false,
    columns: &[
        col("Id", "id", DataType::Int64, false),
        col("UserName", "user_name", DataType::String, false),
        col("FirstName", "first_name", DataType::String, true),
        col("LastName", "last_name", DataType::String, true),
        col("Email", "email", DataType::String, true),
        SESSION,
    ],
    navigations: &[],
};
