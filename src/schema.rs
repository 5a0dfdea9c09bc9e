//! Entity schemas
//!
//! An `EntitySchema` describes one screen's record type to the generic table
//! machinery: which columns are shown and how they are formatted, which fields
//! the search box looks at, which dropdown filters exist, how summary counters
//! are computed and which validation rules apply to create/update forms.
//!
//! # Examples
//!
//! ```
//! use pharmatable::{EntitySchema, ColumnDef, FieldKind};
//!
//! let schema = EntitySchema::new("branches")
//!     .column(ColumnDef::new("name", "Branch", FieldKind::Text))
//!     .column(ColumnDef::new("opened_at", "Opened", FieldKind::Date))
//!     .search_fields(&["name"])
//!     .page_size(20);
//!
//! assert_eq!(schema.entity(), "branches");
//! assert_eq!(schema.kind_of("opened_at"), FieldKind::Date);
//! assert_eq!(schema.default_page_size(), 20);
//! ```

use crate::validate::FieldRule;
use crate::view::SortKey;

/// How a field is compared and displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    /// Free text, sorted case-insensitively
    #[default]
    Text,
    /// Plain number
    Number,
    /// Money amount, formatted with the configured currency symbol
    Currency,
    /// ISO date or datetime (`YYYY-MM-DD[ HH:MM:SS]`)
    Date,
    /// Enumerated value (status, role, category) rendered as a badge
    Badge,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Currency)
    }
}

/// A visible table column
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub field: String,
    pub label: String,
    pub kind: FieldKind,
    pub sortable: bool,
}

impl ColumnDef {
    pub fn new(field: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        ColumnDef {
            field: field.into(),
            label: label.into(),
            kind,
            sortable: true,
        }
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }
}

/// A dropdown filter. `name` is what the UI sends, `field` is what it constrains.
#[derive(Debug, Clone)]
pub struct FilterDef {
    pub name: String,
    pub field: String,
    pub label: String,
    pub options: Vec<String>,
}

impl FilterDef {
    pub fn new(name: impl Into<String>, field: impl Into<String>, label: impl Into<String>) -> Self {
        FilterDef {
            name: name.into(),
            field: field.into(),
            label: label.into(),
            options: Vec::new(),
        }
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// How a summary counter is computed over the full record set
#[derive(Debug, Clone, PartialEq)]
pub enum CounterRule {
    /// Number of records
    Total,
    /// Records whose field text equals `value`
    Equals { field: String, value: String },
    /// Records whose numeric field is at or below `threshold` (low stock)
    Below { field: String, threshold: f64 },
    /// Records whose date field falls within the last `days` days (new)
    RecentDays { field: String, days: i64 },
    /// Records whose date field falls within the next `days` days (expiring)
    DueWithinDays { field: String, days: i64 },
    /// Sum of a numeric field, displayed as currency
    Sum { field: String },
}

#[derive(Debug, Clone)]
pub struct CounterDef {
    pub label: String,
    pub rule: CounterRule,
}

impl CounterDef {
    pub fn new(label: impl Into<String>, rule: CounterRule) -> Self {
        CounterDef {
            label: label.into(),
            rule,
        }
    }
}

/// Schema of one entity type (one admin screen)
#[derive(Debug, Clone)]
pub struct EntitySchema {
    entity: String,
    title: String,
    id_field: String,
    label_field: String,
    columns: Vec<ColumnDef>,
    search_fields: Vec<String>,
    filters: Vec<FilterDef>,
    counters: Vec<CounterDef>,
    rules: Vec<(String, FieldRule)>,
    page_size: usize,
    default_sort: Option<SortKey>,
}

impl EntitySchema {
    /// Creates an empty schema for the API entity `entity` (e.g. "customers").
    pub fn new(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        EntitySchema {
            title: entity.clone(),
            entity,
            id_field: "id".to_string(),
            label_field: "name".to_string(),
            columns: Vec::new(),
            search_fields: Vec::new(),
            filters: Vec::new(),
            counters: Vec::new(),
            rules: Vec::new(),
            page_size: 10,
            default_sort: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Field used to name a record in prompts ("Delete Jane Doe?")
    pub fn label_field(mut self, field: impl Into<String>) -> Self {
        self.label_field = field.into();
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn search_fields(mut self, fields: &[&str]) -> Self {
        self.search_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: FilterDef) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn counter(mut self, counter: CounterDef) -> Self {
        self.counters.push(counter);
        self
    }

    pub fn rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.push((field.into(), rule));
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn default_sort(mut self, key: SortKey) -> Self {
        self.default_sort = Some(key);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn display_title(&self) -> &str {
        &self.title
    }

    pub fn get_id_field(&self) -> &str {
        &self.id_field
    }

    pub fn get_label_field(&self) -> &str {
        &self.label_field
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn get_search_fields(&self) -> &[String] {
        &self.search_fields
    }

    pub fn filters(&self) -> &[FilterDef] {
        &self.filters
    }

    pub fn counters(&self) -> &[CounterDef] {
        &self.counters
    }

    pub fn rules(&self) -> &[(String, FieldRule)] {
        &self.rules
    }

    pub fn default_page_size(&self) -> usize {
        self.page_size
    }

    pub fn get_default_sort(&self) -> Option<&SortKey> {
        self.default_sort.as_ref()
    }

    pub fn get_column(&self, field: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Kind of a field. Fields without a column are treated as text.
    pub fn kind_of(&self, field: &str) -> FieldKind {
        self.get_column(field).map(|c| c.kind).unwrap_or_default()
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.get_column(field).map(|c| c.sortable).unwrap_or(false)
    }

    /// Resolves a filter name to the field it constrains. Unknown names are
    /// taken to be field names.
    pub fn filter_field<'a>(&'a self, name: &'a str) -> &'a str {
        self.filters
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field.as_str())
            .unwrap_or(name)
    }

    // ==================== Pharmacy screens ====================

    pub fn customers() -> Self {
        EntitySchema::new("customers")
            .title("Customers")
            .column(ColumnDef::new("name", "Name", FieldKind::Text))
            .column(ColumnDef::new("email", "Email", FieldKind::Text))
            .column(ColumnDef::new("phone", "Phone", FieldKind::Text).unsortable())
            .column(ColumnDef::new("status", "Status", FieldKind::Badge))
            .column(ColumnDef::new("total_purchases", "Total Purchases", FieldKind::Currency))
            .column(ColumnDef::new("created_at", "Joined", FieldKind::Date))
            .search_fields(&["name", "email", "phone", "address"])
            .filter(
                FilterDef::new("status", "status", "Status")
                    .options(&["Active", "Inactive", "VIP"]),
            )
            .counter(CounterDef::new("Total Customers", CounterRule::Total))
            .counter(CounterDef::new(
                "Active",
                CounterRule::Equals {
                    field: "status".to_string(),
                    value: "Active".to_string(),
                },
            ))
            .counter(CounterDef::new(
                "New This Month",
                CounterRule::RecentDays {
                    field: "created_at".to_string(),
                    days: 30,
                },
            ))
            .rule("name", FieldRule::Required)
            .rule("email", FieldRule::Email)
            .rule("phone", FieldRule::Phone)
            .default_sort(SortKey::ascending("name"))
    }

    pub fn medicines() -> Self {
        EntitySchema::new("medicines")
            .title("Medicines")
            .column(ColumnDef::new("name", "Name", FieldKind::Text))
            .column(ColumnDef::new("generic_name", "Generic Name", FieldKind::Text))
            .column(ColumnDef::new("category", "Category", FieldKind::Badge))
            .column(ColumnDef::new("price", "Price", FieldKind::Currency))
            .column(ColumnDef::new("stock_quantity", "Stock", FieldKind::Number))
            .column(ColumnDef::new("expiry_date", "Expiry", FieldKind::Date))
            .column(ColumnDef::new("status", "Status", FieldKind::Badge))
            .search_fields(&["name", "generic_name", "manufacturer", "batch_number"])
            .filter(FilterDef::new("category", "category", "Category").options(&[
                "Tablet",
                "Capsule",
                "Syrup",
                "Injection",
                "Ointment",
            ]))
            .filter(
                FilterDef::new("status", "status", "Status")
                    .options(&["Available", "Low Stock", "Out of Stock", "Expired"]),
            )
            .counter(CounterDef::new("Total Medicines", CounterRule::Total))
            .counter(CounterDef::new(
                "Low Stock",
                CounterRule::Below {
                    field: "stock_quantity".to_string(),
                    threshold: 10.0,
                },
            ))
            .counter(CounterDef::new(
                "Expiring Soon",
                CounterRule::DueWithinDays {
                    field: "expiry_date".to_string(),
                    days: 90,
                },
            ))
            .counter(CounterDef::new(
                "Inventory Value",
                CounterRule::Sum {
                    field: "price".to_string(),
                },
            ))
            .rule("name", FieldRule::Required)
            .rule("category", FieldRule::Required)
            .rule("price", FieldRule::Required)
            .rule("price", FieldRule::NonNegative)
            .rule("stock_quantity", FieldRule::NonNegative)
            .default_sort(SortKey::ascending("name"))
    }

    pub fn suppliers() -> Self {
        EntitySchema::new("suppliers")
            .title("Suppliers")
            .column(ColumnDef::new("name", "Company", FieldKind::Text))
            .column(ColumnDef::new("contact_person", "Contact", FieldKind::Text))
            .column(ColumnDef::new("email", "Email", FieldKind::Text))
            .column(ColumnDef::new("phone", "Phone", FieldKind::Text).unsortable())
            .column(ColumnDef::new("status", "Status", FieldKind::Badge))
            .search_fields(&["name", "contact_person", "email", "phone"])
            .filter(FilterDef::new("status", "status", "Status").options(&["Active", "Inactive"]))
            .counter(CounterDef::new("Total Suppliers", CounterRule::Total))
            .counter(CounterDef::new(
                "Active",
                CounterRule::Equals {
                    field: "status".to_string(),
                    value: "Active".to_string(),
                },
            ))
            .rule("name", FieldRule::Required)
            .rule("contact_person", FieldRule::Required)
            .rule("email", FieldRule::Email)
            .rule("phone", FieldRule::Phone)
            .default_sort(SortKey::ascending("name"))
    }

    pub fn users() -> Self {
        EntitySchema::new("users")
            .title("Users")
            .label_field("username")
            .column(ColumnDef::new("username", "Username", FieldKind::Text))
            .column(ColumnDef::new("full_name", "Full Name", FieldKind::Text))
            .column(ColumnDef::new("email", "Email", FieldKind::Text))
            .column(ColumnDef::new("role", "Role", FieldKind::Badge))
            .column(ColumnDef::new("status", "Status", FieldKind::Badge))
            .column(ColumnDef::new("last_login", "Last Login", FieldKind::Date))
            .search_fields(&["username", "full_name", "email"])
            .filter(
                FilterDef::new("role", "role", "Role")
                    .options(&["admin", "pharmacist", "cashier"]),
            )
            .filter(FilterDef::new("status", "status", "Status").options(&["Active", "Inactive"]))
            .counter(CounterDef::new("Total Users", CounterRule::Total))
            .counter(CounterDef::new(
                "Pharmacists",
                CounterRule::Equals {
                    field: "role".to_string(),
                    value: "pharmacist".to_string(),
                },
            ))
            .counter(CounterDef::new(
                "Cashiers",
                CounterRule::Equals {
                    field: "role".to_string(),
                    value: "cashier".to_string(),
                },
            ))
            .rule("username", FieldRule::Required)
            .rule("username", FieldRule::MinLength(3))
            .rule("email", FieldRule::Email)
            .rule("role", FieldRule::Required)
            .default_sort(SortKey::ascending("username"))
    }

    /// Looks up one of the built-in pharmacy screens by entity name
    pub fn builtin(entity: &str) -> Option<Self> {
        match entity {
            "customers" => Some(Self::customers()),
            "medicines" => Some(Self::medicines()),
            "suppliers" => Some(Self::suppliers()),
            "users" => Some(Self::users()),
            _ => None,
        }
    }
}
