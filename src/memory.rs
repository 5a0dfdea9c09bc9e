//! In-process demo backend
//!
//! `MemoryRecordApi` keeps one record list per entity behind a mutex and
//! assigns auto-incrementing numeric ids on create. It backs the demo mode
//! and the tests.

use crate::api::{ListParams, RecordApi, RecordPage};
use crate::error::TableError;
use crate::record::{FieldValue, Record, RecordId};
use crate::session::{SessionApi, SessionStatus};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Clones share the same tables
#[derive(Clone)]
pub struct MemoryRecordApi {
    id_field: String,
    tables: Arc<Mutex<HashMap<String, Vec<Record>>>>,
}

impl Default for MemoryRecordApi {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(entity: &str, id: &RecordId) -> TableError {
    TableError::Application {
        status: Some(404),
        message: format!("No {} record with id {}", entity, id),
    }
}

impl MemoryRecordApi {
    pub fn new() -> Self {
        MemoryRecordApi {
            id_field: "id".to_string(),
            tables: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_seed(self, entity: impl Into<String>, records: Vec<Record>) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(entity.into(), records);
        }
        self
    }

    /// A backend pre-filled with a small pharmacy data set
    pub fn demo() -> Self {
        MemoryRecordApi::new()
            .with_seed("customers", demo_customers())
            .with_seed("medicines", demo_medicines())
            .with_seed("suppliers", demo_suppliers())
            .with_seed("users", demo_users())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Record>>>, TableError> {
        self.tables
            .lock()
            .map_err(|_| TableError::application("demo backend is unavailable"))
    }

    pub fn count(&self, entity: &str) -> usize {
        self.lock()
            .map(|t| t.get(entity).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    fn next_id(&self, records: &[Record]) -> i64 {
        records
            .iter()
            .filter_map(|r| r.get(&self.id_field).and_then(FieldValue::as_f64))
            .map(|id| id as i64)
            .max()
            .map_or(1, |id| id.saturating_add(1))
    }

    fn matches(record: &Record, params: &ListParams) -> bool {
        let search_ok = match params.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let needle = term.to_lowercase();
                record
                    .fields()
                    .any(|(_, v)| v.search_text().map(|t| t.contains(&needle)).unwrap_or(false))
            }
            _ => true,
        };
        search_ok
            && params
                .filters
                .iter()
                .all(|(field, value)| record.get(field).map(|v| v.to_string() == *value).unwrap_or(false))
    }
}

impl RecordApi for MemoryRecordApi {
    async fn list(&self, entity: &str, params: &ListParams) -> Result<RecordPage, TableError> {
        let tables = self.lock()?;
        let matched: Vec<Record> = tables
            .get(entity)
            .map(|rows| rows.iter().filter(|r| Self::matches(r, params)).cloned().collect())
            .unwrap_or_default();

        let total = matched.len();
        let records = match params.limit {
            Some(limit) if limit > 0 => {
                let page = params.page.unwrap_or(1).max(1);
                matched.into_iter().skip((page - 1) * limit).take(limit).collect()
            }
            _ => matched,
        };
        Ok(RecordPage { records, total })
    }

    async fn get(&self, entity: &str, id: &RecordId) -> Result<Record, TableError> {
        let tables = self.lock()?;
        tables
            .get(entity)
            .and_then(|rows| rows.iter().find(|r| r.id(&self.id_field).as_ref() == Some(id)))
            .cloned()
            .ok_or_else(|| not_found(entity, id))
    }

    async fn create(&self, entity: &str, fields: &Record) -> Result<Option<Record>, TableError> {
        let mut tables = self.lock()?;
        let rows = tables.entry(entity.to_string()).or_default();

        let mut record = fields.clone();
        let id = self.next_id(rows);
        record.set(self.id_field.clone(), id);
        debug!("demo backend created {} {}", entity, id);
        rows.push(record.clone());
        Ok(Some(record))
    }

    async fn update(
        &self,
        entity: &str,
        id: &RecordId,
        fields: &Record,
    ) -> Result<Option<Record>, TableError> {
        let mut tables = self.lock()?;
        let record = tables
            .get_mut(entity)
            .and_then(|rows| rows.iter_mut().find(|r| r.id(&self.id_field).as_ref() == Some(id)))
            .ok_or_else(|| not_found(entity, id))?;

        let id_value = record.get(&self.id_field).cloned();
        record.merge(fields);
        // The id is not editable
        if let Some(v) = id_value {
            record.set(self.id_field.clone(), v);
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, entity: &str, id: &RecordId) -> Result<(), TableError> {
        let mut tables = self.lock()?;
        let rows = tables.get_mut(entity).ok_or_else(|| not_found(entity, id))?;
        let before = rows.len();
        rows.retain(|r| r.id(&self.id_field).as_ref() != Some(id));
        if rows.len() == before {
            return Err(not_found(entity, id));
        }
        Ok(())
    }
}

impl SessionApi for MemoryRecordApi {
    async fn check_session(&self) -> Result<SessionStatus, TableError> {
        Ok(SessionStatus::Valid)
    }
}

fn demo_customers() -> Vec<Record> {
    [
        (1, "Jane Doe", "jane@example.com", "+1 555 0101", "Active", 1250.0, "2024-01-15"),
        (2, "John Smith", "john.smith@example.com", "+1 555 0102", "VIP", 8420.5, "2023-11-02"),
        (3, "Amina Yusuf", "amina@example.com", "+254 700 123456", "Active", 310.75, "2024-03-20"),
        (4, "Carlos Diaz", "carlos@example.com", "+34 600 111 222", "Inactive", 0.0, "2022-07-09"),
        (5, "Mei Lin", "mei.lin@example.com", "+86 138 0000 0000", "Active", 560.0, "2024-02-28"),
    ]
    .into_iter()
    .map(|(id, name, email, phone, status, total, created)| {
        Record::new()
            .with("id", id as i64)
            .with("name", name)
            .with("email", email)
            .with("phone", phone)
            .with("status", status)
            .with("total_purchases", total)
            .with("created_at", created)
    })
    .collect()
}

fn demo_medicines() -> Vec<Record> {
    [
        (1, "Paracetamol 500mg", "Acetaminophen", "Tablet", 4.5, 240, "2027-05-01", "Available"),
        (2, "Amoxicillin 250mg", "Amoxicillin", "Capsule", 12.0, 8, "2026-12-15", "Low Stock"),
        (3, "Ibuprofen 400mg", "Ibuprofen", "Tablet", 6.25, 0, "2027-01-31", "Out of Stock"),
        (4, "Cetirizine Syrup", "Cetirizine", "Syrup", 3.8, 75, "2027-03-10", "Available"),
        (5, "Metformin 500mg", "Metformin", "Tablet", 9.99, 5, "2026-11-20", "Low Stock"),
    ]
    .into_iter()
    .map(|(id, name, generic, category, price, stock, expiry, status)| {
        Record::new()
            .with("id", id as i64)
            .with("name", name)
            .with("generic_name", generic)
            .with("category", category)
            .with("price", price)
            .with("stock_quantity", stock as i64)
            .with("expiry_date", expiry)
            .with("status", status)
    })
    .collect()
}

fn demo_suppliers() -> Vec<Record> {
    [
        (1, "MedSupply Ltd", "Grace Otieno", "orders@medsupply.example", "+254 711 000111", "Active"),
        (2, "PharmaDirect", "Tom Becker", "tom@pharmadirect.example", "+49 30 123456", "Active"),
        (3, "HealthLine Wholesale", "Priya Nair", "priya@healthline.example", "+91 98 7654 3210", "Inactive"),
    ]
    .into_iter()
    .map(|(id, name, contact, email, phone, status)| {
        Record::new()
            .with("id", id as i64)
            .with("name", name)
            .with("contact_person", contact)
            .with("email", email)
            .with("phone", phone)
            .with("status", status)
    })
    .collect()
}

fn demo_users() -> Vec<Record> {
    [
        (1, "admin", "System Administrator", "admin@pharmacy.example", "admin", "Active"),
        (2, "pkamau", "Peter Kamau", "peter@pharmacy.example", "pharmacist", "Active"),
        (3, "lwanjiru", "Lucy Wanjiru", "lucy@pharmacy.example", "cashier", "Inactive"),
    ]
    .into_iter()
    .map(|(id, username, full_name, email, role, status)| {
        Record::new()
            .with("id", id as i64)
            .with("username", username)
            .with("full_name", full_name)
            .with("email", email)
            .with("role", role)
            .with("status", status)
            .with("last_login", FieldValue::Null)
    })
    .collect()
}
