//! Filter / sort / paginate view over an in-memory record set
//!
//! `apply` is a pure function of `(records, schema, query)`: nothing outside
//! its arguments influences the page it returns. Every admin screen uses this
//! one transform, parameterized by its `EntitySchema`.

use crate::record::{FieldValue, Record};
use crate::schema::{CounterRule, EntitySchema, FieldKind};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Filter value meaning "no constraint"
pub const FILTER_ALL: &str = "all";

/// Sort order specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (smallest first)
    Ascending,
    /// Descending order (largest first)
    Descending,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

/// A sort key specifying a field and order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Field name to sort by
    pub field: String,
    /// Sort order (ascending or descending)
    pub order: SortOrder,
    /// Whether NULL values should be placed first or last
    #[serde(default)]
    pub nulls_first: bool,
}

impl SortKey {
    /// Create a new sort key with ascending order (nulls last)
    pub fn ascending(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            order: SortOrder::Ascending,
            nulls_first: false,
        }
    }

    /// Create a new sort key with descending order (nulls last)
    pub fn descending(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            order: SortOrder::Descending,
            nulls_first: false,
        }
    }

    pub fn new(field: impl Into<String>, order: SortOrder, nulls_first: bool) -> Self {
        SortKey {
            field: field.into(),
            order,
            nulls_first,
        }
    }
}

/// Search, filter, sort and page state of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub sort: Option<SortKey>,
    pub page: usize,
    pub page_size: usize,
}

impl TableQuery {
    pub fn new(page_size: usize) -> Self {
        TableQuery {
            search: String::new(),
            filters: BTreeMap::new(),
            sort: None,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    /// Starting query for a schema: its page size and default sort
    pub fn for_schema(schema: &EntitySchema) -> Self {
        let mut query = TableQuery::new(schema.default_page_size());
        query.sort = schema.get_default_sort().cloned();
        query
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort = Some(key);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Filters whose value actually constrains the result
    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.filters
            .iter()
            .filter(|(_, v)| is_active_filter(v))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn is_active_filter(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && !v.eq_ignore_ascii_case(FILTER_ALL)
}

/// Derived page of a table. Never stored; recomputed from state.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
    pub rows: Vec<&'a Record>,
    pub total_count: usize,
    pub total_pages: usize,
    /// Clamped 1-indexed page actually shown
    pub page: usize,
    pub page_size: usize,
}

impl<'a> PageView<'a> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 1-indexed position of the first row shown, 0 when empty
    pub fn first_index(&self) -> usize {
        if self.rows.is_empty() {
            0
        } else {
            (self.page - 1) * self.page_size + 1
        }
    }

    /// 1-indexed position of the last row shown, 0 when empty
    pub fn last_index(&self) -> usize {
        if self.rows.is_empty() {
            0
        } else {
            self.first_index() + self.rows.len() - 1
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Number of pages needed for `total_count` rows; 0 when there are none
pub fn total_pages(total_count: usize, page_size: usize) -> usize {
    total_count.div_ceil(page_size.max(1))
}

/// Clamps a requested page into `[1, max(total_pages, 1)]`
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.clamp(1, total_pages.max(1))
}

/// Applies search, filters, sort and pagination to `records`.
pub fn apply<'a>(records: &'a [Record], schema: &EntitySchema, query: &TableQuery) -> PageView<'a> {
    let matched = filter_and_sort(records, schema, query);

    let page_size = query.page_size.max(1);
    let total_count = matched.len();
    let total_pages = total_pages(total_count, page_size);
    let page = clamp_page(query.page, total_pages);

    let rows = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    PageView {
        rows,
        total_count,
        total_pages,
        page,
        page_size,
    }
}

/// Search + filter + sort without pagination
pub fn filter_and_sort<'a>(
    records: &'a [Record],
    schema: &EntitySchema,
    query: &TableQuery,
) -> Vec<&'a Record> {
    let needle = query.search.trim().to_lowercase();
    let filters: Vec<(&str, &str)> = query
        .active_filters()
        .map(|(name, value)| (schema.filter_field(name), value))
        .collect();

    let mut matched: Vec<&Record> = records
        .iter()
        .filter(|r| matches_search(r, schema.get_search_fields(), &needle))
        .filter(|r| matches_filters(r, &filters))
        .collect();

    if let Some(key) = &query.sort {
        let kind = schema.kind_of(&key.field);
        // sort_by is stable: ties keep their original relative order
        matched.sort_by(|a, b| compare_values(a.get(&key.field), b.get(&key.field), kind, key));
    }

    matched
}

/// True if the lowercased `needle` occurs in any of `fields`. An empty needle
/// matches everything.
pub fn matches_search(record: &Record, fields: &[String], needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    fields.iter().any(|field| {
        record
            .get(field)
            .and_then(FieldValue::search_text)
            .map(|text| text.contains(needle))
            .unwrap_or(false)
    })
}

fn matches_filters(record: &Record, filters: &[(&str, &str)]) -> bool {
    filters.iter().all(|(field, value)| match record.get(field) {
        Some(v) if !v.is_null() => v.to_string() == *value,
        _ => false,
    })
}

/// Compare two field values according to a sort key and field kind
pub fn compare_values(
    val_a: Option<&FieldValue>,
    val_b: Option<&FieldValue>,
    kind: FieldKind,
    key: &SortKey,
) -> Ordering {
    let a = val_a.filter(|v| !v.is_null());
    let b = val_b.filter(|v| !v.is_null());

    // Null placement does not flip with the sort order
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => {
            return if key.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        (Some(_), None) => {
            return if key.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        (Some(a), Some(b)) => (a, b),
    };

    let base_cmp = if kind.is_numeric() {
        compare_parsed(a, b, FieldValue::as_f64, |x, y| x.total_cmp(y))
    } else if kind == FieldKind::Date {
        compare_parsed(a, b, parse_date, |x, y| x.cmp(y))
    } else {
        compare_text(a, b)
    };

    match key.order {
        SortOrder::Ascending => base_cmp,
        SortOrder::Descending => base_cmp.reverse(),
    }
}

/// Values that parse sort before values that don't; each group is
/// ordered on its own so the comparison stays a total order.
fn compare_parsed<T>(
    a: &FieldValue,
    b: &FieldValue,
    parse: impl Fn(&FieldValue) -> Option<T>,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_text(a, b),
    }
}

fn compare_text(a: &FieldValue, b: &FieldValue) -> Ordering {
    a.to_string().to_lowercase().cmp(&b.to_string().to_lowercase())
}

/// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`
pub fn parse_date(value: &FieldValue) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Value of a summary counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterValue {
    Count(usize),
    Amount(f64),
}

/// A computed summary counter
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub label: String,
    pub value: CounterValue,
}

/// Computes the schema's summary counters over the full (unfiltered) records
pub fn summarize(records: &[Record], schema: &EntitySchema, today: NaiveDate) -> Vec<Counter> {
    schema
        .counters()
        .iter()
        .map(|def| Counter {
            label: def.label.clone(),
            value: evaluate_counter(records, &def.rule, today),
        })
        .collect()
}

fn evaluate_counter(records: &[Record], rule: &CounterRule, today: NaiveDate) -> CounterValue {
    match rule {
        CounterRule::Total => CounterValue::Count(records.len()),
        CounterRule::Equals { field, value } => CounterValue::Count(count_where(records, |r| {
            r.get(field).map(|v| v.to_string() == *value).unwrap_or(false)
        })),
        CounterRule::Below { field, threshold } => CounterValue::Count(count_where(records, |r| {
            r.get(field)
                .and_then(FieldValue::as_f64)
                .map(|n| n <= *threshold)
                .unwrap_or(false)
        })),
        CounterRule::RecentDays { field, days } => CounterValue::Count(count_where(records, |r| {
            days_from_today(r, field, today)
                .map(|d| d <= 0 && -d <= *days)
                .unwrap_or(false)
        })),
        CounterRule::DueWithinDays { field, days } => CounterValue::Count(count_where(records, |r| {
            days_from_today(r, field, today)
                .map(|d| d >= 0 && d <= *days)
                .unwrap_or(false)
        })),
        CounterRule::Sum { field } => CounterValue::Amount(
            records
                .iter()
                .filter_map(|r| r.get(field).and_then(FieldValue::as_f64))
                .sum(),
        ),
    }
}

fn count_where(records: &[Record], pred: impl Fn(&Record) -> bool) -> usize {
    records.iter().filter(|&r| pred(r)).count()
}

/// Signed number of days from `today` to the record's date (negative = past)
fn days_from_today(record: &Record, field: &str, today: NaiveDate) -> Option<i64> {
    let date = parse_date(record.get(field)?)?.date();
    Some((date - today).num_days())
}
