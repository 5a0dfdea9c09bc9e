//! HTML rendering of table pages
//!
//! Produces the fragments an admin screen swaps into its page shell: the
//! filter dropdowns, the header row, the table body for the current page,
//! the pagination strip, the summary cards and the notification area.
//!
//! Every piece of record data is HTML-escaped before insertion since fields
//! are user-entered values echoed back by the API. Rendering is a pure
//! function of its inputs, so rendering the same state twice yields the same
//! markup.

use crate::notice::{Notice, NoticeLevel, Retry};
use crate::permissions::Capabilities;
use crate::record::FieldValue;
use crate::schema::{EntitySchema, FieldKind};
use crate::view::{parse_date, Counter, CounterValue, PageView, SortKey, SortOrder, TableQuery, FILTER_ALL};
use serde::Serialize;

/// Placeholder shown for empty / null cells
pub const EMPTY_CELL: &str = "-";
/// Placeholder row text for an empty result
pub const NO_RECORDS: &str = "No records found";
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";
pub const DEFAULT_DATE_FORMAT: &str = "%b %d, %Y";

/// Escapes text for safe insertion into HTML element content or attributes
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display formatting for field values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    currency_symbol: String,
    date_format: String,
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::new(DEFAULT_CURRENCY_SYMBOL, DEFAULT_DATE_FORMAT)
    }
}

impl Formatter {
    pub fn new(currency_symbol: impl Into<String>, date_format: impl Into<String>) -> Self {
        Formatter {
            currency_symbol: currency_symbol.into(),
            date_format: date_format.into(),
        }
    }

    /// Amount with thousands separators and two decimals, e.g. `$1,234.50`
    pub fn currency(&self, amount: f64) -> String {
        let cents = (amount.abs() * 100.0).round() as u64;
        let whole = (cents / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, c) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
        format!("{}{}{}.{:02}", sign, self.currency_symbol, grouped, cents % 100)
    }

    /// Plain (unescaped) display text of a value
    pub fn format(&self, value: Option<&FieldValue>, kind: FieldKind) -> String {
        let value = match value {
            None | Some(FieldValue::Null) => return EMPTY_CELL.to_string(),
            Some(FieldValue::Text(s)) if s.trim().is_empty() => return EMPTY_CELL.to_string(),
            Some(v) => v,
        };
        match kind {
            FieldKind::Currency => value
                .as_f64()
                .map(|n| self.currency(n))
                .unwrap_or_else(|| value.to_string()),
            FieldKind::Date => parse_date(value)
                .map(|d| d.format(&self.date_format).to_string())
                .unwrap_or_else(|| value.to_string()),
            FieldKind::Text | FieldKind::Number | FieldKind::Badge => value.to_string(),
        }
    }

    /// Escaped HTML for a table cell
    pub fn cell_html(&self, value: Option<&FieldValue>, kind: FieldKind) -> String {
        let text = escape_html(&self.format(value, kind));
        match kind {
            FieldKind::Badge if text != EMPTY_CELL => {
                format!(r#"<span class="badge badge-{}">{}</span>"#, slug(&text), text)
            }
            _ => text,
        }
    }
}

/// Lowercase class-name-safe form of a label ("Low Stock" -> "low-stock")
fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

/// The rendered fragments of one table state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTable {
    pub filters: String,
    pub header: String,
    pub body: String,
    pub pagination: String,
    pub summary: String,
}

/// Renders one schema's table for one role
pub struct Renderer<'a> {
    schema: &'a EntitySchema,
    formatter: &'a Formatter,
    capabilities: Capabilities,
}

impl<'a> Renderer<'a> {
    pub fn new(schema: &'a EntitySchema, formatter: &'a Formatter, capabilities: Capabilities) -> Self {
        Renderer {
            schema,
            formatter,
            capabilities,
        }
    }

    fn show_actions(&self) -> bool {
        self.capabilities.any_row_action()
    }

    fn column_count(&self) -> usize {
        self.schema.columns().len() + usize::from(self.show_actions())
    }

    /// One `<select>` per schema filter, with the active value selected
    pub fn filters(&self, query: &TableQuery) -> String {
        if self.schema.filters().is_empty() {
            return String::new();
        }
        let mut out = String::from(r#"<div class="table-filters">"#);
        for filter in self.schema.filters() {
            let active = query
                .filters
                .get(&filter.name)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
                .unwrap_or(FILTER_ALL);
            out.push_str(&format!(
                r#"<label class="filter">{}<select data-filter="{}">"#,
                escape_html(&filter.label),
                escape_html(&filter.name)
            ));
            out.push_str(&option_tag(FILTER_ALL, &format!("All {}", filter.label), active == FILTER_ALL));
            for option in &filter.options {
                out.push_str(&option_tag(option, option, active == option.as_str()));
            }
            out.push_str("</select></label>");
        }
        out.push_str("</div>");
        out
    }

    pub fn header(&self, sort: Option<&SortKey>) -> String {
        let mut out = String::from("<tr>");
        for column in self.schema.columns() {
            let label = escape_html(&column.label);
            if !column.sortable {
                out.push_str(&format!("<th>{}</th>", label));
                continue;
            }
            let (aria, indicator) = match sort {
                Some(key) if key.field == column.field => match key.order {
                    SortOrder::Ascending => ("ascending", " \u{25B2}"),
                    SortOrder::Descending => ("descending", " \u{25BC}"),
                },
                _ => ("none", ""),
            };
            out.push_str(&format!(
                r#"<th class="sortable" data-sort="{}" aria-sort="{}">{}{}</th>"#,
                escape_html(&column.field),
                aria,
                label,
                indicator
            ));
        }
        if self.show_actions() {
            out.push_str(r#"<th class="actions">Actions</th>"#);
        }
        out.push_str("</tr>");
        out
    }

    pub fn body(&self, view: &PageView<'_>) -> String {
        if view.is_empty() {
            return format!(
                r#"<tr class="empty-row"><td colspan="{}">{}</td></tr>"#,
                self.column_count(),
                NO_RECORDS
            );
        }

        let id_field = self.schema.get_id_field();
        let mut out = String::new();
        for record in &view.rows {
            let id = record
                .id(id_field)
                .map(|id| escape_html(id.as_str()))
                .unwrap_or_default();
            out.push_str(&format!(r#"<tr data-id="{}">"#, id));
            for column in self.schema.columns() {
                out.push_str(&format!(
                    r#"<td data-label="{}">{}</td>"#,
                    escape_html(&column.label),
                    self.formatter.cell_html(record.get(&column.field), column.kind)
                ));
            }
            if self.show_actions() {
                out.push_str(&self.action_cell(&id));
            }
            out.push_str("</tr>");
        }
        out
    }

    /// `id` must already be escaped
    fn action_cell(&self, id: &str) -> String {
        let mut out = String::from(r#"<td class="actions">"#);
        let buttons = [
            (self.capabilities.view, "view", "View"),
            (self.capabilities.edit, "edit", "Edit"),
            (self.capabilities.delete, "delete", "Delete"),
        ];
        for (allowed, action, label) in buttons {
            if allowed {
                out.push_str(&format!(
                    r#"<button type="button" class="btn-action btn-{action}" data-action="{action}" data-id="{id}" title="{label}">{label}</button>"#,
                ));
            }
        }
        out.push_str("</td>");
        out
    }

    pub fn pagination(&self, view: &PageView<'_>) -> String {
        let info = if view.total_count == 0 {
            "No entries to show".to_string()
        } else {
            format!(
                "Showing {}\u{2013}{} of {}",
                view.first_index(),
                view.last_index(),
                view.total_count
            )
        };

        let mut out = format!(r#"<div class="pagination-info">{}</div>"#, info);
        out.push_str(r#"<nav class="pagination">"#);
        out.push_str(&nav_button("prev", "Previous", !view.has_previous()));
        for slot in page_window(view.page, view.total_pages) {
            match slot {
                Some(p) if p == view.page => out.push_str(&format!(
                    r#"<button type="button" class="page-btn active" data-page="{p}" aria-current="page">{p}</button>"#
                )),
                Some(p) => out.push_str(&format!(
                    r#"<button type="button" class="page-btn" data-page="{p}">{p}</button>"#
                )),
                None => out.push_str(r#"<span class="ellipsis">&hellip;</span>"#),
            }
        }
        out.push_str(&nav_button("next", "Next", !view.has_next()));
        out.push_str("</nav>");
        out
    }

    pub fn summary(&self, counters: &[Counter]) -> String {
        let mut out = String::new();
        for counter in counters {
            let value = match counter.value {
                CounterValue::Count(n) => n.to_string(),
                CounterValue::Amount(a) => self.formatter.currency(a),
            };
            out.push_str(&format!(
                r#"<div class="stat-card"><span class="stat-label">{}</span><span class="stat-value">{}</span></div>"#,
                escape_html(&counter.label),
                escape_html(&value)
            ));
        }
        out
    }

    pub fn render(&self, view: &PageView<'_>, query: &TableQuery, counters: &[Counter]) -> RenderedTable {
        RenderedTable {
            filters: self.filters(query),
            header: self.header(query.sort.as_ref()),
            body: self.body(view),
            pagination: self.pagination(view),
            summary: self.summary(counters),
        }
    }
}

fn option_tag(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{}"{}>{}</option>"#,
        escape_html(value),
        if selected { " selected" } else { "" },
        escape_html(label)
    )
}

fn nav_button(target: &str, label: &str, disabled: bool) -> String {
    format!(
        r#"<button type="button" class="page-btn page-{target}" data-page="{target}"{}>{label}</button>"#,
        if disabled { " disabled" } else { "" }
    )
}

/// Page numbers to show; `None` marks an ellipsis. Up to 7 pages are listed
/// in full, beyond that the first, last and neighbours of the current page.
pub fn page_window(current: usize, total: usize) -> Vec<Option<usize>> {
    if total <= 7 {
        return (1..=total).map(Some).collect();
    }
    let start = current.saturating_sub(1).max(2);
    let end = (current + 1).min(total - 1);

    let mut slots = vec![Some(1)];
    if start > 2 {
        slots.push(None);
    }
    slots.extend((start..=end).map(Some));
    if end < total - 1 {
        slots.push(None);
    }
    slots.push(Some(total));
    slots
}

/// Notification area markup
pub fn render_notices(notices: &[Notice]) -> String {
    let mut out = String::new();
    for notice in notices {
        let level = match notice.level {
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
        };
        out.push_str(&format!(
            r#"<div class="alert alert-{}" role="alert"><span class="alert-message">{}</span>"#,
            level,
            escape_html(&notice.message)
        ));
        match &notice.retry {
            Some(Retry::Reload) => {
                out.push_str(r#"<button type="button" class="btn-retry" data-retry="reload">Retry</button>"#)
            }
            Some(Retry::Get { id }) => out.push_str(&format!(
                r#"<button type="button" class="btn-retry" data-retry="get" data-id="{}">Retry</button>"#,
                escape_html(id.as_str())
            )),
            None => {}
        }
        if notice.dismissible {
            out.push_str(r#"<button type="button" class="btn-close" data-dismiss="alert" aria-label="Close">&times;</button>"#);
        }
        out.push_str("</div>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordId};
    use crate::schema::ColumnDef;
    use crate::view::{apply, TableQuery};

    fn schema() -> EntitySchema {
        EntitySchema::new("customers")
            .column(ColumnDef::new("name", "Name", FieldKind::Text))
            .column(ColumnDef::new("status", "Status", FieldKind::Badge))
            .column(ColumnDef::new("balance", "Balance", FieldKind::Currency))
            .column(ColumnDef::new("phone", "Phone", FieldKind::Text).unsortable())
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x")</script> & 'y'"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; &#39;y&#39;"
        );
    }

    #[test]
    fn test_currency_format() {
        let f = Formatter::default();
        assert_eq!(f.currency(0.0), "$0.00");
        assert_eq!(f.currency(12.5), "$12.50");
        assert_eq!(f.currency(1234.567), "$1,234.57");
        assert_eq!(f.currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(f.currency(-3.0), "-$3.00");
        assert_eq!(Formatter::new("KES ", "%d/%m/%Y").currency(999.999), "KES 1,000.00");
    }

    #[test]
    fn test_value_format() {
        let f = Formatter::default();
        assert_eq!(
            f.format(Some(&FieldValue::text("2024-03-05 10:00:00")), FieldKind::Date),
            "Mar 05, 2024"
        );
        assert_eq!(f.format(Some(&FieldValue::text("soon")), FieldKind::Date), "soon");
        assert_eq!(f.format(Some(&FieldValue::text("19.9")), FieldKind::Currency), "$19.90");
        assert_eq!(f.format(Some(&FieldValue::Null), FieldKind::Text), EMPTY_CELL);
        assert_eq!(f.format(None, FieldKind::Number), EMPTY_CELL);
        assert_eq!(
            f.cell_html(Some(&FieldValue::text("Low Stock")), FieldKind::Badge),
            r#"<span class="badge badge-low-stock">Low Stock</span>"#
        );
    }

    #[test]
    fn test_body_escapes_user_data() {
        let records = vec![Record::new()
            .with("id", "1\"><img>")
            .with("name", "<b>Mallory</b>")
            .with("status", "<i>VIP</i>")];
        let schema = schema();
        let formatter = Formatter::default();
        let renderer = Renderer::new(&schema, &formatter, Capabilities::all());

        let body = renderer.body(&apply(&records, &schema, &TableQuery::new(10)));
        assert!(!body.contains("<b>"));
        assert!(!body.contains("<i>"));
        assert!(!body.contains("<img>"));
        assert!(body.contains("&lt;b&gt;Mallory&lt;/b&gt;"));
        assert!(body.contains(r#"data-id="1&quot;&gt;&lt;img&gt;""#));
    }

    #[test]
    fn test_empty_body_placeholder() {
        let schema = schema();
        let formatter = Formatter::default();

        let renderer = Renderer::new(&schema, &formatter, Capabilities::all());
        let body = renderer.body(&apply(&[], &schema, &TableQuery::new(10)));
        assert_eq!(
            body,
            r#"<tr class="empty-row"><td colspan="5">No records found</td></tr>"#
        );

        // No action column when the role has no row actions
        let renderer = Renderer::new(&schema, &formatter, Capabilities::default());
        let body = renderer.body(&apply(&[], &schema, &TableQuery::new(10)));
        assert!(body.contains(r#"colspan="4""#));
    }

    #[test]
    fn test_action_buttons_follow_capabilities() {
        let records = vec![Record::new().with("id", 7i64).with("name", "Jane")];
        let schema = schema();
        let formatter = Formatter::default();
        let caps = Capabilities {
            view: true,
            edit: true,
            ..Capabilities::default()
        };
        let renderer = Renderer::new(&schema, &formatter, caps);
        let body = renderer.body(&apply(&records, &schema, &TableQuery::new(10)));

        assert!(body.contains(r#"data-action="view" data-id="7""#));
        assert!(body.contains(r#"data-action="edit""#));
        assert!(!body.contains(r#"data-action="delete""#));
    }

    #[test]
    fn test_header_sort_indicator() {
        let schema = schema();
        let formatter = Formatter::default();
        let renderer = Renderer::new(&schema, &formatter, Capabilities::default());

        let header = renderer.header(Some(&SortKey::descending("balance")));
        assert!(header.contains(r#"data-sort="balance" aria-sort="descending""#));
        assert!(header.contains(r#"data-sort="name" aria-sort="none""#));
        assert!(header.contains("<th>Phone</th>"));
        assert!(!header.contains("Actions"));
    }

    #[test]
    fn test_pagination_strip() {
        let records: Vec<Record> = (1..=25).map(|i| Record::new().with("id", i as i64)).collect();
        let schema = schema();
        let formatter = Formatter::default();
        let renderer = Renderer::new(&schema, &formatter, Capabilities::default());

        let first = renderer.pagination(&apply(&records, &schema, &TableQuery::new(10)));
        assert!(first.contains("Showing 1\u{2013}10 of 25"));
        assert!(first.contains(r#"data-page="prev" disabled"#));
        assert!(first.contains(r#"data-page="1" aria-current="page""#));
        assert!(!first.contains(r#"data-page="next" disabled"#));

        let last = renderer.pagination(&apply(&records, &schema, &TableQuery::new(10).with_page(3)));
        assert!(last.contains("Showing 21\u{2013}25 of 25"));
        assert!(last.contains(r#"data-page="next" disabled"#));

        let empty = renderer.pagination(&apply(&[], &schema, &TableQuery::new(10)));
        assert!(empty.contains("No entries to show"));
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 0), Vec::<Option<usize>>::new());
        assert_eq!(page_window(2, 3), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(
            page_window(5, 10),
            vec![Some(1), None, Some(4), Some(5), Some(6), None, Some(10)]
        );
        assert_eq!(page_window(1, 10), vec![Some(1), Some(2), None, Some(10)]);
        assert_eq!(page_window(10, 10), vec![Some(1), None, Some(9), Some(10)]);
    }

    #[test]
    fn test_render_is_idempotent() {
        let records: Vec<Record> = (1..=12)
            .map(|i| {
                Record::new()
                    .with("id", i as i64)
                    .with("name", format!("Customer {}", i))
                    .with("status", if i % 2 == 0 { "Active" } else { "Inactive" })
                    .with("balance", i as f64 * 10.5)
            })
            .collect();
        let schema = schema();
        let formatter = Formatter::default();
        let renderer = Renderer::new(&schema, &formatter, Capabilities::all());
        let query = TableQuery::new(5).with_page(2);
        let counters = vec![Counter {
            label: "Total".to_string(),
            value: CounterValue::Count(12),
        }];

        let a = renderer.render(&apply(&records, &schema, &query), &query, &counters);
        let b = renderer.render(&apply(&records, &schema, &query), &query, &counters);
        assert_eq!(a, b);
        assert!(a.summary.contains(r#"<span class="stat-value">12</span>"#));
    }

    #[test]
    fn test_filter_dropdowns() {
        let schema = schema().filter(
            crate::schema::FilterDef::new("status", "status", "Status").options(&["Active", "<VIP>"]),
        );
        let formatter = Formatter::default();
        let renderer = Renderer::new(&schema, &formatter, Capabilities::all());

        let html = renderer.filters(&TableQuery::new(10));
        assert!(html.contains(r#"<select data-filter="status">"#));
        assert!(html.contains(r#"<option value="all" selected>All Status</option>"#));
        assert!(html.contains(r#"<option value="&lt;VIP&gt;">&lt;VIP&gt;</option>"#));

        let html = renderer.filters(&TableQuery::new(10).with_filter("status", "Active"));
        assert!(html.contains(r#"<option value="Active" selected>Active</option>"#));
        assert!(html.contains(r#"<option value="all">All Status</option>"#));

        let plain = self::schema();
        assert_eq!(Renderer::new(&plain, &formatter, Capabilities::all()).filters(&TableQuery::new(10)), "");
    }

    #[test]
    fn test_render_notices() {
        let notices = vec![
            Notice::read_failed(
                "Failed to load",
                &crate::error::TableError::Network("<offline>".into()),
                Retry::Reload,
            ),
            Notice::read_failed(
                "Failed to open",
                &crate::error::TableError::application("gone"),
                Retry::Get { id: RecordId::from(3) },
            ),
            Notice::success("Saved"),
        ];
        let html = render_notices(&notices);
        assert!(html.contains("alert-error"));
        assert!(html.contains("&lt;offline&gt;"));
        assert!(html.contains(r#"data-retry="reload""#));
        assert!(html.contains(r#"data-retry="get" data-id="3""#));
        assert!(html.contains("alert-success"));
    }
}
