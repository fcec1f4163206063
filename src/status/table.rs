//! Filtered, sorted and paginated view over the reconciled user list

use chrono::{DateTime, Utc};

use crate::types::{SortOrder, User};

/// Rows per page
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Shown in place of a missing `synced_at`
pub const NOT_SYNCED: &str = "-";

/// Shown when a page has no rows
pub const NO_RESULTS: &str = "No results.";

const HEADERS: [&str; 6] = [
    "ID",
    "First Name",
    "Last Name",
    "Email",
    "Date of Birth",
    "Synced At",
];

/// Table view settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// Case-insensitive substring matched against email
    pub email_filter: Option<String>,
    /// Sort by email; `None` keeps list order (newest first)
    pub sort: Option<SortOrder>,
    /// Zero-based page index
    pub page: usize,
    pub page_size: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            email_filter: None,
            sort: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TableQuery {
    /// Cycle the email sort: unsorted -> ascending -> descending -> ascending
    pub fn toggle_sort(&mut self) {
        self.sort = Some(self.sort.map(SortOrder::toggled).unwrap_or_default());
    }

    /// Replace the filter and go back to the first page
    pub fn set_filter(&mut self, filter: impl Into<String>) {
        let filter = filter.into();
        self.email_filter = if filter.trim().is_empty() {
            None
        } else {
            Some(filter)
        };
        self.page = 0;
    }

    /// Build the page this query selects from `users`
    pub fn page_of(&self, users: &[User]) -> TablePage {
        let needle = self.email_filter.as_deref().map(str::to_lowercase);
        let mut rows: Vec<&User> = users
            .iter()
            .filter(|u| match &needle {
                Some(needle) => u.email.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .collect();

        match self.sort {
            Some(SortOrder::Asc) => rows.sort_by(|a, b| a.email.cmp(&b.email)),
            Some(SortOrder::Desc) => rows.sort_by(|a, b| b.email.cmp(&a.email)),
            None => {}
        }

        let page_size = self.page_size.max(1);
        let total = rows.len();
        let page_count = total.div_ceil(page_size).max(1);
        let page = self.page.min(page_count - 1);

        let rows = rows
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .map(TableRow::from)
            .collect();

        TablePage {
            rows,
            page,
            page_count,
            total,
        }
    }
}

/// One display row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: String,
    pub synced_at: String,
}

impl From<&User> for TableRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            date_of_birth: user.date_of_birth.clone(),
            synced_at: user
                .synced_at
                .as_deref()
                .map(format_synced_at)
                .unwrap_or_else(|| NOT_SYNCED.to_string()),
        }
    }
}

impl TableRow {
    fn cells(&self) -> [&str; 6] {
        [
            &self.id,
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.date_of_birth,
            &self.synced_at,
        ]
    }
}

/// A rendered page of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePage {
    pub rows: Vec<TableRow>,
    /// Zero-based, clamped to the last page
    pub page: usize,
    pub page_count: usize,
    /// Rows matching the filter across all pages
    pub total: usize,
}

impl TablePage {
    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.page_count
    }

    /// Plain-text rendering with aligned columns
    pub fn render(&self) -> String {
        let mut widths = HEADERS.map(str::len);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row.cells()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &HEADERS, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_line(&mut out, rule.as_slice(), &widths);

        if self.rows.is_empty() {
            out.push_str(NO_RESULTS);
            out.push('\n');
        }
        for row in &self.rows {
            push_line(&mut out, &row.cells(), &widths);
        }

        out.push_str(&format!(
            "Page {} of {} ({} users)\n",
            self.page + 1,
            self.page_count,
            self.total
        ));
        out
    }
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Medium date-time in UTC, e.g. `5 Mar 2024, 2:07:09 pm`.
///
/// Timestamps that are not RFC 3339 are shown as received.
pub fn format_synced_at(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .with_timezone(&Utc)
            .format("%-d %b %Y, %-I:%M:%S %P")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
