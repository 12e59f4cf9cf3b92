//! Plain-text rendering of list pages and chat feeds.
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::api::ChatMessage;
use crate::catalog::{scalar_to_string, ResourceSpec};
use crate::chat::Side;
use crate::resource::PageView;

pub const EMPTY_PLACEHOLDER: &str = "No records found";
const MAX_COLUMNS: usize = 6;
const MAX_CELL: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Record {
        id: String,
        cells: Vec<String>,
        /// Action controls are disabled while a mutation is in flight.
        pending: bool,
    },
    Placeholder(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub footer: String,
}

impl Table {
    pub fn data_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r, Row::Record { .. }))
            .count()
    }
}

/// Columns: id, category, search fields; otherwise the keys of the first row.
fn columns(spec: &ResourceSpec, rows: &[Value]) -> Vec<String> {
    let mut cols = vec![spec.id_field.clone()];
    cols.extend(spec.category_field.iter().cloned());
    cols.extend(spec.search_fields.iter().cloned());
    if cols.len() == 1 {
        if let Some(Value::Object(map)) = rows.first() {
            cols.extend(
                map.iter()
                    .filter(|(k, v)| **k != spec.id_field && scalar_to_string(v).is_some())
                    .map(|(k, _)| k.clone()),
            );
        }
    }
    let mut seen = HashSet::new();
    cols.retain(|c| seen.insert(c.clone()));
    cols.truncate(MAX_COLUMNS);
    cols
}

fn cell(value: Option<&Value>) -> String {
    let text = value.and_then(scalar_to_string).unwrap_or_default();
    if text.chars().count() > MAX_CELL {
        let cut: String = text.chars().take(MAX_CELL - 1).collect();
        format!("{cut}…")
    } else {
        text
    }
}

pub fn table(spec: &ResourceSpec, view: &PageView, pending: &HashSet<String>) -> Table {
    let columns = columns(spec, &view.rows);
    let rows = if view.rows.is_empty() {
        vec![Row::Placeholder(EMPTY_PLACEHOLDER)]
    } else {
        view.rows
            .iter()
            .map(|record| {
                let id = spec.record_id(record).unwrap_or_default();
                Row::Record {
                    pending: pending.contains(&id),
                    cells: columns.iter().map(|c| cell(record.get(c))).collect(),
                    id,
                }
            })
            .collect()
    };
    let footer = if view.total_pages == 0 {
        "page 0 of 0 (0 records)".to_string()
    } else {
        format!(
            "page {} of {} ({} records)",
            view.page, view.total_pages, view.total_items
        )
    };
    Table {
        columns,
        rows,
        footer,
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            if let Row::Record { cells, .. } = row {
                for (w, c) in widths.iter_mut().zip(cells) {
                    *w = (*w).max(c.chars().count());
                }
            }
        }
        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{c:<width$}", width = *w))
                .collect::<Vec<_>>()
                .join("  ")
        };
        writeln!(f, "{}", line(&self.columns))?;
        for row in &self.rows {
            match row {
                Row::Record { cells, pending, .. } => {
                    let marker = if *pending { " (pending)" } else { "" };
                    writeln!(f, "{}{marker}", line(cells))?;
                }
                Row::Placeholder(text) => writeln!(f, "{text}")?,
            }
        }
        write!(f, "{}", self.footer)
    }
}

/// One chat line: own messages right-aligned to `width`, others left.
pub fn chat_line(side: Side, message: &ChatMessage, width: usize) -> String {
    let stamp = message
        .timestamp
        .map(|t| format!(" [{}]", t.format("%H:%M")))
        .unwrap_or_default();
    match side {
        Side::Own => format!("{:>width$}", format!("{}{stamp} :me", message.message)),
        Side::Remote => format!("{}: {}{stamp}", message.sender_id, message.message),
    }
}
