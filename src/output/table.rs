//! Table output formatting

use serde_json::Value;
use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

use super::formatters::cell;

const EMPTY: &str = "No results found.";

/// Format data as a table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return EMPTY.to_string();
    }

    let mut table = Table::new(data);
    style(&mut table);
    table.to_string()
}

/// Format opaque JSON rows as a table.
///
/// Columns are the union of object keys in first-seen order, with `id`
/// always first when present.
pub fn format_records(rows: &[Value]) -> String {
    if rows.is_empty() {
        return EMPTY.to_string();
    }

    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            for key in obj.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    if let Some(pos) = columns.iter().position(|c| c == "id") {
        let id = columns.remove(pos);
        columns.insert(0, id);
    }
    if columns.is_empty() {
        columns.push("value".to_string());
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_uppercase()));
    for row in rows {
        match row.as_object() {
            Some(obj) => builder.push_record(
                columns
                    .iter()
                    .map(|c| obj.get(c).map(cell).unwrap_or_default()),
            ),
            None => builder.push_record([cell(row)]),
        }
    }

    let mut table = builder.build();
    style(&mut table);
    table.to_string()
}

fn style(table: &mut Table) {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
}
