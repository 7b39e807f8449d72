//! Text renderings of query results.
//!
//! `sql_query` returns rows as JSON; with `format: "table"` or `"markdown"` it
//! also attaches one of these renderings under `formatted`.

use crate::db::ColumnInfo;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Requested rendering of `sql_query` results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Rows only (default)
    #[default]
    Json,
    /// ASCII table, like the mysql CLI
    Table,
    /// Markdown table
    Markdown,
}

/// Rows plus the facts the footer needs.
#[derive(Debug, Clone, Copy)]
pub struct ResultSet<'a> {
    pub columns: &'a [ColumnInfo],
    pub rows: &'a [serde_json::Map<String, JsonValue>],
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl OutputFormat {
    /// Render `set`, or `None` for [`OutputFormat::Json`].
    pub fn render(&self, set: &ResultSet<'_>) -> Option<String> {
        match self {
            Self::Json => None,
            Self::Table => Some(format_as_table(set)),
            Self::Markdown => Some(format_as_markdown(set)),
        }
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pad by display width; `format!` width counts chars, not terminal cells.
fn pad(text: &str, width: usize, align_right: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if align_right {
        format!("{fill}{text}")
    } else {
        format!("{text}{fill}")
    }
}

fn footer(row_count: usize, truncated: bool) -> String {
    let noun = if row_count == 1 { "row" } else { "rows" };
    if truncated {
        format!("{row_count} {noun} (truncated)")
    } else {
        format!("{row_count} {noun}")
    }
}

pub fn format_as_table(set: &ResultSet<'_>) -> String {
    if set.columns.is_empty() {
        return "Empty set\n".to_string();
    }

    // Newlines would break the grid.
    let cells: Vec<Vec<(String, bool)>> = set
        .rows
        .iter()
        .map(|row| {
            set.columns
                .iter()
                .map(|col| {
                    let value = row.get(&col.name).unwrap_or(&JsonValue::Null);
                    let text = format_value(value).replace(['\n', '\r'], " ");
                    (text, value.is_number())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = set.columns.iter().map(|c| c.name.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (col, w) in set.columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(&col.name, *w, false)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in &cells {
        for ((text, numeric), w) in row.iter().zip(&widths) {
            output.push_str(&format!("| {} ", pad(text, *w, *numeric)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);

    output.push_str(&format!(
        "{} in set ({:.2} sec)\n",
        footer(set.rows.len(), set.truncated),
        set.execution_time_ms as f64 / 1000.0
    ));
    output
}

pub fn format_as_markdown(set: &ResultSet<'_>) -> String {
    if set.columns.is_empty() {
        return "*Empty set*\n".to_string();
    }

    let escape = |s: &str| s.replace('|', "\\|").replace(['\n', '\r'], " ");

    let mut output = String::new();
    for col in set.columns {
        output.push_str(&format!("| {} ", escape(&col.name)));
    }
    output.push_str("|\n");
    output.push_str(&"|---".repeat(set.columns.len()));
    output.push_str("|\n");

    for row in set.rows {
        for col in set.columns {
            let value = row.get(&col.name).unwrap_or(&JsonValue::Null);
            output.push_str(&format!("| {} ", escape(&format_value(value))));
        }
        output.push_str("|\n");
    }

    output.push_str(&format!("\n*{}*\n", footer(set.rows.len(), set.truncated)));
    output
}
