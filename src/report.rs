//! Plain-text rendering for the terminal commands.

use prettytable::{row, Table};
use spendlog_core::ExpenseRecord;

use crate::analytics::{Breakdown, CategoryBreakdown};

pub const EMPTY_RANGE_MESSAGE: &str = "No expenses found for the selected date range.";

const BAR_WIDTH: usize = 40;

pub fn render_day(records: &[ExpenseRecord]) -> String {
    if records.is_empty() {
        return "No expenses recorded for this date.".to_string();
    }

    let mut table = Table::new();
    table.add_row(row!["#", "Amount", "Category", "Notes"]);
    for (i, record) in records.iter().enumerate() {
        table.add_row(row![i + 1, format!("${:.2}", record.amount), record.category, record.notes]);
    }
    table.to_string()
}

/// Rows ordered by percentage, largest first. Equal shares keep category order.
pub fn sorted_rows(breakdown: &Breakdown) -> Vec<(&str, &CategoryBreakdown)> {
    let mut rows: Vec<_> = breakdown.iter().map(|(k, v)| (k.as_str(), v)).collect();
    rows.sort_by(|a, b| b.1.percentage.total_cmp(&a.1.percentage));
    rows
}

pub fn render_breakdown(breakdown: &Breakdown) -> String {
    if breakdown.is_empty() {
        return EMPTY_RANGE_MESSAGE.to_string();
    }

    let rows = sorted_rows(breakdown);
    let label_width = rows.iter().map(|(name, _)| name.chars().count()).max().unwrap_or(0);

    let mut out = String::from("Expense Breakdown By Category\n\n");
    for (name, entry) in &rows {
        out.push_str(&format!(
            "{:<width$} | {:<bar$} {:.1}%\n",
            name,
            bar(entry.percentage),
            entry.percentage,
            width = label_width,
            bar = BAR_WIDTH
        ));
    }
    out.push('\n');

    let mut table = Table::new();
    table.add_row(row!["Category", "Total", "Percentage"]);
    for (name, entry) in &rows {
        table.add_row(row![name, format!("${:.2}", entry.total), format!("{:.1}%", entry.percentage)]);
    }
    out.push_str(&table.to_string());
    out
}

fn bar(percentage: f64) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled)
}
