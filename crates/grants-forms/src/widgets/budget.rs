//! SF-424A budget sub-tables
//!
//! Section A (budget summary), Section C (non-federal resources) and
//! Section E (future funding periods) have one row per activity line item;
//! Section D (forecasted cash needs) has fixed federal / non-federal rows.
//! Every section gets a computed totals row, and all but Section E a computed
//! total column. Totals are derived on every render and never editable;
//! missing or unparsable amounts count as zero.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::warn;

use super::{WidgetKind, WidgetProps};
use crate::normalize::stringify_or_empty;
use crate::path::FieldPath;
use crate::schema::FormSchema;

/// Line items rendered when the schema gives no `maxItems`
pub const DEFAULT_LINE_ITEMS: usize = 4;

/// Shown on the first line item when the line item list itself is rejected
pub const REQUIRED_CELL_MESSAGE: &str = "This field is required.";

/// Invalid money string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount `{0}`")]
pub struct InvalidAmount(pub String);

fn amount_from_str(raw: &str) -> Result<Decimal, InvalidAmount> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let invalid = || InvalidAmount(raw.to_string());
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !digits(whole) || !digits(fraction) || fraction.len() > 2 || (whole.is_empty() && fraction.is_empty()) {
        return Err(invalid());
    }
    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };
    Decimal::from_str(&normalized).map_err(|_| invalid())
}

/// Parse an optional cell value; absent and blank are zero.
///
/// Amounts are non-negative with at most two decimal places.
pub fn parse_amount(value: Option<&Value>) -> Result<Decimal, InvalidAmount> {
    match value {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) => amount_from_str(s),
        Some(Value::Number(n)) => amount_from_str(&n.to_string()),
        Some(other) => Err(InvalidAmount(other.to_string())),
    }
}

/// Two-place money string
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .unwrap_or_else(|| {
            warn!("budget total overflowed");
            Decimal::MAX
        })
}

/// Spreadsheet-style column letter, 1-based
pub fn column_letter(column: usize) -> String {
    let mut letters = Vec::new();
    let mut n = column;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Amount or text column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetColumn {
    pub key: &'static str,
    pub label: &'static str,
}

/// Where line items live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItems {
    /// Array of objects: `array[i].<text>` and `array[i].amounts.<column>`
    Indexed {
        array: &'static str,
        text: &'static [BudgetColumn],
        amounts: &'static str,
        first_row_number: usize,
    },
    /// Fixed keyed rows: `<key>.<column>`
    Keyed {
        rows: &'static [(&'static str, &'static str)],
        first_row_number: usize,
    },
}

/// Shape of one budget section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLayout {
    pub widget: WidgetKind,
    /// Object wrapping the whole section, if any
    pub group: Option<&'static str>,
    pub lines: LineItems,
    pub columns: &'static [BudgetColumn],
    /// Derived per-row total, stored alongside the row amounts
    pub row_total: Option<BudgetColumn>,
    /// Key of the totals row object
    pub totals: &'static str,
    pub totals_label: &'static str,
    /// Printed row number of the totals row
    pub totals_row: usize,
    /// Errors on the line item list flag the first row's text cells
    pub first_row_required: bool,
}

const ACTIVITY_TITLE: BudgetColumn = BudgetColumn {
    key: "activity_title",
    label: "Grant program, function or activity",
};

const TOTAL: BudgetColumn = BudgetColumn { key: "total_amount", label: "Total" };

pub const SECTION_A: BudgetLayout = BudgetLayout {
    widget: WidgetKind::Budget424aSectionA,
    group: None,
    lines: LineItems::Indexed {
        array: "activity_line_items",
        text: &[
            ACTIVITY_TITLE,
            BudgetColumn { key: "assistance_listing_number", label: "Assistance Listing Number" },
        ],
        amounts: "budget_summary",
        first_row_number: 1,
    },
    columns: &[
        BudgetColumn { key: "federal_estimated_unobligated_amount", label: "Unobligated federal" },
        BudgetColumn { key: "non_federal_estimated_unobligated_amount", label: "Unobligated non-federal" },
        BudgetColumn { key: "federal_new_or_revised_amount", label: "New or revised federal" },
        BudgetColumn { key: "non_federal_new_or_revised_amount", label: "New or revised non-federal" },
    ],
    row_total: Some(TOTAL),
    totals: "total_budget_summary",
    totals_label: "5. Totals",
    totals_row: 5,
    first_row_required: true,
};

pub const SECTION_C: BudgetLayout = BudgetLayout {
    widget: WidgetKind::Budget424aSectionC,
    group: None,
    lines: LineItems::Indexed {
        array: "activity_line_items",
        text: &[ACTIVITY_TITLE],
        amounts: "non_federal_resources",
        first_row_number: 8,
    },
    columns: &[
        BudgetColumn { key: "applicant_amount", label: "Applicant" },
        BudgetColumn { key: "state_amount", label: "State" },
        BudgetColumn { key: "other_amount", label: "Other sources" },
    ],
    row_total: Some(TOTAL),
    totals: "total_non_federal_resources",
    totals_label: "12. Total",
    totals_row: 12,
    first_row_required: false,
};

pub const SECTION_D: BudgetLayout = BudgetLayout {
    widget: WidgetKind::Budget424aSectionD,
    group: Some("forecasted_cash_needs"),
    lines: LineItems::Keyed {
        rows: &[
            ("federal_forecasted_cash_needs", "13. Federal"),
            ("non_federal_forecasted_cash_needs", "14. Non-federal"),
        ],
        first_row_number: 13,
    },
    columns: &[
        BudgetColumn { key: "first_quarter_amount", label: "1st Quarter" },
        BudgetColumn { key: "second_quarter_amount", label: "2nd Quarter" },
        BudgetColumn { key: "third_quarter_amount", label: "3rd Quarter" },
        BudgetColumn { key: "fourth_quarter_amount", label: "4th Quarter" },
    ],
    row_total: Some(BudgetColumn { key: "total_amount", label: "Total for 1st year" }),
    totals: "total_forecasted_cash_needs",
    totals_label: "15. TOTAL",
    totals_row: 15,
    first_row_required: false,
};

pub const SECTION_E: BudgetLayout = BudgetLayout {
    widget: WidgetKind::Budget424aSectionE,
    group: None,
    lines: LineItems::Indexed {
        array: "activity_line_items",
        text: &[ACTIVITY_TITLE],
        amounts: "federal_fund_estimates",
        first_row_number: 16,
    },
    columns: &[
        BudgetColumn { key: "first_year_amount", label: "First year" },
        BudgetColumn { key: "second_year_amount", label: "Second year" },
        BudgetColumn { key: "third_year_amount", label: "Third year" },
        BudgetColumn { key: "fourth_year_amount", label: "Fourth year" },
    ],
    row_total: None,
    totals: "total_federal_fund_estimates",
    totals_label: "20. Totals",
    totals_row: 20,
    first_row_required: false,
};

impl BudgetLayout {
    pub fn for_widget(kind: WidgetKind) -> Option<&'static BudgetLayout> {
        match kind {
            WidgetKind::Budget424aSectionA => Some(&SECTION_A),
            WidgetKind::Budget424aSectionC => Some(&SECTION_C),
            WidgetKind::Budget424aSectionD => Some(&SECTION_D),
            WidgetKind::Budget424aSectionE => Some(&SECTION_E),
            _ => None,
        }
    }

    fn text_columns(&self) -> &'static [BudgetColumn] {
        match self.lines {
            LineItems::Indexed { text, .. } => text,
            LineItems::Keyed { .. } => &[],
        }
    }

    fn first_row_number(&self) -> usize {
        match self.lines {
            LineItems::Indexed { first_row_number, .. } | LineItems::Keyed { first_row_number, .. } => {
                first_row_number
            }
        }
    }
}

/// One table cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetCell {
    pub id: String,
    /// Printed grid position, `Row 8 Column B`
    pub label: String,
    pub value: String,
    pub editable: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetRow {
    pub label: String,
    pub text: Vec<BudgetCell>,
    pub cells: Vec<BudgetCell>,
    pub total: Option<BudgetCell>,
}

impl BudgetRow {
    fn all_cells(&self) -> impl Iterator<Item = &BudgetCell> {
        self.text.iter().chain(&self.cells).chain(&self.total)
    }
}

/// Rendered budget section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetTable {
    pub id: String,
    pub widget: WidgetKind,
    pub columns: Vec<String>,
    pub rows: Vec<BudgetRow>,
    pub totals: BudgetRow,
    /// Messages not addressed to a single cell
    pub errors: Vec<String>,
}

impl BudgetTable {
    /// Grid positions of every cell carrying an error, in reading order
    pub fn error_labels(&self) -> Vec<&str> {
        self.rows
            .iter()
            .chain(std::iter::once(&self.totals))
            .flat_map(BudgetRow::all_cells)
            .filter(|cell| !cell.errors.is_empty())
            .map(|cell| cell.label.as_str())
            .collect()
    }
}

/// Derived sums for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetTotals {
    pub row_totals: Vec<Decimal>,
    pub column_totals: Vec<Decimal>,
    pub grand_total: Decimal,
}

/// One located row: amounts object plus, for line items, the text fields
struct LocatedRow<'v> {
    path: FieldPath,
    amounts: Option<&'v Value>,
    text: Vec<(FieldPath, Option<&'v Value>)>,
}

/// A section located inside a form value
struct Located<'v> {
    /// Path of the section base (the group object, or the value holding the line items)
    base: FieldPath,
    rows: Vec<LocatedRow<'v>>,
}

fn locate<'v>(
    layout: &BudgetLayout,
    path: FieldPath,
    value: Option<&'v Value>,
    row_count: impl Fn(usize) -> usize,
) -> Located<'v> {
    let (mut base, mut base_value) = (path, value);
    if let Some(group) = layout.group {
        if let Some(inner) = base_value.and_then(|v| v.get(group)).filter(|v| v.is_object()) {
            base = base.key(group);
            base_value = Some(inner);
        }
    }

    let rows = match layout.lines {
        LineItems::Indexed {
            array, text, amounts, ..
        } => {
            // the value may be the line item array itself
            let (items_path, items) = match base_value {
                Some(Value::Array(items)) => {
                    let items_path = base.clone();
                    base = base.parent().unwrap_or_default();
                    (items_path, Some(items))
                }
                _ => (
                    base.key(array),
                    base_value.and_then(|v| v.get(array)).and_then(Value::as_array),
                ),
            };
            let present = items.map_or(0, Vec::len);
            (0..row_count(present))
                .map(|i| {
                    let item = items.and_then(|items| items.get(i));
                    let item_path = items_path.index(i);
                    LocatedRow {
                        path: item_path.key(amounts),
                        amounts: item.and_then(|v| v.get(amounts)),
                        text: text
                            .iter()
                            .map(|c| (item_path.key(c.key), item.and_then(|v| v.get(c.key))))
                            .collect(),
                    }
                })
                .collect()
        }
        LineItems::Keyed { rows, .. } => rows
            .iter()
            .map(|(key, _)| LocatedRow {
                path: base.key(*key),
                amounts: base_value.and_then(|v| v.get(*key)),
                text: Vec::new(),
            })
            .collect(),
    };
    Located { base, rows }
}

fn cell_amount(row: Option<&Value>, column: &BudgetColumn) -> Decimal {
    parse_amount(row.and_then(|r| r.get(column.key))).unwrap_or_default()
}

fn totals_for(layout: &BudgetLayout, rows: &[LocatedRow<'_>]) -> BudgetTotals {
    let row_totals: Vec<Decimal> = rows
        .iter()
        .map(|row| sum_amounts(layout.columns.iter().map(|c| cell_amount(row.amounts, c))))
        .collect();
    let column_totals = layout
        .columns
        .iter()
        .map(|c| sum_amounts(rows.iter().map(|row| cell_amount(row.amounts, c))))
        .collect();
    BudgetTotals {
        grand_total: sum_amounts(row_totals.iter().copied()),
        row_totals,
        column_totals,
    }
}

/// Totals for the section found in `value` (rooted at the form value).
pub fn compute_totals(layout: &BudgetLayout, value: &Value) -> BudgetTotals {
    let located = locate(layout, FieldPath::root(), Some(value), |present| present);
    totals_for(layout, &located.rows)
}

/// Write derived totals into `value` so stored data never carries stale sums.
///
/// Only rows that exist are updated; the totals row is written when at least
/// one row exists.
pub fn apply_budget_totals(layout: &BudgetLayout, value: &mut Value) {
    let (row_updates, totals_path, totals, any_rows) = {
        let located = locate(layout, FieldPath::root(), Some(&*value), |present| present);
        let totals = totals_for(layout, &located.rows);
        let existing: Vec<(&LocatedRow<'_>, Decimal)> = located
            .rows
            .iter()
            .zip(totals.row_totals.iter().copied())
            .filter(|(row, _)| row.amounts.is_some())
            .collect();
        let any_rows = !existing.is_empty();
        let row_updates: Vec<(FieldPath, Decimal)> = match layout.row_total {
            Some(column) => existing
                .into_iter()
                .map(|(row, total)| (row.path.key(column.key), total))
                .collect(),
            None => Vec::new(),
        };
        (row_updates, located.base.key(layout.totals), totals, any_rows)
    };
    if !any_rows {
        return;
    }

    for (path, total) in row_updates {
        if let Err(e) = path.set(value, Value::String(format_amount(total))) {
            warn!(error = %e, "budget row total not written");
        }
    }
    let mut totals_row = Map::new();
    for (column, total) in layout.columns.iter().zip(totals.column_totals.iter()) {
        totals_row.insert(column.key.to_string(), Value::String(format_amount(*total)));
    }
    if let Some(column) = layout.row_total {
        totals_row.insert(column.key.to_string(), Value::String(format_amount(totals.grand_total)));
    }
    if let Err(e) = totals_path.set(value, Value::Object(totals_row)) {
        warn!(error = %e, "budget totals row not written");
    }
}

fn cell_errors(errors: &[(String, String)], id: &str) -> Vec<String> {
    errors
        .iter()
        .filter(|(field, _)| field == id)
        .map(|(_, message)| message.clone())
        .collect()
}

fn line_item_rows(schema: &FormSchema, layout: &BudgetLayout) -> usize {
    match layout.lines {
        LineItems::Indexed { array, .. } => {
            let items = match schema.as_array() {
                Some(array_schema) => Some(array_schema),
                None => schema.as_object().and_then(|o| o.properties.get(array)).and_then(FormSchema::as_array),
            };
            items.and_then(|a| a.max_items).unwrap_or(DEFAULT_LINE_ITEMS)
        }
        LineItems::Keyed { rows, .. } => rows.len(),
    }
}

fn grid_label(row: usize, column: usize) -> String {
    format!("Row {} Column {}", row, column_letter(column))
}

/// Render a budget section from widget props.
///
/// `props.raw_errors` entries of the form `<cell id>: <message>` are routed to
/// that cell; other messages, and messages for cells not on the table, stay
/// on the table.
pub fn render_budget(props: &WidgetProps, layout: &BudgetLayout) -> BudgetTable {
    let base = FieldPath::parse_html(&props.id).unwrap_or_default();
    let rows_wanted = line_item_rows(&props.schema, layout);
    let located = locate(layout, base, props.value.as_ref(), |present| present.max(rows_wanted));
    let totals = totals_for(layout, &located.rows);

    let mut errors: Vec<(String, String)> = Vec::new();
    let mut table_errors = Vec::new();
    for raw in &props.raw_errors {
        match raw.split_once(": ") {
            Some((field, message)) if FieldPath::parse_html(field).is_ok() => {
                errors.push((field.to_string(), message.to_string()))
            }
            _ => table_errors.push(raw.clone()),
        }
    }
    let flag_first_row = layout.first_row_required && !table_errors.is_empty();

    let text_count = layout.text_columns().len();
    let amount_column = |i: usize| text_count + i + 1;
    let total_column = text_count + layout.columns.len() + 1;

    let input_cell = |path: FieldPath, value: Option<&Value>, label: String, money: bool| {
        let id = path.to_html();
        let mut errs = cell_errors(&errors, &id);
        if money {
            if let Err(e) = parse_amount(value) {
                errs.push(e.to_string());
            }
        }
        BudgetCell {
            value: stringify_or_empty(value),
            errors: errs,
            editable: !props.disabled,
            label,
            id,
        }
    };
    let derived_cell = |path: FieldPath, total: Decimal, label: String| BudgetCell {
        errors: cell_errors(&errors, &path.to_html()),
        id: path.to_html(),
        value: format_amount(total),
        editable: false,
        label,
    };

    let rows: Vec<BudgetRow> = located
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row_number = layout.first_row_number() + i;
            let label = match layout.lines {
                LineItems::Indexed { .. } => format!("{}.", row_number),
                LineItems::Keyed { rows: keyed, .. } => keyed[i].1.to_string(),
            };
            let text = row
                .text
                .iter()
                .enumerate()
                .map(|(c, (path, value))| {
                    let mut cell = input_cell(path.clone(), *value, grid_label(row_number, c + 1), false);
                    if flag_first_row && i == 0 && cell.errors.is_empty() {
                        cell.errors.push(REQUIRED_CELL_MESSAGE.to_string());
                    }
                    cell
                })
                .collect();
            BudgetRow {
                label,
                text,
                cells: layout
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(c, column)| {
                        input_cell(
                            row.path.key(column.key),
                            row.amounts.and_then(|r| r.get(column.key)),
                            grid_label(row_number, amount_column(c)),
                            true,
                        )
                    })
                    .collect(),
                total: layout.row_total.map(|column| {
                    derived_cell(
                        row.path.key(column.key),
                        totals.row_totals[i],
                        grid_label(row_number, total_column),
                    )
                }),
            }
        })
        .collect();

    let totals_path = located.base.key(layout.totals);
    let totals_row = BudgetRow {
        label: layout.totals_label.to_string(),
        text: Vec::new(),
        cells: layout
            .columns
            .iter()
            .zip(totals.column_totals.iter())
            .enumerate()
            .map(|(c, (column, total))| {
                derived_cell(totals_path.key(column.key), *total, grid_label(layout.totals_row, amount_column(c)))
            })
            .collect(),
        total: layout.row_total.map(|column| {
            derived_cell(
                totals_path.key(column.key),
                totals.grand_total,
                grid_label(layout.totals_row, total_column),
            )
        }),
    };

    for (field, message) in &errors {
        let placed = rows
            .iter()
            .chain(std::iter::once(&totals_row))
            .flat_map(BudgetRow::all_cells)
            .any(|cell| &cell.id == field);
        if !placed {
            table_errors.push(format!("{}: {}", field, message));
        }
    }

    let mut columns: Vec<String> = layout.columns.iter().map(|c| c.label.to_string()).collect();
    if let Some(column) = layout.row_total {
        columns.push(column.label.to_string());
    }

    BudgetTable {
        id: props.id.clone(),
        widget: layout.widget,
        columns,
        rows,
        totals: totals_row,
        errors: table_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn amount(raw: &str) -> Result<Decimal, InvalidAmount> {
        parse_amount(Some(&json!(raw)))
    }

    #[test]
    fn test_amount_parse_and_format() {
        assert_eq!(amount("12").unwrap(), dec!(12));
        assert_eq!(amount("12.5").unwrap(), dec!(12.50));
        assert_eq!(amount("0.07").unwrap(), dec!(0.07));
        assert_eq!(amount(".50").unwrap(), dec!(0.50));
        assert_eq!(amount("").unwrap(), Decimal::ZERO);
        assert_eq!(parse_amount(None).unwrap(), Decimal::ZERO);
        assert_eq!(parse_amount(Some(&json!(3))).unwrap(), dec!(3));
        assert!(amount("1.234").is_err());
        assert!(amount("-5").is_err());
        assert!(amount("1,000").is_err());
        assert!(amount("1_000").is_err());
        assert!(amount(".").is_err());
        assert!(parse_amount(Some(&json!(true))).is_err());
        assert_eq!(format_amount(dec!(1234.56)), "1234.56");
        assert_eq!(format_amount(dec!(0.05)), "0.05");
        assert_eq!(format_amount(dec!(100)), "100.00");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(5), "E");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
    }

    #[test]
    fn test_section_c_single_nonzero_line_item() {
        let value = json!({
            "activity_line_items": [
                { "activity_title": "Outreach", "non_federal_resources": { "applicant_amount": "100.00" } },
                { "activity_title": "Training" },
                {},
                { "non_federal_resources": {} }
            ]
        });
        let totals = compute_totals(&SECTION_C, &value);
        assert_eq!(totals.row_totals, vec![dec!(100), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO]);
        assert_eq!(totals.column_totals, vec![dec!(100), Decimal::ZERO, Decimal::ZERO]);
        assert_eq!(totals.grand_total, dec!(100));
    }

    #[test]
    fn test_section_d_totals() {
        let value = json!({
            "forecasted_cash_needs": {
                "federal_forecasted_cash_needs": { "first_quarter_amount": "10.00", "third_quarter_amount": "5.25" },
                "non_federal_forecasted_cash_needs": { "first_quarter_amount": "1.00", "fourth_quarter_amount": "bogus" }
            }
        });
        let totals = compute_totals(&SECTION_D, &value);
        assert_eq!(totals.row_totals, vec![dec!(15.25), dec!(1)]);
        assert_eq!(totals.column_totals, vec![dec!(11), Decimal::ZERO, dec!(5.25), Decimal::ZERO]);
        assert_eq!(totals.grand_total, dec!(16.25));
    }

    #[test]
    fn test_section_a_totals() {
        let mut value = json!({
            "activity_line_items": [
                {
                    "activity_title": "Planning",
                    "assistance_listing_number": "10.001",
                    "budget_summary": {
                        "federal_estimated_unobligated_amount": "1.10",
                        "federal_new_or_revised_amount": "20.00",
                        "non_federal_new_or_revised_amount": "5"
                    }
                },
                {
                    "activity_title": "Delivery",
                    "budget_summary": { "non_federal_estimated_unobligated_amount": "0.90", "total_amount": "7.00" }
                }
            ]
        });
        let totals = compute_totals(&SECTION_A, &value);
        assert_eq!(totals.row_totals, vec![dec!(26.10), dec!(0.90)]);
        assert_eq!(totals.column_totals, vec![dec!(1.10), dec!(0.90), dec!(20), dec!(5)]);
        assert_eq!(totals.grand_total, dec!(27));

        apply_budget_totals(&SECTION_A, &mut value);
        assert_eq!(value["activity_line_items"][1]["budget_summary"]["total_amount"], json!("0.90"));
        assert_eq!(value["total_budget_summary"]["total_amount"], json!("27.00"));
        assert_eq!(value["total_budget_summary"]["federal_new_or_revised_amount"], json!("20.00"));
    }

    #[test]
    fn test_section_e_totals() {
        let mut value = json!({
            "activity_line_items": [
                { "activity_title": "Year plan", "federal_fund_estimates": { "first_year_amount": "1.00", "second_year_amount": "2.00" } },
                { "federal_fund_estimates": { "first_year_amount": "3.00", "fourth_year_amount": "4.50" } },
                { "federal_fund_estimates": {} },
                { "federal_fund_estimates": { "third_year_amount": "0.25" } }
            ]
        });
        let totals = compute_totals(&SECTION_E, &value);
        assert_eq!(totals.row_totals, vec![dec!(3), dec!(7.50), Decimal::ZERO, dec!(0.25)]);
        assert_eq!(totals.column_totals, vec![dec!(4), dec!(2), dec!(0.25), dec!(4.50)]);
        assert_eq!(totals.grand_total, dec!(10.75));

        // no total column is stored for this section
        apply_budget_totals(&SECTION_E, &mut value);
        assert_eq!(
            value["total_federal_fund_estimates"],
            json!({
                "first_year_amount": "4.00",
                "second_year_amount": "2.00",
                "third_year_amount": "0.25",
                "fourth_year_amount": "4.50"
            })
        );
        assert!(value["activity_line_items"][0]["federal_fund_estimates"].get("total_amount").is_none());
    }

    #[test]
    fn test_apply_budget_totals_overwrites_stale_sums() {
        let mut value = json!({
            "activity_line_items": [
                { "non_federal_resources": { "applicant_amount": "1.00", "state_amount": "2.00", "total_amount": "999.00" } },
                { "non_federal_resources": { "other_amount": "0.50" } }
            ],
            "total_non_federal_resources": { "total_amount": "1.00" }
        });
        apply_budget_totals(&SECTION_C, &mut value);
        assert_eq!(value["activity_line_items"][0]["non_federal_resources"]["total_amount"], json!("3.00"));
        assert_eq!(value["activity_line_items"][1]["non_federal_resources"]["total_amount"], json!("0.50"));
        assert_eq!(
            value["total_non_federal_resources"],
            json!({ "applicant_amount": "1.00", "state_amount": "2.00", "other_amount": "0.50", "total_amount": "3.50" })
        );

        let mut untouched = json!({ "other": 1 });
        apply_budget_totals(&SECTION_C, &mut untouched);
        assert_eq!(untouched, json!({ "other": 1 }));
    }

    #[test]
    fn test_render_section_c() {
        let schema = FormSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "activity_line_items": { "type": "array", "maxItems": 4, "items": { "type": "object" } }
            }
        }))
        .unwrap();
        let mut props = WidgetProps::new("", schema).with_value(json!({
            "activity_line_items": [
                { "activity_title": "Outreach", "non_federal_resources": { "applicant_amount": "100.00", "total_amount": "1.00" } }
            ]
        }));
        props.raw_errors = vec![
            "activity_line_items[0]--non_federal_resources--state_amount: Must be a number".into(),
            "At least one amount is required".into(),
        ];

        let table = render_budget(&props, &SECTION_C);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.errors, vec!["At least one amount is required".to_string()]);
        assert_eq!(table.columns, vec!["Applicant", "State", "Other sources", "Total"]);

        let first = &table.rows[0];
        assert_eq!(first.label, "8.");
        assert_eq!(first.text[0].value, "Outreach");
        assert!(first.text[0].errors.is_empty());
        assert_eq!(first.cells[0].id, "activity_line_items[0]--non_federal_resources--applicant_amount");
        assert!(first.cells[0].editable);
        assert_eq!(first.cells[1].errors, vec!["Must be a number".to_string()]);
        let total = first.total.as_ref().unwrap();
        assert_eq!(total.value, "100.00");
        assert!(!total.editable);

        assert_eq!(table.rows[3].label, "11.");
        assert_eq!(table.rows[3].total.as_ref().unwrap().value, "0.00");
        let grand = table.totals.total.as_ref().unwrap();
        assert_eq!(grand.id, "total_non_federal_resources--total_amount");
        assert_eq!(grand.value, "100.00");
        assert!(table.totals.cells.iter().all(|c| !c.editable));
        assert_eq!(table.error_labels(), vec!["Row 8 Column C"]);
    }

    #[test]
    fn test_render_section_d_from_group_value() {
        let schema = FormSchema::from_json(&json!({ "type": "object", "properties": {} })).unwrap();
        let mut props = WidgetProps::new("forecasted_cash_needs", schema).with_value(json!({
            "federal_forecasted_cash_needs": { "first_quarter_amount": "2.00" }
        }));
        props.raw_errors =
            vec!["forecasted_cash_needs--non_federal_forecasted_cash_needs--fourth_quarter_amount: Must be a number".into()];
        let table = render_budget(&props, &SECTION_D);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0].cells[0].id,
            "forecasted_cash_needs--federal_forecasted_cash_needs--first_quarter_amount"
        );
        assert!(table.rows[0].text.is_empty());
        assert_eq!(table.rows[1].label, "14. Non-federal");
        assert_eq!(table.totals.label, "15. TOTAL");
        let grand = table.totals.total.as_ref().unwrap();
        assert_eq!(grand.value, "2.00");
        assert_eq!(grand.id, "forecasted_cash_needs--total_forecasted_cash_needs--total_amount");
        assert_eq!(grand.label, "Row 15 Column E");
        assert_eq!(table.error_labels(), vec!["Row 14 Column D"]);
    }

    #[test]
    fn test_render_section_a_flags_first_row() {
        let schema = FormSchema::from_json(&json!({ "type": "array", "items": { "type": "object" } })).unwrap();
        let mut props = WidgetProps::new("activity_line_items", schema).with_value(json!([]));
        props.raw_errors = vec![
            "Must have at least 1 items".into(),
            "activity_line_items[0]--budget_summary--federal_new_or_revised_amount: Must be a number".into(),
            "activity_line_items[9]--activity_title: Must be a string".into(),
        ];
        let table = render_budget(&props, &SECTION_A);
        assert_eq!(table.rows.len(), DEFAULT_LINE_ITEMS);
        assert_eq!(table.rows[0].label, "1.");
        assert_eq!(table.rows[0].text[1].id, "activity_line_items[0]--assistance_listing_number");
        assert_eq!(table.rows[0].text[0].errors, vec![REQUIRED_CELL_MESSAGE.to_string()]);
        assert_eq!(table.rows[0].text[1].errors, vec![REQUIRED_CELL_MESSAGE.to_string()]);
        assert!(table.rows[1].text[0].errors.is_empty());
        assert_eq!(table.totals.label, "5. Totals");
        assert_eq!(
            table.error_labels(),
            vec!["Row 1 Column A", "Row 1 Column B", "Row 1 Column E"]
        );
        // errors for cells outside the grid stay visible on the table
        assert_eq!(
            table.errors,
            vec![
                "Must have at least 1 items".to_string(),
                "activity_line_items[9]--activity_title: Must be a string".to_string()
            ]
        );
    }

    #[test]
    fn test_render_section_e_has_no_total_column() {
        let schema = FormSchema::from_json(&json!({ "type": "object", "properties": {} })).unwrap();
        let props = WidgetProps::new("", schema).with_value(json!({
            "activity_line_items": [
                { "activity_title": "Ops", "federal_fund_estimates": { "first_year_amount": "5.00", "third_year_amount": "1.00" } }
            ]
        }));
        let table = render_budget(&props, &SECTION_E);
        assert_eq!(table.columns, vec!["First year", "Second year", "Third year", "Fourth year"]);
        assert_eq!(table.rows[0].label, "16.");
        assert!(table.rows.iter().all(|row| row.total.is_none()));
        assert!(table.totals.total.is_none());
        assert_eq!(table.totals.cells[0].value, "5.00");
        assert_eq!(table.totals.cells[2].value, "1.00");
        assert_eq!(table.totals.cells[0].id, "total_federal_fund_estimates--first_year_amount");
        assert_eq!(table.totals.cells[3].label, "Row 20 Column E");
        assert_eq!(table.rows[0].cells[0].label, "Row 16 Column B");
    }
}
