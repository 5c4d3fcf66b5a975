//! Inventory record domain model.
//!
//! # Responsibility
//! - Define the canonical positional record owned by the remote sheet.
//! - Decode raw wire rows tolerantly into well-formed records.
//!
//! # Invariants
//! - `quantity` is never negative; malformed wire quantities decode to 0.
//! - Date parts are plain strings; missing parts decode to `""`.
//! - Decoding never fails: malformed cells degrade to defaults.

use serde_json::Value;

/// One spreadsheet row: `[name, day, month, year, quantity]`.
///
/// The remote store enforces no uniqueness; several records may share a
/// name, each representing a dated batch of the same item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRecord {
    pub name: String,
    pub day: String,
    pub month: String,
    pub year: String,
    pub quantity: u32,
}

impl StockRecord {
    pub fn new(
        name: impl Into<String>,
        day: impl Into<String>,
        month: impl Into<String>,
        year: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            name: name.into(),
            day: day.into(),
            month: month.into(),
            year: year.into(),
            quantity,
        }
    }

    /// Returns whether all three date parts are present.
    pub fn has_complete_date(&self) -> bool {
        !self.day.is_empty() && !self.month.is_empty() && !self.year.is_empty()
    }

    /// Decodes one raw wire row into a record.
    ///
    /// # Contract
    /// - A non-array row decodes to an all-defaults record (the view layer
    ///   drops records with an empty name).
    /// - Missing cells decode to `""` / 0 instead of failing.
    pub fn from_row(row: &Value) -> Self {
        let cells = row.as_array().map(Vec::as_slice).unwrap_or(&[]);
        Self {
            name: text_cell(cells.first()),
            day: text_cell(cells.get(1)),
            month: text_cell(cells.get(2)),
            year: text_cell(cells.get(3)),
            quantity: quantity_cell(cells.get(4)),
        }
    }
}

/// Outbound quantity update: payload for the `update` write action and
/// the value coalesced by the debouncer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdate {
    pub name: String,
    pub quantity: u32,
    pub day: String,
    pub month: String,
    pub year: String,
}

impl QuantityUpdate {
    pub fn new(
        name: impl Into<String>,
        quantity: u32,
        day: impl Into<String>,
        month: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            quantity,
            day: day.into(),
            month: month.into(),
            year: year.into(),
        }
    }

    pub fn has_complete_date(&self) -> bool {
        !self.day.is_empty() && !self.month.is_empty() && !self.year.is_empty()
    }

    /// Identity of the logical update stream this update belongs to.
    ///
    /// Updates sharing a key coalesce under the debouncer; updates with
    /// different keys never cancel each other.
    pub fn key(&self) -> UpdateKey {
        UpdateKey {
            name: self.name.clone(),
            day: self.day.clone(),
            month: self.month.clone(),
            year: self.year.clone(),
        }
    }
}

/// Debounce key: item name plus the dated batch the update targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpdateKey {
    pub name: String,
    pub day: String,
    pub month: String,
    pub year: String,
}

fn text_cell(cell: Option<&Value>) -> String {
    match cell {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(value) => value.to_string(),
            None => number.to_string(),
        },
        Some(Value::Bool(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn quantity_cell(cell: Option<&Value>) -> u32 {
    match cell {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .filter(|value| *value >= 0)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(0),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|value| *value >= 0)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(0),
        _ => 0,
    }
}
