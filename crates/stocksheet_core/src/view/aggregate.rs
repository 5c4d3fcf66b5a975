//! Row aggregation over the raw record list.
//!
//! # Responsibility
//! - Group records by item name, keeping first-seen order.
//! - Compute per-item total quantities and default date selections.
//! - Serve the prefix filter and the expanded per-date breakdown.
//!
//! # Invariants
//! - The view is rebuilt from the raw record list; it is never persisted
//!   or mutated in place.
//! - A record with an empty name contributes to nothing.
//! - Total quantity equals the sum of the group's quantities; entries
//!   excluded from the date breakdown still count toward the total.

use crate::model::StockRecord;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// One dated batch inside an item group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    pub day: String,
    pub month: String,
    pub year: String,
    pub quantity: u32,
    /// Index of the originating record in the raw list.
    pub source_index: usize,
}

impl ItemEntry {
    pub fn has_complete_date(&self) -> bool {
        !self.day.is_empty() && !self.month.is_empty() && !self.year.is_empty()
    }

    /// Display label, `None` when the date is incomplete.
    pub fn date_label(&self) -> Option<String> {
        if self.has_complete_date() {
            Some(format!("{} {} {}", self.day, self.month, self.year))
        } else {
            None
        }
    }
}

/// Summary row for one unique item name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub name: String,
    pub entries: Vec<ItemEntry>,
    pub total_quantity: u64,
}

impl ItemView {
    /// First entry's date, used as the default date-picker selection.
    pub fn default_date(&self) -> Option<&ItemEntry> {
        self.entries.first()
    }

    /// Entries shown in the expanded per-date breakdown: positive
    /// quantity and a complete date only.
    pub fn dated_entries(&self) -> Vec<&ItemEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.quantity > 0 && entry.has_complete_date())
            .collect()
    }
}

/// Aggregated item view over one snapshot of the record list.
#[derive(Debug, Clone, Default)]
pub struct StockView {
    items: Vec<ItemView>,
    by_name: HashMap<String, usize>,
}

impl StockView {
    /// Builds the view, grouping by name in first-seen order.
    pub fn build(records: &[StockRecord]) -> Self {
        let mut items: Vec<ItemView> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for (source_index, record) in records.iter().enumerate() {
            if record.name.is_empty() {
                continue;
            }

            let entry = ItemEntry {
                day: record.day.clone(),
                month: record.month.clone(),
                year: record.year.clone(),
                quantity: record.quantity,
                source_index,
            };

            match by_name.entry(record.name.clone()) {
                Entry::Occupied(slot) => {
                    let item = &mut items[*slot.get()];
                    item.total_quantity += u64::from(entry.quantity);
                    item.entries.push(entry);
                }
                Entry::Vacant(slot) => {
                    slot.insert(items.len());
                    items.push(ItemView {
                        name: record.name.clone(),
                        total_quantity: u64::from(entry.quantity),
                        entries: vec![entry],
                    });
                }
            }
        }

        Self { items, by_name }
    }

    pub fn items(&self) -> &[ItemView] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ItemView> {
        self.by_name.get(name).map(|&index| &self.items[index])
    }

    /// Search-as-you-type filter: case-insensitive prefix match on item
    /// names. An empty term keeps every row.
    pub fn filter_prefix(&self, term: &str) -> Vec<&ItemView> {
        let term = term.to_lowercase();
        self.items
            .iter()
            .filter(|item| item.name.to_lowercase().starts_with(&term))
            .collect()
    }

    /// Deterministic text rendering: one line per item with total and
    /// default date. Identical record sets render identically.
    pub fn format_rows(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            let (day, month, year) = match item.default_date() {
                Some(entry) => (entry.day.as_str(), entry.month.as_str(), entry.year.as_str()),
                None => ("", "", ""),
            };
            out.push_str(&format!(
                "{}\t{}\t{} {} {}\n",
                item.name, item.total_quantity, day, month, year
            ));
        }
        out
    }
}
