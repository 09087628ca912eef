use crate::model::{display_amount, Entry, MealCategory, Nutrients};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub date: NaiveDate,
    pub entry_count: usize,
    pub totals: Nutrients,
    pub by_category: BTreeMap<MealCategory, Nutrients>,
}

impl AggregateSummary {
    pub fn from_entries(date: NaiveDate, entries: &[Entry]) -> Self {
        let mut by_category: BTreeMap<MealCategory, Nutrients> = BTreeMap::new();
        for entry in entries {
            *by_category.entry(entry.category).or_default() += *entry.aggregates();
        }
        Self {
            date,
            entry_count: entries.len(),
            totals: Nutrients::sum(entries.iter().map(|e| e.aggregates())),
            by_category,
        }
    }

    pub fn render(&self) -> String {
        if self.entry_count == 0 {
            return format!("Nothing is logged for {}.", self.date);
        }
        let breakdown = self
            .by_category
            .iter()
            .map(|(category, totals)| {
                format!("{} {} kcal", category, display_amount(totals.calories))
            })
            .join(", ");
        format!(
            "On {} you logged {} {}: {} ({}).",
            self.date,
            self.entry_count,
            if self.entry_count == 1 { "entry" } else { "entries" },
            self.totals.render(),
            breakdown
        )
    }
}
