//! Logged meal entries.
//!
//! An [`Entry`] owns its component list and the aggregate totals derived from
//! it. The two are only ever changed together: components are private and the
//! single mutator recomputes the aggregates in the same call.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

/// Closed set of meal categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealCategory {
    pub const ALL: [MealCategory; 4] = [
        MealCategory::Breakfast,
        MealCategory::Lunch,
        MealCategory::Dinner,
        MealCategory::Snack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealCategory::Breakfast => "breakfast",
            MealCategory::Lunch => "lunch",
            MealCategory::Dinner => "dinner",
            MealCategory::Snack => "snack",
        }
    }
}

impl fmt::Display for MealCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        MealCategory::ALL
            .iter()
            .find(|c| c.as_str() == lower)
            .copied()
            .ok_or_else(|| format!("unknown meal category '{}'", s))
    }
}

/// Numeric nutrient fields shared by components and aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Nutrients {
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein: f64,
    #[serde(default)]
    pub carbs: f64,
    #[serde(default)]
    pub fat: f64,
}

impl Nutrients {
    pub fn new(calories: f64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
        }
    }

    /// Sum in iteration order. Aggregates are always produced by this function.
    pub fn sum<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Nutrients>,
    {
        items
            .into_iter()
            .fold(Nutrients::default(), |acc, n| acc + *n)
    }

    /// Largest absolute per-field difference.
    pub fn max_difference(&self, other: &Nutrients) -> f64 {
        [
            (self.calories - other.calories).abs(),
            (self.protein - other.protein).abs(),
            (self.carbs - other.carbs).abs(),
            (self.fat - other.fat).abs(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    pub fn render(&self) -> String {
        format!(
            "{} kcal, {}g protein, {}g carbs, {}g fat",
            display_amount(self.calories),
            display_amount(self.protein),
            display_amount(self.carbs),
            display_amount(self.fat)
        )
    }
}

impl Add for Nutrients {
    type Output = Nutrients;

    fn add(self, rhs: Nutrients) -> Nutrients {
        Nutrients {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
        }
    }
}

impl AddAssign for Nutrients {
    fn add_assign(&mut self, rhs: Nutrients) {
        *self = *self + rhs;
    }
}

/// Rounds to one decimal place for display only; stored values keep full precision.
pub fn display_amount(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

/// One food item inside an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Component {
    pub name: String,
    /// Free-text magnitude and unit, e.g. "2 large" or "250 ml".
    #[serde(default)]
    pub quantity: String,
    #[serde(flatten)]
    pub nutrients: Nutrients,
}

impl Component {
    pub fn new(name: impl Into<String>, quantity: impl Into<String>, nutrients: Nutrients) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.into(),
            nutrients,
        }
    }

    pub fn render(&self) -> String {
        if self.quantity.trim().is_empty() {
            format!("{} ({})", self.name, self.nutrients.render())
        } else {
            format!(
                "{} [{}] ({})",
                self.name,
                self.quantity,
                self.nutrients.render()
            )
        }
    }
}

/// A stored meal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Assigned by the repository at creation.
    pub id: String,
    pub category: MealCategory,
    components: Vec<Component>,
    aggregates: Nutrients,
    #[serde(default)]
    pub notes: Option<String>,
    /// Immutable, repository-assigned; drives "recent" ordering.
    pub created_at: DateTime<Utc>,
    /// When the meal was eaten; the user may correct it.
    pub occurred_at: DateTime<Utc>,
}

impl Entry {
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn aggregates(&self) -> &Nutrients {
        &self.aggregates
    }

    /// Replaces every component and recomputes the aggregates.
    pub fn set_components(&mut self, components: Vec<Component>) {
        self.components = components;
        self.aggregates = Nutrients::sum(self.components.iter().map(|c| &c.nutrients));
    }

    pub fn aggregates_consistent(&self) -> bool {
        Nutrients::sum(self.components.iter().map(|c| &c.nutrients)) == self.aggregates
    }

    /// Compact single-line rendering used in oracle prompts and candidate lists.
    pub fn render_line(&self) -> String {
        let components = if self.components.is_empty() {
            "no items".to_string()
        } else {
            self.components
                .iter()
                .map(Component::render)
                .collect::<Vec<_>>()
                .join("; ")
        };
        let mut line = format!(
            "id={} | {} | eaten {} | {} | totals: {}",
            self.id,
            self.category,
            self.occurred_at.format("%Y-%m-%d %H:%M UTC"),
            components,
            self.aggregates.render()
        );
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            line.push_str(&format!(" | notes: {}", notes));
        }
        line
    }
}

/// Everything needed to create an entry except what the repository assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    pub category: MealCategory,
    pub components: Vec<Component>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl EntryDraft {
    pub fn new(category: MealCategory, components: Vec<Component>) -> Self {
        Self {
            category,
            components,
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Materializes the entry; only repositories should call this.
    pub fn into_entry(self, id: String, created_at: DateTime<Utc>) -> Entry {
        let aggregates = Nutrients::sum(self.components.iter().map(|c| &c.nutrients));
        Entry {
            id,
            category: self.category,
            components: self.components,
            aggregates,
            notes: self.notes,
            created_at,
            occurred_at: self.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eggs() -> Component {
        Component::new("eggs", "2 large", Nutrients::new(180.0, 12.0, 1.0, 10.0))
    }

    #[test]
    fn draft_computes_aggregates_from_components() {
        let toast = Component::new("toast", "1 slice", Nutrients::new(80.0, 3.0, 15.0, 1.0));
        let entry = EntryDraft::new(MealCategory::Breakfast, vec![eggs(), toast])
            .into_entry("e-1".into(), Utc::now());

        assert_eq!(*entry.aggregates(), Nutrients::new(260.0, 15.0, 16.0, 11.0));
        assert!(entry.aggregates_consistent());
    }

    #[test]
    fn set_components_recomputes_aggregates() {
        let mut entry = EntryDraft::new(MealCategory::Breakfast, vec![eggs()])
            .into_entry("e-1".into(), Utc::now());
        entry.set_components(vec![]);
        assert_eq!(*entry.aggregates(), Nutrients::default());
    }

    #[test]
    fn component_json_is_flat() {
        let json = serde_json::to_value(eggs()).unwrap();
        assert_eq!(json["calories"], 180.0);
        assert_eq!(json["name"], "eggs");

        let parsed: Component =
            serde_json::from_str(r#"{"name":"soda","calories":150}"#).unwrap();
        assert_eq!(parsed.nutrients.calories, 150.0);
        assert_eq!(parsed.nutrients.protein, 0.0);
        assert_eq!(parsed.quantity, "");
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Lunch".parse::<MealCategory>().unwrap(), MealCategory::Lunch);
        assert!("brunch".parse::<MealCategory>().is_err());
    }

    #[test]
    fn display_amount_trims_noise() {
        assert_eq!(display_amount(0.1 + 0.2), "0.3");
        assert_eq!(display_amount(180.0), "180");
        assert_eq!(display_amount(0.0), "0");
    }
}
