//! Year × month pivot of the monthly class summary.
//!
//! The API sends one row per month with activity, labelled `mon/yy` with
//! Portuguese month abbreviations. The pivot turns that sparse list into a
//! dense grid: one bucket per year, twelve cells per metric, each cell the sum
//! of the selected categories.

use crate::error::ValidationError;
use crate::selection::ToggleGroup;
use crate::value::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Column header and label key for each calendar month, January first.
pub const MONTHS: [(&str, &str); 12] = [
    ("JAN", "jan"),
    ("FEV", "fev"),
    ("MAR", "mar"),
    ("ABR", "abr"),
    ("MAI", "mai"),
    ("JUN", "jun"),
    ("JUL", "jul"),
    ("AGO", "ago"),
    ("SET", "set"),
    ("OUT", "out"),
    ("NOV", "nov"),
    ("DEZ", "dez"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Br,
    Us,
    Fii,
    Cripto,
    Fixa,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Br,
        Category::Us,
        Category::Fii,
        Category::Cripto,
        Category::Fixa,
    ];

    /// Prefix of the row fields belonging to this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Br => "br",
            Category::Us => "us",
            Category::Fii => "fii",
            Category::Cripto => "cripto",
            Category::Fixa => "fixa",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Br => "BR",
            Category::Us => "US",
            Category::Fii => "FIIs",
            Category::Cripto => "Cripto",
            Category::Fixa => "FIXA",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Invested,
    Incomes,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Invested, Metric::Incomes];

    /// Suffix of the row fields holding this metric.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Invested => "invested",
            Metric::Incomes => "incomes",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Metric::Invested => "Inv",
            Metric::Incomes => "Prov",
        }
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invested" => Ok(Metric::Invested),
            "incomes" => Ok(Metric::Incomes),
            _ => Err(ValidationError::UnknownMetric(s.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which categories feed the pivot and which metrics are displayed.
/// Neither group can be emptied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySelection {
    categories: ToggleGroup<Category>,
    metrics: ToggleGroup<Metric>,
}

impl Default for CategorySelection {
    fn default() -> Self {
        CategorySelection {
            categories: ToggleGroup::new(Category::ALL.to_vec()),
            metrics: ToggleGroup::new(Metric::ALL.to_vec()),
        }
    }
}

impl CategorySelection {
    pub fn categories(&self) -> &[Category] {
        self.categories.members()
    }

    pub fn metrics(&self) -> &[Metric] {
        self.metrics.members()
    }

    pub fn shows(&self, metric: Metric) -> bool {
        self.metrics.contains(&metric)
    }

    #[must_use]
    pub fn toggle_category(&self, category: Category) -> CategorySelection {
        CategorySelection {
            categories: self.categories.toggle(category),
            metrics: self.metrics.clone(),
        }
    }

    #[must_use]
    pub fn toggle_metric(&self, metric: Metric) -> CategorySelection {
        CategorySelection {
            categories: self.categories.clone(),
            metrics: self.metrics.toggle(metric),
        }
    }
}

/// One month of the class summary: a `label` plus `<category>_<metric>`
/// fields (`br_invested`, `fii_incomes`, ...). Extra fields such as
/// `total_invested` ride along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthlyClassRow(Record);

impl MonthlyClassRow {
    pub fn new(record: Record) -> MonthlyClassRow {
        MonthlyClassRow(record)
    }

    pub fn label(&self) -> String {
        self.0.text("label").to_lowercase()
    }

    pub fn value(&self, category: Category, metric: Metric) -> f64 {
        self.0
            .number(&format!("{}_{}", category.as_str(), metric.as_str()))
    }

    /// Any other numeric column of the row, e.g. `total_invested`.
    pub fn field(&self, name: &str) -> f64 {
        self.0.number(name)
    }

    /// Contribution of this row to `metric` given the selected categories.
    /// Unselected categories contribute nothing.
    pub fn selected_sum(&self, metric: Metric, categories: &[Category]) -> f64 {
        Category::ALL
            .into_iter()
            .filter(|c| categories.contains(c))
            .map(|c| self.value(c, metric))
            .sum()
    }
}

/// Split a `mon/yy` label into (four-digit year, zero-based month).
///
/// A well-formed label with an unknown month abbreviation still yields its
/// year, with no month. Years resolve to 2000 + yy; labels before 2000 or
/// after 2099 cannot be represented.
pub fn parse_label(label: &str) -> Option<(i32, Option<usize>)> {
    let label = label.to_lowercase();
    let (month, year) = label.split_once('/')?;
    if month.is_empty() || year.len() != 2 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let short: i32 = year.parse().ok()?;
    let month_index = MONTHS.iter().position(|(_, key)| *key == month);
    Some((2000 + short, month_index))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearBucket {
    pub year: i32,
    pub invested_values: [f64; 12],
    pub incomes_values: [f64; 12],
    pub invested_total: f64,
    pub incomes_total: f64,
}

impl YearBucket {
    fn from_cells(year: i32, invested_values: [f64; 12], incomes_values: [f64; 12]) -> YearBucket {
        YearBucket {
            year,
            invested_values,
            incomes_values,
            invested_total: invested_values.iter().sum(),
            incomes_total: incomes_values.iter().sum(),
        }
    }

    pub fn label(&self) -> String {
        self.year.to_string()
    }

    pub fn values(&self, metric: Metric) -> &[f64; 12] {
        match metric {
            Metric::Invested => &self.invested_values,
            Metric::Incomes => &self.incomes_values,
        }
    }

    pub fn total(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Invested => self.invested_total,
            Metric::Incomes => self.incomes_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualPivot {
    pub months: [&'static str; 12],
    pub years: Vec<YearBucket>,
}

/// Build the dense year × month grid from sparse monthly rows.
///
/// Rows with an unreadable label are skipped. A row whose month is unknown
/// still opens its year but adds nothing. Several rows for the same month add
/// up. Years come out in ascending order and always carry twelve cells per
/// metric.
pub fn build_annual_pivot(rows: &[MonthlyClassRow], categories: &[Category]) -> AnnualPivot {
    let mut grid: BTreeMap<i32, ([f64; 12], [f64; 12])> = BTreeMap::new();

    for row in rows {
        let label = row.label();
        let Some((year, month)) = parse_label(&label) else {
            tracing::debug!(label = %label, "skipping monthly row with unreadable label");
            continue;
        };

        let (invested, incomes) = grid.entry(year).or_insert(([0.0; 12], [0.0; 12]));
        let Some(month) = month else {
            tracing::debug!(label = %label, "unknown month, year kept without values");
            continue;
        };
        invested[month] += row.selected_sum(Metric::Invested, categories);
        incomes[month] += row.selected_sum(Metric::Incomes, categories);
    }

    AnnualPivot {
        months: MONTHS.map(|(header, _)| header),
        years: grid
            .into_iter()
            .map(|(year, (invested, incomes))| YearBucket::from_cells(year, invested, incomes))
            .collect(),
    }
}
