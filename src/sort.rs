use crate::error::ValidationError;
use crate::value::Record;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const ASSET_TEXT_FIELDS: &[&str] = &["ticker", "name", "sector"];
pub const POSITION_TEXT_FIELDS: &[&str] = &["ticker", "name"];
// ISO dates order correctly as text
pub const FIXED_INCOME_TEXT_FIELDS: &[&str] = &[
    "distributor",
    "issuer",
    "investment_type",
    "rate_type",
    "date_aporte",
    "maturity_date",
];

pub const DEFAULT_ASSET_SORT: &str = "market_cap_bi";
pub const DEFAULT_POSITION_SORT: &str = "value";
pub const DEFAULT_FIXED_INCOME_SORT: &str = "date_aporte";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> SortDirection {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Asc => "↑",
            SortDirection::Desc => "↓",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(ValidationError::UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The column a table is sorted by and in which direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// A fresh spec always starts descending.
    pub fn new(field: impl Into<String>) -> SortSpec {
        SortSpec {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// The spec after the user clicks the header of `field`: the same field
    /// flips direction, a different field starts over descending.
    #[must_use]
    pub fn toggle(&self, field: &str) -> SortSpec {
        if self.field == field {
            SortSpec {
                field: self.field.clone(),
                direction: self.direction.flipped(),
            }
        } else {
            SortSpec::new(field)
        }
    }

    /// Column header text, with an arrow on the active column.
    pub fn label(&self, label: &str, field: &str) -> String {
        if self.field != field {
            return label.to_string();
        }
        format!("{label} {}", self.direction.arrow())
    }
}

// A sortable column whose value lives in a side map rather than on the row.
#[derive(Debug)]
struct DerivedField<'a> {
    key_field: &'a str,
    values: &'a HashMap<String, f64>,
}

#[derive(Debug)]
enum SortKey {
    Text(String),
    Number(f64),
}

/// Field-name driven comparator over loose rows.
///
/// Fields listed as textual compare case-insensitively as strings, derived
/// fields are read from their side map, and everything else is coerced to a
/// number (unknown or malformed fields become 0).
#[derive(Debug)]
pub struct RecordSorter<'a> {
    textual: &'a [&'a str],
    derived: HashMap<&'a str, DerivedField<'a>>,
}

impl<'a> RecordSorter<'a> {
    pub fn new(textual: &'a [&'a str]) -> RecordSorter<'a> {
        RecordSorter {
            textual,
            derived: HashMap::new(),
        }
    }

    /// Register `field` as derived: its value is looked up in `values` under
    /// the upper-cased text of the row's `key_field`.
    pub fn with_derived(
        mut self,
        field: &'a str,
        key_field: &'a str,
        values: &'a HashMap<String, f64>,
    ) -> RecordSorter<'a> {
        self.derived
            .insert(field, DerivedField { key_field, values });
        self
    }

    fn key(&self, record: &Record, field: &str) -> SortKey {
        if let Some(derived) = self.derived.get(field) {
            let key = record.text(derived.key_field).to_uppercase();
            let value = derived
                .values
                .get(&key)
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            return SortKey::Number(value);
        }

        if self.textual.contains(&field) {
            SortKey::Text(record.text(field).to_uppercase())
        } else {
            SortKey::Number(record.number(field))
        }
    }

    /// Return a sorted copy of `records`. Rows with equal keys keep their
    /// relative input order in both directions.
    pub fn sort(&self, records: &[Record], spec: &SortSpec) -> Vec<Record> {
        let mut keyed: Vec<(SortKey, &Record)> = records
            .iter()
            .map(|record| (self.key(record, &spec.field), record))
            .collect();

        keyed.sort_by(|(left, _), (right, _)| {
            let ordering = compare_keys(left, right);
            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        keyed.into_iter().map(|(_, record)| record.clone()).collect()
    }
}

fn compare_keys(left: &SortKey, right: &SortKey) -> Ordering {
    match (left, right) {
        (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        (SortKey::Number(a), SortKey::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        // one field always yields one kind of key
        _ => Ordering::Equal,
    }
}

pub fn asset_sorter(incomes_by_ticker: &HashMap<String, f64>) -> RecordSorter<'_> {
    RecordSorter::new(ASSET_TEXT_FIELDS).with_derived("incomes", "ticker", incomes_by_ticker)
}

pub fn position_sorter() -> RecordSorter<'static> {
    RecordSorter::new(POSITION_TEXT_FIELDS)
}

pub fn fixed_income_sorter() -> RecordSorter<'static> {
    RecordSorter::new(FIXED_INCOME_TEXT_FIELDS)
}

/// The first record holding the strictly greatest numeric value of `field`.
pub fn leader<'r>(records: &'r [Record], field: &str) -> Option<&'r Record> {
    let mut iter = records.iter();
    let first = iter.next()?;
    Some(iter.fold(first, |best, record| {
        if record.number(field) > best.number(field) {
            record
        } else {
            best
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assets() -> Vec<Record> {
        vec![
            Record::from_value(json!({"ticker": "petr4", "name": "Petrobras", "price": 38.5, "dy": "12.1"})),
            Record::from_value(json!({"ticker": "ITUB4", "name": "itau", "price": 33.0, "dy": 7.4})),
            Record::from_value(json!({"ticker": "HGLG11", "name": null, "price": "160.2", "dy": "n/a"})),
        ]
    }

    fn tickers(records: &[Record]) -> Vec<String> {
        records.iter().map(|r| r.text("ticker")).collect()
    }

    #[test]
    fn test_new_spec_defaults_to_desc() {
        let spec = SortSpec::new("value");
        assert_eq!(spec.direction, SortDirection::Desc);
    }

    #[test]
    fn test_toggle_same_field_flips_and_other_field_resets() {
        let spec = SortSpec::new("value");
        let flipped = spec.toggle("value");
        assert_eq!(flipped.direction, SortDirection::Asc);
        assert_eq!(flipped.toggle("value").direction, SortDirection::Desc);

        let other = flipped.toggle("ticker");
        assert_eq!(other.field, "ticker");
        assert_eq!(other.direction, SortDirection::Desc);
    }

    #[test]
    fn test_numeric_sort_desc_and_asc() {
        let sorter = RecordSorter::new(ASSET_TEXT_FIELDS);
        let desc = sorter.sort(&assets(), &SortSpec::new("price"));
        assert_eq!(tickers(&desc), vec!["HGLG11", "petr4", "ITUB4"]);

        let asc = sorter.sort(&assets(), &SortSpec::new("price").toggle("price"));
        assert_eq!(tickers(&asc), vec!["ITUB4", "petr4", "HGLG11"]);
    }

    #[test]
    fn test_clicking_twice_reverses_exactly() {
        let sorter = RecordSorter::new(ASSET_TEXT_FIELDS);
        let first_click = SortSpec::new(DEFAULT_ASSET_SORT).toggle("price");
        let second_click = first_click.toggle("price");
        assert_eq!(second_click.direction, SortDirection::Asc);

        let once = sorter.sort(&assets(), &first_click);
        let mut twice = sorter.sort(&assets(), &second_click);
        twice.reverse();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_textual_fields_ignore_case() {
        let sorter = RecordSorter::new(ASSET_TEXT_FIELDS);
        let asc = sorter.sort(&assets(), &SortSpec::new("ticker").toggle("ticker"));
        assert_eq!(tickers(&asc), vec!["HGLG11", "ITUB4", "petr4"]);

        // null name coerces to "" and sorts first ascending
        let by_name = sorter.sort(&assets(), &SortSpec::new("name").toggle("name"));
        assert_eq!(tickers(&by_name), vec!["HGLG11", "ITUB4", "petr4"]);
    }

    #[test]
    fn test_malformed_numbers_sort_as_zero() {
        let sorter = RecordSorter::new(ASSET_TEXT_FIELDS);
        let asc = sorter.sort(&assets(), &SortSpec::new("dy").toggle("dy"));
        assert_eq!(tickers(&asc), vec!["HGLG11", "ITUB4", "petr4"]);
    }

    #[test]
    fn test_unknown_field_keeps_input_order() {
        let sorter = RecordSorter::new(ASSET_TEXT_FIELDS);
        let input = assets();
        let desc = sorter.sort(&input, &SortSpec::new("no_such_field"));
        let asc = sorter.sort(&input, &SortSpec::new("no_such_field").toggle("no_such_field"));
        assert_eq!(desc, input);
        assert_eq!(asc, input);
    }

    #[test]
    fn test_ties_are_stable() {
        let rows = vec![
            Record::from_value(json!({"id": 1, "value": 10})),
            Record::from_value(json!({"id": 2, "value": 20})),
            Record::from_value(json!({"id": 3, "value": 10})),
            Record::from_value(json!({"id": 4, "value": 20})),
        ];
        let sorter = position_sorter();
        let ids = |rows: &[Record]| rows.iter().map(|r| r.number("id") as i64).collect::<Vec<_>>();

        assert_eq!(ids(&sorter.sort(&rows, &SortSpec::new("value"))), vec![2, 4, 1, 3]);
        assert_eq!(
            ids(&sorter.sort(&rows, &SortSpec::new("value").toggle("value"))),
            vec![1, 3, 2, 4]
        );
    }

    #[test]
    fn test_derived_field_reads_side_map() {
        let mut incomes = HashMap::new();
        incomes.insert("PETR4".to_string(), 50.0);
        incomes.insert("HGLG11".to_string(), 120.0);

        let sorter = asset_sorter(&incomes);
        let desc = sorter.sort(&assets(), &SortSpec::new("incomes"));
        // ITUB4 has no entry and counts as 0
        assert_eq!(tickers(&desc), vec!["HGLG11", "petr4", "ITUB4"]);
    }

    #[test]
    fn test_sort_does_not_touch_input() {
        let input = assets();
        let before = input.clone();
        let _ = fixed_income_sorter().sort(&input, &SortSpec::new("price"));
        assert_eq!(input, before);
    }

    #[test]
    fn test_sort_empty_list() {
        assert!(position_sorter().sort(&[], &SortSpec::new("value")).is_empty());
    }

    #[test]
    fn test_label_marks_active_column() {
        let spec = SortSpec::new("value");
        assert_eq!(spec.label("Total", "value"), "Total ↓");
        assert_eq!(spec.toggle("value").label("Total", "value"), "Total ↑");
        assert_eq!(spec.label("Ticker", "ticker"), "Ticker");
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("ASC".parse::<SortDirection>(), Ok(SortDirection::Asc));
        assert_eq!(
            "up".parse::<SortDirection>(),
            Err(ValidationError::UnknownDirection("up".to_string()))
        );
    }

    #[test]
    fn test_leader_picks_first_maximum() {
        let rows = vec![
            Record::from_value(json!({"ticker": "A", "dy": 5})),
            Record::from_value(json!({"ticker": "B", "dy": 9})),
            Record::from_value(json!({"ticker": "C", "dy": 9})),
        ];
        assert_eq!(leader(&rows, "dy").map(|r| r.text("ticker")), Some("B".to_string()));
        assert!(leader(&[], "dy").is_none());
    }
}
