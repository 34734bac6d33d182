//! Bucketing of flat item lists and the roll-up shown on each bucket header.

use crate::value::Record;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Partition `items` by `classifier`. Items the classifier maps to `None`
/// belong to no group and are left out.
pub fn group_by<T, K, F>(items: &[T], classifier: F) -> BTreeMap<K, Vec<T>>
where
    T: Clone,
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    let mut dropped = 0usize;

    for item in items {
        match classifier(item) {
            Some(key) => groups.entry(key).or_default().push(item.clone()),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, "items matched no group");
    }
    groups
}

/// Which row fields feed each summed column. The first present field of each
/// list is read; none present counts as 0.
#[derive(Debug, Clone, Copy)]
pub struct SummaryFields {
    pub applied: &'static [&'static str],
    pub current: &'static [&'static str],
    pub income: &'static [&'static str],
    pub total_received: &'static [&'static str],
}

pub const FIXED_INCOME_FIELDS: SummaryFields = SummaryFields {
    applied: &["active_applied_value", "aporte"],
    current: &["current_gross_value"],
    income: &["current_income"],
    total_received: &["total_received"],
};

pub const POSITION_FIELDS: SummaryFields = SummaryFields {
    applied: &["invested_value"],
    current: &["value"],
    income: &["total_incomes"],
    total_received: &[],
};

fn first_present(record: &Record, candidates: &[&str]) -> f64 {
    candidates
        .iter()
        .find(|field| record.has(field))
        .map(|field| record.number(field))
        .unwrap_or(0.0)
}

/// Share of `part` in `whole`, in percent. A non-positive whole gives 0.
pub fn weight(part: f64, whole: f64) -> f64 {
    if whole > 0.0 && part.is_finite() && whole.is_finite() {
        part / whole * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GroupSummary {
    pub count: usize,
    pub applied: f64,
    pub current: f64,
    pub income: f64,
    pub total_received: f64,
    pub weight: f64,
}

/// Roll up a group. `overall_total` is the whole the weight is measured
/// against, independent of which groups end up displayed.
pub fn summarize(group: &[Record], fields: &SummaryFields, overall_total: f64) -> GroupSummary {
    let sum = |candidates: &[&str]| -> f64 {
        group
            .iter()
            .map(|item| first_present(item, candidates))
            .sum()
    };

    let current = sum(fields.current);
    GroupSummary {
        count: group.len(),
        applied: sum(fields.applied),
        current,
        income: sum(fields.income),
        total_received: sum(fields.total_received),
        weight: weight(current, overall_total),
    }
}

/// Summaries for every key in `keys`, in that order; keys without items get
/// an all-zero summary.
pub fn summarize_groups<K: Ord + Copy>(
    groups: &BTreeMap<K, Vec<Record>>,
    keys: &[K],
    fields: &SummaryFields,
    overall_total: f64,
) -> Vec<(K, GroupSummary)> {
    keys.iter()
        .map(|key| {
            let items = groups.get(key).map(Vec::as_slice).unwrap_or(&[]);
            (*key, summarize(items, fields, overall_total))
        })
        .collect()
}

/// Fixed-income split between prefixed-rate and floating-rate titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RateGroup {
    Prefixado,
    Posfixado,
}

impl RateGroup {
    pub const ALL: [RateGroup; 2] = [RateGroup::Prefixado, RateGroup::Posfixado];

    pub fn as_str(self) -> &'static str {
        match self {
            RateGroup::Prefixado => "prefixado",
            RateGroup::Posfixado => "posfixado",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RateGroup::Prefixado => "Juros Prefixado",
            RateGroup::Posfixado => "Juros Pos-fixado",
        }
    }

    /// Only a plain `FIXO` rate is prefixed; every other rate type floats.
    pub fn classify(item: &Record) -> RateGroup {
        if item.text("rate_type").trim().to_uppercase() == "FIXO" {
            RateGroup::Prefixado
        } else {
            RateGroup::Posfixado
        }
    }
}

/// Variable-income asset classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetClass {
    BrStocks,
    UsStocks,
    Crypto,
    Fiis,
}

impl AssetClass {
    pub const ALL: [AssetClass; 4] = [
        AssetClass::BrStocks,
        AssetClass::UsStocks,
        AssetClass::Crypto,
        AssetClass::Fiis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetClass::BrStocks => "br_stocks",
            AssetClass::UsStocks => "us_stocks",
            AssetClass::Crypto => "crypto",
            AssetClass::Fiis => "fiis",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AssetClass::BrStocks => "Acoes BR",
            AssetClass::UsStocks => "Acoes US",
            AssetClass::Crypto => "Cripto",
            AssetClass::Fiis => "FIIs",
        }
    }

    pub fn from_key(key: &str) -> Option<AssetClass> {
        let key = key.trim().to_lowercase();
        AssetClass::ALL.into_iter().find(|c| c.as_str() == key)
    }

    /// Guess the class from the ticker, name and sector of an asset.
    pub fn infer(ticker: &str, name: &str, sector: &str) -> AssetClass {
        let ticker = ticker.to_uppercase();
        let name = name.to_uppercase();
        let sector = sector.to_uppercase();

        if ticker.contains("-USD")
            || ticker.ends_with("USDT")
            || sector.contains("CRYPTO")
            || name.contains("CRYPTO")
        {
            return AssetClass::Crypto;
        }

        let is_fii = ticker.ends_with("11")
            && (name.contains("FII")
                || name.contains("IMOBILI")
                || name.contains("REIT")
                || sector == "REAL ESTATE"
                || sector == "FUNDOS IMOBILIARIOS");
        if is_fii {
            return AssetClass::Fiis;
        }

        let clean: String = ticker.chars().filter(|c| *c != '.').collect();
        if !clean.is_empty() && clean.chars().all(char::is_alphabetic) && clean.chars().count() <= 6 {
            return AssetClass::UsStocks;
        }

        AssetClass::BrStocks
    }

    /// The row's explicit `category` when it has one, the heuristic
    /// otherwise. An unrecognized explicit category places the row nowhere.
    pub fn classify(item: &Record) -> Option<AssetClass> {
        if item.has("category") {
            return AssetClass::from_key(&item.text("category"));
        }
        Some(AssetClass::infer(
            &item.text("ticker"),
            &item.text("name"),
            &item.text("sector"),
        ))
    }
}

/// Total `amount` per upper-cased `ticker`. Rows without a ticker are ignored.
pub fn income_totals_by_ticker(incomes: &[Record]) -> HashMap<String, f64> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for income in incomes {
        let ticker = income.text("ticker").trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }
        *totals.entry(ticker).or_insert(0.0) += income.number("amount");
    }
    totals
}
