//! Which portfolios (and which toggle-group members in general) are active.
//!
//! Ids reach us as numbers from the API and as strings from stored config.
//! [`PortfolioId`] canonicalizes both at the boundary so every comparison
//! below is plain integer equality.

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PortfolioId(i64);

impl PortfolioId {
    pub fn new(id: i64) -> PortfolioId {
        PortfolioId(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Parse an id from text. `"7"`, `" 7 "` and `"7.0"` are the same id.
    pub fn parse(text: &str) -> Result<PortfolioId, ValidationError> {
        let trimmed = text.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(PortfolioId(id));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(integral)
            .map(PortfolioId)
            .ok_or_else(|| ValidationError::InvalidPortfolioId(text.to_string()))
    }

    pub fn from_value(value: &Value) -> Option<PortfolioId> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(PortfolioId),
            Value::String(s) => PortfolioId::parse(s).ok(),
            _ => None,
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

impl FromStr for PortfolioId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortfolioId::parse(s)
    }
}

impl fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PortfolioId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        PortfolioId::from_value(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid portfolio id: {raw}")))
    }
}

/// A named portfolio (carteira) as listed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    #[serde(default)]
    pub name: String,
}

/// An ordered set of active members that refuses to lose its last member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleGroup<T> {
    members: Vec<T>,
}

impl<T: Clone + PartialEq> ToggleGroup<T> {
    /// Duplicates are dropped, first occurrence wins.
    pub fn new(members: Vec<T>) -> ToggleGroup<T> {
        let mut unique: Vec<T> = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        ToggleGroup { members: unique }
    }

    pub fn members(&self) -> &[T] {
        &self.members
    }

    pub fn contains(&self, item: &T) -> bool {
        self.members.contains(item)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Remove `item` if active, unless it is the last one; append it otherwise.
    #[must_use]
    pub fn toggle(&self, item: T) -> ToggleGroup<T> {
        if self.contains(&item) {
            let next: Vec<T> = self
                .members
                .iter()
                .filter(|member| **member != item)
                .cloned()
                .collect();
            if next.is_empty() {
                return self.clone();
            }
            return ToggleGroup { members: next };
        }

        let mut next = self.members.clone();
        next.push(item);
        ToggleGroup { members: next }
    }
}

/// Keep the active ids that still exist in `universe`. When none survive,
/// fall back to the first portfolio of the universe (or nothing if it is
/// empty).
pub fn reconcile(current: &[PortfolioId], universe: &[Portfolio]) -> Vec<PortfolioId> {
    let valid: Vec<PortfolioId> = current
        .iter()
        .copied()
        .filter(|id| universe.iter().any(|p| p.id == *id))
        .collect();

    if !valid.is_empty() {
        return valid;
    }

    match universe.first() {
        Some(first) => {
            tracing::info!(fallback = %first.id, "no active portfolio survived refresh");
            vec![first.id]
        }
        None => Vec::new(),
    }
}

/// The set of portfolios whose data the dashboard shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    active: ToggleGroup<PortfolioId>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SelectionState {
    pub fn new(ids: Vec<PortfolioId>) -> SelectionState {
        SelectionState {
            active: ToggleGroup::new(ids),
        }
    }

    /// Canonicalize ids read back from storage; unreadable entries are skipped.
    pub fn from_stored(raw: &[String]) -> SelectionState {
        let mut ids = Vec::new();
        for text in raw {
            match PortfolioId::parse(text) {
                Ok(id) => ids.push(id),
                Err(err) => tracing::warn!("ignoring stored selection entry: {err}"),
            }
        }
        SelectionState::new(ids)
    }

    /// The form written back to storage.
    pub fn to_stored(&self) -> Vec<String> {
        self.active().iter().map(|id| id.to_string()).collect()
    }

    pub fn active(&self) -> &[PortfolioId] {
        self.active.members()
    }

    pub fn is_active(&self, id: PortfolioId) -> bool {
        self.active.contains(&id)
    }

    #[must_use]
    pub fn toggle(&self, id: PortfolioId) -> SelectionState {
        SelectionState {
            active: self.active.toggle(id),
        }
    }

    #[must_use]
    pub fn reconcile(&self, universe: &[Portfolio]) -> SelectionState {
        SelectionState::new(reconcile(self.active(), universe))
    }

    /// Name of the first active portfolio, used as the dashboard headline.
    pub fn active_name<'u>(&self, universe: &'u [Portfolio]) -> Option<&'u str> {
        let first = self.active().first()?;
        universe
            .iter()
            .find(|p| p.id == *first)
            .map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn id(n: i64) -> PortfolioId {
        PortfolioId::new(n)
    }

    fn universe(ids: &[i64]) -> Vec<Portfolio> {
        ids.iter()
            .map(|n| Portfolio {
                id: id(*n),
                name: format!("Carteira {n}"),
            })
            .collect()
    }

    #[rstest]
    #[case("7", 7)]
    #[case(" 7 ", 7)]
    #[case("7.0", 7)]
    #[case("-3", -3)]
    fn test_parse_id(#[case] text: &str, #[case] expected: i64) {
        assert_eq!(PortfolioId::parse(text), Ok(id(expected)));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("1.5")]
    #[case("NaN")]
    fn test_parse_id_rejects(#[case] text: &str) {
        assert!(PortfolioId::parse(text).is_err());
    }

    #[test]
    fn test_string_and_number_ids_compare_equal() {
        let from_api: Portfolio = serde_json::from_value(json!({"id": 3, "name": "Longo prazo"})).unwrap();
        let from_storage: Portfolio = serde_json::from_value(json!({"id": "3"})).unwrap();
        assert_eq!(from_api.id, from_storage.id);
        assert_eq!(PortfolioId::from_value(&json!(3.0)), Some(id(3)));
        assert_eq!(PortfolioId::from_value(&json!(null)), None);
        assert!(serde_json::from_value::<Portfolio>(json!({"id": "x"})).is_err());
    }

    #[test]
    fn test_reconcile_keeps_surviving_ids_in_order() {
        let result = reconcile(&[id(3), id(9), id(1)], &universe(&[1, 2, 3]));
        assert_eq!(result, vec![id(3), id(1)]);
    }

    #[test]
    fn test_reconcile_is_noop_when_all_survive() {
        let current = vec![id(2), id(1)];
        assert_eq!(reconcile(&current, &universe(&[1, 2, 3])), current);
    }

    #[test]
    fn test_reconcile_falls_back_to_first_portfolio() {
        assert_eq!(reconcile(&[id(8)], &universe(&[5, 6])), vec![id(5)]);
        assert_eq!(reconcile(&[], &universe(&[5, 6])), vec![id(5)]);
    }

    #[test]
    fn test_reconcile_empty_universe() {
        assert!(reconcile(&[id(1)], &[]).is_empty());
        assert!(reconcile(&[], &[]).is_empty());
    }

    #[test]
    fn test_toggle_appends_and_removes() {
        let state = SelectionState::new(vec![id(1)]);
        let state = state.toggle(id(3)).toggle(id(2));
        assert_eq!(state.active(), &[id(1), id(3), id(2)]);

        let state = state.toggle(id(3));
        assert_eq!(state.active(), &[id(1), id(2)]);
    }

    #[test]
    fn test_toggle_refuses_to_empty_selection() {
        let state = SelectionState::new(vec![id(4)]);
        assert_eq!(state.toggle(id(4)), state);
    }

    #[test]
    fn test_toggle_group_dedups() {
        let group = ToggleGroup::new(vec!["br", "us", "br"]);
        assert_eq!(group.members(), &["br", "us"]);
        assert_eq!(group.len(), 2);
        assert!(!group.is_empty());
    }

    #[test]
    fn test_toggle_on_empty_group_appends() {
        let group: ToggleGroup<i32> = ToggleGroup::new(vec![]);
        assert_eq!(group.toggle(5).members(), &[5]);
    }

    #[test]
    fn test_from_stored_skips_garbage() {
        let stored = vec!["2".to_string(), "oops".to_string(), "2.0".to_string(), "5".to_string()];
        let state = SelectionState::from_stored(&stored);
        assert_eq!(state.active(), &[id(2), id(5)]);
        assert_eq!(state.to_stored(), vec!["2".to_string(), "5".to_string()]);
    }

    #[test]
    fn test_state_reconcile_and_active_name() {
        let portfolios = universe(&[1, 2]);
        let state = SelectionState::new(vec![id(7)]).reconcile(&portfolios);
        assert_eq!(state.active(), &[id(1)]);
        assert!(state.is_active(id(1)));
        assert_eq!(state.active_name(&portfolios), Some("Carteira 1"));
        assert_eq!(SelectionState::default().active_name(&portfolios), None);
    }
}
