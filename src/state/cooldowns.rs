//! Rolling per-map cooldown bookkeeping.
//!
//! Map codes encode the game mode and time of day as underscore-separated suffixes
//! (`FOY_WARFARE_NIGHT`). Every variant of a map shares one cooldown bucket keyed by its base
//! code, so playing Foy at night also cools down Foy during the day.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

/// Game-mode suffixes stripped when computing a base map code.
const VARIANT_GAME_SUFFIXES: &[&str] = &["WARFARE", "OFFENSIVE", "OFFENSIVEUS", "OFFENSIVEGER"];
/// Time-of-day suffixes stripped when computing a base map code.
const VARIANT_TIME_SUFFIXES: &[&str] = &["DAY", "DAWN", "NIGHT"];

fn is_variant_segment(segment: &str) -> bool {
    VARIANT_GAME_SUFFIXES
        .iter()
        .chain(VARIANT_TIME_SUFFIXES)
        .any(|suffix| segment.eq_ignore_ascii_case(suffix))
}

/// Collapse a map code to the identifier shared by all of its variants.
///
/// Trailing variant segments are removed one at a time. When every segment is a variant token
/// the original code is returned untouched so the result is never empty.
pub fn base_code(map_code: &str) -> String {
    let mut segments: Vec<&str> = map_code.split('_').collect();
    while segments
        .last()
        .is_some_and(|segment| is_variant_segment(segment))
    {
        segments.pop();
    }

    let base = segments.join("_");
    if base.is_empty() {
        map_code.to_string()
    } else {
        base
    }
}

/// Cooldown counters keyed by base map code.
///
/// A value is the number of closed rounds left before the map is eligible again; absent keys
/// and zero values both mean "eligible".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownLedger {
    entries: BTreeMap<String, u32>,
}

impl CooldownLedger {
    /// Build a ledger from persisted values, re-keying variants onto their base code.
    ///
    /// Values may be JSON integers or numeric strings. Anything else is dropped with a warning
    /// so a hand-edited file cannot break candidate selection. Colliding variants keep the
    /// largest value and non-positive values are not retained.
    pub fn normalize<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut entries: BTreeMap<String, u32> = BTreeMap::new();

        for (code, value) in raw {
            let Some(parsed) = coerce_rounds(value) else {
                warn!(map = %code, value = %value, "dropping malformed cooldown entry");
                continue;
            };
            if parsed <= 0 {
                continue;
            }

            let rounds = u32::try_from(parsed).unwrap_or(u32::MAX);
            let slot = entries.entry(base_code(code)).or_default();
            *slot = (*slot).max(rounds);
        }

        Self { entries }
    }

    /// Rounds remaining before `map_code` (any variant) becomes eligible.
    pub fn remaining(&self, map_code: &str) -> u32 {
        self.entries
            .get(&base_code(map_code))
            .copied()
            .unwrap_or(0)
    }

    /// Return a ledger where every counter moved one round closer to zero.
    pub fn decrement_all(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(code, rounds)| (code.clone(), rounds.saturating_sub(1)))
            .collect();
        Self { entries }
    }

    /// Return a ledger where the base code of `map_code` is set to `rounds`, clamped at zero.
    pub fn set_cooldown(&self, map_code: &str, rounds: i64) -> Self {
        let mut entries = self.entries.clone();
        let rounds = u32::try_from(rounds.max(0)).unwrap_or(u32::MAX);
        entries.insert(base_code(map_code), rounds);
        Self { entries }
    }

    /// Iterate over `(base code, rounds)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries
            .iter()
            .map(|(code, rounds)| (code.as_str(), *rounds))
    }

    /// Persisted representation of the ledger.
    pub fn to_raw(&self) -> BTreeMap<String, u32> {
        self.entries.clone()
    }
}

fn coerce_rounds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
