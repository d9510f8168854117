use std::collections::HashSet;

use rand::{Rng, seq::IndexedRandom};

use crate::{
    dao::models::{MapEntity, PoolEntity},
    state::cooldowns::CooldownLedger,
};

/// Number of options offered by a round unless the caller asks otherwise.
pub const DEFAULT_CANDIDATE_COUNT: usize = 5;

/// Static catalog entry describing a playable map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// Unique map code understood by the game server.
    pub code: String,
    /// Name shown to voters.
    pub display_name: String,
    /// Disabled maps are never offered.
    pub enabled: bool,
}

impl MapEntry {
    /// Label used in round options, falling back to the code.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.code
        } else {
            &self.display_name
        }
    }
}

/// Named subset of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Pool name.
    pub name: String,
    /// Base codes of the maps in the pool.
    pub map_codes: HashSet<String>,
    /// Whether the pool restricts candidate selection.
    pub active: bool,
}

/// Map offered as an option of a new round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Map code pushed to the game server.
    pub code: String,
    /// Label shown to voters.
    pub label: String,
}

impl From<&MapEntry> for Candidate {
    fn from(entry: &MapEntry) -> Self {
        Self {
            code: entry.code.clone(),
            label: entry.label().to_string(),
        }
    }
}

/// Pick up to `count` candidates for a new round.
///
/// Maps off cooldown are sampled uniformly without replacement. When there are not enough of
/// them every eligible map is offered and the remainder is filled with the maps closest to
/// coming off cooldown. Small pools yield fewer than `count` candidates.
pub fn select_candidates<R>(
    maps: &[MapEntry],
    pools: &[Pool],
    ledger: &CooldownLedger,
    count: usize,
    rng: &mut R,
) -> Vec<Candidate>
where
    R: Rng + ?Sized,
{
    let active_pool = pools.iter().find(|pool| pool.active);

    let mut seen = HashSet::new();
    let pool_maps: Vec<&MapEntry> = maps
        .iter()
        .filter(|entry| entry.enabled)
        .filter(|entry| active_pool.is_none_or(|pool| pool.map_codes.contains(&entry.code)))
        .filter(|entry| seen.insert(entry.code.as_str()))
        .collect();

    let (eligible, mut cooling): (Vec<&MapEntry>, Vec<&MapEntry>) = pool_maps
        .into_iter()
        .partition(|entry| ledger.remaining(&entry.code) == 0);

    if eligible.len() >= count {
        return eligible
            .choose_multiple(rng, count)
            .map(|entry| Candidate::from(*entry))
            .collect();
    }

    let missing = count - eligible.len();
    cooling.sort_by_key(|entry| ledger.remaining(&entry.code));

    eligible
        .into_iter()
        .chain(cooling.into_iter().take(missing))
        .map(Candidate::from)
        .collect()
}

impl From<MapEntity> for MapEntry {
    fn from(value: MapEntity) -> Self {
        Self {
            code: value.code,
            display_name: value.name,
            enabled: value.enabled,
        }
    }
}

impl From<PoolEntity> for Pool {
    fn from(value: PoolEntity) -> Self {
        Self {
            name: value.name,
            map_codes: value.maps.into_iter().collect(),
            active: value.active,
        }
    }
}
