//! Winner determination for a closed round.

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::state::round::RoundOption;

/// Why a particular option won the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionReason {
    /// Nobody voted; the winner was drawn among all options.
    NoVotes,
    /// Fewer ballots than the quorum; the winner was drawn among all options.
    BelowThreshold {
        /// Quorum of the round.
        required: u32,
        /// Ballots actually counted.
        total: u32,
    },
    /// Several options shared the highest tally; the winner was drawn among them.
    Tie {
        /// Labels of every option sharing the highest tally.
        tied_labels: Vec<String>,
    },
    /// A single option had the highest tally.
    Highest,
}

/// Outcome of a round: the map to push and the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Code of the winning map.
    pub map_code: String,
    /// Label of the winning map.
    pub label: String,
    /// Why it won.
    pub reason: ResolutionReason,
}

impl Resolution {
    fn new(option: &RoundOption, reason: ResolutionReason) -> Self {
        Self {
            map_code: option.map_code.clone(),
            label: option.label.clone(),
            reason,
        }
    }

    /// One-line explanation suitable for a chat summary.
    pub fn describe(&self) -> String {
        match &self.reason {
            ResolutionReason::NoVotes => {
                format!("No votes cast. Randomly selected {}.", self.label)
            }
            ResolutionReason::BelowThreshold { required, total } => format!(
                "Only {total} of the {required} required votes were cast. Randomly selected {}.",
                self.label
            ),
            ResolutionReason::Tie { tied_labels } => format!(
                "Tie detected. Randomly selected {} among: {}.",
                self.label,
                tied_labels.join(", ")
            ),
            ResolutionReason::Highest => format!("Winner by votes: {}.", self.label),
        }
    }
}

/// Decide the winner from already tallied options.
///
/// Branches are evaluated in order: no votes, quorum not reached, tie at the top, unique
/// maximum. Returns `None` only when there are no options at all.
pub fn resolve<R>(options: &[RoundOption], minimum_votes: u32, rng: &mut R) -> Option<Resolution>
where
    R: Rng + ?Sized,
{
    let total: u32 = options.iter().map(|option| option.tally).sum();

    if total == 0 {
        let pick = options.choose(rng)?;
        return Some(Resolution::new(pick, ResolutionReason::NoVotes));
    }

    if minimum_votes > 0 && total < minimum_votes {
        let pick = options.choose(rng)?;
        return Some(Resolution::new(
            pick,
            ResolutionReason::BelowThreshold {
                required: minimum_votes,
                total,
            },
        ));
    }

    let max = options.iter().map(|option| option.tally).max()?;
    let top: Vec<&RoundOption> = options.iter().filter(|option| option.tally == max).collect();

    if top.len() > 1 {
        let pick = top.choose(rng)?;
        let tied_labels = top.iter().map(|option| option.label.clone()).collect();
        return Some(Resolution::new(pick, ResolutionReason::Tie { tied_labels }));
    }

    top.first()
        .map(|pick| Resolution::new(pick, ResolutionReason::Highest))
}
