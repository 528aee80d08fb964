//! Deterministic round outcome: winner selection and the bonus trial.
//!
//! The ledger recomputes both from the submitted random output, so this
//! module must match its arithmetic bit-for-bit:
//!
//! ```text
//! occupied  = ascending list of cells with at least one pick
//! index     = uint256(random_output) mod len(occupied)
//! winner    = occupied[index]
//! is_bonus  = uint256(SHA-256(random_output || "bonus")) mod bonus_odds == 0
//! ```
//!
//! Zero side effects: no I/O, no clock, no randomness of its own.

use std::collections::BTreeSet;

use gridzero_types::{CellIndex, FieldElement, RandomOutput, constants};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Winner and bonus flag derived from one random output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub winning_cell: CellIndex,
    pub is_bonus_round: bool,
}

/// Cells with a non-zero pick count, in ascending order.
#[must_use]
pub fn occupied_from_occupancy(occupancy: &[u32]) -> Vec<CellIndex> {
    occupancy
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .filter_map(|(idx, _)| u16::try_from(idx).ok().map(CellIndex))
        .collect()
}

/// Canonical ordering of a cell set: ascending, de-duplicated.
///
/// Selection indexes into this list, so the order in which the caller
/// collected the cells never affects the result.
#[must_use]
pub fn canonical_cells(cells: impl IntoIterator<Item = CellIndex>) -> Vec<CellIndex> {
    cells.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Pick the winning cell. `None` only when no cell is occupied.
#[must_use]
pub fn select_winner(
    random_output: &RandomOutput,
    occupied: impl IntoIterator<Item = CellIndex>,
) -> Option<CellIndex> {
    let cells = canonical_cells(occupied);
    if cells.is_empty() {
        return None;
    }
    let index = random_output.mod_u64(cells.len() as u64);
    usize::try_from(index).ok().and_then(|i| cells.get(i).copied())
}

/// `uint256(SHA-256(random_output || "bonus")) mod bonus_odds`.
///
/// # Panics
/// Panics if `bonus_odds` is zero.
#[must_use]
pub fn bonus_trial_residue(random_output: &RandomOutput, bonus_odds: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(random_output.as_bytes());
    hasher.update(constants::BONUS_TRIAL_TAG);
    let digest: [u8; 32] = hasher.finalize().into();
    FieldElement(digest).mod_u64(bonus_odds)
}

/// Bernoulli trial with probability `1 / bonus_odds`.
#[must_use]
pub fn is_bonus_round(random_output: &RandomOutput, bonus_odds: u64) -> bool {
    bonus_trial_residue(random_output, bonus_odds) == 0
}

/// Full outcome for a round with at least one occupied cell.
#[must_use]
pub fn compute_outcome(
    random_output: &RandomOutput,
    occupied: impl IntoIterator<Item = CellIndex>,
    bonus_odds: u64,
) -> Option<RoundOutcome> {
    select_winner(random_output, occupied).map(|winning_cell| RoundOutcome {
        winning_cell,
        is_bonus_round: is_bonus_round(random_output, bonus_odds),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(v: u64) -> RandomOutput {
        RandomOutput(FieldElement::from_u64(v))
    }

    fn cells(ids: &[u16]) -> Vec<CellIndex> {
        ids.iter().copied().map(CellIndex).collect()
    }

    #[test]
    fn scenario_a_index_two_selects_nine() {
        // 0x..06 mod 4 == 2 -> third cell of {2,5,9,13}
        let out = output(6);
        assert_eq!(out.mod_u64(4), 2);
        assert_eq!(select_winner(&out, cells(&[2, 5, 9, 13])), Some(CellIndex(9)));
    }

    #[test]
    fn scenario_a_with_full_width_output() {
        // high bytes set, low residue still 2 mod 4
        let mut bytes = [0xAAu8; 32];
        bytes[31] = 0x02;
        let out = RandomOutput(FieldElement(bytes));
        assert_eq!(out.mod_u64(4), 2);
        assert_eq!(select_winner(&out, cells(&[2, 5, 9, 13])), Some(CellIndex(9)));
    }

    #[test]
    fn no_occupied_cells_no_winner() {
        assert_eq!(select_winner(&output(3), Vec::new()), None);
        assert!(compute_outcome(&output(3), Vec::new(), 100).is_none());
    }

    #[test]
    fn winner_is_always_occupied() {
        let occupied = cells(&[0, 7, 8, 24]);
        for v in 0..500 {
            let winner = select_winner(&output(v), occupied.clone()).unwrap();
            assert!(occupied.contains(&winner));
        }
    }

    #[test]
    fn selection_independent_of_input_order() {
        let a = cells(&[13, 2, 9, 5]);
        let b = cells(&[2, 5, 9, 13]);
        let c = cells(&[9, 13, 5, 2, 9]);
        for v in [0, 1, 2, 3, 17, 12345, u64::MAX] {
            let out = output(v);
            let wa = select_winner(&out, a.clone());
            assert_eq!(wa, select_winner(&out, b.clone()));
            assert_eq!(wa, select_winner(&out, c.clone()));
        }
    }

    #[test]
    fn occupancy_to_cells() {
        let occupancy = [0, 2, 0, 0, 1, 0, 5];
        assert_eq!(occupied_from_occupancy(&occupancy), cells(&[1, 4, 6]));
        assert!(occupied_from_occupancy(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn scenario_c_bonus_iff_residue_zero() {
        let mut found_bonus = false;
        let mut found_plain = false;
        for v in 0..2_000u64 {
            let out = output(v);
            let residue = bonus_trial_residue(&out, 100);
            assert_eq!(is_bonus_round(&out, 100), residue == 0);
            found_bonus |= residue == 0;
            found_plain |= residue != 0;
        }
        assert!(found_bonus && found_plain);
    }

    #[test]
    fn bonus_frequency_converges() {
        let odds = 20u64;
        let samples = 40_000u64;
        let hits = (0..samples)
            .filter(|v| {
                let digest: [u8; 32] = Sha256::digest(v.to_be_bytes()).into();
                is_bonus_round(&RandomOutput(FieldElement(digest)), odds)
            })
            .count() as f64;
        let expected = samples as f64 / odds as f64;
        // ~4.5 sigma band for a binomial(40000, 0.05)
        let tolerance = 4.5 * (samples as f64 * 0.05 * 0.95).sqrt();
        assert!(
            (hits - expected).abs() < tolerance,
            "hits={hits}, expected={expected}, tolerance={tolerance}"
        );
    }

    #[test]
    fn bonus_odds_of_one_always_hits() {
        assert!(is_bonus_round(&output(42), 1));
    }
}
