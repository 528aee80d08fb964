//! Leaderboard scoring rules.
//!
//! The leaderboard proof commits to a player's score computed from their
//! private mining history. These are the rules the proving program
//! enforces; the resolver runs them natively to validate a claim before it
//! is proven and attested.

use std::collections::BTreeSet;

use gridzero_types::{FieldElement, GridzeroError, PlayerAddress, ProofKind, Result, statement_hash};
use serde::{Deserialize, Serialize};

/// Number of ore types.
pub const ORE_TYPES: usize = 8;

/// Side length of the mining grid.
pub const GRID_SIDE: u8 = 32;

/// Score per ore type: stone, coal, iron, copper, silver, gold, diamond, mythril.
pub const BASE_SCORES: [u64; ORE_TYPES] = [1, 2, 5, 5, 15, 25, 100, 500];

/// Multiplier applied to rare finds.
pub const RARE_MULTIPLIER: u64 = 3;

/// One mining result in a player's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRecord {
    pub grid_x: u8,
    pub grid_y: u8,
    pub ore_type: u8,
    pub is_rare: bool,
    pub random_output: [u8; 32],
    pub nonce: u64,
}

/// Private input: a player's full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardInput {
    pub player_address: PlayerAddress,
    pub mining_history: Vec<MiningRecord>,
}

/// Public output: the verified score and inventories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardOutput {
    pub player_address: PlayerAddress,
    pub total_mined: u64,
    pub score: u64,
    pub ore_inventory: [u64; ORE_TYPES],
    pub rare_inventory: [u64; ORE_TYPES],
    pub unique_cells: u64,
}

impl LeaderboardOutput {
    /// Public signals committed by the leaderboard proof, in field order:
    /// player, total, score, ore inventory, rare inventory, unique cells.
    #[must_use]
    pub fn public_signals(&self) -> Vec<FieldElement> {
        let mut player = [0u8; 32];
        player[12..].copy_from_slice(&self.player_address.0);
        let mut signals = Vec::with_capacity(4 + 2 * ORE_TYPES);
        signals.push(FieldElement(player));
        signals.push(FieldElement::from_u64(self.total_mined));
        signals.push(FieldElement::from_u64(self.score));
        signals.extend(self.ore_inventory.iter().map(|n| FieldElement::from_u64(*n)));
        signals.extend(self.rare_inventory.iter().map(|n| FieldElement::from_u64(*n)));
        signals.push(FieldElement::from_u64(self.unique_cells));
        signals
    }

    /// Statement hash the attestation layer aggregates for this output.
    #[must_use]
    pub fn statement(&self) -> [u8; 32] {
        statement_hash(ProofKind::Risc0, &self.public_signals())
    }
}

/// Validate a history and compute the public output.
///
/// # Errors
/// [`GridzeroError::LeaderboardRejected`] on an unknown ore type, an
/// out-of-bounds cell, or a cell mined twice.
pub fn score_leaderboard(input: &LeaderboardInput) -> Result<LeaderboardOutput> {
    let reject = |reason: String| GridzeroError::LeaderboardRejected { reason };
    let mut score = 0u64;
    let mut ore_inventory = [0u64; ORE_TYPES];
    let mut rare_inventory = [0u64; ORE_TYPES];
    let mut seen = BTreeSet::new();

    for (i, record) in input.mining_history.iter().enumerate() {
        let ore = usize::from(record.ore_type);
        let base = BASE_SCORES
            .get(ore)
            .copied()
            .ok_or_else(|| reject(format!("record {i}: invalid ore type {}", record.ore_type)))?;
        if record.grid_x >= GRID_SIDE || record.grid_y >= GRID_SIDE {
            return Err(reject(format!(
                "record {i}: cell ({}, {}) out of bounds",
                record.grid_x, record.grid_y
            )));
        }
        if !seen.insert((record.grid_x, record.grid_y)) {
            return Err(reject(format!(
                "record {i}: duplicate cell ({}, {})",
                record.grid_x, record.grid_y
            )));
        }

        score += if record.is_rare { base * RARE_MULTIPLIER } else { base };
        ore_inventory[ore] += 1;
        if record.is_rare {
            rare_inventory[ore] += 1;
        }
    }

    Ok(LeaderboardOutput {
        player_address: input.player_address,
        total_mined: input.mining_history.len() as u64,
        score,
        ore_inventory,
        rare_inventory,
        unique_cells: seen.len() as u64,
    })
}
