//! # gridzero-prover
//!
//! Turns a round id and a block hash into a locally verified random output.
//!
//! - [`seed`]: secret-keyed seed derivation and circuit coordinates
//! - [`Prover`]: proof system seam, with [`ExternalProver`] (prove/verify
//!   commands speaking JSON) and [`DigestProver`] (hash-based devnet stand-in)
//! - [`RandomnessProofPipeline`]: prove with a timeout, verify, extract `signals[0]`
//! - [`leaderboard`]: leaderboard scoring rules

pub mod leaderboard;
pub mod pipeline;
pub mod prover;
pub mod seed;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use leaderboard::{LeaderboardInput, LeaderboardOutput, MiningRecord, score_leaderboard};
pub use pipeline::RandomnessProofPipeline;
pub use prover::{DigestProver, ExternalProver, Prover};
