//! # gridzero-types
//!
//! Shared types, errors, and configuration for the **GridZero** round
//! settlement pipeline.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`RoundId`], [`CellIndex`], [`PlayerAddress`], [`DomainId`], [`AggregationId`], [`KeyHandle`], [`AttemptId`], [`RecordId`]
//! - **Field values**: [`FieldElement`], [`RandomOutput`]
//! - **Round model**: [`Round`], [`CellPick`], [`BlockRef`], [`TxReceipt`]
//! - **Proof model**: [`ProofRequest`], [`ProofResult`], [`RawProof`], [`CircuitInputs`], [`VerificationKey`], [`RandomnessSecret`]
//! - **Attestation model**: [`ProofCategory`], [`AggregationDomain`], [`ProofSubmission`], [`SubmissionHandle`], [`AggregationReceipt`], [`MerklePath`]
//! - **Events**: [`LedgerEvent`], [`PipelineEvent`], [`EventKind`]
//! - **Audit records**: [`RoundRecord`], [`ParticipationRecord`]
//! - **Configuration**: [`ResolverConfig`] and its sections
//! - **Errors**: [`GridzeroError`] with `GZ_ERR_` prefix codes, [`RevertReason`]
//! - **Constants**: system-wide limits and defaults

pub mod attestation;
pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod field;
pub mod ids;
pub mod proof;
pub mod round;

// Re-export all primary types at crate root for ergonomic imports:
//   use gridzero_types::{Round, RoundId, ProofResult, ...};

pub use attestation::*;
pub use audit::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use field::*;
pub use ids::*;
pub use proof::*;
pub use round::*;

// Constants are accessed via `gridzero_types::constants::FOO`
// (not re-exported to avoid name collisions).
