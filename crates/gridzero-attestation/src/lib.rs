//! # gridzero-attestation
//!
//! Third-party aggregation and attestation of proofs.
//!
//! - [`AttestationService`]: the remote service seam, with
//!   [`HttpAttestationService`] and [`InMemoryAttestationService`]
//! - [`ProofAttestationClient`]: domain and key registry, single, batched
//!   and optimistic submission, bounded receipt wait, inclusion checks
//! - [`BatchAccumulator`]: per-category batching window
//! - [`merkle`]: aggregation tree and inclusion verification

pub mod batch;
pub mod client;
pub mod http;
pub mod memory;
pub mod merkle;
pub mod service;

pub use batch::{BatchAccumulator, PendingProof};
pub use client::ProofAttestationClient;
pub use http::HttpAttestationService;
pub use memory::{InMemoryAttestationService, MemoryServiceStats};
pub use service::AttestationService;
