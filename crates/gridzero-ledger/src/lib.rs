//! # gridzero-ledger
//!
//! Everything the settlement pipeline knows about the ledger.
//!
//! - [`LedgerGateway`]: round reads plus the two signed writes
//! - [`LedgerEventSource`]: observed ledger events for telemetry
//! - [`outcome`]: winner selection and bonus trial, pure and deterministic
//! - [`ResolverCredentials`]: ed25519 transaction signing
//! - [`DevnetLedger`]: in-process ledger with the contract's acceptance rules
//! - [`HttpLedgerGateway`]: client for a ledger gateway service
//! - [`Clock`]: wall-clock abstraction with a sleep-until primitive

pub mod clock;
pub mod credentials;
pub mod devnet;
pub mod gateway;
pub mod http;
pub mod outcome;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use credentials::{LedgerAction, ResolverCredentials, SignedLedgerTx};
pub use devnet::{DevnetCalls, DevnetClient, DevnetFaults, DevnetLedger, DevnetParams};
pub use gateway::{LedgerEventSource, LedgerGateway};
pub use http::HttpLedgerGateway;
pub use outcome::{RoundOutcome, compute_outcome, is_bonus_round, select_winner};
