//! # gridzero-resolver
//!
//! The resolver process. One instance keeps the GridZero ledger moving:
//! it waits for each round to end, proves a random output against the
//! block it observed, resolves or skips the round, and records what it did.
//!
//! ```text
//!   RoundScheduler ──tick──▶ SettlementOrchestrator ──▶ LedgerGateway
//!        │                    │    │    │
//!        │                    │    │    └─▶ EventRecorder (audit)
//!        │                    │    └─▶ ProofAttestationClient (background)
//!        │                    └─▶ RandomnessProofPipeline
//!        ▼
//!   PipelineState ◀── LedgerWatcher ◀── LedgerEventSource
//!        │
//!        └─▶ ops endpoint (/health, /resolve)      EventBus ──▶ subscribers
//! ```
//!
//! - [`orchestrator`]: one settlement attempt per observed block
//! - [`scheduler`]: deadline sleep, retries, exponential backoff
//! - [`state`]: the in-process view served by `/health`
//! - [`bus`]: broadcast of [`gridzero_types::PipelineEvent`]s
//! - [`recorder`]: audit records (log, JSON lines, memory)
//! - [`watcher`]: ledger event telemetry
//! - [`health`]: axum ops router
//! - [`app`]: wiring from [`gridzero_types::ResolverConfig`]

pub mod app;
pub mod bus;
pub mod config_loader;
pub mod devnet;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod recorder;
pub mod scheduler;
pub mod settled_guard;
pub mod state;
pub mod watcher;

pub use app::ResolverApp;
pub use bus::{EventBus, EventSubscription};
pub use orchestrator::{SettlementOrchestrator, SettlementOutcome};
pub use recorder::{AuditEntry, EventRecorder, JsonlRecorder, MemoryRecorder, TracingRecorder};
pub use scheduler::RoundScheduler;
pub use settled_guard::SettledRoundGuard;
pub use state::{AlertKind, HealthSnapshot, OperatorAlert, PipelineState};
pub use watcher::LedgerWatcher;
