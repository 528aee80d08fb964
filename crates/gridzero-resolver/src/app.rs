//! Process wiring: build every component from a [`ResolverConfig`] and run
//! them until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gridzero_attestation::{
    AttestationService, HttpAttestationService, InMemoryAttestationService, ProofAttestationClient,
};
use gridzero_ledger::{
    Clock, DevnetLedger, DevnetParams, HttpLedgerGateway, LedgerEventSource, LedgerGateway,
    ResolverCredentials, SystemClock, TokioClock,
};
use gridzero_prover::{DigestProver, ExternalProver, Prover, RandomnessProofPipeline};
use gridzero_types::{
    AttestationBackend, GridzeroError, LedgerBackend, ProofKind, ProverBackend, RandomnessSecret,
    ResolverConfig, Result, VerificationKey,
};
use rand::Rng;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::devnet::run_simulated_players;
use crate::health;
use crate::orchestrator::SettlementOrchestrator;
use crate::recorder::{EventRecorder, JsonlRecorder, TracingRecorder};
use crate::scheduler::RoundScheduler;
use crate::state::PipelineState;
use crate::watcher::LedgerWatcher;

/// A fully wired resolver process.
pub struct ResolverApp {
    config: ResolverConfig,
    state: Arc<PipelineState>,
    bus: EventBus,
    attestation: Arc<ProofAttestationClient>,
    scheduler: Arc<RoundScheduler>,
    watcher: LedgerWatcher,
    ops_listener: Option<TcpListener>,
    devnet: Option<DevnetLedger>,
}

impl ResolverApp {
    /// Build the process from a validated configuration.
    ///
    /// With the devnet backend a missing resolver key or randomness secret
    /// is generated for the lifetime of the process; with a real ledger
    /// both are required.
    pub async fn build(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let devnet_mode = config.ledger.backend == LedgerBackend::Devnet;
        let credentials = credentials(&config, devnet_mode)?;
        let secret = randomness_secret(&config, devnet_mode)?;

        // Devnet block times follow the tokio clock so paused-time runs agree
        // with the scheduler.
        let clock: Arc<dyn Clock> = if devnet_mode {
            Arc::new(TokioClock::new())
        } else {
            Arc::new(SystemClock)
        };
        let (gateway, source, devnet) = match config.ledger.backend {
            LedgerBackend::Devnet => {
                let params = DevnetParams::from_game(&config.game, config.ledger.chain_id);
                let ledger = DevnetLedger::new(params, credentials.verifying_key(), clock.clone());
                let client = Arc::new(ledger.client(credentials));
                let gateway: Arc<dyn LedgerGateway> = client.clone();
                let source: Arc<dyn LedgerEventSource> = client;
                (gateway, source, Some(ledger))
            }
            LedgerBackend::Http => {
                let endpoint = config.ledger.endpoint.as_deref().ok_or_else(|| {
                    GridzeroError::Configuration("ledger.endpoint is required".into())
                })?;
                let client = Arc::new(HttpLedgerGateway::new(
                    endpoint,
                    credentials,
                    config.ledger.request_timeout(),
                )?);
                let gateway: Arc<dyn LedgerGateway> = client.clone();
                let source: Arc<dyn LedgerEventSource> = client;
                (gateway, source, None)
            }
        };

        let (prover, vk) = prover(&config).await?;
        let proofs = Arc::new(RandomnessProofPipeline::new(
            prover,
            vk,
            secret,
            config.prover.timeout(),
        ));

        let bus = EventBus::default();
        let service: Arc<dyn AttestationService> = match config.attestation.backend {
            AttestationBackend::Memory => Arc::new(InMemoryAttestationService::new()),
            AttestationBackend::Http => {
                let endpoint = config.attestation.endpoint.as_deref().ok_or_else(|| {
                    GridzeroError::Configuration("attestation.endpoint is required".into())
                })?;
                Arc::new(HttpAttestationService::new(
                    endpoint,
                    config.attestation.api_key.as_ref().map(|k| k.expose().to_string()),
                    config.attestation.request_timeout(),
                )?)
            }
        };
        let attestation = Arc::new(ProofAttestationClient::new(
            service,
            config.attestation.clone(),
            Arc::new(bus.clone()),
        ));

        let recorder: Arc<dyn EventRecorder> = match &config.audit.path {
            Some(path) => {
                let recorder = JsonlRecorder::open(path).await?;
                info!(path = %recorder.path().display(), "audit records appended to file");
                Arc::new(recorder)
            }
            None => Arc::new(TracingRecorder),
        };

        let state = Arc::new(PipelineState::new());
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            gateway.clone(),
            proofs,
            attestation.clone(),
            recorder,
            Arc::new(bus.clone()),
            state.clone(),
            config.game.bonus_odds,
        ));
        let scheduler = Arc::new(RoundScheduler::new(
            gateway,
            orchestrator,
            clock,
            config.scheduler.clone(),
        ));
        let watcher = LedgerWatcher::new(
            source,
            Arc::new(bus.clone()),
            state.clone(),
            config.scheduler.watch_interval(),
        );
        let ops_listener = if config.ops.enabled {
            Some(health::bind(&config.ops.listen_addr).await?)
        } else {
            None
        };

        info!(
            ledger = ?config.ledger.backend,
            prover = ?config.prover.backend,
            attestation = ?config.attestation.backend,
            attestation_enabled = config.attestation.enabled,
            bonus_odds = config.game.bonus_odds,
            "resolver built"
        );
        Ok(Self {
            config,
            state,
            bus,
            attestation,
            scheduler,
            watcher,
            ops_listener,
            devnet,
        })
    }

    #[must_use]
    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<RoundScheduler> {
        &self.scheduler
    }

    /// The in-process ledger, when running against devnet.
    #[must_use]
    pub fn devnet(&self) -> Option<&DevnetLedger> {
        self.devnet.as_ref()
    }

    /// Address the ops endpoint is bound to.
    #[must_use]
    pub fn ops_addr(&self) -> Option<SocketAddr> {
        self.ops_listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Run until `shutdown` flips to `true`, then drain background work
    /// within `ops.shutdown_grace_ms`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let Self {
            config,
            state,
            bus: _,
            attestation,
            scheduler,
            watcher,
            ops_listener,
            devnet,
        } = self;

        let mut tasks = JoinSet::new();
        tasks.spawn(attestation.clone().run_flusher(shutdown.clone()));
        tasks.spawn(watcher.run(shutdown.clone()));
        if let Some(listener) = ops_listener {
            let router = health::router(state.clone(), scheduler.clone());
            let rx = shutdown.clone();
            tasks.spawn(async move {
                if let Err(e) = health::serve(listener, router, rx).await {
                    error!(error = %e, "ops endpoint stopped");
                }
            });
        }
        if let Some(ledger) = devnet {
            tasks.spawn(run_simulated_players(
                ledger,
                config.game.devnet_players_per_round,
                Duration::from_secs(config.game.round_duration_secs),
                shutdown.clone(),
            ));
        }

        scheduler.run(shutdown).await;

        let grace = config.ops.shutdown_grace();
        attestation.shutdown(grace).await;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "background task ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "background tasks aborted at shutdown");
            tasks.abort_all();
        }

        let snapshot = state.snapshot();
        info!(
            resolved = snapshot.rounds_resolved,
            skipped = snapshot.rounds_skipped,
            settled_elsewhere = snapshot.rounds_settled_elsewhere,
            failed_attempts = snapshot.failed_attempts,
            "resolver stopped"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ResolverApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverApp")
            .field("ledger", &self.config.ledger.backend)
            .field("ops_addr", &self.ops_addr())
            .finish_non_exhaustive()
    }
}

fn credentials(config: &ResolverConfig, devnet: bool) -> Result<ResolverCredentials> {
    match &config.credentials.resolver_key {
        Some(key) => ResolverCredentials::from_hex(key.expose(), config.ledger.chain_id),
        None if devnet => {
            warn!("no resolver key configured; generated an ephemeral devnet key");
            Ok(ResolverCredentials::generate(config.ledger.chain_id))
        }
        None => Err(GridzeroError::Configuration(
            "credentials.resolver_key is required outside devnet".into(),
        )),
    }
}

fn randomness_secret(config: &ResolverConfig, devnet: bool) -> Result<RandomnessSecret> {
    match &config.randomness.secret {
        Some(secret) => RandomnessSecret::from_hex(secret.expose()),
        None if devnet => {
            warn!("no randomness secret configured; generated an ephemeral devnet secret");
            let bytes: [u8; 32] = rand::thread_rng().r#gen();
            RandomnessSecret::new(bytes.to_vec())
        }
        None => Err(GridzeroError::Configuration(
            "randomness.secret is required outside devnet".into(),
        )),
    }
}

async fn prover(config: &ResolverConfig) -> Result<(Arc<dyn Prover>, VerificationKey)> {
    match config.prover.backend {
        ProverBackend::Digest => Ok((Arc::new(DigestProver), DigestProver::verification_key())),
        ProverBackend::External => {
            let path = config.prover.verification_key_path.as_deref().ok_or_else(|| {
                GridzeroError::Configuration("prover.verification_key_path is required".into())
            })?;
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| GridzeroError::Configuration(format!("read verification key {path}: {e}")))?;
            let prover = ExternalProver::new(
                ProofKind::Groth16,
                config.prover.prove_command.clone(),
                config.prover.verify_command.clone(),
            )?;
            Ok((Arc::new(prover), VerificationKey::new(ProofKind::Groth16, bytes)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridzero_types::Secret;

    fn devnet_config() -> ResolverConfig {
        let mut config = ResolverConfig::default();
        config.ops.enabled = false;
        config.game.round_duration_secs = 10;
        config.game.devnet_players_per_round = 3;
        config.scheduler.resolve_buffer_ms = 200;
        config.scheduler.retry_delay_ms = 500;
        config.scheduler.max_backoff_ms = 4_000;
        config.ops.shutdown_grace_ms = 1_000;
        config
    }

    #[tokio::test]
    async fn http_ledger_requires_resolver_key() {
        let mut config = devnet_config();
        config.ledger.backend = LedgerBackend::Http;
        config.ledger.endpoint = Some("http://127.0.0.1:1".into());
        config.randomness.secret = Some(Secret::new("11".repeat(32)));
        let err = ResolverApp::build(config).await.unwrap_err();
        assert!(err.to_string().contains("resolver_key"));
    }

    #[tokio::test]
    async fn http_ledger_requires_randomness_secret() {
        let mut config = devnet_config();
        config.ledger.backend = LedgerBackend::Http;
        config.ledger.endpoint = Some("http://127.0.0.1:1".into());
        config.credentials.resolver_key = Some(Secret::new(ResolverCredentials::generate(0).secret_hex()));
        let err = ResolverApp::build(config).await.unwrap_err();
        assert!(err.to_string().contains("randomness.secret"));
    }

    #[tokio::test]
    async fn external_prover_needs_readable_key() {
        let mut config = devnet_config();
        config.prover.backend = ProverBackend::External;
        config.prover.prove_command = vec!["prove".into()];
        config.prover.verify_command = vec!["verify".into()];
        config.prover.verification_key_path = Some("/nonexistent/vk.json".into());
        let err = ResolverApp::build(config).await.unwrap_err();
        assert!(matches!(err, GridzeroError::Configuration(_)));
    }

    #[tokio::test]
    async fn ops_listener_binds_when_enabled() {
        let mut config = devnet_config();
        config.ops.enabled = true;
        config.ops.listen_addr = "127.0.0.1:0".into();
        let app = ResolverApp::build(config).await.unwrap();
        assert!(app.ops_addr().is_some_and(|a| a.port() != 0));
    }

    #[tokio::test(start_paused = true)]
    async fn devnet_app_settles_rounds_until_shutdown() {
        let app = ResolverApp::build(devnet_config()).await.unwrap();
        let state = app.state().clone();
        let ledger = app.devnet().unwrap().clone();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(app.run(rx));

        tokio::time::sleep(Duration::from_secs(35)).await;
        let snap = state.snapshot();
        assert!(
            snap.rounds_resolved + snap.rounds_skipped >= 2,
            "resolved {} skipped {}",
            snap.rounds_resolved,
            snap.rounds_skipped
        );
        assert!(ledger.current_round().unwrap().id.0 >= 3);
        assert!(snap.ledger_activity.rounds_started >= 2);

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
