//! Simulated players for a devnet run, so rounds have something to resolve.

use std::time::Duration;

use gridzero_ledger::DevnetLedger;
use gridzero_types::{CellIndex, PlayerAddress};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info};

/// Spacing between picks so that roughly `per_round` land in each round.
#[must_use]
pub fn pick_interval(round_duration: Duration, per_round: u32) -> Duration {
    (round_duration / per_round.saturating_add(1)).max(Duration::from_millis(50))
}

/// Place picks from fresh random players until `shutdown` flips to `true`.
/// Returns immediately when `per_round` is zero.
pub async fn run_simulated_players(
    ledger: DevnetLedger,
    per_round: u32,
    round_duration: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if per_round == 0 {
        return;
    }
    let grid_cells = ledger.params().grid_cells;
    let period = pick_interval(round_duration, per_round);
    info!(per_round, period_ms = period.as_millis(), "simulated players started");

    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut placed = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let player = PlayerAddress(rng.r#gen());
                let cell = CellIndex(rng.gen_range(0..grid_cells));
                match ledger.pick_cell(player, cell) {
                    Ok(block) => {
                        placed += 1;
                        debug!(block = block.number, cell = cell.0, "simulated pick");
                    }
                    // Rounds that ended but are not yet resolved reject picks.
                    Err(e) => debug!(error = %e, "simulated pick rejected"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(placed, "simulated players stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridzero_ledger::{DevnetParams, ResolverCredentials, TokioClock};
    use std::sync::Arc;

    #[test]
    fn interval_spreads_picks_over_round() {
        assert_eq!(pick_interval(Duration::from_secs(30), 5), Duration::from_secs(5));
        assert_eq!(pick_interval(Duration::from_secs(30), 0), Duration::from_secs(30));
        assert_eq!(pick_interval(Duration::from_millis(10), 9), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn players_pick_until_shutdown() {
        let creds = ResolverCredentials::generate(3);
        let params = DevnetParams {
            chain_id: 3,
            grid_cells: 25,
            bonus_odds: 100,
            round_duration: chrono::Duration::seconds(30),
            block_time: chrono::Duration::seconds(1),
        };
        let ledger = DevnetLedger::new(params, creds.verifying_key(), Arc::new(TokioClock::new()));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_simulated_players(
            ledger.clone(),
            5,
            Duration::from_secs(30),
            rx,
        ));

        tokio::time::sleep(Duration::from_secs(21)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
        let round = ledger.current_round().unwrap();
        assert!(round.total_players >= 4, "got {}", round.total_players);
    }
}
