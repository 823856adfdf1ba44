// =============================================================================
// Position Monitor — single pass of profit / loss threshold evaluation
// =============================================================================
//
// Each pass:
//   1. Lists open positions (empty → NoOpenPositions, failure → FetchError).
//   2. Walks them in the order returned by the endpoint.
//   3. Resolves the live price per instrument. Unknown instruments are logged
//      and skipped; any other price failure aborts the pass.
//   4. Computes the signed profit % and closes the FIRST position crossing
//      either bound, then stops. Later positions wait for the next pass.
//
// No retries happen inside a pass; the scheduler's next tick is the retry.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GatewayError;
use crate::gateway::TradingGateway;
use crate::journal::{LogSink, Narrator};
use crate::position::CloseReceipt;
use crate::types::{ThresholdConfig, ThresholdHit};

/// Terminal outcome of one monitor pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonitorOutcome {
    NoOpenPositions,
    FetchError { reason: String },
    PositionClosed {
        id: String,
        profit_pct: f64,
        receipt: CloseReceipt,
    },
    CloseFailed { id: String, reason: String },
    NoThresholdReached,
}

impl std::fmt::Display for MonitorOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoOpenPositions => write!(f, "NoOpenPositions"),
            Self::FetchError { reason } => write!(f, "FetchError({reason})"),
            Self::PositionClosed { id, profit_pct, .. } => {
                write!(f, "PositionClosed({id}, {profit_pct:.3}%)")
            }
            Self::CloseFailed { id, reason } => write!(f, "CloseFailed({id}, {reason})"),
            Self::NoThresholdReached => write!(f, "NoThresholdReached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub outcome: MonitorOutcome,
    /// Positions whose profit was actually computed this pass.
    pub evaluated: usize,
    /// Positions skipped because their instrument could not be priced.
    pub skipped: usize,
    pub last_message: Option<String>,
}

/// Run one monitor pass against `gateway`.
pub async fn evaluate_positions(
    gateway: &dyn TradingGateway,
    thresholds: &ThresholdConfig,
    sink: &dyn LogSink,
) -> MonitorReport {
    let mut narrator = Narrator::new(sink);
    let mut evaluated = 0usize;
    let mut skipped = 0usize;

    let outcome = pass(gateway, thresholds, &mut narrator, &mut evaluated, &mut skipped).await;

    debug!(
        outcome = %outcome,
        evaluated,
        skipped,
        "position monitor pass finished"
    );

    MonitorReport {
        outcome,
        evaluated,
        skipped,
        last_message: narrator.into_last(),
    }
}

async fn pass(
    gateway: &dyn TradingGateway,
    thresholds: &ThresholdConfig,
    narrator: &mut Narrator<'_>,
    evaluated: &mut usize,
    skipped: &mut usize,
) -> MonitorOutcome {
    let positions = match gateway.list_open_positions().await {
        Ok(p) => p,
        Err(e) => {
            narrator.error(format!("Failed to fetch open positions ({}): {e}", e.class()));
            return MonitorOutcome::FetchError {
                reason: e.to_string(),
            };
        }
    };

    if positions.is_empty() {
        narrator.info("No open positions or trade found");
        return MonitorOutcome::NoOpenPositions;
    }

    for position in &positions {
        debug!(
            id = %position.id,
            instrument = %position.instrument,
            direction = %position.direction,
            open_rate = position.open_rate,
            opened_at = %position.opened_at,
            "evaluating position"
        );

        let current_price = match gateway.lookup_price(position.instrument).await {
            Ok(price) => price,
            Err(GatewayError::UnknownInstrument(what)) => {
                *skipped += 1;
                narrator.warn(format!(
                    "Invalid instrument {what} for position {} - skipping",
                    position.id
                ));
                continue;
            }
            Err(e) => {
                narrator.error(format!(
                    "Failed to fetch current price for {} ({}): {e}",
                    position.instrument,
                    e.class()
                ));
                return MonitorOutcome::FetchError {
                    reason: e.to_string(),
                };
            }
        };

        if let crate::position::Direction::Other(raw) = &position.direction {
            narrator.warn(format!(
                "Unrecognised direction '{raw}' for position {} - profit taken as 0",
                position.id
            ));
        }

        *evaluated += 1;
        let profit_pct = position.profit_pct(current_price);
        narrator.info(format!(
            "Position {} on {}: price {current_price}, profit {profit_pct:.3}%",
            position.id, position.instrument
        ));

        let Some(hit) = thresholds.crossed(profit_pct) else {
            continue;
        };

        let bound = match hit {
            ThresholdHit::Profit => thresholds.profit_pct,
            ThresholdHit::Loss => thresholds.loss_pct,
        };
        narrator.info(format!(
            "{} threshold reached: {profit_pct:.3}% (bound {bound}%) | Closing position {}",
            capitalise(hit),
            position.id
        ));

        return match gateway.close_position(&position.id).await {
            Ok(receipt) => {
                info!(
                    id = %position.id,
                    profit_pct,
                    reward_vt = receipt.reward_vt,
                    pnl = receipt.pnl,
                    "position closed by monitor"
                );
                narrator.info(format!(
                    "Position {} closed | Reward {} VT with PNL {}%",
                    position.id, receipt.reward_vt, receipt.pnl
                ));
                MonitorOutcome::PositionClosed {
                    id: position.id.clone(),
                    profit_pct,
                    receipt,
                }
            }
            Err(e) => {
                narrator.error(format!(
                    "Failed to close position {} ({}): {e}",
                    position.id,
                    e.class()
                ));
                MonitorOutcome::CloseFailed {
                    id: position.id.clone(),
                    reason: e.to_string(),
                }
            }
        };
    }

    narrator.info("No position has reached the profit or loss threshold");
    MonitorOutcome::NoThresholdReached
}

fn capitalise(hit: ThresholdHit) -> &'static str {
    match hit {
        ThresholdHit::Profit => "Profit",
        ThresholdHit::Loss => "Loss",
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::journal::RecordingSink;
    use crate::position::{Direction, InstrumentId, Position};

    const X: InstrumentId = InstrumentId(1);
    const Y: InstrumentId = InstrumentId(2);

    struct FakeDesk {
        positions: Result<Vec<Position>, GatewayError>,
        prices: HashMap<InstrumentId, Result<f64, GatewayError>>,
        close_result: Result<CloseReceipt, GatewayError>,
        closed: Mutex<Vec<String>>,
        lookups: Mutex<Vec<InstrumentId>>,
    }

    impl FakeDesk {
        fn new(positions: Vec<Position>) -> Self {
            Self {
                positions: Ok(positions),
                prices: HashMap::new(),
                close_result: Ok(CloseReceipt {
                    reward_vt: 4.0,
                    pnl: 6.0,
                }),
                closed: Mutex::new(Vec::new()),
                lookups: Mutex::new(Vec::new()),
            }
        }

        fn price(mut self, instrument: InstrumentId, price: f64) -> Self {
            self.prices.insert(instrument, Ok(price));
            self
        }
    }

    #[async_trait]
    impl TradingGateway for FakeDesk {
        async fn list_open_positions(&self) -> Result<Vec<Position>, GatewayError> {
            self.positions.clone()
        }

        async fn lookup_price(&self, instrument: InstrumentId) -> Result<f64, GatewayError> {
            self.lookups.lock().push(instrument);
            self.prices
                .get(&instrument)
                .cloned()
                .unwrap_or_else(|| Err(GatewayError::UnknownInstrument(instrument.to_string())))
        }

        async fn close_position(&self, id: &str) -> Result<CloseReceipt, GatewayError> {
            self.closed.lock().push(id.to_string());
            self.close_result.clone()
        }
    }

    fn long(id: &str, instrument: InstrumentId, open_rate: f64) -> Position {
        Position {
            id: id.into(),
            instrument,
            open_rate,
            direction: Direction::Long,
            opened_at: Utc::now(),
        }
    }

    async fn run(desk: &FakeDesk) -> MonitorReport {
        let sink = RecordingSink::default();
        evaluate_positions(desk, &ThresholdConfig::new(5.0, -2.0), &sink).await
    }

    #[tokio::test]
    async fn profit_threshold_closes_position() {
        let desk = FakeDesk::new(vec![long("1", X, 100.0)]).price(X, 106.0);
        let report = run(&desk).await;
        match report.outcome {
            MonitorOutcome::PositionClosed { id, profit_pct, .. } => {
                assert_eq!(id, "1");
                assert!((profit_pct - 6.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other}"),
        }
        assert_eq!(*desk.closed.lock(), vec!["1"]);
    }

    #[tokio::test]
    async fn small_loss_inside_band_is_left_open() {
        let desk = FakeDesk::new(vec![long("1", X, 100.0)]).price(X, 99.0);
        let report = run(&desk).await;
        assert_eq!(report.outcome, MonitorOutcome::NoThresholdReached);
        assert!(desk.closed.lock().is_empty());
        assert_eq!(report.evaluated, 1);
    }

    #[tokio::test]
    async fn loss_threshold_closes_short() {
        let mut short = long("7", X, 100.0);
        short.direction = Direction::Short;
        let desk = FakeDesk::new(vec![short]).price(X, 103.0);
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::PositionClosed { ref id, .. } if id == "7"));
    }

    #[tokio::test]
    async fn stops_at_first_crossing_position() {
        let desk = FakeDesk::new(vec![
            long("1", X, 100.0),
            long("2", Y, 100.0),
            long("3", Y, 100.0),
        ])
        .price(X, 101.0)
        .price(Y, 110.0);
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::PositionClosed { ref id, .. } if id == "2"));
        assert_eq!(*desk.closed.lock(), vec!["2"]);
        // position 3 never priced
        assert_eq!(desk.lookups.lock().len(), 2);
    }

    #[tokio::test]
    async fn unknown_instrument_is_skipped() {
        let desk = FakeDesk::new(vec![long("1", InstrumentId(99), 100.0), long("2", X, 100.0)])
            .price(X, 90.0);
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::PositionClosed { ref id, .. } if id == "2"));
        assert_eq!(report.skipped, 1);
        assert_eq!(report.evaluated, 1);
    }

    #[tokio::test]
    async fn empty_list_and_fetch_error() {
        let desk = FakeDesk::new(vec![]);
        assert_eq!(run(&desk).await.outcome, MonitorOutcome::NoOpenPositions);

        let mut desk = FakeDesk::new(vec![]);
        desk.positions = Err(GatewayError::Status {
            code: 500,
            body: "internal".into(),
        });
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::FetchError { .. }));
        assert!(report.last_message.unwrap_or_default().contains("500"));
    }

    #[tokio::test]
    async fn price_transport_error_aborts_pass() {
        let mut desk = FakeDesk::new(vec![long("1", X, 100.0), long("2", Y, 100.0)]).price(Y, 200.0);
        desk.prices
            .insert(X, Err(GatewayError::Transport("timeout".into())));
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::FetchError { .. }));
        assert!(desk.closed.lock().is_empty());
    }

    #[tokio::test]
    async fn close_failure_is_reported() {
        let mut desk = FakeDesk::new(vec![long("5", X, 100.0)]).price(X, 120.0);
        desk.close_result = Err(GatewayError::Status {
            code: 409,
            body: "already closing".into(),
        });
        let report = run(&desk).await;
        assert!(matches!(report.outcome, MonitorOutcome::CloseFailed { ref id, .. } if id == "5"));
        assert_eq!(desk.closed.lock().len(), 1);
    }

    #[tokio::test]
    async fn unrecognised_direction_never_closes() {
        let mut odd = long("1", X, 100.0);
        odd.direction = Direction::Other("hedge".into());
        let desk = FakeDesk::new(vec![odd]).price(X, 500.0);
        let report = run(&desk).await;
        assert_eq!(report.outcome, MonitorOutcome::NoThresholdReached);
    }
}
