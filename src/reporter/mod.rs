//! Periodic volume reporting
//!
//! Reads every book on a fixed cadence, computes total notional and its
//! change since the previous cycle, and emits one report per instrument.
//! Each book is copied under a short read lock; nothing here waits on the
//! network.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::orderbook::{BookMetrics, BookRegistry, PriceLevel, SyncState, VolumeSnapshot};
use crate::publisher::Publisher;

/// Report emitted for one instrument per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeReport {
    pub symbol: String,
    pub sync_state: SyncState,
    pub last_update_id: Option<u64>,
    /// Highest price first
    pub bids: Vec<PriceLevel>,
    /// Lowest price first
    pub asks: Vec<PriceLevel>,
    pub metrics: BookMetrics,
    pub total_notional: Decimal,
    /// Change in total notional since the previous report
    pub volume_delta: Decimal,
    pub timestamp: DateTime<Utc>,
}

pub struct MetricsReporter {
    registry: Arc<BookRegistry>,
    publisher: Option<Arc<Publisher>>,
    period: Duration,
    /// Previous total notional per symbol
    previous: HashMap<String, Decimal>,
}

impl MetricsReporter {
    pub fn new(registry: Arc<BookRegistry>, period: Duration) -> Self {
        Self {
            registry,
            publisher: None,
            period,
            previous: HashMap::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Compute one report per tracked instrument and remember the totals
    pub async fn report_once(&mut self) -> Vec<VolumeReport> {
        let mut reports = Vec::with_capacity(self.registry.len());

        for (symbol, book) in self.registry.iter() {
            let view = book.read().await.view();

            let metrics = BookMetrics::from_view(&view);
            let volume = VolumeSnapshot {
                symbol: symbol.to_string(),
                total_notional: metrics.total_notional(),
                timestamp: Utc::now(),
            };
            let volume_delta = volume.delta(self.previous.get(symbol).copied());
            self.previous
                .insert(volume.symbol.clone(), volume.total_notional);

            reports.push(VolumeReport {
                symbol: volume.symbol,
                sync_state: view.sync_state,
                last_update_id: view.last_update_id,
                bids: view.bids,
                asks: view.asks,
                metrics,
                total_notional: volume.total_notional,
                volume_delta,
                timestamp: volume.timestamp,
            });
        }

        reports
    }

    /// Report every period until shutdown. Late ticks are skipped rather
    /// than run back to back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; wait a full period first
        ticker.tick().await;

        info!(period_secs = self.period.as_secs(), "Starting volume reporter");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("Volume reporter stopping");
                    return;
                }
            }

            let started = Instant::now();
            for report in self.report_once().await {
                log_report(&report);
                if let Some(publisher) = &self.publisher {
                    if let Err(e) = publisher.publish(&report).await {
                        warn!(symbol = %report.symbol, error = %e, "Failed to publish report");
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed > self.period {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = self.period.as_millis() as u64,
                    "Report cycle overran its period, next tick skipped"
                );
            }
        }
    }
}

fn log_report(report: &VolumeReport) {
    let render = |levels: &[PriceLevel]| {
        levels
            .iter()
            .map(|level| format!("{}:{}", level.price, level.quantity))
            .collect::<Vec<_>>()
            .join(" ")
    };

    info!(
        symbol = %report.symbol,
        sync_state = %report.sync_state,
        last_update_id = ?report.last_update_id,
        bids = %render(&report.bids),
        asks = %render(&report.asks),
        mid_price = ?report.metrics.mid_price,
        spread_bps = ?report.metrics.spread_bps,
        total_notional = %report.total_notional,
        volume_delta = %report.volume_delta,
        "Order book report"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DepthUpdate, OrderBookSnapshot, ParsedMessage};
    use crate::sync::{ApplyOutcome, InstallOutcome, SnapshotBootstrapper, UpdateApplier};
    use crate::sync::MockSnapshotSource;
    use crate::telemetry::Telemetry;
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "BTCUSDT";

    struct Harness {
        registry: Arc<BookRegistry>,
        applier: Arc<UpdateApplier>,
        bootstrapper: SnapshotBootstrapper,
    }

    fn harness(symbols: &[&str]) -> Harness {
        let telemetry = Arc::new(Telemetry::new().unwrap());
        let registry = Arc::new(BookRegistry::new(symbols, 100));
        let applier = Arc::new(UpdateApplier::new(telemetry.clone()));
        let bootstrapper = SnapshotBootstrapper::new(
            registry.clone(),
            Arc::new(MockSnapshotSource::new()),
            applier.clone(),
            telemetry,
            1,
            5,
        );
        Harness {
            registry,
            applier,
            bootstrapper,
        }
    }

    async fn install(h: &Harness, symbol: &str, snapshot: &OrderBookSnapshot) {
        let handle = h.registry.get(symbol).unwrap();
        let mut book = handle.write().await;
        let epoch = book.begin_sync().unwrap();
        let outcome = h.bootstrapper.install(&mut book, epoch, snapshot).unwrap();
        assert!(matches!(outcome, InstallOutcome::Synced { .. }));
    }

    fn levels(raw: &[(Decimal, Decimal)]) -> Vec<PriceLevel> {
        raw.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect()
    }

    #[tokio::test]
    async fn test_total_notional_and_delta() {
        let h = harness(&[SYMBOL]);
        install(
            &h,
            SYMBOL,
            &OrderBookSnapshot {
                last_update_id: 100,
                bids: levels(&[(dec!(100), dec!(2)), (dec!(99), dec!(1))]),
                asks: levels(&[(dec!(101), dec!(1)), (dec!(102), dec!(3))]),
            },
        )
        .await;
        let mut reporter = MetricsReporter::new(h.registry.clone(), Duration::from_secs(10));

        let first = reporter.report_once().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].total_notional, dec!(706));
        // No previous observation: delta counts from zero
        assert_eq!(first[0].volume_delta, dec!(706));

        let second = reporter.report_once().await;
        assert_eq!(second[0].volume_delta, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_snapshot_then_update_scenario() {
        let h = harness(&[SYMBOL]);
        let mut reporter = MetricsReporter::new(h.registry.clone(), Duration::from_secs(10));

        // Prior cycle over the 706 book
        install(
            &h,
            SYMBOL,
            &OrderBookSnapshot {
                last_update_id: 100,
                bids: levels(&[(dec!(100), dec!(2)), (dec!(99), dec!(1))]),
                asks: levels(&[(dec!(101), dec!(1)), (dec!(102), dec!(3))]),
            },
        )
        .await;
        assert_eq!(reporter.report_once().await[0].total_notional, dec!(706));

        // Re-bootstrap with bids [[100,2],[99,1]], asks [[101,1]]
        h.registry.mark_disconnected(SYMBOL).await.unwrap();
        install(
            &h,
            SYMBOL,
            &OrderBookSnapshot {
                last_update_id: 200,
                bids: levels(&[(dec!(100), dec!(2)), (dec!(99), dec!(1))]),
                asks: levels(&[(dec!(101), dec!(1))]),
            },
        )
        .await;

        // Next version removes bid 99 and adds ask 102 x 3
        let update = DepthUpdate {
            event_type: "depthUpdate".to_string(),
            event_time: 1,
            symbol: SYMBOL.to_string(),
            first_update_id: 201,
            final_update_id: 201,
            bids: levels(&[(dec!(99), dec!(0))]),
            asks: levels(&[(dec!(102), dec!(3))]),
            rejected_levels: 0,
        };
        let outcome = h.applier.apply_to(&h.registry, update).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let report = reporter.report_once().await.remove(0);
        assert_eq!(report.bids, levels(&[(dec!(100), dec!(2))]));
        assert_eq!(report.asks, levels(&[(dec!(101), dec!(1)), (dec!(102), dec!(3))]));
        assert_eq!(report.total_notional, dec!(607));
        assert_eq!(report.volume_delta, dec!(-99));
        assert_eq!(report.last_update_id, Some(201));
    }

    #[tokio::test]
    async fn test_out_of_range_wire_level_is_skipped() {
        let h = harness(&[SYMBOL]);
        install(
            &h,
            SYMBOL,
            &OrderBookSnapshot {
                last_update_id: 10,
                bids: levels(&[(dec!(100), dec!(2))]),
                asks: levels(&[(dec!(101), dec!(1))]),
            },
        )
        .await;
        let mut reporter = MetricsReporter::new(h.registry.clone(), Duration::from_secs(10));

        let raw = r#"{"e":"depthUpdate","E":1,"s":"BTCUSDT","U":11,"u":11,"b":[["79228162514264337593543950335","2"],["99","1"]],"a":[]}"#;
        let ParsedMessage::DepthUpdate(update) = ParsedMessage::parse(raw).unwrap() else {
            panic!("expected a depth update");
        };
        let outcome = h.applier.apply_to(&h.registry, update).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        let report = reporter.report_once().await.remove(0);
        assert_eq!(report.bids, levels(&[(dec!(100), dec!(2)), (dec!(99), dec!(1))]));
        assert_eq!(report.total_notional, dec!(400));
        assert_eq!(report.last_update_id, Some(11));
    }

    #[tokio::test]
    async fn test_reports_every_instrument_independently() {
        let h = harness(&["BTCUSDT", "ETHUSDT"]);
        install(
            &h,
            "ETHUSDT",
            &OrderBookSnapshot {
                last_update_id: 5,
                bids: levels(&[(dec!(3000), dec!(1))]),
                asks: levels(&[(dec!(3001), dec!(2))]),
            },
        )
        .await;
        let mut reporter = MetricsReporter::new(h.registry.clone(), Duration::from_secs(10));

        let reports = reporter.report_once().await;

        assert_eq!(reports.len(), 2);
        let btc = &reports[0];
        assert_eq!(btc.symbol, "BTCUSDT");
        assert_eq!(btc.sync_state, SyncState::Unsynced);
        assert_eq!(btc.total_notional, Decimal::ZERO);
        let eth = &reports[1];
        assert_eq!(eth.sync_state, SyncState::Synced);
        assert_eq!(eth.total_notional, dec!(9002));
        assert!(eth.metrics.is_healthy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reader_never_sees_partial_update() {
        let h = harness(&[SYMBOL]);
        // Ten one-lot bids; every update moves one lot to a new price
        let bids: Vec<(Decimal, Decimal)> = (0..10).map(|i| (Decimal::from(100 + i), dec!(1))).collect();
        install(
            &h,
            SYMBOL,
            &OrderBookSnapshot {
                last_update_id: 0,
                bids: levels(&bids),
                asks: vec![],
            },
        )
        .await;

        let registry = h.registry.clone();
        let applier = h.applier.clone();
        let writer = tokio::spawn(async move {
            for i in 0..2_000u64 {
                let update = DepthUpdate {
                    event_type: "depthUpdate".to_string(),
                    event_time: i,
                    symbol: SYMBOL.to_string(),
                    first_update_id: i + 1,
                    final_update_id: i + 1,
                    bids: vec![
                        PriceLevel::new(Decimal::from(100 + i), Decimal::ZERO),
                        PriceLevel::new(Decimal::from(110 + i), dec!(1)),
                    ],
                    asks: vec![],
                    rejected_levels: 0,
                };
                let outcome = applier.apply_to(&registry, update).await.unwrap();
                assert_eq!(outcome, ApplyOutcome::Applied);
                tokio::task::yield_now().await;
            }
        });

        let mut reporter = MetricsReporter::new(h.registry.clone(), Duration::from_secs(10));
        while !writer.is_finished() {
            let report = reporter.report_once().await.remove(0);
            assert_eq!(report.bids.len(), 10);
            assert_eq!(report.metrics.bid_levels, 10);
            // Ten consecutive prices starting at some k
            let lowest = report.bids[9].price;
            for (offset, level) in report.bids.iter().rev().enumerate() {
                assert_eq!(level.price, lowest + Decimal::from(offset as u64));
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let report = reporter.report_once().await.remove(0);
        assert_eq!(report.bids[0].price, Decimal::from(2_109u64));
    }
}
