//! # Prometheus Metrics
//!
//! Operational counters for the engine, fed by the event stream: attach a
//! [`CovenantMetrics`] as an [`EventSink`] (usually behind a
//! [`FanoutSink`](crate::events::FanoutSink)) and it counts what happens.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `covenant` prefix so they do not collide with the host's own.

use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::events::{CovenantEvent, EventSink, PayoutPath};
use crate::types::{Amount, AssetKind};

/// Handles to every engine metric.
#[derive(Clone)]
pub struct CovenantMetrics {
    registry: Registry,
    /// Entities created, by kind.
    pub entities_created_total: IntCounterVec,
    pub contributions_total: IntCounter,
    /// Payouts, by path (primary, refund, release).
    pub payouts_total: IntCounterVec,
    /// Transfers that failed and were rolled back.
    pub transfer_failures_total: IntCounter,
    pub voids_total: IntCounter,
    pub exchanges_total: IntCounter,
    /// Value currently held in escrow, by asset (native, token id, or item
    /// collection). Each series counts that asset's own smallest units.
    pub escrow_value: IntGaugeVec,
    pub payout_amount: Histogram,
}

impl CovenantMetrics {
    /// Creates and registers all metrics.
    ///
    /// # Errors
    ///
    /// Propagates [`prometheus::Error`] if a metric cannot be created or
    /// registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("covenant".into()), None)?;

        let entities_created_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("entities_created_total", "Entities created, by kind"),
                &["kind"],
            )?,
        )?;
        let contributions_total = register(
            &registry,
            IntCounter::new("contributions_total", "Contributions accepted into a pool")?,
        )?;
        let payouts_total = register(
            &registry,
            IntCounterVec::new(
                Opts::new("payouts_total", "Successful payouts, by path"),
                &["path"],
            )?,
        )?;
        let transfer_failures_total = register(
            &registry,
            IntCounter::new(
                "transfer_failures_total",
                "Payouts whose transfer failed and were rolled back",
            )?,
        )?;
        let voids_total = register(
            &registry,
            IntCounter::new("voids_total", "Entities that fell back to refunds")?,
        )?;
        let exchanges_total = register(
            &registry,
            IntCounter::new("exchanges_total", "Atomic multi-leg exchanges settled")?,
        )?;
        let escrow_value = register(
            &registry,
            IntGaugeVec::new(
                Opts::new("escrow_value", "Value currently held in escrow, by asset"),
                &["asset"],
            )?,
        )?;
        let payout_amount = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new("payout_amount", "Size of individual payouts")
                    .buckets(prometheus::exponential_buckets(1.0, 10.0, 10)?),
            )?,
        )?;

        Ok(Self {
            registry,
            entities_created_total,
            contributions_total,
            payouts_total,
            transfer_failures_total,
            voids_total,
            exchanges_total,
            escrow_value,
            payout_amount,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn register<T>(registry: &Registry, metric: T) -> Result<T, prometheus::Error>
where
    T: Collector + Clone + 'static,
{
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge_delta(amount: Amount) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// Items are grouped by collection so the label set stays bounded.
fn asset_label(asset: &AssetKind) -> &str {
    match asset {
        AssetKind::Native => "native",
        AssetKind::Token(id) => id.as_str(),
        AssetKind::Item { collection, .. } => collection.as_str(),
    }
}

impl CovenantMetrics {
    fn escrow_in(&self, asset: &AssetKind, amount: Amount) {
        self.escrow_value
            .with_label_values(&[asset_label(asset)])
            .add(gauge_delta(amount));
    }

    fn escrow_out(&self, asset: &AssetKind, amount: Amount) {
        self.escrow_value
            .with_label_values(&[asset_label(asset)])
            .sub(gauge_delta(amount));
    }
}

impl EventSink for CovenantMetrics {
    fn emit(&self, event: &CovenantEvent) {
        match event {
            CovenantEvent::Created { kind, .. } => {
                self.entities_created_total
                    .with_label_values(&[&kind.to_string()])
                    .inc();
            }
            CovenantEvent::Contributed { asset, amount, .. } => {
                self.contributions_total.inc();
                self.escrow_in(asset, *amount);
            }
            CovenantEvent::Collected { asset, amount, .. } => self.escrow_in(asset, *amount),
            CovenantEvent::Paid {
                asset, amount, path, ..
            } => {
                let label = match path {
                    PayoutPath::Primary => "primary",
                    PayoutPath::Refund => "refund",
                    PayoutPath::Release => "release",
                };
                self.payouts_total.with_label_values(&[label]).inc();
                self.payout_amount.observe(*amount as f64);
                self.escrow_out(asset, *amount);
            }
            CovenantEvent::PayoutReverted { .. } => self.transfer_failures_total.inc(),
            CovenantEvent::Voided { .. } => self.voids_total.inc(),
            CovenantEvent::Exchanged { legs, .. } => {
                self.exchanges_total.inc();
                for leg in legs {
                    if leg.from.is_escrow() {
                        self.escrow_out(&leg.asset, leg.amount);
                    }
                    if leg.to.is_escrow() {
                        self.escrow_in(&leg.asset, leg.amount);
                    }
                }
            }
            CovenantEvent::Resolved { .. } | CovenantEvent::Cleared { .. } => {}
        }
    }
}
