//! Batch driver: turns a flat, unsorted set of order records into one
//! [`SummaryRow`] per instrument.
//!
//! ## Steps
//! 1. Stable-sort all records by timestamp (ties keep arrival order) and
//!    re-stamp `sequence` with the position in that sorted stream.
//! 2. Partition into per-instrument sub-streams, preserving relative order.
//!    The partitions live in a [`BTreeMap`] keyed by instrument id, so every
//!    result is reported in **ascending instrument id** order.
//! 3. For each partition build a fresh [`MatchingEngine`] and [`Aggregator`],
//!    feed every order, and publish the summary once the stream is exhausted.
//!
//! Bad records never stop the batch: they are collected as [`Rejection`]s next
//! to the summaries. Partitions may run on the rayon pool since nothing is
//! shared between instruments. A [`CancellationToken`] can abandon the run;
//! an instrument interrupted mid-stream is reported in `aborted` and gets no row.
//! An instrument whose traded total overflows is reported in `failed`, also
//! without a row, while the other instruments carry on.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    aggregator::{Aggregator, SummaryRow},
    engine::MatchingEngine,
    errors::{EngineError, Rejection},
    orders::{InstrumentId, OrderRecord},
};

#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Instruments that must be reported even without orders. When set, orders
    /// for any other instrument are rejected as unroutable.
    pub expected_instruments: Option<BTreeSet<InstrumentId>>,
    /// Match instruments concurrently, one engine per worker.
    pub parallel: bool,
}

/// Everything a batch run produces.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One row per completed instrument, ascending by instrument id.
    pub summaries: Vec<SummaryRow>,
    pub rejections: Vec<Rejection>,
    /// Instruments abandoned because the run was cancelled.
    pub aborted: Vec<InstrumentId>,
    /// Instruments whose totals could not be represented; the cause is in `rejections`.
    pub failed: Vec<InstrumentId>,
}

/// Result of replaying a single instrument, book included.
#[derive(Debug)]
pub struct Replay {
    pub engine: MatchingEngine,
    pub summary: SummaryRow,
    pub rejections: Vec<Rejection>,
}

enum Outcome {
    Completed(Replay),
    Aborted(InstrumentId),
    Failed(InstrumentId, Vec<Rejection>),
}

pub struct BatchDriver {
    config: BatchConfig,
    cancel: CancellationToken,
}

/// Stable sort by timestamp, then assign arrival sequences `0..n`.
///
/// Records with equal timestamps keep their relative order (their incoming
/// sequence is the tie-break).
pub fn sequence_by_time(mut records: Vec<OrderRecord>) -> Vec<OrderRecord> {
    records.sort_by_key(|r| (r.timestamp, r.sequence));
    for (sequence, record) in (0u64..).zip(records.iter_mut()) {
        record.sequence = sequence;
    }
    records
}

fn run_instrument(
    instrument_id: InstrumentId,
    orders: Vec<OrderRecord>,
    cancel: &CancellationToken,
) -> Outcome {
    let mut engine = MatchingEngine::new(instrument_id);
    let mut aggregator = Aggregator::new(instrument_id);
    let mut rejections = Vec::new();

    for order in &orders {
        if cancel.is_cancelled() {
            warn!(instrument = instrument_id, "run cancelled, dropping partial results");
            return Outcome::Aborted(instrument_id);
        }
        let recorded = engine
            .submit(order)
            .map(|trades| aggregator.record_all(&trades, order.sequence));
        match recorded {
            Ok(Ok(())) => {}
            Ok(Err(overflow)) => {
                warn!(instrument = instrument_id, err = %overflow, "dropping instrument");
                rejections.push(Rejection {
                    line: order.line,
                    instrument_id: Some(instrument_id),
                    kind: overflow.into(),
                });
                return Outcome::Failed(instrument_id, rejections);
            }
            Err(err) => {
                warn!(instrument = instrument_id, %err, "rejected order");
                rejections.push(Rejection {
                    line: order.line,
                    instrument_id: Some(instrument_id),
                    kind: err.into(),
                });
            }
        }
    }
    // an instrument without orders is still skipped once the run is cancelled
    if orders.is_empty() && cancel.is_cancelled() {
        return Outcome::Aborted(instrument_id);
    }

    let summary = aggregator.finish();
    info!(
        instrument = instrument_id,
        orders = orders.len(),
        trades = summary.trades_executed,
        qty = summary.total_traded_qty,
        "instrument done"
    );
    Outcome::Completed(Replay {
        engine,
        summary,
        rejections,
    })
}

impl BatchDriver {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to abandon the run from another thread or task.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn partition(
        &self,
        records: Vec<OrderRecord>,
        rejections: &mut Vec<Rejection>,
    ) -> BTreeMap<InstrumentId, Vec<OrderRecord>> {
        let mut partitions: BTreeMap<InstrumentId, Vec<OrderRecord>> = BTreeMap::new();
        if let Some(expected) = &self.config.expected_instruments {
            for id in expected {
                partitions.insert(*id, Vec::new());
            }
        }

        for record in sequence_by_time(records) {
            let routable = self
                .config
                .expected_instruments
                .as_ref()
                .is_none_or(|expected| expected.contains(&record.instrument_id));
            if !routable {
                let err = EngineError::InvalidOrder {
                    sequence: record.sequence,
                    reason: format!("unknown instrument {}", record.instrument_id),
                };
                warn!(%err, "rejected order");
                rejections.push(Rejection {
                    line: record.line,
                    instrument_id: Some(record.instrument_id),
                    kind: err.into(),
                });
                continue;
            }
            partitions.entry(record.instrument_id).or_default().push(record);
        }
        partitions
    }

    /// Runs the whole batch.
    pub fn run(&self, records: Vec<OrderRecord>) -> BatchReport {
        self.run_with_rejections(records, Vec::new())
    }

    /// Runs the whole batch, reporting `rejections` from an earlier parsing
    /// stage ahead of the ones found here.
    pub fn run_with_rejections(
        &self,
        records: Vec<OrderRecord>,
        mut rejections: Vec<Rejection>,
    ) -> BatchReport {
        let partitions = self.partition(records, &mut rejections);
        info!(
            instruments = partitions.len(),
            parallel = self.config.parallel,
            "starting batch"
        );

        let outcomes: Vec<Outcome> = if self.config.parallel {
            partitions
                .into_par_iter()
                .map(|(id, orders)| run_instrument(id, orders, &self.cancel))
                .collect()
        } else {
            partitions
                .into_iter()
                .map(|(id, orders)| run_instrument(id, orders, &self.cancel))
                .collect()
        };

        let mut report = BatchReport {
            rejections,
            ..BatchReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Completed(replay) => {
                    report.summaries.push(replay.summary);
                    report.rejections.extend(replay.rejections);
                }
                Outcome::Aborted(id) => report.aborted.push(id),
                Outcome::Failed(id, rejections) => {
                    report.failed.push(id);
                    report.rejections.extend(rejections);
                }
            }
        }
        report.summaries.sort_by_key(|row| row.instrument_id);
        report.aborted.sort_unstable();
        report.failed.sort_unstable();
        report
    }

    /// Matches a single instrument and hands back its engine so the resting
    /// book can be inspected.
    ///
    /// # Errors
    /// The rejections explaining why no summary exists: empty when the run was
    /// cancelled, ending with the overflow when the instrument failed.
    pub fn replay(
        &self,
        records: Vec<OrderRecord>,
        instrument_id: InstrumentId,
    ) -> Result<Replay, Vec<Rejection>> {
        let orders = sequence_by_time(records)
            .into_iter()
            .filter(|r| r.instrument_id == instrument_id)
            .collect();
        match run_instrument(instrument_id, orders, &self.cancel) {
            Outcome::Completed(replay) => Ok(replay),
            Outcome::Aborted(_) => Err(Vec::new()),
            Outcome::Failed(_, rejections) => Err(rejections),
        }
    }
}
