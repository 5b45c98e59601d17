//! Synthetic order flow for test and research batches.
//!
//! For every reference instrument, emits `orders_per_instrument` limit orders
//! spaced `spacing_ms` apart:
//!
//! - **Price**: `LogNormal(ln(prev_close) - σ²/2, σ)`, so the mean sits on the
//!   previous close. Rounded to the tick, clamped to
//!   `prev_close · (1 ± price_deviation_clamp)` and rounded to the tick again.
//! - **Quantity**: `lot_size × U{1..=max_lot_multiple}`.
//! - **Side**: BUY with probability `0.5 + 5·(price - prev_close)/prev_close`,
//!   clamped to `[0.45, 0.55]`.
//!
//! The random source is always passed in, so a seeded [`StdRng`] gives a
//! reproducible batch.

use std::{fs::File, io, path::Path};

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, LogNormal};
use serde::Serialize;
use tracing::info;

use crate::{
    errors::{GeneratorError, IngestError},
    instrument::{Instrument, round_to_tick},
    orders::{OrderRecord, Price, Side},
};

const MIN_BUY_BIAS: f64 = 0.45;
const MAX_BUY_BIAS: f64 = 0.55;
const BIAS_SENSITIVITY: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub orders_per_instrument: usize,
    /// Log-price volatility.
    pub sigma: f64,
    /// Maximum relative distance from the previous close.
    pub price_deviation_clamp: f64,
    pub max_lot_multiple: i64,
    pub spacing_ms: i64,
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            orders_per_instrument: 200,
            sigma: 0.005,
            price_deviation_clamp: 0.05,
            max_lot_multiple: 5,
            spacing_ms: 2,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// A seeded generator when `seed` is set, an OS-seeded one otherwise.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Probability of a BUY: more buying when the draw is above the reference price.
pub fn buy_bias(price: Price, prev_close: Price) -> f64 {
    let reference = prev_close.max(1) as f64;
    let bias = 0.5 + ((price - prev_close) as f64 / reference) * BIAS_SENSITIVITY;
    bias.clamp(MIN_BUY_BIAS, MAX_BUY_BIAS)
}

/// Orders for one instrument. Sequences start at `first_sequence`.
pub fn generate_for_instrument<R: Rng + ?Sized>(
    instrument: &Instrument,
    cfg: &GeneratorConfig,
    start: DateTime<Utc>,
    first_sequence: u64,
    rng: &mut R,
) -> Result<Vec<OrderRecord>, GeneratorError> {
    let prev_close = instrument.underlying_prev_close;
    if prev_close <= 0 {
        return Err(GeneratorError::ReferencePrice {
            symbol: instrument.symbol.clone(),
            prev_close,
        });
    }
    if !(0.0..=1.0).contains(&cfg.price_deviation_clamp) {
        return Err(GeneratorError::DeviationClamp(cfg.price_deviation_clamp));
    }
    let tick = instrument.tick_size;
    let mu = (prev_close as f64).ln() - cfg.sigma.powi(2) / 2.0;
    let price_dist = LogNormal::new(mu, cfg.sigma)?;

    let lo = (prev_close as f64 * (1.0 - cfg.price_deviation_clamp)) as Price;
    let hi = (prev_close as f64 * (1.0 + cfg.price_deviation_clamp)) as Price;

    let mut orders = Vec::with_capacity(cfg.orders_per_instrument);
    for (i, sequence) in (0..cfg.orders_per_instrument).zip(first_sequence..) {
        let raw: f64 = price_dist.sample(rng);
        let price = round_to_tick(raw, tick).clamp(lo, hi);
        let price = round_to_tick(price as f64, tick);

        let quantity = instrument.lot_size * rng.random_range(1..=cfg.max_lot_multiple);

        let side = if rng.random::<f64>() < buy_bias(price, prev_close) {
            Side::Buy
        } else {
            Side::Sell
        };
        let timestamp = start + TimeDelta::milliseconds(i as i64 * cfg.spacing_ms);

        orders.push(OrderRecord::new(
            instrument.token,
            side,
            price,
            quantity,
            timestamp,
            sequence,
        ));
    }
    Ok(orders)
}

/// Orders for every instrument, concatenated in reference order.
pub fn generate<R: Rng + ?Sized>(
    instruments: &[Instrument],
    cfg: &GeneratorConfig,
    start: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<OrderRecord>, GeneratorError> {
    let mut all = Vec::with_capacity(instruments.len() * cfg.orders_per_instrument);
    for instrument in instruments {
        let orders = generate_for_instrument(instrument, cfg, start, all.len() as u64, rng)?;
        info!(
            symbol = %instrument.symbol,
            token = instrument.token,
            orders = orders.len(),
            "generated orders"
        );
        all.extend(orders);
    }
    Ok(all)
}

#[derive(Serialize)]
struct OrderRow {
    timestamp: String,
    instrument_id: u64,
    side: String,
    quantity: i64,
    price: i64,
}

/// Writes orders in the same layout [`crate::ingest::read_orders`] reads.
pub fn write_orders_to<W: io::Write>(sink: W, orders: &[OrderRecord]) -> Result<(), IngestError> {
    let mut writer = csv::Writer::from_writer(sink);
    for order in orders {
        writer.serialize(OrderRow {
            timestamp: order.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            instrument_id: order.instrument_id,
            side: order.side.to_string(),
            quantity: order.quantity,
            price: order.price,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_orders(path: impl AsRef<Path>, orders: &[OrderRecord]) -> Result<(), IngestError> {
    write_orders_to(File::create(path)?, orders)
}
