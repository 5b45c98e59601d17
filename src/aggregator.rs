use serde::Serialize;

use crate::{
    errors::EngineError,
    orders::{InstrumentId, Quantity, Sequence},
    trade::TradeEvent,
};

/// Per-instrument outcome of a batch, published once the instrument's stream is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub instrument_id: InstrumentId,
    pub trades_executed: u64,
    pub total_traded_qty: u64,
}

/// Running fold over one instrument's trade events.
#[derive(Debug)]
pub struct Aggregator {
    instrument_id: InstrumentId,
    trades_executed: u64,
    total_traded_qty: u64,
}

impl Aggregator {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            trades_executed: 0,
            total_traded_qty: 0,
        }
    }

    /// Adds one trade. Fails, leaving the totals unchanged, if the traded
    /// quantity no longer fits; `sequence` names the order that caused it.
    pub fn record(&mut self, trade: &TradeEvent, sequence: Sequence) -> Result<(), EngineError> {
        debug_assert_eq!(trade.instrument_id, self.instrument_id);
        let total = self
            .total_traded_qty
            .checked_add(quantity_as_u64(trade.quantity))
            .ok_or(EngineError::QuantityOverflow {
                instrument_id: self.instrument_id,
                sequence,
            })?;
        self.total_traded_qty = total;
        self.trades_executed += 1;
        Ok(())
    }

    /// Adds every trade produced by order `sequence`.
    pub fn record_all<'a>(
        &mut self,
        trades: impl IntoIterator<Item = &'a TradeEvent>,
        sequence: Sequence,
    ) -> Result<(), EngineError> {
        trades
            .into_iter()
            .try_for_each(|trade| self.record(trade, sequence))
    }

    /// Consumes the accumulators; the row cannot be changed afterwards.
    pub fn finish(self) -> SummaryRow {
        SummaryRow {
            instrument_id: self.instrument_id,
            trades_executed: self.trades_executed,
            total_traded_qty: self.total_traded_qty,
        }
    }
}

// Trade quantities come out of the engine strictly positive.
fn quantity_as_u64(quantity: Quantity) -> u64 {
    u64::try_from(quantity).unwrap_or(0)
}
