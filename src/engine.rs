use tracing::{debug, trace};

use crate::{
    errors::EngineError,
    orderbook::OrderBook,
    orders::{InstrumentId, OrderRecord, Price, Quantity, RestingOrder, Side},
    trade::TradeEvent,
};

/// Price-time priority matcher for a single instrument.
///
/// The engine owns its [`OrderBook`] exclusively. It is created empty, fed the
/// instrument's orders in arrival order, and dropped once the stream is done.
#[derive(Debug)]
pub struct MatchingEngine {
    instrument_id: InstrumentId,
    book: OrderBook,
}

/// Whether an incoming order at `limit` may trade against a resting order at `resting`.
///
/// Equal prices always cross.
fn crosses(side: Side, limit: Price, resting: Price) -> bool {
    match side {
        Side::Buy => resting <= limit,
        Side::Sell => resting >= limit,
    }
}

/// Matches an **incoming order** against the opposite side of `book`,
/// appending one [`TradeEvent`] per fill to `trades`.
///
/// Returns the quantity of the incoming order that is still unfilled.
///
/// # Notes
/// - The best resting order is popped, filled by
///   `min(remaining, resting.remaining_quantity)` and, if anything is left,
///   pushed back with its original sequence so it keeps its place in the queue.
/// - The loop stops when the incoming order is filled, the opposite side is
///   empty, or the best opposite price no longer crosses.
fn match_incoming_side(
    incoming: &OrderRecord,
    book: &mut OrderBook,
    trades: &mut Vec<TradeEvent>,
) -> Quantity {
    let contra = incoming.side.opposite();
    let mut remaining = incoming.quantity;

    while remaining > 0 {
        let crossing = book
            .peek_best(contra)
            .is_some_and(|best| crosses(incoming.side, incoming.price, best.price));
        if !crossing {
            break;
        }
        let Some(mut resting) = book.pop_best(contra) else {
            break;
        };

        let traded = remaining.min(resting.remaining_quantity);
        let (buy_sequence, sell_sequence) = match incoming.side {
            Side::Buy => (incoming.sequence, resting.sequence),
            Side::Sell => (resting.sequence, incoming.sequence),
        };
        trace!(
            price = resting.price,
            traded,
            maker = resting.sequence,
            taker = incoming.sequence,
            "fill"
        );
        trades.push(TradeEvent {
            instrument_id: incoming.instrument_id,
            price: resting.price,
            quantity: traded,
            buy_sequence,
            sell_sequence,
        });

        remaining -= traded;
        resting.remaining_quantity -= traded;
        if resting.remaining_quantity > 0 {
            book.push(contra, resting);
        }
    }
    remaining
}

impl MatchingEngine {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            book: OrderBook::new(),
        }
    }

    /// Read-only view of the resting liquidity.
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Processes one incoming limit order.
    ///
    /// # Behavior
    /// - A `Buy` crosses the asks from the lowest price up while `ask <= price`.
    /// - A `Sell` crosses the bids from the highest price down while `bid >= price`.
    /// - Whatever is left afterwards rests on the order's own side at its limit price.
    ///
    /// # Errors
    /// [`EngineError::InvalidOrder`] if the quantity is not positive or the order
    /// belongs to another instrument. The book is left untouched in that case.
    pub fn submit(&mut self, order: &OrderRecord) -> Result<Vec<TradeEvent>, EngineError> {
        if order.quantity <= 0 {
            return Err(EngineError::InvalidOrder {
                sequence: order.sequence,
                reason: format!("quantity must be positive, got {}", order.quantity),
            });
        }
        if order.instrument_id != self.instrument_id {
            return Err(EngineError::InvalidOrder {
                sequence: order.sequence,
                reason: format!(
                    "routed to instrument {} but belongs to {}",
                    self.instrument_id, order.instrument_id
                ),
            });
        }

        let mut trades = Vec::new();
        let remaining = match_incoming_side(order, &mut self.book, &mut trades);
        if remaining > 0 {
            self.book
                .push(order.side, RestingOrder::from_order(order, remaining));
        }
        if !trades.is_empty() {
            debug!(
                instrument = self.instrument_id,
                sequence = order.sequence,
                fills = trades.len(),
                rested = remaining,
                "order matched"
            );
        }
        Ok(trades)
    }
}
