use crate::orders::{InstrumentId, Price, Quantity, Sequence};

/// A trade represents a matched transaction between an incoming order and a resting one.
///
/// # Terminology
/// - **Maker**: the order that was already resting in the book (providing liquidity).
/// - **Aggressor**: the incoming order that triggered the trade.
///
/// # Behavior
/// - The trade always executes at the **maker's price**, so any price improvement
///   goes to the aggressor.
/// - Partial fills may occur: one incoming order can produce many trades.
///
/// Example:
/// - A buy at 105 (aggressor) matches a resting sell at 102 (maker).
/// - A trade is created at price 102.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub quantity: Quantity,
    pub buy_sequence: Sequence,
    pub sell_sequence: Sequence,
}
