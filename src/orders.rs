use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

/// Opaque instrument token; every token gets its own independent book.
pub type InstrumentId = u64;
/// Integer price, already a multiple of the instrument's tick size.
pub type Price = i64;
/// Signed so that a bad upstream quantity can be observed and rejected.
pub type Quantity = i64;
/// Arrival order, the time-priority tie-break among equal prices.
pub type Sequence = u64;

/// Represents which side of the market the order is on.
///
/// # Intuition
/// - `Buy` (Bid): sorted from **highest to lowest price**, a higher bid is more aggressive.
/// - `Sell` (Ask): sorted from **lowest to highest price**, a lower ask is more aggressive.
///
/// Within a price, both sides are sorted by ascending [`Sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,  // Bid
    Sell, // Ask
}

impl Side {
    /// The side an incoming order of this side crosses against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(s.to_string()),
        }
    }
}

/// One validated incoming limit order. Never mutated once built; the engine
/// tracks fills on its own copy of the quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: DateTime<Utc>,
    pub sequence: Sequence,
    /// 1-based line of the source file, when the order was read from one.
    pub line: Option<u64>,
}

impl OrderRecord {
    pub fn new(
        instrument_id: InstrumentId,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
        sequence: Sequence,
    ) -> Self {
        Self {
            instrument_id,
            side,
            price,
            quantity,
            timestamp,
            sequence,
            line: None,
        }
    }

    /// Tags the order with the file line it was read from.
    pub fn with_line(mut self, line: Option<u64>) -> Self {
        self.line = line;
        self
    }
}

/// A book entry: whatever part of an [`OrderRecord`] is still unmatched.
///
/// `remaining_quantity` is only ever decremented by the matching engine and the
/// entry is dropped as soon as it reaches zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingOrder {
    pub sequence: Sequence,
    pub side: Side,
    pub price: Price,
    pub remaining_quantity: Quantity,
}

impl RestingOrder {
    /// Rest the unfilled balance of `order`, keeping its original sequence.
    pub fn from_order(order: &OrderRecord, remaining_quantity: Quantity) -> Self {
        Self {
            sequence: order.sequence,
            side: order.side,
            price: order.price,
            remaining_quantity,
        }
    }
}
