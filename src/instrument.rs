//! Instrument reference data, as produced by the reference-data export
//! (`symbol,token,stock_name,lot_size,tick_size,underlying_prev_close`).
//!
//! The matching core never looks these up; they drive the order generator and
//! tell the batch driver which instruments to expect.

use std::{collections::BTreeSet, fs::File, io, path::Path};

use serde::Deserialize;

use crate::{
    errors::IngestError,
    orders::{InstrumentId, Price, Quantity},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    /// Instrument id used in the order stream.
    pub token: InstrumentId,
    #[serde(default)]
    pub stock_name: String,
    pub lot_size: Quantity,
    pub tick_size: Price,
    pub underlying_prev_close: Price,
}

/// Rounds `price` to the nearest multiple of `tick_size`, ties to even.
///
/// A non-positive tick size just rounds to the nearest integer.
pub fn round_to_tick(price: f64, tick_size: Price) -> Price {
    if tick_size <= 0 {
        return price.round_ties_even() as Price;
    }
    (price / tick_size as f64).round_ties_even() as Price * tick_size
}

/// Ids of every listed instrument.
pub fn tokens(instruments: &[Instrument]) -> BTreeSet<InstrumentId> {
    instruments.iter().map(|i| i.token).collect()
}

pub fn read_instruments_from<R: io::Read>(source: R) -> Result<Vec<Instrument>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source)
        .deserialize()
        .collect()
}

/// Loads the reference file. Unlike order files, a single bad row fails the load.
pub fn read_instruments(path: impl AsRef<Path>) -> Result<Vec<Instrument>, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_instruments_from(file).map_err(|source| IngestError::Reference {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(2451.4, 5), 2450);
        assert_eq!(round_to_tick(2453.0, 5), 2455);
        assert_eq!(round_to_tick(101.6, 1), 102);
        assert_eq!(round_to_tick(101.6, 0), 102);
        // halfway goes to the even multiple
        assert_eq!(round_to_tick(2.5, 1), 2);
        assert_eq!(round_to_tick(15.0, 10), 20);
    }
}
