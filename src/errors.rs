use std::path::PathBuf;

use thiserror::Error;

use crate::orders::{InstrumentId, Price, Sequence};

/// A row that could not be turned into an [`OrderRecord`](crate::orders::OrderRecord).
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not an integer: `{value}`")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown side `{0}`, expected BUY or SELL")]
    UnknownSide(String),

    #[error("unparseable timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// A well-formed order the matching engine refuses to process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid order #{sequence}: {reason}")]
    InvalidOrder { sequence: Sequence, reason: String },

    #[error("traded quantity of order #{sequence} overflows the total of instrument {instrument_id}")]
    QuantityOverflow {
        instrument_id: InstrumentId,
        sequence: Sequence,
    },
}

/// Failures that stop a whole file from being read or written.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("cannot open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad header in `{path}`: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad reference data in `{path}`: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("invalid price model: {0}")]
    PriceModel(#[from] rand_distr::NormalError),

    #[error("price deviation clamp must be within [0, 1], got {0}")]
    DeviationClamp(f64),

    #[error("instrument {symbol} has a non-positive previous close {prev_close}")]
    ReferencePrice { symbol: String, prev_close: Price },
}

/// Why a single record was dropped from a batch.
#[derive(Error, Debug)]
pub enum RejectionKind {
    #[error("malformed record: {0}")]
    Malformed(#[from] RecordError),

    #[error(transparent)]
    Invalid(#[from] EngineError),
}

/// A rejected-record diagnostic returned alongside the summary rows.
#[derive(Debug)]
pub struct Rejection {
    /// 1-based line in the source file, header included, when the record came from a file.
    pub line: Option<u64>,
    pub instrument_id: Option<InstrumentId>,
    pub kind: RejectionKind,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {line}: ")?;
        }
        if let Some(id) = self.instrument_id {
            write!(f, "instrument {id}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}
