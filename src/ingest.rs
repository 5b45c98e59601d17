//! CSV boundary of the batch: reads the order file into [`OrderRecord`]s and
//! writes the per-instrument summary file.
//!
//! Order file header: `timestamp,instrument_id,side,quantity,price`
//! (`token` and `qty` are accepted for the id and quantity columns).

use std::{fs::File, io, path::Path};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    aggregator::SummaryRow,
    errors::{IngestError, RecordError, Rejection},
    orders::{OrderRecord, Side},
};

/// One raw row; every field is kept as text so a bad value rejects only its row.
#[derive(Debug, Deserialize)]
struct RawOrderRow {
    timestamp: Option<String>,
    #[serde(alias = "token")]
    instrument_id: Option<String>,
    side: Option<String>,
    #[serde(alias = "qty")]
    quantity: Option<String>,
    price: Option<String>,
}

/// Parsed records plus the rows that could not be parsed.
#[derive(Debug, Default)]
pub struct Ingested {
    pub records: Vec<OrderRecord>,
    pub rejections: Vec<Rejection>,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, RecordError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RecordError::MissingField(field)),
    }
}

fn integer<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<T, RecordError> {
    value.parse().map_err(|_| RecordError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// RFC 3339 (`2025-01-01T09:15:00.002Z`); zone-less timestamps are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RecordError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| RecordError::InvalidTimestamp(value.to_string()))
}

impl RawOrderRow {
    fn into_record(self, sequence: u64, line: Option<u64>) -> Result<OrderRecord, RecordError> {
        let side = required(&self.side, "side")?
            .parse::<Side>()
            .map_err(RecordError::UnknownSide)?;
        Ok(OrderRecord {
            instrument_id: integer(required(&self.instrument_id, "instrument_id")?, "instrument_id")?,
            side,
            price: integer(required(&self.price, "price")?, "price")?,
            quantity: integer(required(&self.quantity, "quantity")?, "quantity")?,
            timestamp: parse_timestamp(required(&self.timestamp, "timestamp")?)?,
            sequence,
            line,
        })
    }
}

/// Reads orders from any CSV source. Row `n` (0-based, header excluded) gets sequence `n`.
pub fn read_orders_from<R: io::Read>(source: R) -> Result<Ingested, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);
    let headers = reader.headers()?.clone();

    let mut out = Ingested::default();
    for (sequence, row) in (0u64..).zip(reader.records()) {
        let (line, parsed) = match row {
            Ok(record) => {
                let line = record.position().map(|p| p.line());
                let parsed = record
                    .deserialize::<RawOrderRow>(Some(&headers))
                    .map_err(RecordError::from)
                    .and_then(|raw| raw.into_record(sequence, line));
                (line, parsed)
            }
            Err(err) => (err.position().map(|p| p.line()), Err(err.into())),
        };
        match parsed {
            Ok(record) => out.records.push(record),
            Err(err) => {
                warn!(line, %err, "skipping malformed record");
                out.rejections.push(Rejection {
                    line,
                    instrument_id: None,
                    kind: err.into(),
                });
            }
        }
    }
    debug!(
        accepted = out.records.len(),
        rejected = out.rejections.len(),
        "orders read"
    );
    Ok(out)
}

/// Reads the order file at `path`.
pub fn read_orders(path: impl AsRef<Path>) -> Result<Ingested, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IngestError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_orders_from(file).map_err(|source| IngestError::Header {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `instrument_id,trades_executed,total_traded_qty` rows.
pub fn write_summary_to<W: io::Write>(sink: W, rows: &[SummaryRow]) -> Result<(), IngestError> {
    let mut writer = csv::Writer::from_writer(sink);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: impl AsRef<Path>, rows: &[SummaryRow]) -> Result<(), IngestError> {
    write_summary_to(File::create(path)?, rows)
}
