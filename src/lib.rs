pub mod aggregator;
pub mod batch;
pub mod cli;
pub mod engine;
pub mod errors;
pub mod ingest;
pub mod instrument;
pub mod orderbook;
pub mod orders;
pub mod simulate;
pub mod trade;
pub mod utils;
