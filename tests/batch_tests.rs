use chrono::{DateTime, TimeDelta, Utc};
use price_time_matcher::{
    aggregator::SummaryRow,
    batch::{BatchConfig, BatchDriver, sequence_by_time},
    errors::{EngineError, RejectionKind},
    ingest::read_orders_from,
    instrument::Instrument,
    orders::{OrderRecord, Side},
    simulate::{GeneratorConfig, generate},
};
use tokio_util::sync::CancellationToken;

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)
}

/// Order `n` of the list arrives at `n` ms unless the test says otherwise.
fn order(instrument_id: u64, side: Side, quantity: i64, price: i64, ms: i64) -> OrderRecord {
    OrderRecord::new(instrument_id, side, price, quantity, at(ms), ms as u64)
}

fn row(instrument_id: u64, trades_executed: u64, total_traded_qty: u64) -> SummaryRow {
    SummaryRow {
        instrument_id,
        trades_executed,
        total_traded_qty,
    }
}

fn run(records: Vec<OrderRecord>) -> Vec<SummaryRow> {
    let report = BatchDriver::new(BatchConfig::default()).run(records);
    assert!(report.rejections.is_empty());
    assert!(report.aborted.is_empty());
    report.summaries
}

#[test]
fn scenario_single_full_match() {
    let rows = run(vec![
        order(1, Side::Buy, 10, 100, 1),
        order(1, Side::Sell, 10, 100, 2),
    ]);
    assert_eq!(rows, vec![row(1, 1, 10)]);

    let replay = BatchDriver::new(BatchConfig::default())
        .replay(
            vec![order(1, Side::Buy, 10, 100, 1), order(1, Side::Sell, 10, 100, 2)],
            1,
        )
        .unwrap();
    assert!(replay.engine.book().is_empty());
}

#[test]
fn scenario_buy_takes_best_ask_first() {
    let records = vec![
        order(1, Side::Sell, 5, 101, 1),
        order(1, Side::Sell, 5, 100, 2),
        order(1, Side::Buy, 8, 101, 3),
    ];
    assert_eq!(run(records.clone()), vec![row(1, 2, 8)]);

    let replay = BatchDriver::new(BatchConfig::default())
        .replay(records, 1)
        .unwrap();
    assert_eq!(replay.engine.book().depth(Side::Sell), vec![(101, 2)]);
    assert!(replay.engine.book().bids.is_empty());
}

#[test]
fn scenario_equal_price_bids_fill_by_arrival() {
    let records = vec![
        order(1, Side::Buy, 3, 50, 1),
        order(1, Side::Buy, 2, 50, 2),
        order(1, Side::Sell, 4, 50, 3),
    ];
    assert_eq!(run(records.clone()), vec![row(1, 2, 4)]);

    let replay = BatchDriver::new(BatchConfig::default())
        .replay(records, 1)
        .unwrap();
    let left: Vec<_> = replay.engine.book().resting(Side::Buy).collect();
    assert_eq!(left.len(), 1);
    // second bid, re-stamped as sequence 1 after sorting
    assert_eq!((left[0].sequence, left[0].remaining_quantity), (1, 1));
}

#[test]
fn scenario_lonely_sell_rests() {
    let records = vec![order(1, Side::Sell, 10, 200, 1)];
    assert_eq!(run(records.clone()), vec![row(1, 0, 0)]);

    let replay = BatchDriver::new(BatchConfig::default())
        .replay(records, 1)
        .unwrap();
    assert_eq!(replay.engine.book().depth(Side::Sell), vec![(200, 10)]);
}

#[test]
fn summaries_come_out_in_ascending_instrument_order() {
    let rows = run(vec![
        order(30, Side::Buy, 1, 10, 1),
        order(10, Side::Buy, 1, 10, 2),
        order(20, Side::Buy, 1, 10, 3),
        order(10, Side::Sell, 1, 10, 4),
    ]);
    let ids: Vec<_> = rows.iter().map(|r| r.instrument_id).collect();
    assert_eq!(ids, vec![10, 20, 30]);
    assert_eq!(rows[0], row(10, 1, 1));
}

/// The file lists the sell first but the buy happened earlier; matching follows time.
#[test]
fn input_is_sorted_by_timestamp_before_matching() {
    let records = vec![
        order(1, Side::Sell, 5, 100, 20),
        order(1, Side::Buy, 5, 101, 10),
        order(1, Side::Buy, 5, 100, 15),
    ];
    let replay = BatchDriver::new(BatchConfig::default())
        .replay(records, 1)
        .unwrap();

    // sell arrives last and hits the best bid (101) rather than the first listed one
    assert_eq!(replay.summary, row(1, 1, 5));
    assert_eq!(replay.engine.book().depth(Side::Buy), vec![(100, 5)]);
}

#[test]
fn equal_timestamps_keep_file_order() {
    let csv = "timestamp,token,side,qty,price\n\
               2025-01-01T09:15:00.000Z,1,BUY,3,50\n\
               2025-01-01T09:15:00.000Z,1,BUY,2,50\n\
               2025-01-01T09:15:00.000Z,1,SELL,3,50\n";
    let ingested = read_orders_from(csv.as_bytes()).unwrap();
    let sorted = sequence_by_time(ingested.records);
    assert_eq!(
        sorted.iter().map(|r| r.quantity).collect::<Vec<_>>(),
        vec![3, 2, 3]
    );

    let replay = BatchDriver::new(BatchConfig::default())
        .replay(sorted, 1)
        .unwrap();
    // the first bid is consumed entirely, the second is untouched
    assert_eq!(replay.engine.book().depth(Side::Buy), vec![(50, 2)]);
}

#[test]
fn invalid_orders_are_reported_and_skipped() {
    let report = BatchDriver::new(BatchConfig::default()).run(vec![
        order(1, Side::Buy, 10, 100, 1),
        order(1, Side::Sell, 0, 100, 2),
        order(1, Side::Sell, 4, 100, 3),
        order(2, Side::Sell, -5, 100, 4),
        order(2, Side::Sell, 5, 100, 5),
    ]);

    assert_eq!(report.summaries, vec![row(1, 1, 4), row(2, 0, 0)]);
    assert_eq!(report.rejections.len(), 2);
    assert!(matches!(
        report.rejections[0].kind,
        RejectionKind::Invalid(EngineError::InvalidOrder { .. })
    ));
    assert_eq!(report.rejections[0].instrument_id, Some(1));
    assert_eq!(report.rejections[1].instrument_id, Some(2));
}

#[test]
fn parse_rejections_travel_with_the_report() {
    let csv = "timestamp,instrument_id,side,quantity,price\n\
               2025-01-01T09:15:00.000Z,1,BUY,10,100\n\
               2025-01-01T09:15:00.001Z,1,SHORT,10,100\n\
               2025-01-01T09:15:00.002Z,1,SELL,10,100\n";
    let ingested = read_orders_from(csv.as_bytes()).unwrap();
    let report = BatchDriver::new(BatchConfig::default())
        .run_with_rejections(ingested.records, ingested.rejections);

    assert_eq!(report.summaries, vec![row(1, 1, 10)]);
    assert_eq!(report.rejections.len(), 1);
    assert_eq!(report.rejections[0].line, Some(3));
}

#[test]
fn engine_rejections_point_at_their_source_line() {
    let csv = "timestamp,instrument_id,side,quantity,price\n\
               2025-01-01T09:15:00.000Z,1,BUY,10,100\n\
               2025-01-01T09:15:00.001Z,1,SELL,0,100\n\
               2025-01-01T09:15:00.002Z,7,SELL,10,100\n";
    let ingested = read_orders_from(csv.as_bytes()).unwrap();
    let driver = BatchDriver::new(BatchConfig {
        expected_instruments: Some([1].into_iter().collect()),
        parallel: false,
    });
    let report = driver.run_with_rejections(ingested.records, ingested.rejections);

    assert_eq!(report.summaries, vec![row(1, 0, 0)]);
    let lines: Vec<_> = report.rejections.iter().map(|r| r.line).collect();
    assert_eq!(lines, vec![Some(4), Some(3)]);
    assert!(report.rejections[1].to_string().starts_with("line 3: instrument 1: "));
}

#[test]
fn overflowing_total_drops_only_that_instrument() {
    let mut records = Vec::new();
    for pair in 0..3 {
        records.push(order(1, Side::Buy, i64::MAX, 100, 2 * pair + 1));
        records.push(order(1, Side::Sell, i64::MAX, 100, 2 * pair + 2));
    }
    records.push(order(2, Side::Buy, 5, 100, 10));
    records.push(order(2, Side::Sell, 5, 100, 11));

    for parallel in [false, true] {
        let report = BatchDriver::new(BatchConfig {
            parallel,
            ..BatchConfig::default()
        })
        .run(records.clone());

        assert_eq!(report.summaries, vec![row(2, 1, 5)]);
        assert_eq!(report.failed, vec![1]);
        assert!(report.aborted.is_empty());
        assert_eq!(report.rejections.len(), 1);
        assert!(matches!(
            report.rejections[0].kind,
            RejectionKind::Invalid(EngineError::QuantityOverflow {
                instrument_id: 1,
                sequence: 5
            })
        ));
    }

    let rejections = BatchDriver::new(BatchConfig::default())
        .replay(records, 1)
        .unwrap_err();
    assert_eq!(rejections.len(), 1);
}

#[test]
fn expected_instruments_without_orders_get_zero_rows() {
    let driver = BatchDriver::new(BatchConfig {
        expected_instruments: Some([1, 99].into_iter().collect()),
        parallel: false,
    });
    let report = driver.run(vec![
        order(1, Side::Buy, 1, 10, 1),
        order(77, Side::Sell, 1, 10, 2),
    ]);

    assert_eq!(report.summaries, vec![row(1, 0, 0), row(99, 0, 0)]);
    assert_eq!(report.rejections.len(), 1);
    assert_eq!(report.rejections[0].instrument_id, Some(77));
    assert!(report.rejections[0].kind.to_string().contains("unknown instrument 77"));
}

#[test]
fn empty_batch_yields_nothing() {
    let report = BatchDriver::new(BatchConfig::default()).run(Vec::new());
    assert!(report.summaries.is_empty());
    assert!(report.rejections.is_empty());
}

#[test]
fn cancelled_run_emits_no_rows() {
    let token = CancellationToken::new();
    token.cancel();
    let driver = BatchDriver::new(BatchConfig {
        expected_instruments: Some([1, 2, 3].into_iter().collect()),
        parallel: false,
    })
    .with_cancellation(token);
    let report = driver.run(vec![
        order(2, Side::Buy, 1, 10, 1),
        order(1, Side::Sell, 1, 10, 2),
    ]);

    assert!(report.summaries.is_empty());
    assert!(report.rejections.is_empty());
    assert_eq!(report.aborted, vec![1, 2, 3]);
    let rejections = driver
        .replay(vec![order(1, Side::Buy, 1, 10, 1)], 1)
        .unwrap_err();
    assert!(rejections.is_empty());
}

fn reference() -> Vec<Instrument> {
    [(1333, 172_000, 5, 550), (2885, 140_000, 10, 250), (11536, 415_000, 5, 175)]
        .into_iter()
        .map(|(token, prev_close, tick_size, lot_size)| Instrument {
            symbol: format!("SYM{token}"),
            token,
            stock_name: String::new(),
            lot_size,
            tick_size,
            underlying_prev_close: prev_close,
        })
        .collect()
}

fn generated(seed: u64) -> Vec<OrderRecord> {
    let cfg = GeneratorConfig {
        seed: Some(seed),
        ..GeneratorConfig::default()
    };
    generate(&reference(), &cfg, at(0), &mut cfg.rng()).unwrap()
}

#[test]
fn repeated_runs_are_identical() {
    let driver = BatchDriver::new(BatchConfig::default());
    let first = driver.run(generated(11)).summaries;
    let second = driver.run(generated(11)).summaries;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn parallel_matches_sequential() {
    let sequential = BatchDriver::new(BatchConfig::default()).run(generated(5));
    let parallel = BatchDriver::new(BatchConfig {
        parallel: true,
        ..BatchConfig::default()
    })
    .run(generated(5));

    assert_eq!(sequential.summaries, parallel.summaries);
    assert!(sequential.summaries.iter().any(|r| r.trades_executed > 0));
}
