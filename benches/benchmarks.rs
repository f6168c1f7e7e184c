use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rusty_portfolio::prelude::*;
use rusty_portfolio::sources::InMemoryCorporateActions;
use std::sync::Arc;

fn trades(count: i64) -> Vec<Transaction> {
    let start = Utc.with_ymd_and_hms(2020, 1, 2, 15, 0, 0).unwrap();
    let mut txns = vec![Transaction::deposit(start, Currency::USD, 1_000_000.0)];
    for i in 0..count {
        let asset = Asset::stock(i % 50, Currency::USD, "NYSE");
        let kind = if i % 3 == 2 {
            TransactionKind::Sell
        } else {
            TransactionKind::Buy
        };
        txns.push(Transaction::new(
            start + Duration::hours(i + 1),
            asset,
            kind,
            10.0,
            100.0 + (i % 7) as f64,
        ));
    }
    txns
}

fn engine_with_dividends() -> PortfolioEngine {
    let start = Utc.with_ymd_and_hms(2020, 1, 2, 15, 0, 0).unwrap();
    let mut actions = InMemoryCorporateActions::new();
    for id in 0..50 {
        for quarter in 0..8 {
            actions.add(
                Asset::stock(id, Currency::USD, "NYSE"),
                CorporateAction::dividend(start + Duration::days(90 * quarter + id), 0.25),
            );
        }
    }
    let collaborators = Collaborators::default().with_corporate_actions(Arc::new(actions));
    PortfolioEngine::new(EngineConfig::default(), collaborators)
}

fn benchmark_ingest(c: &mut Criterion) {
    let batch = trades(5000);
    c.bench_function("ingest_5000_with_dividends", |b| {
        b.iter(|| {
            let mut engine = engine_with_dividends();
            engine.ingest_batch(black_box(batch.clone())).unwrap();
            engine.finish().unwrap();
        });
    });
}

fn benchmark_portfolio_at(c: &mut Criterion) {
    let mut engine = engine_with_dividends();
    engine.ingest_batch(trades(5000)).unwrap();
    engine.finish().unwrap();
    let query = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();

    c.bench_function("portfolio_at_mid_history", |b| {
        b.iter(|| engine.portfolio_at(black_box(query)).unwrap());
    });
}

fn benchmark_traversal(c: &mut Criterion) {
    let mut engine = PortfolioEngine::with_config(EngineConfig::default());
    engine.ingest_batch(trades(5000)).unwrap();

    c.bench_function("traverse_5000_events", |b| {
        b.iter(|| {
            let cursor = engine
                .events_from(chrono::DateTime::<Utc>::MIN_UTC, false)
                .unwrap();
            let mut live = 0;
            for handle in cursor {
                live += handle.with_index(|index| index.live_count()).unwrap();
            }
            black_box(live)
        });
    });
}

criterion_group!(
    benches,
    benchmark_ingest,
    benchmark_portfolio_at,
    benchmark_traversal
);
criterion_main!(benches);
