use pricing_intel_core::{diagnostics::data_diagnostics, engine::PricingEngine, rng::RngBank};
use std::collections::HashSet;

fn make_engine(seed: u64) -> PricingEngine {
    PricingEngine::build_test(format!("diag-{seed}"), seed).expect("test engine")
}

#[test]
fn diagnostics_are_reproducible_per_seed() {
    let a = make_engine(11).diagnostics(500).unwrap();
    let b = make_engine(11).diagnostics(500).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.sample.len(), 500);
    assert_eq!(a.rows, 12_000);
    assert!(a.cube_cells > 0);
}

#[test]
fn statistics_cover_every_row() {
    let mut engine = make_engine(42);
    let d = engine.diagnostics(100).unwrap();
    let corr = d.price_units_corr.unwrap();
    assert!((-1.0..=1.0).contains(&corr));
    assert!(d.price_std.unwrap() > 0.0);
    assert!(d.units_std.unwrap() > 0.0);
    assert_eq!(d.cube_cells, engine.elasticity_cube().unwrap().len());
}

#[test]
fn sample_is_capped_at_the_row_count() {
    let engine = make_engine(3);
    let txns = &engine.transactions()[..50];
    let d = data_diagnostics(txns, 0, 2000, &RngBank::new(3));
    assert_eq!(d.sample.len(), 50);
    // Drawn without replacement: every row appears once.
    let prices: HashSet<u64> = d.sample.iter().map(|p| p.net_price.to_bits()).collect();
    let all: HashSet<u64> = txns.iter().map(|t| t.net_price.to_bits()).collect();
    assert_eq!(prices, all);
}

#[test]
fn empty_table_has_no_statistics() {
    let d = data_diagnostics(&[], 0, 10, &RngBank::new(1));
    assert_eq!(d.rows, 0);
    assert!(d.sample.is_empty());
    assert_eq!(d.price_units_corr, None);
    assert_eq!(d.price_std, None);
}
