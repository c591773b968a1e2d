use pricing_intel_core::{
    config::ElasticityConfig,
    elasticity::{derive_elasticity_cube, ElasticitySource},
    engine::PricingEngine,
    synth::Transaction,
    types::{Category, CubeKey, Region, Segment},
};

const PRICES: [f64; 9] = [2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 9.0, 10.0, 12.0];

fn txn(id: u64, sku: &str, segment: Segment, region: Region, price: f64, units: u32) -> Transaction {
    Transaction {
        txn_id: id,
        sku: sku.to_string(),
        category: Category::Lab,
        customer_id: "CUST_0001".to_string(),
        sales_rep_id: "REP_001".to_string(),
        segment,
        region,
        list_price: price * 1.25,
        net_price: price,
        unit_cost: price * 0.6,
        units,
        contract_flag: false,
    }
}

/// `n` rows on the unit-elastic curve units = 3600 / price.
fn unit_elastic(start: u64, sku: &str, segment: Segment, region: Region, n: usize) -> Vec<Transaction> {
    (0..n)
        .map(|i| {
            let p = PRICES[i % PRICES.len()];
            txn(start + i as u64, sku, segment, region, p, (3600.0 / p) as u32)
        })
        .collect()
}

fn key(sku: &str, segment: Segment, region: Region) -> CubeKey {
    CubeKey { sku: sku.to_string(), segment, region }
}

fn cascade_data() -> Vec<Transaction> {
    let mut txns = unit_elastic(0, "SKU_A", Segment::Dso, Region::Northeast, 45);
    txns.extend(unit_elastic(100, "SKU_B", Segment::Dso, Region::Northeast, 10));
    txns.extend(unit_elastic(200, "SKU_C", Segment::Hospital, Region::West, 10));
    txns
}

#[test]
fn cell_fit_recovers_exact_curve() {
    let txns = unit_elastic(0, "SKU_A", Segment::Clinic, Region::South, 45);
    let cube = derive_elasticity_cube(&txns, &ElasticityConfig::default());

    let row = cube.get(&key("SKU_A", Segment::Clinic, Region::South)).expect("cell");
    assert_eq!(row.source, ElasticitySource::Group);
    assert_eq!(row.n_rows, 45);
    assert!((row.elasticity + 1.0).abs() < 1e-9, "got {}", row.elasticity);
    assert_eq!(row.category, Category::Lab);
}

#[test]
fn sparse_cells_fall_back_through_the_cascade() {
    let config = ElasticityConfig {
        group_min_rows: 40,
        segment_region_min_rows: 50,
        global_min_rows: 60,
        ..ElasticityConfig::default()
    };
    let cube = derive_elasticity_cube(&cascade_data(), &config);
    assert_eq!(cube.len(), 3);
    assert!(cube.global_fitted);

    let a = cube.get(&key("SKU_A", Segment::Dso, Region::Northeast)).unwrap();
    let b = cube.get(&key("SKU_B", Segment::Dso, Region::Northeast)).unwrap();
    let c = cube.get(&key("SKU_C", Segment::Hospital, Region::West)).unwrap();
    assert_eq!(a.source, ElasticitySource::Group);
    assert_eq!(b.source, ElasticitySource::SegmentRegion);
    assert_eq!(c.source, ElasticitySource::Global);
    assert!(b.elasticity_raw.is_none());
    assert!(c.elasticity_sr.is_none());
    for row in &cube.rows {
        assert!((row.elasticity + 1.0).abs() < 1e-9);
    }
}

#[test]
fn no_usable_fit_uses_the_default() {
    let config = ElasticityConfig {
        segment_region_min_rows: 50,
        global_min_rows: 10_000,
        default_elasticity: -1.7,
        ..ElasticityConfig::default()
    };
    let cube = derive_elasticity_cube(&cascade_data(), &config);
    assert!(!cube.global_fitted);
    assert_eq!(cube.global_elasticity, -1.7);

    let c = cube.get(&key("SKU_C", Segment::Hospital, Region::West)).unwrap();
    assert_eq!(c.source, ElasticitySource::Default);
    assert_eq!(c.elasticity, -1.7);
}

#[test]
fn too_few_distinct_prices_skips_the_fit() {
    let txns: Vec<Transaction> = (0..60)
        .map(|i| {
            let p = PRICES[i % 3];
            txn(i as u64, "SKU_A", Segment::Dso, Region::West, p, (3600.0 / p) as u32)
        })
        .collect();
    let cube = derive_elasticity_cube(&txns, &ElasticityConfig::default());
    assert_eq!(cube.rows[0].elasticity_raw, None);
    assert_eq!(cube.rows[0].source, ElasticitySource::Default);
}

#[test]
fn chosen_values_are_clipped() {
    let mut txns = unit_elastic(0, "SKU_A", Segment::Dso, Region::Northeast, 45);
    // units = price², slope +2
    txns.extend((0..45).map(|i| {
        let p = PRICES[i % PRICES.len()];
        txn(100 + i as u64, "SKU_P", Segment::Clinic, Region::Midwest, p, (p * p) as u32)
    }));

    let config = ElasticityConfig { clip_min: -0.5, clip_max: 1.0, ..ElasticityConfig::default() };
    let cube = derive_elasticity_cube(&txns, &config);

    let a = cube.get(&key("SKU_A", Segment::Dso, Region::Northeast)).unwrap();
    assert_eq!(a.elasticity, -0.5);
    assert!((a.elasticity_raw.unwrap() + 1.0).abs() < 1e-9);

    let p = cube.get(&key("SKU_P", Segment::Clinic, Region::Midwest)).unwrap();
    assert_eq!(p.elasticity, 1.0);
    assert!((p.elasticity_raw.unwrap() - 2.0).abs() < 1e-9);
}

#[test]
fn cell_summaries_average_the_rows() {
    let txns = vec![
        txn(0, "SKU_A", Segment::Dso, Region::West, 10.0, 4),
        txn(1, "SKU_A", Segment::Dso, Region::West, 20.0, 8),
    ];
    let cube = derive_elasticity_cube(&txns, &ElasticityConfig::default());
    let row = &cube.rows[0];
    assert_eq!(row.n_rows, 2);
    assert!((row.avg_price - 15.0).abs() < 1e-12);
    assert!((row.avg_units - 6.0).abs() < 1e-12);
    assert!((row.avg_margin - 0.4).abs() < 1e-12);
}

#[test]
fn empty_input_builds_an_empty_cube() {
    let cube = derive_elasticity_cube(&[], &ElasticityConfig::default());
    assert!(cube.is_empty());
    assert!(!cube.global_fitted);
    assert_eq!(cube.mean_elasticity(), None);
}

#[test]
fn generated_data_covers_every_observed_cell() {
    let mut engine = PricingEngine::build_test("elasticity-cube".into(), 42).unwrap();
    let cells: std::collections::HashSet<CubeKey> = engine
        .transactions()
        .iter()
        .map(|t| CubeKey { sku: t.sku.clone(), segment: t.segment, region: t.region })
        .collect();

    let cube = engine.elasticity_cube().unwrap();
    assert_eq!(cube.len(), cells.len());
    assert!(cube.global_fitted);
    assert!(cube.global_elasticity.is_finite());
    for row in &cube.rows {
        assert!((-6.0..=1.0).contains(&row.elasticity));
        assert!(cube.get(&row.key()).is_some());
    }
    let total: usize = cube.source_counts().values().sum();
    assert_eq!(total, cube.len());
}

#[test]
fn cube_is_built_once_per_table() {
    let mut engine = PricingEngine::build_test("elasticity-cache".into(), 42).unwrap();
    engine.elasticity_cube().unwrap();
    engine.elasticity_cube().unwrap();
    let builds = |e: &PricingEngine| e.events().iter().filter(|ev| ev.event_type == "elasticity_cube_built").count();
    assert_eq!(builds(&engine), 1);

    engine.regenerate(6_000, 43).unwrap();
    engine.elasticity_cube().unwrap();
    assert_eq!(builds(&engine), 2);
}
