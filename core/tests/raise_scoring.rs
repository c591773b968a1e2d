use pricing_intel_core::{
    config::{RaiseScenario, RaiseWeights, TierThresholds},
    elasticity::{CubeRow, ElasticityCube, ElasticitySource},
    engine::PricingEngine,
    types::{Category, Region, Segment},
    uplift::{filter_actions, simulate_price_lift, ActionFilter, RaiseSummary, RaiseTier},
};

fn row(sku: &str, elasticity: f64, avg_margin: f64) -> CubeRow {
    CubeRow {
        sku: sku.to_string(),
        segment: Segment::Clinic,
        region: Region::Midwest,
        category: Category::Dental,
        avg_price: 10.0,
        avg_units: 100.0,
        avg_margin,
        n_rows: 50,
        elasticity_raw: Some(elasticity),
        elasticity_sr: None,
        elasticity,
        source: ElasticitySource::Group,
    }
}

/// Three cells at +2%: a clear raise, a borderline one and one to protect.
fn three_cell_cube() -> ElasticityCube {
    ElasticityCube {
        rows: vec![row("SKU_1", -0.5, 0.5), row("SKU_2", -3.5, 0.1), row("SKU_3", -1.0, 0.4)],
        global_elasticity: -1.0,
        global_fitted: true,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn projection_follows_the_linear_elasticity_rule() {
    let recs = simulate_price_lift(&three_cell_cube(), &RaiseScenario::default());
    let r = &recs[0];
    assert!(close(r.new_price, 10.2));
    assert!(close(r.new_units, 99.0));
    assert!(close(r.vol_delta_pct, -1.0));
    assert!(close(r.base_revenue, 1000.0));
    assert!(close(r.revenue_delta, 9.8));
    assert!(close(r.elasticity_norm, 0.875));
    assert!(close(r.margin_norm, 0.5));
    assert!(close(r.vol_risk_norm, 0.1));
}

#[test]
fn scores_map_to_tiers() {
    let recs = simulate_price_lift(&three_cell_cube(), &RaiseScenario::default());
    let tiers: Vec<RaiseTier> = recs.iter().map(|r| r.raise_tier).collect();
    assert_eq!(tiers, vec![RaiseTier::SafeRaise, RaiseTier::Protect, RaiseTier::TestRaise]);

    // 0.35 * 0.875 + 0.30 * 0.5 + 0.25 * ~1.0 - 0.10 * 0.1
    assert!((recs[0].raise_score - 0.69625).abs() < 1e-4, "got {}", recs[0].raise_score);
    assert!((recs[1].raise_score - 0.00375).abs() < 1e-4, "got {}", recs[1].raise_score);
    for r in &recs {
        assert!((0.0..=1.0).contains(&r.raise_score));
        assert!((0.0..=1.0).contains(&r.rev_uplift_norm));
    }
    // Largest uplift normalises to ~1, smallest to 0.
    assert!(recs[0].rev_uplift_norm > 0.999);
    assert_eq!(recs[1].rev_uplift_norm, 0.0);
}

#[test]
fn inverted_thresholds_are_honoured() {
    let scenario = RaiseScenario {
        thresholds: TierThresholds { safe_raise: 0.3, test_raise: 0.5 },
        ..RaiseScenario::default()
    };
    let recs = simulate_price_lift(&three_cell_cube(), &scenario);
    assert!(recs.iter().all(|r| r.raise_tier != RaiseTier::TestRaise));
    assert_eq!(recs[2].raise_tier, RaiseTier::SafeRaise);
}

#[test]
fn units_never_go_negative() {
    let cube = ElasticityCube {
        rows: vec![row("SKU_1", -6.0, 0.3)],
        global_elasticity: -6.0,
        global_fitted: true,
    };
    let scenario = RaiseScenario { price_increase_pct: 20.0, ..RaiseScenario::default() };
    let recs = simulate_price_lift(&cube, &scenario);
    assert_eq!(recs[0].new_units, 0.0);
    assert!(close(recs[0].vol_delta_pct, -100.0));
    assert_eq!(recs[0].vol_risk_norm, 1.0);
}

#[test]
fn zero_unit_cells_have_no_volume_change() {
    let mut r = row("SKU_1", -1.0, 0.3);
    r.avg_units = 0.0;
    let cube = ElasticityCube { rows: vec![r], global_elasticity: -1.0, global_fitted: true };
    let recs = simulate_price_lift(&cube, &RaiseScenario::default());
    assert_eq!(recs[0].vol_delta_pct, 0.0);
    assert_eq!(recs[0].revenue_delta, 0.0);
}

#[test]
fn empty_cube_scores_nothing() {
    let cube = ElasticityCube { rows: Vec::new(), global_elasticity: -1.0, global_fitted: false };
    assert!(simulate_price_lift(&cube, &RaiseScenario::default()).is_empty());
}

#[test]
fn reward_weights_normalise_to_one() {
    let w = RaiseWeights { elasticity: 0.7, margin: 0.6, rev_uplift: 0.5, vol_risk: 0.2 }.normalized();
    assert!((w.elasticity + w.margin + w.rev_uplift - 1.0).abs() < 1e-12);
    assert!((w.elasticity - 0.7 / 1.8).abs() < 1e-12);
    assert_eq!(w.vol_risk, 0.2);

    let zero = RaiseWeights { elasticity: 0.0, margin: 0.0, rev_uplift: 0.0, vol_risk: 0.1 }.normalized();
    assert_eq!(zero.elasticity, 0.0);
    assert_eq!(zero.margin, 0.0);
    assert_eq!(zero.rev_uplift, 0.0);
}

#[test]
fn action_table_filters_and_ranks() {
    let recs = simulate_price_lift(&three_cell_cube(), &RaiseScenario::default());

    let default = filter_actions(&recs, &ActionFilter::default());
    let skus: Vec<&str> = default.iter().map(|r| r.sku.as_str()).collect();
    assert_eq!(skus, vec!["SKU_1"]);

    let any_lift = ActionFilter { min_revenue_lift: f64::NEG_INFINITY, ..ActionFilter::default() };
    let skus: Vec<String> = filter_actions(&recs, &any_lift).into_iter().map(|r| r.sku).collect();
    assert_eq!(skus, vec!["SKU_1", "SKU_3"]);

    let everything = ActionFilter {
        tiers: RaiseTier::ALL.to_vec(),
        min_revenue_lift: f64::NEG_INFINITY,
        limit: 2,
    };
    let skus: Vec<String> = filter_actions(&recs, &everything).into_iter().map(|r| r.sku).collect();
    assert_eq!(skus, vec!["SKU_1", "SKU_3"]);
}

#[test]
fn summary_counts_tiers_and_lift() {
    let recs = simulate_price_lift(&three_cell_cube(), &RaiseScenario::default());
    let summary = RaiseSummary::from_recommendations(&recs);
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.safe_raise_count, 1);
    assert_eq!(summary.test_raise_count, 1);
    assert_eq!(summary.protect_count, 1);
    assert!(close(summary.total_revenue_lift, 9.8 - 51.4 - 0.4));
    assert!(close(summary.avg_elasticity, -5.0 / 3.0));
}

#[test]
fn explanation_names_the_cell_and_tier() {
    let recs = simulate_price_lift(&three_cell_cube(), &RaiseScenario::default());
    let text = recs[0].explain(2.0);
    assert!(text.starts_with("SKU_1 | Clinic | Midwest"));
    assert!(text.contains("Tier 1 – Safe Raise"));
    assert!(text.contains("+2.0% price"));
}

#[test]
fn engine_scores_every_cube_cell() {
    let mut engine = PricingEngine::build_test("raise-engine".into(), 42).unwrap();
    let cells = engine.elasticity_cube().unwrap().len();

    let report = engine.run_default_raise().unwrap();
    assert_eq!(report.recommendations.len(), cells);
    let s = &report.summary;
    assert_eq!(s.safe_raise_count + s.test_raise_count + s.protect_count, cells);
    assert!(!report.scenario_id.is_empty());
}

#[test]
fn engine_normalises_ui_weights() {
    let mut engine = PricingEngine::build_test("raise-weights".into(), 42).unwrap();
    let scenario = RaiseScenario {
        weights: RaiseWeights { elasticity: 2.0, margin: 2.0, rev_uplift: 2.0, vol_risk: 0.1 },
        ..RaiseScenario::default()
    };
    let report = engine.run_raise_scenario(&scenario).unwrap();
    let w = report.scenario.weights;
    assert!((w.elasticity - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(w.vol_risk, 0.1);
    for r in &report.recommendations {
        assert!((0.0..=1.0).contains(&r.raise_score));
    }
}
