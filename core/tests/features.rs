use pricing_intel_core::{
    engine::PricingEngine,
    features::build_customer_features,
    synth::Transaction,
    types::{Category, Region, Segment},
};
use std::collections::HashSet;

fn txn(id: u64, customer: &str, sku: &str, category: Category, net: f64, units: u32, contract: bool) -> Transaction {
    Transaction {
        txn_id: id,
        sku: sku.to_string(),
        category,
        customer_id: customer.to_string(),
        sales_rep_id: "REP_001".to_string(),
        segment: Segment::Hospital,
        region: Region::Northeast,
        list_price: 20.0,
        net_price: net,
        unit_cost: 8.0,
        units,
        contract_flag: contract,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn aggregates_one_row_per_customer() {
    let txns = vec![
        txn(0, "CUST_0002", "SKU_1", Category::Dental, 16.0, 10, true),
        txn(1, "CUST_0001", "SKU_1", Category::Dental, 18.0, 5, false),
        txn(2, "CUST_0002", "SKU_2", Category::Lab, 10.0, 4, false),
        txn(3, "CUST_0002", "SKU_1", Category::Dental, 20.0, 6, false),
    ];
    let features = build_customer_features(&txns);
    let ids: Vec<&str> = features.iter().map(|f| f.customer_id.as_str()).collect();
    assert_eq!(ids, vec!["CUST_0001", "CUST_0002"]);

    let c = &features[1];
    assert_eq!(c.segment, Segment::Hospital);
    assert_eq!(c.orders, 3);
    assert_eq!(c.sku_count, 2);
    assert_eq!(c.category_count, 2);
    assert_eq!(c.total_units, 20);
    // 160 + 40 + 120
    assert!(close(c.total_revenue, 320.0));
    // (8 * 10) + (2 * 4) + (12 * 6)
    assert!(close(c.total_gm, 160.0));
    assert!(close(c.gm_pct, 0.5));
    // discounts 0.2, 0.5, 0.0
    assert!(close(c.avg_discount, 0.7 / 3.0));
    assert!(close(c.p90_discount, 0.44));
    assert!(close(c.contract_share, 1.0 / 3.0));
    assert!(close(c.aov, 320.0 / 3.0));
    assert!(close(c.units_per_order, 20.0 / 3.0));
    assert!(close(c.sku_per_order_proxy, 2.0 / 3.0));
}

#[test]
fn no_transactions_means_no_features() {
    assert!(build_customer_features(&[]).is_empty());
}

#[test]
fn engine_features_cover_every_customer() {
    let mut engine = PricingEngine::build_test("features".into(), 42).unwrap();
    let customers: HashSet<String> = engine.transactions().iter().map(|t| t.customer_id.clone()).collect();
    let rows = engine.transactions().len();

    let features = engine.customer_features();
    assert_eq!(features.len(), customers.len());
    let orders: usize = features.iter().map(|f| f.orders).sum();
    assert_eq!(orders, rows);
    for f in features {
        assert!((0.0..=1.0).contains(&f.contract_share));
        assert!(f.total_revenue.is_finite());
        assert!(f.sku_count >= 1 && f.category_count >= 1);
    }
}
