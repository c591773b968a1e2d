//! Customer feature builder: one row per customer for segmentation
//! and leakage benchmarking.

use crate::{
    stats::{mean, quantile},
    synth::Transaction,
    types::{Category, CustomerId, Region, Segment},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerFeatures {
    pub customer_id: CustomerId,
    pub segment: Segment,
    pub region: Region,
    pub orders: usize,
    pub sku_count: usize,
    pub category_count: usize,
    pub total_units: u64,
    pub total_revenue: f64,
    pub total_gm: f64,
    pub avg_discount: f64,
    pub p90_discount: f64,
    pub contract_share: f64,
    pub gm_pct: f64,
    /// Average order value.
    pub aov: f64,
    pub units_per_order: f64,
    pub sku_per_order_proxy: f64,
}

struct CustomerAcc<'a> {
    segment: Segment,
    region: Region,
    skus: HashSet<&'a str>,
    categories: HashSet<Category>,
    units: u64,
    revenue: f64,
    gm: f64,
    discounts: Vec<f64>,
    contracts: usize,
}

/// Aggregate transactions to customer level, ordered by customer id.
/// Segment and region are taken from the customer's first transaction.
pub fn build_customer_features(txns: &[Transaction]) -> Vec<CustomerFeatures> {
    let mut accs: BTreeMap<&str, CustomerAcc<'_>> = BTreeMap::new();

    for t in txns {
        let acc = accs.entry(t.customer_id.as_str()).or_insert_with(|| CustomerAcc {
            segment: t.segment,
            region: t.region,
            skus: HashSet::new(),
            categories: HashSet::new(),
            units: 0,
            revenue: 0.0,
            gm: 0.0,
            discounts: Vec::new(),
            contracts: 0,
        });
        acc.skus.insert(t.sku.as_str());
        acc.categories.insert(t.category);
        acc.units += t.units as u64;
        acc.revenue += t.revenue();
        acc.gm += t.gross_margin();
        acc.discounts.push(t.discount_pct());
        if t.contract_flag {
            acc.contracts += 1;
        }
    }

    let features: Vec<CustomerFeatures> = accs
        .into_iter()
        .map(|(id, acc)| {
            let orders = acc.discounts.len();
            let n = orders as f64 + 1e-9;
            CustomerFeatures {
                customer_id: id.to_string(),
                segment: acc.segment,
                region: acc.region,
                orders,
                sku_count: acc.skus.len(),
                category_count: acc.categories.len(),
                total_units: acc.units,
                total_revenue: acc.revenue,
                total_gm: acc.gm,
                avg_discount: mean(&acc.discounts).unwrap_or(0.0),
                p90_discount: quantile(&acc.discounts, 0.90).unwrap_or(0.0),
                contract_share: acc.contracts as f64 / orders as f64,
                gm_pct: acc.gm / (acc.revenue + 1e-9),
                aov: acc.revenue / n,
                units_per_order: acc.units as f64 / n,
                sku_per_order_proxy: acc.skus.len() as f64 / n,
            }
        })
        .collect();

    log::info!("features: built {} customer rows from {} transactions", features.len(), txns.len());
    features
}
