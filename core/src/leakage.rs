//! Discount leakage detection against a peer benchmark.
//!
//! Peer group: SKU × segment × region. A transaction leaks when its peer
//! group has at least `min_peer_n` rows and its discount exceeds the
//! group's `percentile` discount. Estimated leakage dollars are the
//! excess discount over the benchmark applied to list price × units, for
//! every row, so they do not depend on `min_peer_n`.

use crate::{
    config::{validate_leakage, LeakageConfig},
    error::PricingResult,
    stats::{mean, quantile, quantile_sorted},
    synth::Transaction,
    types::{Category, CubeKey, CustomerId, Region, RepId, Segment, Sku},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerBenchmark {
    pub peer_avg_disc: f64,
    /// Discount at the configured percentile.
    pub peer_q_disc: f64,
    pub peer_avg_gm: f64,
    pub peer_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedTransaction {
    pub txn_id: u64,
    pub sku: Sku,
    pub category: Category,
    pub customer_id: CustomerId,
    pub sales_rep_id: RepId,
    pub segment: Segment,
    pub region: Region,
    pub list_price: f64,
    pub net_price: f64,
    pub unit_cost: f64,
    pub units: u32,
    pub discount_pct: f64,
    pub gm_pct_txn: f64,
    pub revenue: f64,
    pub gm: f64,
    pub peer_avg_disc: f64,
    pub peer_q_disc: f64,
    pub peer_avg_gm: f64,
    pub peer_n: usize,
    pub leakage_flag: bool,
    pub excess_disc_pct: f64,
    pub leakage_dollars_est: f64,
}

/// Benchmarks per peer group.
pub fn peer_benchmarks(txns: &[Transaction], percentile: f64) -> HashMap<CubeKey, PeerBenchmark> {
    let mut groups: HashMap<CubeKey, (Vec<f64>, Vec<f64>)> = HashMap::new();
    for t in txns {
        let entry = groups
            .entry(CubeKey {
                sku: t.sku.clone(),
                segment: t.segment,
                region: t.region,
            })
            .or_default();
        entry.0.push(t.discount_pct());
        entry.1.push(t.guarded_margin_pct());
    }

    groups
        .into_iter()
        .map(|(key, (mut discounts, margins))| {
            discounts.sort_by(f64::total_cmp);
            let bench = PeerBenchmark {
                peer_avg_disc: mean(&discounts).unwrap_or(0.0),
                peer_q_disc: quantile_sorted(&discounts, percentile),
                peer_avg_gm: mean(&margins).unwrap_or(0.0),
                peer_n: discounts.len(),
            };
            (key, bench)
        })
        .collect()
}

/// Transaction-level leakage flags, in input order.
pub fn leakage_flags(txns: &[Transaction], config: &LeakageConfig) -> PricingResult<Vec<FlaggedTransaction>> {
    validate_leakage(config)?;
    let benchmarks = peer_benchmarks(txns, config.percentile);

    let flagged: Vec<FlaggedTransaction> = txns
        .iter()
        .map(|t| {
            let key = CubeKey {
                sku: t.sku.clone(),
                segment: t.segment,
                region: t.region,
            };
            // Every transaction contributes to its own group.
            let peer = &benchmarks[&key];
            let discount_pct = t.discount_pct();
            let leakage_flag = peer.peer_n >= config.min_peer_n && discount_pct > peer.peer_q_disc;
            let excess_disc_pct = (discount_pct - peer.peer_q_disc).max(0.0);
            // Priced on every row, flagged or not: thin peer groups still leak.
            let leakage_dollars_est = excess_disc_pct * t.list_price * t.units as f64;
            FlaggedTransaction {
                txn_id: t.txn_id,
                sku: t.sku.clone(),
                category: t.category,
                customer_id: t.customer_id.clone(),
                sales_rep_id: t.sales_rep_id.clone(),
                segment: t.segment,
                region: t.region,
                list_price: t.list_price,
                net_price: t.net_price,
                unit_cost: t.unit_cost,
                units: t.units,
                discount_pct,
                gm_pct_txn: t.guarded_margin_pct(),
                revenue: t.revenue(),
                gm: t.gross_margin(),
                peer_avg_disc: peer.peer_avg_disc,
                peer_q_disc: peer.peer_q_disc,
                peer_avg_gm: peer.peer_avg_gm,
                peer_n: peer.peer_n,
                leakage_flag,
                excess_disc_pct,
                leakage_dollars_est,
            }
        })
        .collect();

    log::info!(
        "leakage: {} of {} transactions flagged at p{:.0} (min peers {})",
        flagged.iter().filter(|f| f.leakage_flag).count(),
        flagged.len(),
        config.percentile * 100.0,
        config.min_peer_n
    );
    Ok(flagged)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerLeakage {
    pub customer_id: CustomerId,
    pub segment: Segment,
    pub region: Region,
    pub leakage_txns: usize,
    pub leakage_est_dollars: f64,
    pub avg_discount: f64,
    pub p90_discount: f64,
    pub revenue: f64,
    pub gm: f64,
    pub gm_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepLeakage {
    pub sales_rep_id: RepId,
    pub customers: usize,
    pub skus: usize,
    pub leakage_txns: usize,
    pub leakage_est_dollars: f64,
    pub avg_discount: f64,
    pub revenue: f64,
    pub gm: f64,
    pub gm_pct: f64,
}

/// Accounts to review, largest estimated leakage first.
pub fn leakage_summary_by_customer(flagged: &[FlaggedTransaction]) -> Vec<CustomerLeakage> {
    let mut groups: BTreeMap<&str, Vec<&FlaggedTransaction>> = BTreeMap::new();
    for f in flagged {
        groups.entry(f.customer_id.as_str()).or_default().push(f);
    }

    let mut out: Vec<CustomerLeakage> = groups
        .into_iter()
        .map(|(id, rows)| {
            let discounts: Vec<f64> = rows.iter().map(|r| r.discount_pct).collect();
            let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
            let gm: f64 = rows.iter().map(|r| r.gm).sum();
            CustomerLeakage {
                customer_id: id.to_string(),
                segment: rows[0].segment,
                region: rows[0].region,
                leakage_txns: rows.iter().filter(|r| r.leakage_flag).count(),
                leakage_est_dollars: rows.iter().map(|r| r.leakage_dollars_est).sum(),
                avg_discount: mean(&discounts).unwrap_or(0.0),
                p90_discount: quantile(&discounts, 0.90).unwrap_or(0.0),
                revenue,
                gm,
                gm_pct: gm / (revenue + 1e-9),
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.leakage_est_dollars
            .total_cmp(&a.leakage_est_dollars)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    out
}

/// Rep leaderboard, largest estimated leakage first.
pub fn leakage_summary_by_rep(flagged: &[FlaggedTransaction]) -> Vec<RepLeakage> {
    let mut groups: BTreeMap<&str, Vec<&FlaggedTransaction>> = BTreeMap::new();
    for f in flagged {
        groups.entry(f.sales_rep_id.as_str()).or_default().push(f);
    }

    let mut out: Vec<RepLeakage> = groups
        .into_iter()
        .map(|(id, rows)| {
            let discounts: Vec<f64> = rows.iter().map(|r| r.discount_pct).collect();
            let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
            let gm: f64 = rows.iter().map(|r| r.gm).sum();
            RepLeakage {
                sales_rep_id: id.to_string(),
                customers: rows.iter().map(|r| r.customer_id.as_str()).collect::<HashSet<_>>().len(),
                skus: rows.iter().map(|r| r.sku.as_str()).collect::<HashSet<_>>().len(),
                leakage_txns: rows.iter().filter(|r| r.leakage_flag).count(),
                leakage_est_dollars: rows.iter().map(|r| r.leakage_dollars_est).sum(),
                avg_discount: mean(&discounts).unwrap_or(0.0),
                revenue,
                gm,
                gm_pct: gm / (revenue + 1e-9),
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.leakage_est_dollars
            .total_cmp(&a.leakage_est_dollars)
            .then_with(|| a.sales_rep_id.cmp(&b.sales_rep_id))
    });
    out
}

fn top_flagged<'a>(
    rows: impl Iterator<Item = &'a FlaggedTransaction>,
    limit: usize,
) -> Vec<FlaggedTransaction> {
    let mut out: Vec<FlaggedTransaction> = rows.filter(|f| f.leakage_flag).cloned().collect();
    out.sort_by(|a, b| {
        b.leakage_dollars_est
            .total_cmp(&a.leakage_dollars_est)
            .then_with(|| a.txn_id.cmp(&b.txn_id))
    });
    out.truncate(limit);
    out
}

/// Drill-down: a customer's flagged transactions by estimated dollars.
pub fn top_leakage_for_customer(
    flagged: &[FlaggedTransaction],
    customer_id: &str,
    limit: usize,
) -> Vec<FlaggedTransaction> {
    top_flagged(flagged.iter().filter(|f| f.customer_id == customer_id), limit)
}

/// Drill-down: a rep's flagged transactions by estimated dollars.
pub fn top_leakage_for_rep(flagged: &[FlaggedTransaction], rep_id: &str, limit: usize) -> Vec<FlaggedTransaction> {
    top_flagged(flagged.iter().filter(|f| f.sales_rep_id == rep_id), limit)
}

/// Headline KPIs for one account or rep drill-down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrillDownKpis {
    pub transactions: usize,
    pub leakage_txns: usize,
    pub leakage_est_dollars: f64,
    pub avg_discount: f64,
}

impl DrillDownKpis {
    pub fn from_rows<'a>(rows: impl Iterator<Item = &'a FlaggedTransaction>) -> Self {
        let rows: Vec<&FlaggedTransaction> = rows.collect();
        let discounts: Vec<f64> = rows.iter().map(|r| r.discount_pct).collect();
        Self {
            transactions: rows.len(),
            leakage_txns: rows.iter().filter(|r| r.leakage_flag).count(),
            leakage_est_dollars: rows.iter().map(|r| r.leakage_dollars_est).sum(),
            avg_discount: mean(&discounts).unwrap_or(0.0),
        }
    }
}
