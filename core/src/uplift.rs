//! Price-lift simulation and raise scoring.
//!
//! For every cube cell: apply a hypothetical price change, project units
//! through the cell's elasticity (ΔQ% = elasticity × ΔP%), and score the
//! raise on elasticity, margin, revenue uplift and volume risk.

use crate::{
    config::{RaiseScenario, TierThresholds},
    elasticity::{CubeRow, ElasticityCube, ElasticitySource},
    stats::mean,
    types::{Category, CubeKey, Region, Segment, Sku},
};
use serde::{Deserialize, Serialize};

/// Plausible elasticity span mapped onto [0, 1]; less negative is safer.
const ELASTICITY_NORM_FLOOR: f64 = -4.0;
/// A volume drop of this many percent saturates the risk penalty.
const VOL_RISK_SATURATION_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RaiseTier {
    SafeRaise,
    TestRaise,
    Protect,
}

impl RaiseTier {
    pub const ALL: [RaiseTier; 3] = [RaiseTier::SafeRaise, RaiseTier::TestRaise, RaiseTier::Protect];

    pub fn assign(score: f64, thresholds: &TierThresholds) -> Self {
        if score >= thresholds.safe_raise {
            Self::SafeRaise
        } else if score >= thresholds.test_raise {
            Self::TestRaise
        } else {
            Self::Protect
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SafeRaise => "Tier 1 – Safe Raise",
            Self::TestRaise => "Tier 2 – Test Raise",
            Self::Protect   => "Protect",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafeRaise => "safe_raise",
            Self::TestRaise => "test_raise",
            Self::Protect   => "protect",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseRecommendation {
    pub sku: Sku,
    pub segment: Segment,
    pub region: Region,
    pub category: Category,
    pub elasticity: f64,
    pub elasticity_source: ElasticitySource,
    pub avg_margin: f64,
    pub avg_price: f64,
    pub new_price: f64,
    pub avg_units: f64,
    pub new_units: f64,
    pub vol_delta_pct: f64,
    pub base_revenue: f64,
    pub new_revenue: f64,
    pub revenue_delta: f64,
    pub rev_uplift_pct: f64,
    // Score components, each in [0, 1].
    pub elasticity_norm: f64,
    pub margin_norm: f64,
    pub rev_uplift_norm: f64,
    pub vol_risk_norm: f64,
    pub raise_score: f64,
    pub raise_tier: RaiseTier,
}

impl RaiseRecommendation {
    pub fn key(&self) -> CubeKey {
        CubeKey {
            sku: self.sku.clone(),
            segment: self.segment,
            region: self.region,
        }
    }

    /// Plain-language drill-down for one recommendation.
    pub fn explain(&self, price_increase_pct: f64) -> String {
        format!(
            "{key}\n\
             - At +{price_increase_pct:.1}% price, expected units change is {vol:.1}%.\n\
             - Demand sensitivity (elasticity) is {el:.2} (less negative = safer).\n\
             - Margin is {margin:.1}% (healthier margin = better raise candidate).\n\
             - Expected revenue uplift is ${lift:.0}.\n\
             - Overall raise score = {score:.2} -> {tier}.",
            key = self.key(),
            vol = self.vol_delta_pct,
            el = self.elasticity,
            margin = self.avg_margin * 100.0,
            lift = self.revenue_delta,
            score = self.raise_score,
            tier = self.raise_tier.label(),
        )
    }
}

/// Project every cube row under `scenario` and score it.
///
/// Reward weights are used as given; callers that take weights from a UI
/// normalise them first with `RaiseWeights::normalized`.
pub fn simulate_price_lift(cube: &ElasticityCube, scenario: &RaiseScenario) -> Vec<RaiseRecommendation> {
    let t = &scenario.thresholds;
    if t.test_raise >= t.safe_raise {
        log::warn!(
            "uplift: test_raise threshold {:.2} is not below safe_raise {:.2}; Tier 2 is unreachable",
            t.test_raise, t.safe_raise
        );
    }

    let p = scenario.price_increase_pct / 100.0;
    let mut recs: Vec<RaiseRecommendation> = cube.rows.iter().map(|row| project(row, p)).collect();
    if recs.is_empty() {
        return recs;
    }

    let rev_min = recs.iter().map(|r| r.rev_uplift_pct).fold(f64::INFINITY, f64::min);
    let rev_max = recs.iter().map(|r| r.rev_uplift_pct).fold(f64::NEG_INFINITY, f64::max);
    let w = &scenario.weights;

    for r in &mut recs {
        r.rev_uplift_norm = (r.rev_uplift_pct - rev_min) / (rev_max - rev_min + 1e-6);
        r.raise_score = (w.elasticity * r.elasticity_norm
            + w.margin * r.margin_norm
            + w.rev_uplift * r.rev_uplift_norm
            - w.vol_risk * r.vol_risk_norm)
            .clamp(0.0, 1.0);
        r.raise_tier = RaiseTier::assign(r.raise_score, t);
    }

    log::info!(
        "uplift: scored {} cells at +{:.2}% price",
        recs.len(),
        scenario.price_increase_pct
    );
    recs
}

fn project(row: &CubeRow, p: f64) -> RaiseRecommendation {
    let new_price = row.avg_price * (1.0 + p);
    let new_units = (row.avg_units * (1.0 + row.elasticity * p)).max(0.0);
    let base_revenue = row.avg_price * row.avg_units;
    let new_revenue = new_price * new_units;
    let revenue_delta = new_revenue - base_revenue;
    let vol_delta_pct = if row.avg_units > 0.0 {
        (new_units - row.avg_units) / row.avg_units * 100.0
    } else {
        0.0
    };

    RaiseRecommendation {
        sku: row.sku.clone(),
        segment: row.segment,
        region: row.region,
        category: row.category,
        elasticity: row.elasticity,
        elasticity_source: row.source,
        avg_margin: row.avg_margin,
        avg_price: row.avg_price,
        new_price,
        avg_units: row.avg_units,
        new_units,
        vol_delta_pct,
        base_revenue,
        new_revenue,
        revenue_delta,
        rev_uplift_pct: revenue_delta / (base_revenue + 1e-9),
        elasticity_norm: ((row.elasticity - ELASTICITY_NORM_FLOOR) / -ELASTICITY_NORM_FLOOR).clamp(0.0, 1.0),
        margin_norm: row.avg_margin.clamp(0.0, 1.0),
        rev_uplift_norm: 0.0,
        vol_risk_norm: (-vol_delta_pct / VOL_RISK_SATURATION_PCT).clamp(0.0, 1.0),
        raise_score: 0.0,
        raise_tier: RaiseTier::Protect,
    }
}

/// Action table filter: which tiers to show and the minimum lift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionFilter {
    pub tiers: Vec<RaiseTier>,
    pub min_revenue_lift: f64,
    pub limit: usize,
}

impl Default for ActionFilter {
    fn default() -> Self {
        Self {
            tiers: vec![RaiseTier::SafeRaise, RaiseTier::TestRaise],
            min_revenue_lift: 0.0,
            limit: 50,
        }
    }
}

/// Ranked action table: matching rows by revenue delta, largest first.
pub fn filter_actions(recs: &[RaiseRecommendation], filter: &ActionFilter) -> Vec<RaiseRecommendation> {
    let mut out: Vec<RaiseRecommendation> = recs
        .iter()
        .filter(|r| filter.tiers.contains(&r.raise_tier) && r.revenue_delta >= filter.min_revenue_lift)
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        b.revenue_delta
            .total_cmp(&a.revenue_delta)
            .then_with(|| a.key().cmp(&b.key()))
    });
    out.truncate(filter.limit);
    out
}

/// Headline KPIs for the raise view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RaiseSummary {
    pub rows: usize,
    pub total_revenue_lift: f64,
    pub avg_elasticity: f64,
    pub safe_raise_count: usize,
    pub test_raise_count: usize,
    pub protect_count: usize,
}

impl RaiseSummary {
    pub fn from_recommendations(recs: &[RaiseRecommendation]) -> Self {
        let count = |tier: RaiseTier| recs.iter().filter(|r| r.raise_tier == tier).count();
        let elasticities: Vec<f64> = recs.iter().map(|r| r.elasticity).collect();
        Self {
            rows: recs.len(),
            total_revenue_lift: recs.iter().map(|r| r.revenue_delta).sum(),
            avg_elasticity: mean(&elasticities).unwrap_or(0.0),
            safe_raise_count: count(RaiseTier::SafeRaise),
            test_raise_count: count(RaiseTier::TestRaise),
            protect_count: count(RaiseTier::Protect),
        }
    }
}
