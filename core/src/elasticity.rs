//! Elasticity estimator: SKU × segment × region demand curves.
//!
//! Each cube cell gets the slope of a log-log fit of units on net price.
//! Sparse cells fall back in a fixed cascade:
//!   1. SKU × segment × region  (group_min_rows)
//!   2. segment × region        (segment_region_min_rows)
//!   3. global                  (global_min_rows)
//!   4. configured default
//! The chosen value is clipped to [clip_min, clip_max].

use crate::{
    config::ElasticityConfig,
    stats::{fit_loglog, mean},
    synth::Transaction,
    types::{Category, CubeKey, Region, Segment, Sku},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which level of the cascade supplied a cell's elasticity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ElasticitySource {
    Group,
    SegmentRegion,
    Global,
    Default,
}

impl ElasticitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group         => "group",
            Self::SegmentRegion => "segment_region",
            Self::Global        => "global",
            Self::Default       => "default",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubeRow {
    pub sku: Sku,
    pub segment: Segment,
    pub region: Region,
    pub category: Category,
    pub avg_price: f64,
    pub avg_units: f64,
    pub avg_margin: f64,
    pub n_rows: usize,
    /// Cell-level fit, if the cell had enough data.
    pub elasticity_raw: Option<f64>,
    /// Segment × region fit for the cell's segment and region.
    pub elasticity_sr: Option<f64>,
    pub elasticity: f64,
    pub source: ElasticitySource,
}

impl CubeRow {
    pub fn key(&self) -> CubeKey {
        CubeKey {
            sku: self.sku.clone(),
            segment: self.segment,
            region: self.region,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticityCube {
    pub rows: Vec<CubeRow>,
    /// Global fit, or the configured default when it failed.
    pub global_elasticity: f64,
    pub global_fitted: bool,
}

impl ElasticityCube {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &CubeKey) -> Option<&CubeRow> {
        self.rows
            .binary_search_by(|r| {
                (r.sku.as_str(), r.segment, r.region).cmp(&(key.sku.as_str(), key.segment, key.region))
            })
            .ok()
            .map(|i| &self.rows[i])
    }

    /// How many cube rows each fallback level supplied.
    pub fn source_counts(&self) -> HashMap<ElasticitySource, usize> {
        let mut counts = HashMap::new();
        for row in &self.rows {
            *counts.entry(row.source).or_insert(0) += 1;
        }
        counts
    }

    pub fn mean_elasticity(&self) -> Option<f64> {
        let values: Vec<f64> = self.rows.iter().map(|r| r.elasticity).collect();
        mean(&values)
    }
}

#[derive(Default)]
struct CellAcc {
    category: Option<Category>,
    pairs: Vec<(f64, f64)>,
    margins: Vec<f64>,
}

/// Build the SKU × segment × region cube with fallbacks and summary stats.
pub fn derive_elasticity_cube(txns: &[Transaction], config: &ElasticityConfig) -> ElasticityCube {
    let mut cells: BTreeMap<CubeKey, CellAcc> = BTreeMap::new();
    let mut seg_region: BTreeMap<(Segment, Region), Vec<(f64, f64)>> = BTreeMap::new();
    let mut all_pairs: Vec<(f64, f64)> = Vec::with_capacity(txns.len());

    for t in txns {
        let pair = (t.net_price, t.units as f64);
        let cell = cells
            .entry(CubeKey {
                sku: t.sku.clone(),
                segment: t.segment,
                region: t.region,
            })
            .or_default();
        cell.category.get_or_insert(t.category);
        cell.pairs.push(pair);
        let m = t.margin_pct();
        if m.is_finite() {
            cell.margins.push(m);
        }
        seg_region.entry((t.segment, t.region)).or_default().push(pair);
        all_pairs.push(pair);
    }

    let sr_fits: HashMap<(Segment, Region), Option<f64>> = seg_region
        .iter()
        .map(|(k, pairs)| {
            let fit = fit_loglog(pairs, config.segment_region_min_rows, config.min_distinct_prices);
            if fit.is_none() {
                log::debug!(
                    "elasticity: segment×region {}/{} has no usable fit ({} rows)",
                    k.0, k.1, pairs.len()
                );
            }
            (*k, fit)
        })
        .collect();

    let global_fit = fit_loglog(&all_pairs, config.global_min_rows, config.min_distinct_prices);
    let global_elasticity = global_fit.unwrap_or(config.default_elasticity);
    if global_fit.is_none() {
        log::debug!(
            "elasticity: global fit unavailable over {} rows, defaulting to {:.2}",
            all_pairs.len(),
            config.default_elasticity
        );
    }

    let rows: Vec<CubeRow> = cells
        .into_iter()
        .map(|(key, cell)| {
            let raw = fit_loglog(&cell.pairs, config.group_min_rows, config.min_distinct_prices);
            let sr = sr_fits.get(&(key.segment, key.region)).copied().flatten();
            let (value, source) = match (raw, sr, global_fit) {
                (Some(e), _, _)       => (e, ElasticitySource::Group),
                (None, Some(e), _)    => (e, ElasticitySource::SegmentRegion),
                (None, None, Some(e)) => (e, ElasticitySource::Global),
                (None, None, None)    => (config.default_elasticity, ElasticitySource::Default),
            };

            let prices: Vec<f64> = cell.pairs.iter().map(|(p, _)| *p).collect();
            let units: Vec<f64> = cell.pairs.iter().map(|(_, u)| *u).collect();

            CubeRow {
                category: cell.category.unwrap_or(Category::Dental),
                avg_price: mean(&prices).unwrap_or(0.0),
                avg_units: mean(&units).unwrap_or(0.0),
                avg_margin: mean(&cell.margins).unwrap_or(0.0),
                n_rows: cell.pairs.len(),
                elasticity_raw: raw,
                elasticity_sr: sr,
                elasticity: value.clamp(config.clip_min, config.clip_max),
                source,
                sku: key.sku,
                segment: key.segment,
                region: key.region,
            }
        })
        .collect();

    let cube = ElasticityCube {
        rows,
        global_elasticity,
        global_fitted: global_fit.is_some(),
    };

    let counts = cube.source_counts();
    log::info!(
        "elasticity: cube of {} cells (group={}, segment_region={}, global={}, default={}), global={:.3}",
        cube.len(),
        counts.get(&ElasticitySource::Group).copied().unwrap_or(0),
        counts.get(&ElasticitySource::SegmentRegion).copied().unwrap_or(0),
        counts.get(&ElasticitySource::Global).copied().unwrap_or(0),
        counts.get(&ElasticitySource::Default).copied().unwrap_or(0),
        cube.global_elasticity
    );
    cube
}
