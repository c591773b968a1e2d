//! Sanity checks on the raw transaction table: how strongly price and
//! volume move together, and a small sample for a price/units scatter.

use crate::{
    rng::{RngBank, StageSlot},
    stats::{pearson, sample_std},
    synth::Transaction,
    types::Segment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceUnitsPoint {
    pub net_price: f64,
    pub units: u32,
    pub segment: Segment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataDiagnostics {
    pub rows: usize,
    pub cube_cells: usize,
    /// Pearson correlation of net price and units over all rows.
    pub price_units_corr: Option<f64>,
    pub price_std: Option<f64>,
    pub units_std: Option<f64>,
    pub sample: Vec<PriceUnitsPoint>,
}

/// Summarise `txns`; `sample_size` rows are drawn without replacement
/// from the Diagnostics stream, so the sample is fixed per seed.
pub fn data_diagnostics(
    txns: &[Transaction],
    cube_cells: usize,
    sample_size: usize,
    bank: &RngBank,
) -> DataDiagnostics {
    let prices: Vec<f64> = txns.iter().map(|t| t.net_price).collect();
    let units: Vec<f64> = txns.iter().map(|t| t.units as f64).collect();

    let mut rng = bank.for_stage(StageSlot::Diagnostics);
    let sample = rng
        .sample_indices(txns.len(), sample_size)
        .into_iter()
        .map(|i| PriceUnitsPoint {
            net_price: txns[i].net_price,
            units: txns[i].units,
            segment: txns[i].segment,
        })
        .collect();

    DataDiagnostics {
        rows: txns.len(),
        cube_cells,
        price_units_corr: pearson(&prices, &units),
        price_std: sample_std(&prices),
        units_std: sample_std(&units),
        sample,
    }
}
