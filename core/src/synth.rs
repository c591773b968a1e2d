//! Synthetic transaction generator.
//!
//! Builds a SKU catalog and a book of business (customers, reps), then
//! draws transaction rows whose units respond to net price through a
//! constant-elasticity demand curve. The true elasticity of a row is
//! segment prior × region multiplier + SKU offset, so the estimator
//! downstream has real signal to recover.
//!
//! Each part draws from its own RngBank stream: changing the row count
//! leaves the catalog and the customer book unchanged.

use crate::{
    config::{GeneratorConfig, RegionPrior, SegmentPrior},
    error::{PricingError, PricingResult},
    rng::{RngBank, StageRng, StageSlot},
    types::{Category, CustomerId, Region, RepId, Segment, Sku},
};
use serde::{Deserialize, Serialize};

/// Bounds on the true elasticity used to draw units.
const TRUE_ELASTICITY_MIN: f64 = -4.0;
const TRUE_ELASTICITY_MAX: f64 = -0.1;

/// Net price never falls below this share of list.
const NET_PRICE_FLOOR: f64 = 0.01;

/// One simulated sales line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
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
    pub contract_flag: bool,
}

impl Transaction {
    /// Share of list price given away, guarded against a zero list.
    pub fn discount_pct(&self) -> f64 {
        (self.list_price - self.net_price) / (self.list_price + 1e-9)
    }

    /// Unit margin over net price. Undefined (NaN) for a zero net price.
    pub fn margin_pct(&self) -> f64 {
        (self.net_price - self.unit_cost) / self.net_price
    }

    /// Same as margin_pct with a guard, used by the leakage benchmark.
    pub fn guarded_margin_pct(&self) -> f64 {
        (self.net_price - self.unit_cost) / (self.net_price + 1e-9)
    }

    pub fn revenue(&self) -> f64 {
        self.net_price * self.units as f64
    }

    pub fn gross_margin(&self) -> f64 {
        (self.net_price - self.unit_cost) * self.units as f64
    }
}

#[derive(Debug, Clone)]
struct CatalogItem {
    sku: Sku,
    category: Category,
    base_price: f64,
    cost_ratio: f64,
    elasticity_offset: f64,
}

#[derive(Debug, Clone)]
struct CustomerProfile {
    customer_id: CustomerId,
    segment_idx: usize,
    region_idx: usize,
    contract: bool,
    discount_propensity: f64,
    rep_idx: usize,
}

#[derive(Debug, Clone)]
struct RepProfile {
    rep_id: RepId,
    generosity: f64,
}

/// Generate `config.n_rows` transactions deterministically from `bank`.
pub fn generate_transactions(
    config: &GeneratorConfig,
    bank: &RngBank,
) -> PricingResult<Vec<Transaction>> {
    if config.n_rows == 0 {
        log::warn!("synth: n_rows=0, returning an empty table");
        return Ok(Vec::new());
    }
    if config.n_skus == 0 || config.n_customers == 0 || config.n_reps == 0 {
        return Err(PricingError::invalid(
            "generator",
            "n_skus, n_customers and n_reps must be positive",
        ));
    }
    if config.segments.is_empty() || config.regions.is_empty() || config.catalog.categories.is_empty() {
        return Err(PricingError::invalid(
            "generator",
            "segments, regions and categories must be non-empty",
        ));
    }

    let catalog = build_catalog(config, &mut bank.for_stage(StageSlot::Catalog));
    let reps = build_reps(config, &mut bank.for_stage(StageSlot::Reps));
    let customers = build_customers(config, &mut bank.for_stage(StageSlot::Customers));

    let mut rng = bank.for_stage(StageSlot::Transactions);
    let noise = &config.noise;
    let mut rows = Vec::with_capacity(config.n_rows);

    for txn_id in 0..config.n_rows as u64 {
        let customer = rng.pick(&customers);
        let item = rng.pick(&catalog);
        let seg: &SegmentPrior = &config.segments[customer.segment_idx];
        let reg: &RegionPrior = &config.regions[customer.region_idx];
        let rep = &reps[customer.rep_idx];

        let list_price = (item.base_price * (1.0 + rng.normal(0.0, noise.list_price_noise)))
            .max(item.base_price * 0.5);

        let contract_bonus = if customer.contract { noise.contract_discount_bonus } else { 0.0 };
        let discount = (seg.base_discount
            + reg.discount_shift
            + customer.discount_propensity
            + rep.generosity
            + contract_bonus
            + rng.normal(0.0, noise.discount_noise))
        .clamp(0.0, noise.max_discount);

        let net_price = (list_price * (1.0 - discount) * (1.0 + rng.normal(0.0, noise.net_price_noise)))
            .max(list_price * NET_PRICE_FLOOR);

        let unit_cost = (item.base_price * item.cost_ratio * (1.0 + rng.normal(0.0, noise.cost_noise)))
            .max(0.0);

        let true_elasticity = (seg.elasticity_prior * reg.elasticity_multiplier + item.elasticity_offset)
            .clamp(TRUE_ELASTICITY_MIN, TRUE_ELASTICITY_MAX);
        let demand_shock = rng.normal(0.0, noise.unit_noise).exp();
        let expected_units = noise.base_units
            * seg.volume_multiplier
            * (net_price / item.base_price).powf(true_elasticity)
            * demand_shock;
        let units = rng.poisson(expected_units);

        rows.push(Transaction {
            txn_id,
            sku: item.sku.clone(),
            category: item.category,
            customer_id: customer.customer_id.clone(),
            sales_rep_id: rep.rep_id.clone(),
            segment: seg.segment,
            region: reg.region,
            list_price,
            net_price,
            unit_cost,
            units,
            contract_flag: customer.contract,
        });
    }

    log::info!(
        "synth: generated {} transactions ({} skus, {} customers, {} reps, seed={})",
        rows.len(),
        catalog.len(),
        customers.len(),
        reps.len(),
        bank.master_seed()
    );
    Ok(rows)
}

fn build_catalog(config: &GeneratorConfig, rng: &mut StageRng) -> Vec<CatalogItem> {
    let cat = &config.catalog;
    let category_weights: Vec<(Category, f64)> =
        cat.categories.iter().map(|c| (c.category, c.share)).collect();

    (1..=config.n_skus)
        .map(|i| CatalogItem {
            sku: format!("SKU_{i}"),
            category: *rng.pick_weighted(&category_weights),
            base_price: rng.uniform(cat.list_price_min, cat.list_price_max),
            cost_ratio: rng.uniform(cat.cost_ratio_min, cat.cost_ratio_max),
            elasticity_offset: rng.normal(0.0, cat.sku_elasticity_noise),
        })
        .collect()
}

fn build_reps(config: &GeneratorConfig, rng: &mut StageRng) -> Vec<RepProfile> {
    let noise = &config.noise;
    (1..=config.n_reps)
        .map(|i| {
            let mut generosity = rng.normal(0.0, noise.rep_discount_noise);
            if rng.chance(noise.leaky_rep_share) {
                generosity += noise.leaky_rep_bonus;
            }
            RepProfile { rep_id: format!("REP_{i:03}"), generosity }
        })
        .collect()
}

fn build_customers(config: &GeneratorConfig, rng: &mut StageRng) -> Vec<CustomerProfile> {
    let noise = &config.noise;
    let segment_weights: Vec<(usize, f64)> = config
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| (i, s.population_share))
        .collect();
    let region_idx: Vec<usize> = (0..config.regions.len()).collect();

    (1..=config.n_customers)
        .map(|i| CustomerProfile {
            customer_id: format!("CUST_{i:04}"),
            segment_idx: *rng.pick_weighted(&segment_weights),
            region_idx: *rng.pick(&region_idx),
            contract: rng.chance(noise.contract_probability),
            discount_propensity: rng.normal(0.0, noise.customer_discount_noise),
            rep_idx: rng.next_u64_below(config.n_reps as u64) as usize,
        })
        .collect()
}
