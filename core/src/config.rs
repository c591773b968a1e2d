use crate::{
    error::{PricingError, PricingResult},
    types::{Category, Region, Segment},
};
use serde::{Deserialize, Serialize};

// ── Generator: segment and region priors ──────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentPrior {
    pub segment: Segment,
    pub population_share: f64,
    /// True price elasticity before region and SKU adjustments.
    pub elasticity_prior: f64,
    /// Typical discount off list for the segment.
    pub base_discount: f64,
    pub volume_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionPrior {
    pub region: Region,
    pub elasticity_multiplier: f64,
    pub discount_shift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: Category,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub list_price_min: f64,
    pub list_price_max: f64,
    pub cost_ratio_min: f64,
    pub cost_ratio_max: f64,
    pub sku_elasticity_noise: f64,
    pub categories: Vec<CategoryShare>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            list_price_min: 5.0,
            list_price_max: 120.0,
            cost_ratio_min: 0.45,
            cost_ratio_max: 0.80,
            sku_elasticity_noise: 0.25,
            categories: vec![
                CategoryShare { category: Category::Dental,  share: 0.45 },
                CategoryShare { category: Category::MedSurg, share: 0.35 },
                CategoryShare { category: Category::Lab,     share: 0.20 },
            ],
        }
    }
}

/// Noise model for prices, costs, units and discounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub list_price_noise: f64,
    pub net_price_noise: f64,
    pub cost_noise: f64,
    pub discount_noise: f64,
    /// Log-scale std of the multiplicative demand shock.
    pub unit_noise: f64,
    pub base_units: f64,
    pub customer_discount_noise: f64,
    pub rep_discount_noise: f64,
    pub leaky_rep_share: f64,
    pub leaky_rep_bonus: f64,
    pub contract_probability: f64,
    pub contract_discount_bonus: f64,
    pub max_discount: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            list_price_noise: 0.03,
            net_price_noise: 0.08,
            cost_noise: 0.04,
            discount_noise: 0.04,
            unit_noise: 0.25,
            base_units: 50.0,
            customer_discount_noise: 0.03,
            rep_discount_noise: 0.015,
            leaky_rep_share: 0.10,
            leaky_rep_bonus: 0.06,
            contract_probability: 0.40,
            contract_discount_bonus: 0.03,
            max_discount: 0.60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub n_rows: usize,
    pub seed: u64,
    pub n_skus: usize,
    pub n_customers: usize,
    pub n_reps: usize,
    pub segments: Vec<SegmentPrior>,
    pub regions: Vec<RegionPrior>,
    pub catalog: CatalogConfig,
    pub noise: NoiseConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n_rows: 80_000,
            seed: 42,
            n_skus: 300,
            n_customers: 2_000,
            n_reps: 60,
            segments: default_segments(),
            regions: default_regions(),
            catalog: CatalogConfig::default(),
            noise: NoiseConfig::default(),
        }
    }
}

fn default_segments() -> Vec<SegmentPrior> {
    vec![
        SegmentPrior {
            segment: Segment::Dso,
            population_share: 0.20,
            elasticity_prior: -0.8,
            base_discount: 0.12,
            volume_multiplier: 1.6,
        },
        SegmentPrior {
            segment: Segment::Clinic,
            population_share: 0.30,
            elasticity_prior: -1.4,
            base_discount: 0.08,
            volume_multiplier: 1.0,
        },
        SegmentPrior {
            segment: Segment::SmallPractice,
            population_share: 0.35,
            elasticity_prior: -2.0,
            base_discount: 0.05,
            volume_multiplier: 0.6,
        },
        SegmentPrior {
            segment: Segment::Hospital,
            population_share: 0.15,
            elasticity_prior: -0.6,
            base_discount: 0.15,
            volume_multiplier: 2.0,
        },
    ]
}

fn default_regions() -> Vec<RegionPrior> {
    vec![
        RegionPrior { region: Region::Northeast, elasticity_multiplier: 0.90, discount_shift:  0.00 },
        RegionPrior { region: Region::South,     elasticity_multiplier: 1.10, discount_shift:  0.01 },
        RegionPrior { region: Region::Midwest,   elasticity_multiplier: 1.00, discount_shift:  0.00 },
        RegionPrior { region: Region::West,      elasticity_multiplier: 1.05, discount_shift: -0.01 },
    ]
}

// ── Elasticity estimation ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticityConfig {
    pub group_min_rows: usize,
    pub segment_region_min_rows: usize,
    pub global_min_rows: usize,
    pub min_distinct_prices: usize,
    /// Used when even the global fit has too little data.
    pub default_elasticity: f64,
    pub clip_min: f64,
    pub clip_max: f64,
}

impl Default for ElasticityConfig {
    fn default() -> Self {
        Self {
            group_min_rows: 40,
            segment_region_min_rows: 200,
            global_min_rows: 500,
            min_distinct_prices: 5,
            default_elasticity: -1.0,
            clip_min: -6.0,
            clip_max: 1.0,
        }
    }
}

// ── Raise scoring ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaiseWeights {
    pub elasticity: f64,
    pub margin: f64,
    pub rev_uplift: f64,
    /// Penalty weight; never rescaled.
    pub vol_risk: f64,
}

impl Default for RaiseWeights {
    fn default() -> Self {
        Self { elasticity: 0.35, margin: 0.30, rev_uplift: 0.25, vol_risk: 0.10 }
    }
}

impl RaiseWeights {
    /// Rescale the three reward weights to sum to 1.
    /// A zero sum is treated as 1 so all-zero weights stay zero.
    pub fn normalized(&self) -> Self {
        let sum = self.elasticity + self.margin + self.rev_uplift;
        let s = if sum > 0.0 { sum } else { 1.0 };
        Self {
            elasticity: self.elasticity / s,
            margin:     self.margin / s,
            rev_uplift: self.rev_uplift / s,
            vol_risk:   self.vol_risk,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierThresholds {
    pub safe_raise: f64,
    pub test_raise: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { safe_raise: 0.65, test_raise: 0.45 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaiseScenario {
    pub price_increase_pct: f64,
    pub weights: RaiseWeights,
    pub thresholds: TierThresholds,
}

impl Default for RaiseScenario {
    fn default() -> Self {
        Self {
            price_increase_pct: 2.0,
            weights: RaiseWeights::default(),
            thresholds: TierThresholds::default(),
        }
    }
}

// ── Segmentation and leakage ──────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    pub k: usize,
    pub max_iter: usize,
    pub n_init: usize,
    pub tol: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self { k: 5, max_iter: 300, n_init: 3, tol: 1e-6 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeakageConfig {
    /// Peer discount quantile above which a transaction leaks.
    pub percentile: f64,
    pub min_peer_n: usize,
}

impl Default for LeakageConfig {
    fn default() -> Self {
        Self { percentile: 0.90, min_peer_n: 30 }
    }
}

// ── On-disk file shapes ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct SegmentsFile {
    segments: Vec<SegmentPrior>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegionsFile {
    regions: Vec<RegionPrior>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    n_rows: usize,
    seed: u64,
    n_skus: usize,
    n_customers: usize,
    n_reps: usize,
    #[serde(default)]
    catalog: CatalogConfig,
    #[serde(default)]
    noise: NoiseConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RaiseScoringFile {
    #[serde(default)]
    elasticity: ElasticityConfig,
    #[serde(default)]
    raise: RaiseScenario,
}

#[derive(Debug, Clone, Deserialize)]
struct LeakageRulesFile {
    #[serde(default)]
    segmentation: SegmentationConfig,
    #[serde(default)]
    leakage: LeakageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub generator: GeneratorConfig,
    pub elasticity: ElasticityConfig,
    pub raise: RaiseScenario,
    pub segmentation: SegmentationConfig,
    pub leakage: LeakageConfig,
}

impl PipelineConfig {
    /// Load from the data/ directory.
    /// In tests, use PipelineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let segments_file: SegmentsFile = read_json(&format!("{data_dir}/generator/segments.json"))?;
        let regions_file: RegionsFile = read_json(&format!("{data_dir}/generator/regions.json"))?;
        let catalog_file: CatalogFile = read_json(&format!("{data_dir}/generator/catalog.json"))?;
        let scoring_file: RaiseScoringFile =
            read_json(&format!("{data_dir}/scoring/raise_scoring.json"))?;
        let leakage_file: LeakageRulesFile =
            read_json(&format!("{data_dir}/leakage/leakage_rules.json"))?;

        let config = Self {
            generator: GeneratorConfig {
                n_rows:      catalog_file.n_rows,
                seed:        catalog_file.seed,
                n_skus:      catalog_file.n_skus,
                n_customers: catalog_file.n_customers,
                n_reps:      catalog_file.n_reps,
                segments:    segments_file.segments,
                regions:     regions_file.regions,
                catalog:     catalog_file.catalog,
                noise:       catalog_file.noise,
            },
            elasticity:   scoring_file.elasticity,
            raise:        scoring_file.raise,
            segmentation: leakage_file.segmentation,
            leakage:      leakage_file.leakage,
        };
        config.validate()?;
        Ok(config)
    }

    /// Config with small hardcoded defaults for use in tests.
    /// Enough rows that segment × region fits succeed, few enough
    /// SKUs that some SKU × segment × region groups do too.
    pub fn default_test() -> Self {
        let mut config = Self::default();
        config.generator.n_rows = 12_000;
        config.generator.n_skus = 12;
        config.generator.n_customers = 150;
        config.generator.n_reps = 10;
        config.segmentation.k = 4;
        config
    }

    pub fn validate(&self) -> PricingResult<()> {
        let g = &self.generator;
        if g.n_rows > 0 && (g.n_skus == 0 || g.n_customers == 0 || g.n_reps == 0) {
            return Err(PricingError::invalid(
                "generator",
                "n_skus, n_customers and n_reps must be positive when rows are requested",
            ));
        }
        if g.segments.is_empty() || g.segments.iter().all(|s| s.population_share <= 0.0) {
            return Err(PricingError::invalid("generator.segments", "need at least one segment with a positive share"));
        }
        if g.regions.is_empty() {
            return Err(PricingError::invalid("generator.regions", "need at least one region"));
        }
        if g.catalog.categories.is_empty() {
            return Err(PricingError::invalid("generator.catalog.categories", "need at least one category"));
        }
        if g.catalog.list_price_min <= 0.0 || g.catalog.list_price_max < g.catalog.list_price_min {
            return Err(PricingError::invalid("generator.catalog", "list price range must be positive and ordered"));
        }
        if !(0.0..1.0).contains(&g.noise.max_discount) {
            return Err(PricingError::invalid("generator.noise.max_discount", "must be in [0, 1)"));
        }

        let e = &self.elasticity;
        if e.clip_min >= e.clip_max {
            return Err(PricingError::invalid("elasticity.clip", "clip_min must be below clip_max"));
        }

        let w = &self.raise.weights;
        if [w.elasticity, w.margin, w.rev_uplift, w.vol_risk].iter().any(|v| *v < 0.0) {
            return Err(PricingError::invalid("raise.weights", "weights must be non-negative"));
        }

        validate_segmentation(&self.segmentation)?;
        validate_leakage(&self.leakage)?;
        Ok(())
    }
}

pub fn validate_segmentation(cfg: &SegmentationConfig) -> PricingResult<()> {
    if cfg.k == 0 {
        return Err(PricingError::invalid("segmentation.k", "must be at least 1"));
    }
    if cfg.max_iter == 0 || cfg.n_init == 0 {
        return Err(PricingError::invalid("segmentation", "max_iter and n_init must be at least 1"));
    }
    Ok(())
}

pub fn validate_leakage(cfg: &LeakageConfig) -> PricingResult<()> {
    if !(cfg.percentile > 0.0 && cfg.percentile < 1.0) {
        return Err(PricingError::invalid(
            "leakage.percentile",
            format!("{} is outside (0, 1)", cfg.percentile),
        ));
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}
