//! The pricing engine: wires the analytical stages together.
//!
//! STAGE ORDER (fixed):
//!   1. Synthetic transactions     (once per seed / row count)
//!   2. Elasticity cube            (cached until regenerate)
//!   3. Price-lift simulation + raise scoring   (every raise scenario)
//!   4. Customer features          (cached until regenerate)
//!   5. Segmentation + leakage     (every leakage scenario)
//!
//! RULES:
//!   - Stages are pure transforms; the engine owns all intermediate tables.
//!   - All randomness flows through the RngBank.
//!   - Every stage result is recorded in the event log.

use crate::{
    config::{LeakageConfig, PipelineConfig, RaiseScenario, SegmentationConfig},
    diagnostics::{data_diagnostics, DataDiagnostics},
    elasticity::{derive_elasticity_cube, ElasticityCube, ElasticitySource},
    error::PricingResult,
    event::{EventLogEntry, PipelineEvent},
    features::{build_customer_features, CustomerFeatures},
    leakage::{
        leakage_flags, leakage_summary_by_customer, leakage_summary_by_rep, CustomerLeakage,
        FlaggedTransaction, RepLeakage,
    },
    rng::RngBank,
    segmentation::{cluster_profiles, segment_customers, ClusterProfile, SegmentedCustomer},
    stats::mean,
    store::AnalysisStore,
    synth::{generate_transactions, Transaction},
    types::RunId,
    uplift::{filter_actions, simulate_price_lift, ActionFilter, RaiseRecommendation, RaiseSummary},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseReport {
    pub scenario_id: String,
    /// The scenario as scored, with reward weights normalised.
    pub scenario: RaiseScenario,
    pub summary: RaiseSummary,
    pub recommendations: Vec<RaiseRecommendation>,
}

impl RaiseReport {
    pub fn actions(&self, filter: &ActionFilter) -> Vec<RaiseRecommendation> {
        filter_actions(&self.recommendations, filter)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LeakageScenario {
    pub segmentation: SegmentationConfig,
    pub leakage: LeakageConfig,
}

/// Headline KPIs for the leakage view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeakageSummary {
    pub customers: usize,
    pub leakage_txns: usize,
    pub leakage_est_dollars: f64,
    /// Mean of per-customer average discounts.
    pub avg_discount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageReport {
    pub scenario: LeakageScenario,
    pub summary: LeakageSummary,
    pub segmented: Vec<SegmentedCustomer>,
    pub profiles: Vec<ClusterProfile>,
    pub flagged: Vec<FlaggedTransaction>,
    pub by_customer: Vec<CustomerLeakage>,
    pub by_rep: Vec<RepLeakage>,
}

pub struct PricingEngine {
    pub run_id:   RunId,
    pub config:   PipelineConfig,
    pub rng_bank: RngBank,
    transactions: Vec<Transaction>,
    cube:         Option<ElasticityCube>,
    features:     Option<Vec<CustomerFeatures>>,
    events:       Vec<EventLogEntry>,
    store:        Option<AnalysisStore>,
}

impl PricingEngine {
    /// Validate the config and generate the transaction table.
    pub fn build(run_id: RunId, config: PipelineConfig) -> PricingResult<Self> {
        config.validate()?;
        let mut engine = Self {
            rng_bank: RngBank::new(config.generator.seed),
            run_id,
            config,
            transactions: Vec::new(),
            cube: None,
            features: None,
            events: Vec::new(),
            store: None,
        };
        engine.generate()?;
        Ok(engine)
    }

    /// Like build(), but persists the run and every stage result to `store`.
    pub fn build_with_store(run_id: RunId, config: PipelineConfig, store: AnalysisStore) -> PricingResult<Self> {
        config.validate()?;
        store.insert_run(&run_id, config.generator.seed, config.generator.n_rows, env!("CARGO_PKG_VERSION"))?;
        let mut engine = Self {
            rng_bank: RngBank::new(config.generator.seed),
            run_id,
            config,
            transactions: Vec::new(),
            cube: None,
            features: None,
            events: Vec::new(),
            store: Some(store),
        };
        engine.generate()?;
        Ok(engine)
    }

    /// Small, fast engine backed by an in-memory store.
    pub fn build_test(run_id: RunId, seed: u64) -> PricingResult<Self> {
        let mut config = PipelineConfig::default_test();
        config.generator.seed = seed;
        let store = AnalysisStore::in_memory()?;
        store.migrate()?;
        Self::build_with_store(run_id, config, store)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn events(&self) -> &[EventLogEntry] {
        &self.events
    }

    pub fn store(&self) -> Option<&AnalysisStore> {
        self.store.as_ref()
    }

    /// Rebuild the data for a new row count and seed. Cached tables and any
    /// stored results for this run are dropped.
    pub fn regenerate(&mut self, n_rows: usize, seed: u64) -> PricingResult<()> {
        self.config.generator.n_rows = n_rows;
        self.config.generator.seed = seed;
        self.config.validate()?;
        self.rng_bank = RngBank::new(seed);
        self.cube = None;
        self.features = None;
        if let Some(store) = &self.store {
            // Results from the previous data would contradict the new run.
            store.clear_results(&self.run_id)?;
            store.insert_run(&self.run_id, seed, n_rows, env!("CARGO_PKG_VERSION"))?;
        }
        self.generate()
    }

    fn generate(&mut self) -> PricingResult<()> {
        self.record(PipelineEvent::RunInitialized {
            run_id: self.run_id.clone(),
            seed:   self.config.generator.seed,
            n_rows: self.config.generator.n_rows,
        })?;

        self.transactions = generate_transactions(&self.config.generator, &self.rng_bank)?;

        let customers: HashSet<&str> = self.transactions.iter().map(|t| t.customer_id.as_str()).collect();
        let skus: HashSet<&str> = self.transactions.iter().map(|t| t.sku.as_str()).collect();
        let event = PipelineEvent::TransactionsGenerated {
            rows:      self.transactions.len(),
            customers: customers.len(),
            skus:      skus.len(),
        };
        self.record(event)
    }

    /// The elasticity cube, computed on first use.
    pub fn elasticity_cube(&mut self) -> PricingResult<&ElasticityCube> {
        let cube = match self.cube.take() {
            Some(cube) => cube,
            None => self.build_cube()?,
        };
        let cube: &ElasticityCube = self.cube.insert(cube);
        Ok(cube)
    }

    fn build_cube(&mut self) -> PricingResult<ElasticityCube> {
        let cube = derive_elasticity_cube(&self.transactions, &self.config.elasticity);
        let counts = cube.source_counts();
        let count = |s: ElasticitySource| counts.get(&s).copied().unwrap_or(0);
        self.record(PipelineEvent::ElasticityCubeBuilt {
            cells:               cube.len(),
            from_group:          count(ElasticitySource::Group),
            from_segment_region: count(ElasticitySource::SegmentRegion),
            from_global:         count(ElasticitySource::Global),
            from_default:        count(ElasticitySource::Default),
            global_elasticity:   cube.global_elasticity,
        })?;
        if let Some(store) = &self.store {
            store.save_elasticity_cube(&self.run_id, &cube)?;
        }
        Ok(cube)
    }

    /// Customer-level features, computed on first use.
    pub fn customer_features(&mut self) -> &[CustomerFeatures] {
        let txns = &self.transactions;
        self.features.get_or_insert_with(|| build_customer_features(txns))
    }

    /// Simulate a price lift over the cube and score every cell.
    pub fn run_raise_scenario(&mut self, scenario: &RaiseScenario) -> PricingResult<RaiseReport> {
        let scenario = RaiseScenario {
            weights: scenario.weights.normalized(),
            ..*scenario
        };
        let recommendations = simulate_price_lift(self.elasticity_cube()?, &scenario);
        let summary = RaiseSummary::from_recommendations(&recommendations);
        let scenario_id = uuid::Uuid::new_v4().to_string();

        self.record(PipelineEvent::RaiseScenarioScored {
            scenario_id:        scenario_id.clone(),
            price_increase_pct: scenario.price_increase_pct,
            rows:               summary.rows,
            safe_raise:         summary.safe_raise_count,
            test_raise:         summary.test_raise_count,
            protect:            summary.protect_count,
            total_revenue_lift: summary.total_revenue_lift,
        })?;
        if let Some(store) = &self.store {
            store.save_recommendations(&self.run_id, &scenario_id, scenario.price_increase_pct, &recommendations)?;
        }

        log::info!(
            "engine: raise scenario {scenario_id} +{:.2}% -> lift ${:.0}, {} safe / {} test / {} protect",
            scenario.price_increase_pct,
            summary.total_revenue_lift,
            summary.safe_raise_count,
            summary.test_raise_count,
            summary.protect_count
        );

        Ok(RaiseReport { scenario_id, scenario, summary, recommendations })
    }

    /// Raise scenario from the configured defaults.
    pub fn run_default_raise(&mut self) -> PricingResult<RaiseReport> {
        let scenario = self.config.raise;
        self.run_raise_scenario(&scenario)
    }

    /// Segment customers and flag discount leakage.
    pub fn run_leakage_scenario(&mut self, scenario: &LeakageScenario) -> PricingResult<LeakageReport> {
        let bank = self.rng_bank;
        let segmented = segment_customers(self.customer_features(), &scenario.segmentation, &bank)?;
        let profiles = cluster_profiles(&segmented);
        self.record(PipelineEvent::CustomersSegmented {
            customers: segmented.len(),
            k:         scenario.segmentation.k,
        })?;

        let flagged = leakage_flags(&self.transactions, &scenario.leakage)?;
        let by_customer = leakage_summary_by_customer(&flagged);
        let by_rep = leakage_summary_by_rep(&flagged);

        let discounts: Vec<f64> = segmented.iter().map(|s| s.features.avg_discount).collect();
        let summary = LeakageSummary {
            customers:           segmented.len(),
            leakage_txns:        flagged.iter().filter(|f| f.leakage_flag).count(),
            leakage_est_dollars: by_customer.iter().map(|c| c.leakage_est_dollars).sum(),
            avg_discount:        mean(&discounts).unwrap_or(0.0),
        };

        self.record(PipelineEvent::LeakageFlagged {
            transactions:        flagged.len(),
            flagged:             summary.leakage_txns,
            leakage_est_dollars: summary.leakage_est_dollars,
            percentile:          scenario.leakage.percentile,
            min_peer_n:          scenario.leakage.min_peer_n,
        })?;
        if let Some(store) = &self.store {
            store.save_segments(&self.run_id, &segmented)?;
            store.save_customer_leakage(&self.run_id, &by_customer)?;
            store.save_rep_leakage(&self.run_id, &by_rep)?;
        }

        Ok(LeakageReport {
            scenario: *scenario,
            summary,
            segmented,
            profiles,
            flagged,
            by_customer,
            by_rep,
        })
    }

    /// Leakage scenario from the configured defaults.
    pub fn run_default_leakage(&mut self) -> PricingResult<LeakageReport> {
        let scenario = LeakageScenario {
            segmentation: self.config.segmentation,
            leakage:      self.config.leakage,
        };
        self.run_leakage_scenario(&scenario)
    }

    /// Price/volume sanity checks over the current transaction table.
    pub fn diagnostics(&mut self, sample_size: usize) -> PricingResult<DataDiagnostics> {
        let cube_cells = self.elasticity_cube()?.len();
        Ok(data_diagnostics(&self.transactions, cube_cells, sample_size, &self.rng_bank))
    }

    fn record(&mut self, event: PipelineEvent) -> PricingResult<()> {
        let entry = EventLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            seq:        self.events.len() as u64,
            stage:      event.stage().to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(&event)?,
        };
        if let Some(store) = &self.store {
            store.append_event(&entry)?;
        }
        log::debug!("engine: {} #{}", entry.event_type, entry.seq);
        self.events.push(entry);
        Ok(())
    }
}
