//! Pipeline event log.
//!
//! Every stage reports what it produced as a PipelineEvent. The engine
//! keeps the log in memory and mirrors it to the store when one is attached.

use crate::types::RunId;
use serde::{Deserialize, Serialize};

/// Every event emitted during a run.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunInitialized {
        run_id: RunId,
        seed: u64,
        n_rows: usize,
    },

    // ── Data ───────────────────────────────────────
    TransactionsGenerated {
        rows: usize,
        customers: usize,
        skus: usize,
    },

    // ── Price raise view ───────────────────────────
    ElasticityCubeBuilt {
        cells: usize,
        from_group: usize,
        from_segment_region: usize,
        from_global: usize,
        from_default: usize,
        global_elasticity: f64,
    },
    RaiseScenarioScored {
        scenario_id: String,
        price_increase_pct: f64,
        rows: usize,
        safe_raise: usize,
        test_raise: usize,
        protect: usize,
        total_revenue_lift: f64,
    },

    // ── Leakage view ───────────────────────────────
    CustomersSegmented {
        customers: usize,
        k: usize,
    },
    LeakageFlagged {
        transactions: usize,
        flagged: usize,
        leakage_est_dollars: f64,
        percentile: f64,
        min_peer_n: usize,
    },
}

impl PipelineEvent {
    /// Stable string name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }        => "run_initialized",
            Self::TransactionsGenerated { .. } => "transactions_generated",
            Self::ElasticityCubeBuilt { .. }   => "elasticity_cube_built",
            Self::RaiseScenarioScored { .. }   => "raise_scenario_scored",
            Self::CustomersSegmented { .. }    => "customers_segmented",
            Self::LeakageFlagged { .. }        => "leakage_flagged",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }        => "engine",
            Self::TransactionsGenerated { .. } => "synth",
            Self::ElasticityCubeBuilt { .. }   => "elasticity",
            Self::RaiseScenarioScored { .. }   => "uplift",
            Self::CustomersSegmented { .. }    => "segmentation",
            Self::LeakageFlagged { .. }        => "leakage",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub seq:        u64,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON
}
