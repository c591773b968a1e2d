//! SQLite persistence layer for run outputs.
//!
//! RULE: Only store.rs talks to the database.
//! Stages never touch SQL; the engine hands finished tables to the store.

use crate::{
    elasticity::ElasticityCube,
    error::{PricingError, PricingResult},
    event::EventLogEntry,
    leakage::{CustomerLeakage, RepLeakage},
    segmentation::SegmentedCustomer,
    uplift::RaiseRecommendation,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Tables holding per-run stage outputs.
pub const RESULT_TABLES: [&str; 5] = [
    "elasticity_cube",
    "raise_recommendation",
    "customer_segment",
    "customer_leakage",
    "rep_leakage",
];

pub struct AnalysisStore {
    conn: Connection,
}

impl AnalysisStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> PricingResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: a dashboard can read while the runner writes.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PricingResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PricingResult<()> {
        self.conn.execute_batch(include_str!("../migrations/001_foundation.sql"))?;
        self.conn.execute_batch(include_str!("../migrations/002_results.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, n_rows: usize, version: &str) -> PricingResult<()> {
        let started_at = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO run (run_id, seed, n_rows, version, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(run_id) DO UPDATE SET
                seed = excluded.seed, n_rows = excluded.n_rows,
                version = excluded.version, started_at = excluded.started_at",
            params![run_id, seed as i64, n_rows as i64, version, started_at],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> PricingResult<Option<u64>> {
        let seed = self
            .conn
            .query_row("SELECT seed FROM run WHERE run_id = ?1", params![run_id], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(seed.map(|s| s as u64))
    }

    /// Drop every stage result stored for `run_id`. The run row and the
    /// event log are kept.
    pub fn clear_results(&self, run_id: &str) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for table in RESULT_TABLES {
            tx.execute(&format!("DELETE FROM {table} WHERE run_id = ?1"), params![run_id])?;
        }
        tx.commit()?;
        log::debug!("store: cleared results for {run_id}");
        Ok(())
    }

    /// Row count of one result table for `run_id`.
    pub fn result_count(&self, table: &str, run_id: &str) -> PricingResult<i64> {
        if !RESULT_TABLES.contains(&table) {
            return Err(PricingError::invalid("table", format!("unknown result table '{table}'")));
        }
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1"),
            params![run_id],
            |row| row.get(0),
        )?)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> PricingResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, seq, stage, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.run_id,
                entry.seq as i64,
                entry.stage,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &str) -> PricingResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, seq, stage, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY seq ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    seq:        row.get::<_, i64>(2)? as u64,
                    stage:      row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Price raise view ───────────────────────────────────────

    pub fn save_elasticity_cube(&self, run_id: &str, cube: &ElasticityCube) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO elasticity_cube
                 (run_id, sku, segment, region, category, avg_price, avg_units, avg_margin,
                  n_rows, elasticity_raw, elasticity, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for r in &cube.rows {
                stmt.execute(params![
                    run_id,
                    r.sku,
                    r.segment.label(),
                    r.region.label(),
                    r.category.label(),
                    r.avg_price,
                    r.avg_units,
                    r.avg_margin,
                    r.n_rows as i64,
                    r.elasticity_raw,
                    r.elasticity,
                    r.source.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("store: saved {} cube rows for {run_id}", cube.len());
        Ok(())
    }

    pub fn elasticity_cube_count(&self, run_id: &str) -> PricingResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM elasticity_cube WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?)
    }

    pub fn save_recommendations(
        &self,
        run_id: &str,
        scenario_id: &str,
        price_increase_pct: f64,
        recs: &[RaiseRecommendation],
    ) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO raise_recommendation
                 (run_id, scenario_id, price_increase_pct, sku, segment, region,
                  elasticity, revenue_delta, vol_delta_pct, raise_score, raise_tier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in recs {
                stmt.execute(params![
                    run_id,
                    scenario_id,
                    price_increase_pct,
                    r.sku,
                    r.segment.label(),
                    r.region.label(),
                    r.elasticity,
                    r.revenue_delta,
                    r.vol_delta_pct,
                    r.raise_score,
                    r.raise_tier.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// (tier, count) for one scored scenario, ordered by tier name.
    pub fn tier_counts(&self, run_id: &str, scenario_id: &str) -> PricingResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT raise_tier, COUNT(*) FROM raise_recommendation
             WHERE run_id = ?1 AND scenario_id = ?2
             GROUP BY raise_tier ORDER BY raise_tier",
        )?;
        let rows = stmt
            .query_map(params![run_id, scenario_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Leakage view ───────────────────────────────────────────

    pub fn save_segments(&self, run_id: &str, segmented: &[SegmentedCustomer]) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO customer_segment
                 (run_id, customer_id, cluster, total_revenue, avg_discount, gm_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for s in segmented {
                stmt.execute(params![
                    run_id,
                    s.features.customer_id,
                    s.cluster as i64,
                    s.features.total_revenue,
                    s.features.avg_discount,
                    s.features.gm_pct,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn save_customer_leakage(&self, run_id: &str, rows: &[CustomerLeakage]) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO customer_leakage
                 (run_id, customer_id, segment, region, leakage_txns, leakage_est_dollars,
                  avg_discount, revenue, gm_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for c in rows {
                stmt.execute(params![
                    run_id,
                    c.customer_id,
                    c.segment.label(),
                    c.region.label(),
                    c.leakage_txns as i64,
                    c.leakage_est_dollars,
                    c.avg_discount,
                    c.revenue,
                    c.gm_pct,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn save_rep_leakage(&self, run_id: &str, rows: &[RepLeakage]) -> PricingResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO rep_leakage
                 (run_id, sales_rep_id, customers, skus, leakage_txns, leakage_est_dollars,
                  avg_discount, revenue, gm_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for r in rows {
                stmt.execute(params![
                    run_id,
                    r.sales_rep_id,
                    r.customers as i64,
                    r.skus as i64,
                    r.leakage_txns as i64,
                    r.leakage_est_dollars,
                    r.avg_discount,
                    r.revenue,
                    r.gm_pct,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Top accounts by estimated leakage dollars.
    pub fn top_customer_leakage(&self, run_id: &str, limit: usize) -> PricingResult<Vec<(String, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, leakage_est_dollars FROM customer_leakage
             WHERE run_id = ?1
             ORDER BY leakage_est_dollars DESC, customer_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn rep_leakage_total(&self, run_id: &str) -> PricingResult<f64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(leakage_est_dollars), 0.0) FROM rep_leakage WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?)
    }
}
