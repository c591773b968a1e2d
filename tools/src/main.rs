//! pricing-runner: headless runner for the pricing intelligence engine.
//!
//! Usage:
//!   pricing-runner --seed 42 --rows 80000 --price-increase 2.0 --k 5
//!   pricing-runner --data-dir ./data --db results.db
//!   pricing-runner --ipc-mode            (JSON lines on stdin/stdout)
//!
//! IPC commands: get_state, raise, leakage, regenerate, explain_raise,
//! explain_customer, explain_rep, debug, quit. `raise` and `leakage` use
//! the configured scenario when the command carries none.

use anyhow::Result;
use pricing_intel_core::{
    config::{PipelineConfig, RaiseScenario},
    diagnostics::DataDiagnostics,
    engine::{LeakageReport, LeakageScenario, LeakageSummary, PricingEngine, RaiseReport},
    leakage::{
        top_leakage_for_customer, top_leakage_for_rep, CustomerLeakage, DrillDownKpis,
        FlaggedTransaction, RepLeakage,
    },
    segmentation::{ClusterProfile, N_FEATURES, SEGMENT_FEATURES},
    stats::{histogram, HistogramBin},
    store::AnalysisStore,
    types::{CubeKey, CustomerId, Region, Segment, Sku},
    uplift::{ActionFilter, RaiseRecommendation, RaiseSummary, RaiseTier},
};
use std::env;
use std::io::{self, BufRead, Write};

const TOP_CUSTOMERS: usize = 50;
const TOP_REPS: usize = 30;
const DRILL_DOWN_ROWS: usize = 25;
const HISTOGRAM_BINS: usize = 40;
const DEBUG_SAMPLE: usize = 2000;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    /// Without a scenario, the engine's configured defaults apply.
    Raise {
        #[serde(default)]
        scenario: Option<RaiseScenario>,
        #[serde(default)]
        filter: ActionFilter,
    },
    Leakage {
        #[serde(default)]
        scenario: Option<LeakageScenario>,
    },
    Regenerate {
        n_rows: usize,
        seed: u64,
    },
    ExplainRaise {
        sku: String,
        segment: Segment,
        region: Region,
    },
    ExplainCustomer {
        customer_id: String,
    },
    ExplainRep {
        rep_id: String,
    },
    Debug,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    run_id: String,
    seed: u64,
    rows: usize,
    cube_cells: usize,
    raise: Option<RaiseSummary>,
    leakage: Option<LeakageSummary>,
}

#[derive(serde::Serialize)]
struct RaiseView<'a> {
    scenario_id: &'a str,
    scenario: &'a RaiseScenario,
    summary: &'a RaiseSummary,
    actions: Vec<RaiseRecommendation>,
    elasticity_histogram: Vec<HistogramBin>,
    score_histogram: Vec<HistogramBin>,
    /// One point per cube cell for the elasticity vs margin scatter.
    cells: Vec<CellPoint>,
}

#[derive(serde::Serialize)]
struct CellPoint {
    sku: Sku,
    segment: Segment,
    region: Region,
    elasticity: f64,
    avg_margin: f64,
    raise_tier: RaiseTier,
}

impl From<&RaiseRecommendation> for CellPoint {
    fn from(r: &RaiseRecommendation) -> Self {
        Self {
            sku: r.sku.clone(),
            segment: r.segment,
            region: r.region,
            elasticity: r.elasticity,
            avg_margin: r.avg_margin,
            raise_tier: r.raise_tier,
        }
    }
}

#[derive(serde::Serialize)]
struct LeakageView<'a> {
    scenario: &'a LeakageScenario,
    summary: &'a LeakageSummary,
    /// Column order of each profile's feature_means.
    feature_names: [&'static str; N_FEATURES],
    profiles: &'a [ClusterProfile],
    customers: &'a [CustomerLeakage],
    reps: &'a [RepLeakage],
    /// Every segmented customer, for the discount vs GM% scatter.
    points: Vec<CustomerPoint>,
}

#[derive(serde::Serialize)]
struct CustomerPoint {
    customer_id: CustomerId,
    cluster: usize,
    avg_discount: f64,
    gm_pct: f64,
}

#[derive(serde::Serialize)]
struct DrillDownView {
    id: String,
    kpis: DrillDownKpis,
    transactions: Vec<FlaggedTransaction>,
}

/// Last scored scenarios, kept so drill-downs do not re-run the pipeline.
#[derive(Default)]
struct Session {
    raise: Option<RaiseReport>,
    leakage: Option<LeakageReport>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = arg_value(&args, "--db");
    let data_dir = arg_value(&args, "--data-dir");

    let mut config = match data_dir {
        Some(dir) => PipelineConfig::load(dir)?,
        None => PipelineConfig::default(),
    };
    config.generator.seed = parse_arg(&args, "--seed", config.generator.seed);
    config.generator.n_rows = parse_arg(&args, "--rows", config.generator.n_rows);
    config.raise.price_increase_pct = parse_arg(&args, "--price-increase", config.raise.price_increase_pct);
    config.segmentation.k = parse_arg(&args, "--k", config.segmentation.k);
    config.leakage.percentile = parse_arg(&args, "--percentile", config.leakage.percentile);
    config.leakage.min_peer_n = parse_arg(&args, "--min-peer-n", config.leakage.min_peer_n);

    let run_id = arg_value(&args, "--run-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("run-{}-{}", config.generator.seed, timestamp_suffix()));

    if !ipc_mode {
        println!("Pricing Intelligence Engine: pricing-runner");
        println!("  run_id:    {run_id}");
        println!("  seed:      {}", config.generator.seed);
        println!("  rows:      {}", config.generator.n_rows);
        println!("  db:        {}", db.unwrap_or("(none)"));
        println!("  data_dir:  {}", data_dir.unwrap_or("(built-in defaults)"));
        println!();
    }

    let mut engine = match db {
        Some(path) => {
            let store = AnalysisStore::open(path)?;
            store.migrate()?;
            PricingEngine::build_with_store(run_id, config, store)?
        }
        None => PricingEngine::build(run_id, config)?,
    };

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        let raise = engine.run_default_raise()?;
        let leakage = engine.run_default_leakage()?;
        print_summary(&engine, &raise, &leakage);
    }

    Ok(())
}

fn run_ipc_loop(engine: &mut PricingEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let mut session = Session::default();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                write_error(&mut stdout, &e.to_string())?;
                continue;
            }
        };

        if let IpcCommand::Quit = cmd {
            break;
        }

        // Pipeline errors (bad K, bad percentile) go back to the UI; the loop keeps running.
        let reply = match handle_command(engine, &mut session, cmd) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("ipc: command failed: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &mut PricingEngine,
    session: &mut Session,
    cmd: IpcCommand,
) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::GetState => serde_json::to_value(build_ui_state(engine, session)?)?,
        IpcCommand::Raise { scenario, filter } => {
            let report = match scenario {
                Some(scenario) => engine.run_raise_scenario(&scenario)?,
                None => engine.run_default_raise()?,
            };
            let elasticities: Vec<f64> = report.recommendations.iter().map(|r| r.elasticity).collect();
            let scores: Vec<f64> = report.recommendations.iter().map(|r| r.raise_score).collect();
            let value = serde_json::to_value(RaiseView {
                scenario_id: &report.scenario_id,
                scenario: &report.scenario,
                summary: &report.summary,
                actions: report.actions(&filter),
                elasticity_histogram: histogram(&elasticities, HISTOGRAM_BINS),
                score_histogram: histogram(&scores, HISTOGRAM_BINS),
                cells: report.recommendations.iter().map(CellPoint::from).collect(),
            })?;
            session.raise = Some(report);
            value
        }
        IpcCommand::Leakage { scenario } => {
            let report = match scenario {
                Some(scenario) => engine.run_leakage_scenario(&scenario)?,
                None => engine.run_default_leakage()?,
            };
            let value = serde_json::to_value(LeakageView {
                scenario: &report.scenario,
                summary: &report.summary,
                feature_names: SEGMENT_FEATURES,
                profiles: &report.profiles,
                customers: &report.by_customer[..report.by_customer.len().min(TOP_CUSTOMERS)],
                reps: &report.by_rep[..report.by_rep.len().min(TOP_REPS)],
                points: report
                    .segmented
                    .iter()
                    .map(|s| CustomerPoint {
                        customer_id: s.features.customer_id.clone(),
                        cluster: s.cluster,
                        avg_discount: s.features.avg_discount,
                        gm_pct: s.features.gm_pct,
                    })
                    .collect(),
            })?;
            session.leakage = Some(report);
            value
        }
        IpcCommand::Regenerate { n_rows, seed } => {
            engine.regenerate(n_rows, seed)?;
            *session = Session::default();
            serde_json::to_value(build_ui_state(engine, session)?)?
        }
        IpcCommand::ExplainRaise { sku, segment, region } => {
            let report = session
                .raise
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no raise scenario has been scored yet"))?;
            let key = CubeKey { sku, segment, region };
            let rec = report
                .recommendations
                .iter()
                .find(|r| r.key() == key)
                .ok_or_else(|| anyhow::anyhow!("no cube cell for {key}"))?;
            serde_json::json!({
                "recommendation": rec,
                "explanation": rec.explain(report.scenario.price_increase_pct),
            })
        }
        IpcCommand::ExplainCustomer { customer_id } => {
            let report = last_leakage(session)?;
            let kpis = DrillDownKpis::from_rows(report.flagged.iter().filter(|f| f.customer_id == customer_id));
            let transactions = top_leakage_for_customer(&report.flagged, &customer_id, DRILL_DOWN_ROWS);
            serde_json::to_value(DrillDownView { id: customer_id, kpis, transactions })?
        }
        IpcCommand::ExplainRep { rep_id } => {
            let report = last_leakage(session)?;
            let kpis = DrillDownKpis::from_rows(report.flagged.iter().filter(|f| f.sales_rep_id == rep_id));
            let transactions = top_leakage_for_rep(&report.flagged, &rep_id, DRILL_DOWN_ROWS);
            serde_json::to_value(DrillDownView { id: rep_id, kpis, transactions })?
        }
        IpcCommand::Debug => {
            let diagnostics: DataDiagnostics = engine.diagnostics(DEBUG_SAMPLE)?;
            serde_json::to_value(diagnostics)?
        }
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn last_leakage(session: &Session) -> Result<&LeakageReport> {
    session
        .leakage
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no leakage scenario has been run yet"))
}

fn build_ui_state(engine: &mut PricingEngine, session: &Session) -> Result<UiState> {
    let cube_cells = engine.elasticity_cube()?.len();
    Ok(UiState {
        run_id: engine.run_id.clone(),
        seed: engine.config.generator.seed,
        rows: engine.transactions().len(),
        cube_cells,
        raise: session.raise.as_ref().map(|r| r.summary.clone()),
        leakage: session.leakage.as_ref().map(|l| l.summary.clone()),
    })
}

fn write_error(stdout: &mut io::Stdout, message: &str) -> Result<()> {
    let err_json = serde_json::json!({ "error": message });
    writeln!(stdout, "{err_json}")?;
    stdout.flush()?;
    Ok(())
}

fn print_summary(engine: &PricingEngine, raise: &RaiseReport, leakage: &LeakageReport) {
    let s = &raise.summary;
    println!("=== PRICE RAISE (+{:.1}%) ===", raise.scenario.price_increase_pct);
    println!("  cube cells:        {}", s.rows);
    println!("  total revenue lift: ${:.0}", s.total_revenue_lift);
    println!("  avg elasticity:    {:.2}", s.avg_elasticity);
    println!("  safe raises:       {}", s.safe_raise_count);
    println!("  test raises:       {}", s.test_raise_count);
    println!("  protect:           {}", s.protect_count);

    println!();
    println!("  Top actions:");
    for rec in raise.actions(&ActionFilter { limit: 10, ..ActionFilter::default() }) {
        println!(
            "    {:<32} e={:>5.2} score={:.2} lift=${:>8.0} [{}]",
            rec.key().to_string(),
            rec.elasticity,
            rec.raise_score,
            rec.revenue_delta,
            rec.raise_tier.label()
        );
    }

    let l = &leakage.summary;
    println!();
    println!("=== DISCOUNT LEAKAGE (k={}, p{:.0}, min peers {}) ===",
        leakage.scenario.segmentation.k,
        leakage.scenario.leakage.percentile * 100.0,
        leakage.scenario.leakage.min_peer_n
    );
    println!("  customers:         {}", l.customers);
    println!("  leakage txns:      {}", l.leakage_txns);
    println!("  est leakage:       ${:.0}", l.leakage_est_dollars);
    println!("  avg discount:      {:.1}%", l.avg_discount * 100.0);

    println!();
    println!("  Clusters:");
    for p in &leakage.profiles {
        println!(
            "    {:<10} n={:>5} revenue=${:>12.0} disc={:>5.1}% gm={:>5.1}%",
            p.cluster_label,
            p.customers,
            p.revenue,
            p.avg_discount * 100.0,
            p.avg_gm_pct * 100.0
        );
    }

    println!();
    println!("  Top reps by leakage:");
    for r in leakage.by_rep.iter().take(5) {
        println!(
            "    {:<8} customers={:>4} txns={:>5} leakage=${:.0}",
            r.sales_rep_id, r.customers, r.leakage_txns, r.leakage_est_dollars
        );
    }

    println!();
    println!("  events logged:     {}", engine.events().len());
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}
