use pricing_intel_core::{
    config::SegmentationConfig,
    engine::{LeakageScenario, PricingEngine},
    error::PricingError,
    rng::{RngBank, StageRng, StageSlot},
    segmentation::{segment_customers, FeatureVector, KMeans, StandardScaler, N_FEATURES},
};

fn make_engine(seed: u64) -> PricingEngine {
    PricingEngine::build_test(format!("seg-test-{seed}"), seed).expect("test engine")
}

fn stage_rng(seed: u64) -> StageRng {
    RngBank::new(seed).for_stage(StageSlot::Segmentation)
}

#[test]
fn scaler_centres_and_scales_columns() {
    let rows: Vec<FeatureVector> = vec![[1.0; N_FEATURES], [3.0; N_FEATURES]];
    let scaler = StandardScaler::fit(&rows);
    assert_eq!(scaler.means, [2.0; N_FEATURES]);
    assert_eq!(scaler.scales, [1.0; N_FEATURES]);
    assert_eq!(scaler.transform(&rows[0]), [-1.0; N_FEATURES]);
    assert_eq!(scaler.transform(&rows[1]), [1.0; N_FEATURES]);
}

#[test]
fn constant_columns_scale_to_zero() {
    let mut a = [5.0; N_FEATURES];
    let mut b = [5.0; N_FEATURES];
    a[0] = 0.0;
    b[0] = 4.0;
    let scaler = StandardScaler::fit(&[a, b]);
    assert_eq!(scaler.scales[1], 1.0);
    let t = scaler.transform(&a);
    assert_eq!(t[0], -1.0);
    assert!(t[1..].iter().all(|v| *v == 0.0));
}

#[test]
fn kmeans_separates_distant_blobs() {
    let points: Vec<FeatureVector> = vec![
        [0.0; N_FEATURES],
        [0.1; N_FEATURES],
        [0.2; N_FEATURES],
        [100.0; N_FEATURES],
        [100.1; N_FEATURES],
        [100.2; N_FEATURES],
    ];
    let km = KMeans { k: 2, max_iter: 300, n_init: 3, tol: 1e-6 };
    let fit = km.fit(&points, &mut stage_rng(42)).unwrap();

    assert_eq!(fit.labels[0], fit.labels[1]);
    assert_eq!(fit.labels[1], fit.labels[2]);
    assert_eq!(fit.labels[3], fit.labels[4]);
    assert_eq!(fit.labels[4], fit.labels[5]);
    assert_ne!(fit.labels[0], fit.labels[3]);
    // Each blob's within-cluster SSE: 2 * 0.01 * N_FEATURES.
    assert!((fit.inertia - 0.4).abs() < 1e-6, "got {}", fit.inertia);
}

#[test]
fn kmeans_rejects_more_clusters_than_points() {
    let points: Vec<FeatureVector> = vec![[0.0; N_FEATURES], [1.0; N_FEATURES]];
    let km = KMeans { k: 3, max_iter: 10, n_init: 1, tol: 1e-6 };
    let err = km.fit(&points, &mut stage_rng(1)).unwrap_err();
    assert!(matches!(err, PricingError::InvalidConfig { .. }));
}

#[test]
fn kmeans_with_one_cluster_uses_the_mean() {
    let points: Vec<FeatureVector> = vec![[0.0; N_FEATURES], [2.0; N_FEATURES], [4.0; N_FEATURES]];
    let km = KMeans { k: 1, max_iter: 50, n_init: 2, tol: 1e-9 };
    let fit = km.fit(&points, &mut stage_rng(3)).unwrap();
    assert_eq!(fit.labels, vec![0, 0, 0]);
    assert!(fit.centroids[0].iter().all(|v| (v - 2.0).abs() < 1e-12));
}

#[test]
fn zero_k_is_invalid() {
    let config = SegmentationConfig { k: 0, ..SegmentationConfig::default() };
    let err = segment_customers(&[], &config, &RngBank::new(1)).unwrap_err();
    assert!(matches!(err, PricingError::InvalidConfig { .. }));
}

#[test]
fn no_customers_means_no_segments() {
    let out = segment_customers(&[], &SegmentationConfig::default(), &RngBank::new(1)).unwrap();
    assert!(out.is_empty());
}

#[test]
fn every_customer_gets_a_cluster() {
    let mut engine = make_engine(42);
    let customers = engine.customer_features().len();
    let report = engine.run_default_leakage().unwrap();
    let k = report.scenario.segmentation.k;

    assert_eq!(report.segmented.len(), customers);
    for s in &report.segmented {
        assert!(s.cluster < k);
        assert_eq!(s.cluster_label, format!("Cluster {}", s.cluster));
    }

    assert!(!report.profiles.is_empty() && report.profiles.len() <= k);
    let profiled: usize = report.profiles.iter().map(|p| p.customers).sum();
    assert_eq!(profiled, customers);
    let revenue: f64 = report.segmented.iter().map(|s| s.features.total_revenue).sum();
    let profile_revenue: f64 = report.profiles.iter().map(|p| p.revenue).sum();
    assert!((revenue - profile_revenue).abs() < 1e-6 * revenue.max(1.0));
}

#[test]
fn changing_k_does_not_touch_the_data() {
    let mut engine = make_engine(8);
    let before = engine.transactions().to_vec();
    let scenario = LeakageScenario {
        segmentation: SegmentationConfig { k: 6, ..SegmentationConfig::default() },
        ..LeakageScenario::default()
    };
    let report = engine.run_leakage_scenario(&scenario).unwrap();
    assert!(report.segmented.iter().all(|s| s.cluster < 6));
    assert_eq!(engine.transactions(), &before[..]);
}

#[test]
fn too_many_clusters_is_an_error() {
    let mut engine = make_engine(42);
    let scenario = LeakageScenario {
        segmentation: SegmentationConfig { k: 10_000, ..SegmentationConfig::default() },
        ..LeakageScenario::default()
    };
    assert!(engine.run_leakage_scenario(&scenario).is_err());
}

#[test]
fn empty_cluster_is_reseeded_with_the_farthest_point() {
    let points: Vec<FeatureVector> = vec![[0.0; N_FEATURES], [1.0; N_FEATURES], [10.0; N_FEATURES]];
    // The third centre starts beyond the outlier and never wins a point.
    let initial = vec![[0.0; N_FEATURES], [1.0; N_FEATURES], [100.0; N_FEATURES]];
    let km = KMeans { k: 3, max_iter: 300, n_init: 1, tol: 1e-6 };
    let fit = km.refine(&points, initial).unwrap();

    assert!(fit.centroids.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(fit.centroids[2], [10.0; N_FEATURES]);
    assert_eq!(fit.labels, vec![0, 1, 2]);
    assert!(fit.inertia.abs() < 1e-12);
}

#[test]
fn duplicate_points_with_spare_clusters_stay_finite() {
    let a = [0.0; N_FEATURES];
    let b = [5.0; N_FEATURES];
    let points = vec![a, a, a, b];
    let km = KMeans { k: 3, max_iter: 50, n_init: 3, tol: 1e-6 };
    let fit = km.fit(&points, &mut stage_rng(9)).unwrap();

    assert_eq!(fit.centroids.len(), 3);
    assert!(fit.centroids.iter().flatten().all(|v| v.is_finite()));
    assert_eq!(fit.labels.len(), 4);
    assert!(fit.inertia.abs() < 1e-12);
}

#[test]
fn refine_checks_the_number_of_centres() {
    let km = KMeans { k: 2, max_iter: 10, n_init: 1, tol: 1e-6 };
    let points = vec![[0.0; N_FEATURES]];
    let err = km.refine(&points, vec![[0.0; N_FEATURES]; 2]).unwrap_err();
    assert!(matches!(err, PricingError::InvalidConfig { .. }));
    assert!(km.refine(&points, Vec::new()).is_err());
}
