//! Segmentation engine: standardise customer features and cluster
//! customers into K groups with k-means.
//!
//! k-means++ seeding and all restarts draw from the Segmentation stage
//! stream, so a given seed and K always yield the same clusters.

use crate::{
    config::{validate_segmentation, SegmentationConfig},
    error::{PricingError, PricingResult},
    features::CustomerFeatures,
    rng::{RngBank, StageRng, StageSlot},
    stats::mean,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const N_FEATURES: usize = 10;

/// Column order of the clustering feature vector.
pub const SEGMENT_FEATURES: [&str; N_FEATURES] = [
    "orders",
    "sku_count",
    "category_count",
    "total_revenue",
    "gm_pct",
    "avg_discount",
    "p90_discount",
    "contract_share",
    "aov",
    "units_per_order",
];

pub type FeatureVector = [f64; N_FEATURES];

/// Non-finite values are replaced with 0.
pub fn feature_vector(c: &CustomerFeatures) -> FeatureVector {
    let raw = [
        c.orders as f64,
        c.sku_count as f64,
        c.category_count as f64,
        c.total_revenue,
        c.gm_pct,
        c.avg_discount,
        c.p90_discount,
        c.contract_share,
        c.aov,
        c.units_per_order,
    ];
    raw.map(|v| if v.is_finite() { v } else { 0.0 })
}

/// Zero-mean, unit-variance scaling with population std.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: FeatureVector,
    pub scales: FeatureVector,
}

impl StandardScaler {
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let mut means = [0.0; N_FEATURES];
        let mut scales = [1.0; N_FEATURES];
        if rows.is_empty() {
            return Self { means, scales };
        }
        let n = rows.len() as f64;
        for j in 0..N_FEATURES {
            let m = rows.iter().map(|r| r[j]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[j] - m).powi(2)).sum::<f64>() / n;
            means[j] = m;
            // Constant columns keep scale 1 so they map to 0, not NaN.
            scales[j] = if var > 0.0 { var.sqrt() } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = (row[j] - self.means[j]) / self.scales[j];
        }
        out
    }
}

fn check_k(k: usize, n_points: usize) -> PricingResult<()> {
    if k == 0 || k > n_points {
        return Err(PricingError::invalid(
            "segmentation.k",
            format!("k={k} must be between 1 and the number of customers ({n_points})"),
        ));
    }
    Ok(())
}

fn sq_dist(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &FeatureVector, centroids: &[FeatureVector]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = sq_dist(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub centroids: Vec<FeatureVector>,
    pub labels: Vec<usize>,
    pub inertia: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    pub k: usize,
    pub max_iter: usize,
    pub n_init: usize,
    pub tol: f64,
}

impl From<&SegmentationConfig> for KMeans {
    fn from(cfg: &SegmentationConfig) -> Self {
        Self {
            k: cfg.k,
            max_iter: cfg.max_iter,
            n_init: cfg.n_init,
            tol: cfg.tol,
        }
    }
}

impl KMeans {
    /// Best of `n_init` runs by inertia. Requires `1 <= k <= points.len()`.
    pub fn fit(&self, points: &[FeatureVector], rng: &mut StageRng) -> PricingResult<KMeansFit> {
        check_k(self.k, points.len())?;
        let mut best = self.fit_once(points, rng, 0);
        for run in 1..self.n_init.max(1) {
            let fit = self.fit_once(points, rng, run);
            if fit.inertia < best.inertia {
                best = fit;
            }
        }
        Ok(best)
    }

    fn fit_once(&self, points: &[FeatureVector], rng: &mut StageRng, run: usize) -> KMeansFit {
        let initial = self.seed_plus_plus(points, rng);
        let fit = self.lloyd(points, initial);
        log::debug!(
            "segmentation: k-means run {run} converged in {} iterations, inertia={:.3}",
            fit.iterations, fit.inertia
        );
        fit
    }

    /// Lloyd iterations from caller-chosen starting centres; K is
    /// `initial.len()`. A centre that loses all its points is moved to
    /// the point farthest from its current centre.
    pub fn refine(&self, points: &[FeatureVector], initial: Vec<FeatureVector>) -> PricingResult<KMeansFit> {
        check_k(initial.len(), points.len())?;
        Ok(self.lloyd(points, initial))
    }

    fn lloyd(&self, points: &[FeatureVector], initial: Vec<FeatureVector>) -> KMeansFit {
        let k = initial.len();
        let mut centroids = initial;
        let mut labels = vec![0usize; points.len()];
        let mut iterations = 0;

        for _ in 0..self.max_iter {
            iterations += 1;
            let mut dists = vec![0.0; points.len()];
            for (i, p) in points.iter().enumerate() {
                let (c, d) = nearest(p, &centroids);
                labels[i] = c;
                dists[i] = d;
            }

            let mut sums = vec![[0.0; N_FEATURES]; k];
            let mut counts = vec![0usize; k];
            for (p, &c) in points.iter().zip(&labels) {
                counts[c] += 1;
                for j in 0..N_FEATURES {
                    sums[c][j] += p[j];
                }
            }

            let mut next = centroids.clone();
            for c in 0..k {
                if counts[c] > 0 {
                    for j in 0..N_FEATURES {
                        next[c][j] = sums[c][j] / counts[c] as f64;
                    }
                } else {
                    // Empty cluster: steal the point worst served by its centre.
                    let far = dists
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    next[c] = points[far];
                    dists[far] = 0.0;
                }
            }

            let shift: f64 = centroids.iter().zip(&next).map(|(a, b)| sq_dist(a, b)).sum();
            centroids = next;
            if shift <= self.tol {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, p) in points.iter().enumerate() {
            let (c, d) = nearest(p, &centroids);
            labels[i] = c;
            inertia += d;
        }

        KMeansFit { centroids, labels, inertia, iterations }
    }

    /// k-means++: each new centre drawn with probability ∝ D².
    fn seed_plus_plus(&self, points: &[FeatureVector], rng: &mut StageRng) -> Vec<FeatureVector> {
        let mut centroids = Vec::with_capacity(self.k);
        centroids.push(*rng.pick(points));
        let mut d2: Vec<f64> = points.iter().map(|p| sq_dist(p, &centroids[0])).collect();

        while centroids.len() < self.k {
            let total: f64 = d2.iter().sum();
            let idx = if total > 0.0 {
                let roll = rng.next_f64() * total;
                let mut cumulative = 0.0;
                let mut chosen = points.len() - 1;
                for (i, d) in d2.iter().enumerate() {
                    cumulative += d;
                    if roll < cumulative {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                rng.next_u64_below(points.len() as u64) as usize
            };
            let centre = points[idx];
            for (d, p) in d2.iter_mut().zip(points) {
                *d = d.min(sq_dist(p, &centre));
            }
            centroids.push(centre);
        }
        centroids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentedCustomer {
    #[serde(flatten)]
    pub features: CustomerFeatures,
    pub cluster: usize,
    pub cluster_label: String,
}

/// Standardise features and assign each customer to one of K clusters.
pub fn segment_customers(
    customers: &[CustomerFeatures],
    config: &SegmentationConfig,
    bank: &RngBank,
) -> PricingResult<Vec<SegmentedCustomer>> {
    validate_segmentation(config)?;
    if customers.is_empty() {
        log::warn!("segmentation: no customers to cluster");
        return Ok(Vec::new());
    }

    let raw: Vec<FeatureVector> = customers.iter().map(feature_vector).collect();
    let scaler = StandardScaler::fit(&raw);
    let scaled: Vec<FeatureVector> = raw.iter().map(|r| scaler.transform(r)).collect();

    let mut rng = bank.for_stage(StageSlot::Segmentation);
    let fit = KMeans::from(config).fit(&scaled, &mut rng)?;

    log::info!(
        "segmentation: clustered {} customers into k={} (inertia={:.2})",
        customers.len(),
        config.k,
        fit.inertia
    );

    Ok(customers
        .iter()
        .zip(fit.labels)
        .map(|(c, cluster)| SegmentedCustomer {
            features: c.clone(),
            cluster,
            cluster_label: format!("Cluster {cluster}"),
        })
        .collect())
}

/// Per-cluster averages for the profile table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub cluster_label: String,
    pub customers: usize,
    pub revenue: f64,
    pub avg_discount: f64,
    pub avg_gm_pct: f64,
    /// Means of the raw (unscaled) features, in SEGMENT_FEATURES order.
    pub feature_means: FeatureVector,
}

pub fn cluster_profiles(segmented: &[SegmentedCustomer]) -> Vec<ClusterProfile> {
    let mut groups: BTreeMap<usize, Vec<&SegmentedCustomer>> = BTreeMap::new();
    for s in segmented {
        groups.entry(s.cluster).or_default().push(s);
    }

    groups
        .into_iter()
        .map(|(cluster, members)| {
            let vectors: Vec<FeatureVector> = members.iter().map(|m| feature_vector(&m.features)).collect();
            let mut feature_means = [0.0; N_FEATURES];
            for (j, slot) in feature_means.iter_mut().enumerate() {
                let column: Vec<f64> = vectors.iter().map(|v| v[j]).collect();
                *slot = mean(&column).unwrap_or(0.0);
            }
            ClusterProfile {
                cluster,
                cluster_label: format!("Cluster {cluster}"),
                customers: members.len(),
                revenue: members.iter().map(|m| m.features.total_revenue).sum(),
                avg_discount: feature_means[5],
                avg_gm_pct: feature_means[4],
                feature_means,
            }
        })
        .collect()
}
