//! Small numeric helpers shared by the estimators.
//!
//! Empty input yields `None` instead of NaN so callers decide the fallback.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Quantile with linear interpolation between closest ranks
/// (the numpy default). `q` is clamped to [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

/// Same as [`quantile`] for an already-sorted, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Population standard deviation (ddof = 0).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (ddof = 1). `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Pearson correlation. `None` when either column has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
        syy += (yi - my) * (yi - my);
    }
    if sxx <= f64::EPSILON || syy <= f64::EPSILON {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

/// Number of distinct values, comparing by bit pattern.
pub fn distinct_count(values: &[f64]) -> usize {
    let mut bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    bits.sort_unstable();
    bits.dedup();
    bits.len()
}

/// Ordinary least squares slope and intercept of `y` on `x`.
/// Returns `None` when `x` has no variance.
pub fn ols(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        sxy += (xi - mx) * (yi - my);
        sxx += (xi - mx) * (xi - mx);
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Fit `ln(y) = a + b ln(x)` over strictly positive pairs and return `b`.
///
/// `None` when fewer than `min_rows` usable pairs remain or the price
/// column has fewer than `min_distinct` distinct values.
pub fn fit_loglog(pairs: &[(f64, f64)], min_rows: usize, min_distinct: usize) -> Option<f64> {
    let usable: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(x, y)| *x > 0.0 && *y > 0.0)
        .collect();
    if usable.len() < min_rows {
        return None;
    }
    let xs: Vec<f64> = usable.iter().map(|(x, _)| *x).collect();
    if distinct_count(&xs) < min_distinct {
        return None;
    }
    let ln_x: Vec<f64> = xs.iter().map(|x| x.ln()).collect();
    let ln_y: Vec<f64> = usable.iter().map(|(_, y)| y.ln()).collect();
    ols(&ln_x, &ln_y).map(|(slope, _)| slope)
}

/// One equal-width histogram bucket; `hi` is exclusive except for the last.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistogramBin {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

/// Equal-width histogram over the finite values. A constant column
/// collapses into a single bin.
pub fn histogram(values: &[f64], nbins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || nbins == 0 {
        return Vec::new();
    }
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi <= lo {
        return vec![HistogramBin { lo, hi, count: finite.len() }];
    }

    let width = (hi - lo) / nbins as f64;
    let mut bins: Vec<HistogramBin> = (0..nbins)
        .map(|i| HistogramBin {
            lo: lo + width * i as f64,
            hi: if i + 1 == nbins { hi } else { lo + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(nbins - 1);
        bins[idx].count += 1;
    }
    bins
}
