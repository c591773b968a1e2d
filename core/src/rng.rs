//! Seeded randomness for the pipeline stages.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StageRng instances derived
//! from the single master seed of the run.
//!
//! Each stage gets its own RNG stream, seeded deterministically
//! from (master_seed XOR stage_index). This means:
//!   - Adding a new stage never changes existing stages' streams.
//!   - Re-clustering with a new K never perturbs the generated data.

use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Poisson};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single pipeline stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// Create a stage RNG from the master seed and a stable
    /// stage index. The index must never change once assigned.
    pub fn new(master_seed: u64, stage_index: u64) -> Self {
        let derived_seed = master_seed ^ (stage_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Uniform draw in [0, 1) from the top 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Integer in [0, n). Panics when n is 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform float in [lo, hi).
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Gaussian draw. A non-positive std collapses to the mean.
    pub fn normal(&mut self, mean: f64, std: f64) -> f64 {
        match Normal::new(mean, std) {
            Ok(dist) if std > 0.0 => dist.sample(&mut self.inner),
            _ => mean,
        }
    }

    /// Poisson count with rate `lambda`. Non-positive rates yield 0.
    pub fn poisson(&mut self, lambda: f64) -> u32 {
        if !(lambda > 0.0) {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(dist) => {
                let draw: f64 = dist.sample(&mut self.inner);
                draw.min(u32::MAX as f64) as u32
            }
            Err(_) => 0,
        }
    }

    /// Uniform pick from a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.next_u64_below(items.len() as u64) as usize]
    }

    /// Up to `n` distinct indices from `0..len`, in draw order
    /// (partial Fisher-Yates).
    pub fn sample_indices(&mut self, len: usize, n: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..len).collect();
        let n = n.min(len);
        for i in 0..n {
            let j = i + self.next_u64_below((len - i) as u64) as usize;
            pool.swap(i, j);
        }
        pool.truncate(n);
        pool
    }

    /// Weighted pick. Weights need not sum to 1; the last item absorbs
    /// any rounding remainder.
    pub fn pick_weighted<'a, T>(&mut self, items: &'a [(T, f64)]) -> &'a T {
        let total: f64 = items.iter().map(|(_, w)| w.max(0.0)).sum();
        let roll = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (item, weight) in items {
            cumulative += weight.max(0.0);
            if roll < cumulative {
                return item;
            }
        }
        &items[items.len() - 1].0
    }
}

/// All stage RNGs for a single run, indexed by stable slot.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        StageRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stage slot assignments.
/// Append only: a slot's index is part of its stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Catalog = 0,
    Customers = 1,
    Reps = 2,
    Transactions = 3,
    Segmentation = 4,
    Diagnostics = 5,
    // New stages go at the end.
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Catalog      => "catalog",
            Self::Customers    => "customers",
            Self::Reps         => "reps",
            Self::Transactions => "transactions",
            Self::Segmentation => "segmentation",
            Self::Diagnostics  => "diagnostics",
        }
    }
}
