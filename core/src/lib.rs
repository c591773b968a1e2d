//! Pricing intelligence core: synthetic B2B distribution transactions,
//! elasticity estimation, raise scoring, customer segmentation and
//! discount leakage detection.

pub mod config;
pub mod diagnostics;
pub mod elasticity;
pub mod engine;
pub mod error;
pub mod event;
pub mod features;
pub mod leakage;
pub mod rng;
pub mod segmentation;
pub mod stats;
pub mod store;
pub mod synth;
pub mod types;
pub mod uplift;
