//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stock-keeping unit identifier, e.g. `SKU_17`.
pub type Sku = String;

/// A customer account identifier, e.g. `CUST_0042`.
pub type CustomerId = String;

/// A sales rep identifier, e.g. `REP_007`.
pub type RepId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Customer segment. Drives elasticity priors and discount levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Dso,
    Clinic,
    SmallPractice,
    Hospital,
}

impl Segment {
    pub const ALL: [Segment; 4] = [
        Segment::Dso,
        Segment::Clinic,
        Segment::SmallPractice,
        Segment::Hospital,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dso           => "DSO",
            Self::Clinic        => "Clinic",
            Self::SmallPractice => "Small Practice",
            Self::Hospital      => "Hospital",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Northeast,
    South,
    Midwest,
    West,
}

impl Region {
    pub const ALL: [Region; 4] = [Region::Northeast, Region::South, Region::Midwest, Region::West];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Northeast => "Northeast",
            Self::South     => "South",
            Self::Midwest   => "Midwest",
            Self::West      => "West",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Dental,
    MedSurg,
    Lab,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Dental, Category::MedSurg, Category::Lab];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dental  => "Dental",
            Self::MedSurg => "MedSurg",
            Self::Lab     => "Lab",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The grain of the elasticity cube and the leakage peer benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CubeKey {
    pub sku:     Sku,
    pub segment: Segment,
    pub region:  Region,
}

impl fmt::Display for CubeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.sku, self.segment, self.region)
    }
}
