use serde::{Deserialize, Serialize};

use crate::domain::drug::Drug;
use crate::interaction::RiskLevel;

pub const FEATURE_NAMES: [&str; FeatureVector::DIM] =
    ["is_same_generic", "is_equivalent", "cost_difference", "interaction_risk"];

/// Relationship between an original drug and a candidate replacement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub is_same_generic: bool,
    pub is_equivalent: bool,
    /// `original - candidate`; positive when the candidate is cheaper.
    pub cost_difference: f64,
    pub interaction_risk: RiskLevel,
}

impl FeatureVector {
    pub const DIM: usize = 4;

    pub fn to_array(&self) -> [f64; Self::DIM] {
        [
            if self.is_same_generic { 1.0 } else { 0.0 },
            if self.is_equivalent { 1.0 } else { 0.0 },
            self.cost_difference,
            self.interaction_risk.as_feature(),
        ]
    }
}

/// Callers only pair drugs from the same therapeutic class.
pub fn build_features(original: &Drug, candidate: &Drug, interaction_risk: RiskLevel) -> FeatureVector {
    FeatureVector {
        is_same_generic: original.generic_name == candidate.generic_name,
        is_equivalent: candidate.is_substitutable(),
        cost_difference: original.pmpm_cost - candidate.pmpm_cost,
        interaction_risk,
    }
}
