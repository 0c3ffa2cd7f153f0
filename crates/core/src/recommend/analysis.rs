use serde::{Deserialize, Serialize};

use super::Recommendation;
use crate::domain::drug::Drug;
use crate::interaction::{RiskLevel, SafetyRating};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleDrugAnalysis {
    pub cost_saving_per_member: f64,
    pub percentage_saving: f64,
    pub therapeutic_class_match: bool,
    pub generic_match: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinationAnalysis {
    pub total_cost_saving: f64,
    pub percentage_saving: f64,
    pub interaction_risk: RiskLevel,
    pub interaction_description: String,
    pub safety_score: SafetyRating,
}

/// Savings and safety summary of a recommendation against the drugs asked
/// about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommendationAnalysis {
    SingleDrug(SingleDrugAnalysis),
    Combination(CombinationAnalysis),
}

impl RecommendationAnalysis {
    /// `None` when nothing was recommended or the shapes do not line up.
    pub fn of(originals: &[Drug], recommendation: &Recommendation) -> Option<Self> {
        match (originals, recommendation) {
            ([original], Recommendation::Single(scored)) => {
                let recommended = &scored.drug;
                let saving = original.pmpm_cost - recommended.pmpm_cost;
                Some(Self::SingleDrug(SingleDrugAnalysis {
                    cost_saving_per_member: saving,
                    percentage_saving: percentage(saving, original.pmpm_cost),
                    therapeutic_class_match: original.therapeutic_class
                        == recommended.therapeutic_class,
                    generic_match: original.generic_name == recommended.generic_name,
                }))
            }
            (
                [first, second, ..],
                Recommendation::Combination { first: rec_first, second: rec_second, interaction, .. },
            ) => {
                let original_cost = first.pmpm_cost + second.pmpm_cost;
                let saving = original_cost - (rec_first.drug.pmpm_cost + rec_second.drug.pmpm_cost);
                Some(Self::Combination(CombinationAnalysis {
                    total_cost_saving: saving,
                    percentage_saving: percentage(saving, original_cost),
                    interaction_risk: interaction.risk,
                    interaction_description: interaction.evidence.clone(),
                    safety_score: interaction.risk.safety_rating(),
                }))
            }
            _ => None,
        }
    }
}

fn percentage(saving: f64, original_cost: f64) -> f64 {
    if original_cost > 0.0 {
        saving / original_cost * 100.0
    } else {
        0.0
    }
}
