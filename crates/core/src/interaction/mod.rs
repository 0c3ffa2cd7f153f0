//! Interaction risk between two drugs.
//!
//! Risk is derived from the free-text interaction descriptions on either
//! drug. A description naming the other drug is handed to a zero-shot
//! classifier that ranks it against `"high risk"` and `"low risk"`.

mod classifier;

pub use classifier::InteractionClassifier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::drug::{Drug, InteractionParseError};

pub const HIGH_RISK_LABEL: &str = "high risk";
pub const LOW_RISK_LABEL: &str = "low risk";
pub const CANDIDATE_LABELS: [&str; 2] = [HIGH_RISK_LABEL, LOW_RISK_LABEL];

pub const EVIDENCE_NO_INTERACTION: &str = "No interaction found.";
pub const EVIDENCE_UNPARSEABLE: &str = "Could not parse interaction data.";
pub const EVIDENCE_MODEL_UNAVAILABLE: &str = "NLP model not available.";

/// Ranks candidate labels for a piece of text, most likely first.
#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    async fn rank_labels(&self, text: &str, candidate_labels: &[&str]) -> anyhow::Result<Vec<String>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RiskLevel {
    None,
    Low,
    High,
}

impl RiskLevel {
    pub fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::High => 2,
        }
    }

    pub fn as_feature(self) -> f64 {
        f64::from(self.level())
    }

    /// Safety rating shown alongside a recommended combination.
    pub fn safety_rating(self) -> SafetyRating {
        match self {
            Self::None => SafetyRating::High,
            Self::Low => SafetyRating::Medium,
            Self::High => SafetyRating::Low,
        }
    }
}

impl From<RiskLevel> for u8 {
    fn from(value: RiskLevel) -> Self {
        value.level()
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Low),
            2 => Ok(Self::High),
            other => Err(format!("interaction risk must be 0, 1 or 2 (got {other})")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyRating {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionAssessment {
    pub risk: RiskLevel,
    pub evidence: String,
}

impl InteractionAssessment {
    pub fn none() -> Self {
        Self { risk: RiskLevel::None, evidence: EVIDENCE_NO_INTERACTION.to_string() }
    }

    pub fn unparseable() -> Self {
        Self { risk: RiskLevel::Low, evidence: EVIDENCE_UNPARSEABLE.to_string() }
    }

    pub fn model_unavailable() -> Self {
        Self { risk: RiskLevel::None, evidence: EVIDENCE_MODEL_UNAVAILABLE.to_string() }
    }
}

/// First description on `x` naming `y`, else the first on `y` naming `x`.
///
/// Names match case-insensitively on either `drug_name` or `generic_name`.
/// An unreadable field on `x` stops the search before `y` is consulted.
pub fn find_interaction_text(x: &Drug, y: &Drug) -> Result<Option<String>, InteractionParseError> {
    for entry in x.drug_interactions.entries()? {
        if mentions(entry, y) {
            return Ok(Some(entry.to_string()));
        }
    }
    for entry in y.drug_interactions.entries()? {
        if mentions(entry, x) {
            return Ok(Some(entry.to_string()));
        }
    }
    Ok(None)
}

fn mentions(description: &str, drug: &Drug) -> bool {
    let description = description.to_lowercase();
    [&drug.drug_name, &drug.generic_name]
        .into_iter()
        .map(|name| name.trim().to_lowercase())
        .any(|name| !name.is_empty() && description.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::{find_interaction_text, RiskLevel, SafetyRating};
    use crate::domain::drug::Drug;

    #[test]
    fn finds_description_on_either_side() {
        let warfarin = Drug::new("COUMADIN", "WARFARIN", "Anticoagulants", "AB", 30.0)
            .with_interactions(["Aspirin increases risk of bleeding"]);
        let aspirin = Drug::new("BAYER", "ASPIRIN", "Analgesics", "AB", 2.0);

        let forward = find_interaction_text(&warfarin, &aspirin).expect("parseable");
        let backward = find_interaction_text(&aspirin, &warfarin).expect("parseable");

        assert_eq!(forward.as_deref(), Some("Aspirin increases risk of bleeding"));
        assert_eq!(backward, forward);
    }

    #[test]
    fn matches_brand_name_case_insensitively() {
        let a = Drug::new("A", "X", "C", "AB", 1.0)
            .with_interactions(["coumadin levels rise sharply"]);
        let b = Drug::new("COUMADIN", "WARFARIN", "C", "AB", 1.0);

        assert!(find_interaction_text(&a, &b).expect("parseable").is_some());
    }

    #[test]
    fn no_description_yields_none() {
        let a = Drug::new("A", "X", "C", "AB", 1.0).with_interactions(["unrelated note"]);
        let b = Drug::new("B", "Y", "C", "AB", 1.0);

        assert_eq!(find_interaction_text(&a, &b).expect("parseable"), None);
    }

    #[test]
    fn malformed_field_is_an_error() {
        let a = Drug::new("A", "X", "C", "AB", 1.0).with_raw_interactions("['broken");
        let b = Drug::new("B", "Y", "C", "AB", 1.0);

        assert!(find_interaction_text(&a, &b).is_err());
        assert!(find_interaction_text(&b, &a).is_err());
    }

    #[test]
    fn risk_levels_map_to_features_and_ratings() {
        assert_eq!(RiskLevel::None.as_feature(), 0.0);
        assert_eq!(RiskLevel::High.as_feature(), 2.0);
        assert_eq!(RiskLevel::Low.safety_rating(), SafetyRating::Medium);
        assert_eq!(RiskLevel::try_from(3), Err("interaction risk must be 0, 1 or 2 (got 3)".to_string()));
    }
}
