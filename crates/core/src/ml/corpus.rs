//! Labelled training corpus built from same-class drug pairs.
//!
//! Every ordered pair `(a, b)` of distinct drugs within a therapeutic class
//! becomes one example describing `b` as a replacement for `a`. The label is
//! a hand-designed reward: a shared generic compound earns a base score plus
//! equivalence and savings bonuses, a different compound is heavily
//! penalized, and interaction risk outweighs any cost benefit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::features::{build_features, FeatureVector};
use super::TrainingError;
use crate::catalog::DrugCatalog;
use crate::domain::drug::Drug;
use crate::interaction::InteractionClassifier;

pub const SAME_GENERIC_BASE: f64 = 50.0;
pub const EQUIVALENCE_BONUS: f64 = 20.0;
pub const DIFFERENT_GENERIC_PENALTY: f64 = -1000.0;
pub const INTERACTION_PENALTY_PER_LEVEL: f64 = 500.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub drug_a: String,
    pub drug_b: String,
    pub features: FeatureVector,
    pub alternative_score: f64,
}

pub fn alternative_score(features: &FeatureVector) -> f64 {
    let mut score = if features.is_same_generic {
        SAME_GENERIC_BASE
            + if features.is_equivalent { EQUIVALENCE_BONUS } else { 0.0 }
            + features.cost_difference.max(0.0)
    } else {
        DIFFERENT_GENERIC_PENALTY
    };
    score -= INTERACTION_PENALTY_PER_LEVEL * features.interaction_risk.as_feature();
    score
}

/// Ordered pairs of distinct drug names within each therapeutic class.
pub fn same_class_pairs(catalog: &DrugCatalog) -> Vec<(Drug, Drug)> {
    let mut pairs = Vec::new();
    for (_, drugs) in catalog.partition_by_class() {
        for a in &drugs {
            for b in &drugs {
                if a.drug_name != b.drug_name {
                    pairs.push(((*a).clone(), (*b).clone()));
                }
            }
        }
    }
    pairs
}

pub async fn synthesize(
    catalog: &DrugCatalog,
    classifier: &Arc<InteractionClassifier>,
    max_concurrency: usize,
) -> Result<Vec<TrainingExample>, TrainingError> {
    let pairs = same_class_pairs(catalog);
    if pairs.is_empty() {
        return Err(TrainingError::EmptyCorpus);
    }

    let assessments = classifier.classify_all(pairs.clone(), max_concurrency).await;
    let examples: Vec<TrainingExample> = pairs
        .into_iter()
        .zip(assessments)
        .map(|((a, b), assessment)| {
            let features = build_features(&a, &b, assessment.risk);
            TrainingExample {
                alternative_score: alternative_score(&features),
                drug_a: a.drug_name,
                drug_b: b.drug_name,
                features,
            }
        })
        .collect();

    info!(
        event_name = "rxalt.corpus.synthesized",
        examples = examples.len(),
        classes = catalog.partition_by_class().len(),
        "training corpus synthesized"
    );
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{alternative_score, same_class_pairs, synthesize};
    use crate::catalog::DrugCatalog;
    use crate::domain::drug::Drug;
    use crate::interaction::{InteractionClassifier, RiskLevel, ZeroShotClassifier, HIGH_RISK_LABEL};
    use crate::ml::features::FeatureVector;
    use crate::ml::TrainingError;

    struct AlwaysHigh;

    #[async_trait]
    impl ZeroShotClassifier for AlwaysHigh {
        async fn rank_labels(&self, _text: &str, _labels: &[&str]) -> anyhow::Result<Vec<String>> {
            Ok(vec![HIGH_RISK_LABEL.to_string()])
        }
    }

    fn features(same: bool, equivalent: bool, cost: f64, risk: RiskLevel) -> FeatureVector {
        FeatureVector {
            is_same_generic: same,
            is_equivalent: equivalent,
            cost_difference: cost,
            interaction_risk: risk,
        }
    }

    #[test]
    fn label_rewards_generic_equivalence_and_savings() {
        assert_eq!(alternative_score(&features(true, true, 20.0, RiskLevel::None)), 90.0);
        assert_eq!(alternative_score(&features(true, false, 20.0, RiskLevel::None)), 70.0);
        assert_eq!(alternative_score(&features(true, true, -20.0, RiskLevel::None)), 70.0);
    }

    #[test]
    fn label_penalizes_switching_compound_and_interactions() {
        assert_eq!(alternative_score(&features(false, true, 500.0, RiskLevel::None)), -1000.0);
        assert_eq!(alternative_score(&features(false, true, 0.0, RiskLevel::High)), -2000.0);
        assert_eq!(alternative_score(&features(true, true, 0.0, RiskLevel::Low)), -430.0);
    }

    #[test]
    fn different_generic_always_scores_below_same_generic() {
        for risk in [RiskLevel::None, RiskLevel::Low, RiskLevel::High] {
            for cost in [-1_000.0, 0.0, 5_000.0] {
                let different = alternative_score(&features(false, true, cost, risk));
                assert!(different <= -1000.0 - 500.0 * risk.as_feature());
                let same_worst = alternative_score(&features(true, false, -1e6, RiskLevel::High));
                assert!(different < same_worst);
            }
        }
    }

    #[test]
    fn pairs_are_ordered_and_exclude_identity() {
        let catalog = DrugCatalog::new(vec![
            Drug::new("A", "X", "C", "AB", 100.0),
            Drug::new("B", "X", "C", "AB", 80.0),
            Drug::new("D", "Y", "C", "AB", 60.0),
            Drug::new("E", "Z", "OTHER", "AB", 10.0),
        ]);

        let pairs = same_class_pairs(&catalog);

        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|(a, b)| a.drug_name != b.drug_name));
        assert!(pairs.iter().all(|(a, b)| a.therapeutic_class == b.therapeutic_class));
        assert!(pairs.iter().any(|(a, b)| a.drug_name == "A" && b.drug_name == "B"));
        assert!(pairs.iter().any(|(a, b)| a.drug_name == "B" && b.drug_name == "A"));
    }

    #[tokio::test]
    async fn synthesize_fails_without_same_class_pairs() {
        let catalog = DrugCatalog::new(vec![
            Drug::new("A", "X", "C1", "AB", 1.0),
            Drug::new("B", "Y", "C2", "AB", 1.0),
        ]);
        let classifier = Arc::new(InteractionClassifier::unavailable());

        let result = synthesize(&catalog, &classifier, 4).await;

        assert!(matches!(result, Err(TrainingError::EmptyCorpus)));
    }

    #[tokio::test]
    async fn synthesize_bakes_interaction_risk_into_labels() {
        let catalog = DrugCatalog::new(vec![
            Drug::new("A", "X", "C", "AB", 100.0),
            Drug::new("B", "X", "C", "AB", 80.0)
                .with_interactions(["B increases risk of bleeding when combined with A"]),
        ]);
        let classifier = Arc::new(InteractionClassifier::new(
            Some(Arc::new(AlwaysHigh)),
            Duration::from_secs(1),
        ));

        let examples = synthesize(&catalog, &classifier, 2).await.expect("corpus");

        assert_eq!(examples.len(), 2);
        let a_to_b = examples.iter().find(|e| e.drug_a == "A").expect("A -> B example");
        assert_eq!(a_to_b.features.interaction_risk, RiskLevel::High);
        assert_eq!(a_to_b.alternative_score, 50.0 + 20.0 + 20.0 - 1000.0);
        let b_to_a = examples.iter().find(|e| e.drug_a == "B").expect("B -> A example");
        assert_eq!(b_to_a.alternative_score, 50.0 + 20.0 - 1000.0);
    }
}
