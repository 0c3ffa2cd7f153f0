//! Recommendation engine
//!
//! Answers two query shapes against a catalog snapshot and a scoring model.
//! A single drug is matched to the best-scoring other drug of its class. A
//! pair of drugs is matched to the best-scoring pair from the cross product
//! of their candidate sets, where both members of each candidate pair are
//! scored with the pair's shared interaction risk.

mod analysis;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::DrugCatalog;
use crate::domain::drug::Drug;
use crate::interaction::{InteractionAssessment, InteractionClassifier, RiskLevel};
use crate::ml::features::build_features;
use crate::ml::ScoringModel;

pub use analysis::{CombinationAnalysis, RecommendationAnalysis, SingleDrugAnalysis};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecommendError {
    #[error("no drug names provided")]
    NoInput,
    #[error("drugs not found in dataset: {}", names.join(", "))]
    NotFound { names: Vec<String> },
    #[error("recommendation model is not trained")]
    ModelNotReady,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredDrug {
    pub drug: Drug,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoRecommendationReason {
    NonSubstitutable { drug_name: String },
    DuplicateCombination { generic_name: String, therapeutic_class: String },
    EmptyCandidateSet,
}

impl fmt::Display for NoRecommendationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonSubstitutable { drug_name } => {
                write!(f, "{drug_name} has no therapeutic equivalent")
            }
            Self::DuplicateCombination { generic_name, therapeutic_class } => write!(
                f,
                "both drugs are {generic_name} in {therapeutic_class} and cannot be substituted as a pair"
            ),
            Self::EmptyCandidateSet => write!(f, "no eligible candidates in the therapeutic class"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Recommendation {
    Single(ScoredDrug),
    Combination {
        first: ScoredDrug,
        second: ScoredDrug,
        total_score: f64,
        interaction: InteractionAssessment,
    },
    NoEligibleCandidate(NoRecommendationReason),
}

impl Recommendation {
    pub fn recommended_drugs(&self) -> Vec<&Drug> {
        match self {
            Self::Single(scored) => vec![&scored.drug],
            Self::Combination { first, second, .. } => vec![&first.drug, &second.drug],
            Self::NoEligibleCandidate(_) => Vec::new(),
        }
    }
}

/// Resolved query shape. Inputs beyond the second are ignored.
#[derive(Clone, Copy, Debug)]
pub enum Query<'a> {
    Single(&'a Drug),
    Combination(&'a Drug, &'a Drug),
}

impl<'a> Query<'a> {
    pub fn from_inputs(inputs: &'a [Drug]) -> Result<Self, RecommendError> {
        match inputs {
            [] => Err(RecommendError::NoInput),
            [only] => Ok(Self::Single(only)),
            [first, second, ..] => Ok(Self::Combination(first, second)),
        }
    }
}

/// Candidate pair with the score of each member and the pair's shared risk.
#[derive(Clone, Debug, PartialEq)]
pub struct CombinationScore {
    pub first: ScoredDrug,
    pub second: ScoredDrug,
    pub interaction: InteractionAssessment,
}

impl CombinationScore {
    pub fn total(&self) -> f64 {
        self.first.score + self.second.score
    }
}

/// Query-scoped collaborators shared by both query shapes.
pub struct RecommendationEngine<'a> {
    model: &'a dyn ScoringModel,
    catalog: &'a DrugCatalog,
    classifier: &'a Arc<InteractionClassifier>,
    max_concurrency: usize,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(
        model: &'a dyn ScoringModel,
        catalog: &'a DrugCatalog,
        classifier: &'a Arc<InteractionClassifier>,
        max_concurrency: usize,
    ) -> Self {
        Self { model, catalog, classifier, max_concurrency }
    }

    pub async fn recommend(&self, inputs: &[Drug]) -> Result<Recommendation, RecommendError> {
        let recommendation = match Query::from_inputs(inputs)? {
            Query::Single(original) => self.recommend_single(original),
            Query::Combination(first, second) => self.recommend_combination(first, second).await,
        };

        if let Recommendation::NoEligibleCandidate(reason) = &recommendation {
            info!(
                event_name = "rxalt.recommend.no_candidate",
                reason = %reason,
                "no recommendation produced"
            );
        }
        Ok(recommendation)
    }

    pub fn recommend_single(&self, original: &Drug) -> Recommendation {
        if !original.is_substitutable() {
            return Recommendation::NoEligibleCandidate(NoRecommendationReason::NonSubstitutable {
                drug_name: original.drug_name.clone(),
            });
        }

        let mut best: Option<ScoredDrug> = None;
        for candidate in self.catalog.in_class(&original.therapeutic_class) {
            if candidate.drug_name == original.drug_name {
                continue;
            }
            let features = build_features(original, candidate, RiskLevel::None);
            let score = self.model.predict(&features);
            if best.as_ref().map_or(true, |current| score > current.score) {
                best = Some(ScoredDrug { drug: candidate.clone(), score });
            }
        }

        match best {
            Some(scored) => {
                debug!(
                    event_name = "rxalt.recommend.single",
                    original = %original.drug_name,
                    recommended = %scored.drug.drug_name,
                    score = scored.score,
                    "single-drug recommendation selected"
                );
                Recommendation::Single(scored)
            }
            None => Recommendation::NoEligibleCandidate(NoRecommendationReason::EmptyCandidateSet),
        }
    }

    pub async fn recommend_combination(&self, first: &Drug, second: &Drug) -> Recommendation {
        if first.is_same_compound(second) {
            return Recommendation::NoEligibleCandidate(
                NoRecommendationReason::DuplicateCombination {
                    generic_name: first.generic_name.clone(),
                    therapeutic_class: first.therapeutic_class.clone(),
                },
            );
        }

        let scored = self.score_combinations(first, second).await;
        let mut best: Option<CombinationScore> = None;
        for candidate in scored {
            if best.as_ref().map_or(true, |current| candidate.total() > current.total()) {
                best = Some(candidate);
            }
        }

        match best {
            Some(best) => {
                debug!(
                    event_name = "rxalt.recommend.combination",
                    first = %best.first.drug.drug_name,
                    second = %best.second.drug.drug_name,
                    total_score = best.total(),
                    risk = best.interaction.risk.level(),
                    "combination recommendation selected"
                );
                Recommendation::Combination {
                    total_score: best.total(),
                    first: best.first,
                    second: best.second,
                    interaction: best.interaction,
                }
            }
            None => Recommendation::NoEligibleCandidate(NoRecommendationReason::EmptyCandidateSet),
        }
    }

    /// Scores every pair of the two candidate sets, in enumeration order.
    pub async fn score_combinations(&self, first: &Drug, second: &Drug) -> Vec<CombinationScore> {
        let first_candidates = self.candidate_set(first);
        let second_candidates = self.candidate_set(second);

        let pairs: Vec<(Drug, Drug)> = first_candidates
            .iter()
            .flat_map(|c1| second_candidates.iter().map(move |c2| (c1.clone(), c2.clone())))
            .collect();
        let assessments = self.classifier.classify_all(pairs.clone(), self.max_concurrency).await;

        pairs
            .into_iter()
            .zip(assessments)
            .map(|((c1, c2), interaction)| {
                let first_score = self.model.predict(&build_features(first, &c1, interaction.risk));
                let second_score =
                    self.model.predict(&build_features(second, &c2, interaction.risk));
                CombinationScore {
                    first: ScoredDrug { drug: c1, score: first_score },
                    second: ScoredDrug { drug: c2, score: second_score },
                    interaction,
                }
            })
            .collect()
    }

    /// A non-substitutable drug is held fixed; otherwise its whole class,
    /// itself included, is eligible.
    fn candidate_set(&self, drug: &Drug) -> Vec<Drug> {
        if drug.is_substitutable() {
            self.catalog.in_class(&drug.therapeutic_class).cloned().collect()
        } else {
            vec![drug.clone()]
        }
    }
}
