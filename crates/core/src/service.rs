//! Coordinator owning the catalog snapshot and the published model.
//!
//! The catalog sits behind an async `RwLock`: recommendation and training
//! hold a read guard for the whole computation, adding a drug takes the
//! write guard. The model is published as an `Arc` swapped under a short
//! synchronous lock, so a reader either sees the previous model or the new
//! one in full.

use std::sync::{Arc, PoisonError, RwLock as SyncRwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::catalog::{
    CatalogError, CatalogStats, ClassCount, CostAnalysis, DrugCatalog, RawDrugRecord,
};
use crate::config::AppConfig;
use crate::domain::drug::{Drug, DrugName};
use crate::errors::ApplicationError;
use crate::interaction::{InteractionAssessment, InteractionClassifier, ZeroShotClassifier};
use crate::ml::{self, TrainedModel, TrainingParams};
use crate::recommend::{Recommendation, RecommendationAnalysis, RecommendationEngine, RecommendError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub model_loaded: bool,
    pub data_loaded: bool,
    pub nlp_available: bool,
    pub drug_count: usize,
    pub model_version: Option<String>,
    pub validation_rmse: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationReport {
    pub original_drugs: Vec<Drug>,
    pub recommendation: Recommendation,
    pub analysis: Option<RecommendationAnalysis>,
    /// Requested names absent from the dataset when others were found.
    pub missing: Vec<String>,
}

pub struct RecommenderService {
    catalog: RwLock<DrugCatalog>,
    model: SyncRwLock<Option<Arc<TrainedModel>>>,
    classifier: Arc<InteractionClassifier>,
    training: TrainingParams,
    max_concurrency: usize,
}

impl RecommenderService {
    pub fn new(
        catalog: DrugCatalog,
        classifier: Arc<InteractionClassifier>,
        training: TrainingParams,
        max_concurrency: usize,
    ) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            model: SyncRwLock::new(None),
            classifier,
            training,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Loads the configured dataset. `backend` is `None` when no zero-shot
    /// classifier could be built.
    pub fn from_config(
        config: &AppConfig,
        backend: Option<Arc<dyn ZeroShotClassifier>>,
    ) -> Result<Self, ApplicationError> {
        let catalog = DrugCatalog::from_json_path(&config.dataset.path)?;
        info!(
            event_name = "rxalt.catalog.loaded",
            path = %config.dataset.path.display(),
            drugs = catalog.len(),
            "drug dataset loaded"
        );
        let classifier = Arc::new(InteractionClassifier::new(
            backend,
            Duration::from_secs(config.classifier.timeout_secs),
        ));
        Ok(Self::new(
            catalog,
            classifier,
            TrainingParams::from(&config.training),
            config.classifier.max_concurrency,
        ))
    }

    pub fn classifier(&self) -> &Arc<InteractionClassifier> {
        &self.classifier
    }

    pub fn model(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publishes `model`, replacing any previous one.
    pub fn install_model(&self, model: TrainedModel) -> Arc<TrainedModel> {
        let model = Arc::new(model);
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&model));
        info!(
            event_name = "rxalt.model.published",
            version = %model.version,
            "model published"
        );
        model
    }

    /// Synthesizes a corpus from the current snapshot and publishes the
    /// resulting model.
    pub async fn retrain(&self) -> Result<Arc<TrainedModel>, ApplicationError> {
        let catalog = self.catalog.read().await;
        let examples = ml::synthesize(&catalog, &self.classifier, self.max_concurrency).await?;
        let model = ml::train(&examples, &self.training)?;
        drop(catalog);
        Ok(self.install_model(model))
    }

    pub async fn recommend(
        &self,
        names: &[String],
    ) -> Result<RecommendationReport, ApplicationError> {
        if names.iter().all(|name| name.trim().is_empty()) {
            return Err(RecommendError::NoInput.into());
        }
        let model = self.model().ok_or(RecommendError::ModelNotReady)?;

        let catalog = self.catalog.read().await;
        let (originals, missing) = resolve(&catalog, names)?;
        let engine = RecommendationEngine::new(
            model.as_ref(),
            &catalog,
            &self.classifier,
            self.max_concurrency,
        );
        let recommendation = engine.recommend(&originals).await?;
        let analysis = RecommendationAnalysis::of(&originals, &recommendation);

        Ok(RecommendationReport { original_drugs: originals, recommendation, analysis, missing })
    }

    /// Classifies the interaction between two catalog drugs.
    pub async fn classify(
        &self,
        first: &str,
        second: &str,
    ) -> Result<InteractionAssessment, ApplicationError> {
        let catalog = self.catalog.read().await;
        let (drugs, missing) = resolve(&catalog, &[first.to_string(), second.to_string()])?;
        if !missing.is_empty() {
            return Err(RecommendError::NotFound { names: missing }.into());
        }
        match drugs.as_slice() {
            [x, y, ..] => Ok(self.classifier.classify(x, y).await),
            [only] => Ok(self.classifier.classify(only, only).await),
            [] => Err(RecommendError::NoInput.into()),
        }
    }

    /// Validates and appends a drug. The model is not retrained.
    pub async fn add_drug(&self, record: RawDrugRecord) -> Result<Drug, ApplicationError> {
        if record.ndc.as_deref().map_or(true, |ndc| ndc.trim().is_empty()) {
            return Err(CatalogError::InvalidRecord("missing required field: ndc".to_string()).into());
        }

        let mut catalog = self.catalog.write().await;
        let updated = catalog.with_record(record)?;
        let added = updated.drugs().last().cloned().ok_or_else(|| {
            ApplicationError::Dataset("catalog is empty after adding a drug".to_string())
        })?;
        *catalog = updated;

        info!(
            event_name = "rxalt.catalog.drug_added",
            drug_name = %added.drug_name,
            therapeutic_class = %added.therapeutic_class,
            drugs = catalog.len(),
            "drug added to dataset"
        );
        Ok(added)
    }

    pub async fn health(&self) -> HealthStatus {
        let drug_count = self.catalog.read().await.len();
        let model = self.model();
        HealthStatus {
            model_loaded: model.is_some(),
            data_loaded: drug_count > 0,
            nlp_available: self.classifier.is_available(),
            drug_count,
            model_version: model.as_ref().map(|model| model.version.clone()),
            validation_rmse: model.and_then(|model| model.validation_rmse),
        }
    }

    /// Current catalog snapshot.
    pub async fn snapshot(&self) -> DrugCatalog {
        self.catalog.read().await.clone()
    }

    pub async fn stats(&self) -> CatalogStats {
        self.catalog.read().await.stats()
    }

    pub async fn classes(&self) -> Vec<ClassCount> {
        self.catalog.read().await.classes()
    }

    pub async fn drugs(&self) -> Vec<Drug> {
        self.catalog.read().await.drugs().to_vec()
    }

    pub async fn cost_analysis(&self) -> CostAnalysis {
        self.catalog.read().await.cost_analysis()
    }
}

/// Resolves names in input order, skipping blanks and repeats.
fn resolve(
    catalog: &DrugCatalog,
    names: &[String],
) -> Result<(Vec<Drug>, Vec<String>), RecommendError> {
    let mut found: Vec<Drug> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for raw in names {
        let name = DrugName::canonical(raw);
        if name.as_str().is_empty() {
            continue;
        }
        match catalog.find(name.as_str()) {
            Some(drug) if found.iter().any(|known| known.drug_name == drug.drug_name) => {}
            Some(drug) => found.push(drug.clone()),
            None if missing.iter().any(|known| known == name.as_str()) => {}
            None => missing.push(name.0),
        }
    }

    if found.is_empty() {
        return Err(RecommendError::NotFound { names: missing });
    }
    if !missing.is_empty() {
        warn!(
            event_name = "rxalt.recommend.names_missing",
            missing = ?missing,
            "some requested drugs were not found"
        );
    }
    Ok((found, missing))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::RecommenderService;
    use crate::catalog::{DrugCatalog, RawDrugRecord};
    use crate::domain::drug::Drug;
    use crate::errors::ApplicationError;
    use crate::interaction::InteractionClassifier;
    use crate::ml::TrainingParams;
    use crate::recommend::{
        NoRecommendationReason, Recommendation, RecommendationAnalysis, RecommendError,
    };

    fn service(drugs: Vec<Drug>) -> RecommenderService {
        RecommenderService::new(
            DrugCatalog::new(drugs),
            Arc::new(InteractionClassifier::unavailable()),
            TrainingParams::default(),
            4,
        )
    }

    fn scenario() -> RecommenderService {
        service(vec![
            Drug::new("A", "X", "C", "AB", 100.0),
            Drug::new("B", "X", "C", "AB", 80.0),
            Drug::new("E", "Y", "C", "AB", 10.0),
            Drug::new("N", "Z", "D", "NA", 50.0),
            Drug::new("M", "Z", "D", "AB", 30.0),
        ])
    }

    #[tokio::test]
    async fn recommend_requires_a_trained_model() {
        let service = scenario();

        let result = service.recommend(&["A".to_string()]).await;

        assert_eq!(result, Err(ApplicationError::Recommend(RecommendError::ModelNotReady)));
        assert!(!service.health().await.model_loaded);
    }

    #[tokio::test]
    async fn retrained_model_recommends_cheaper_same_generic() {
        let service = scenario();
        service.retrain().await.expect("model");

        let report = service.recommend(&[" a ".to_string()]).await.expect("report");

        let Recommendation::Single(scored) = &report.recommendation else {
            panic!("expected single recommendation, got {:?}", report.recommendation);
        };
        assert_eq!(scored.drug.drug_name, "B");
        let Some(RecommendationAnalysis::SingleDrug(analysis)) = report.analysis else {
            panic!("expected single-drug analysis");
        };
        assert_eq!(analysis.cost_saving_per_member, 20.0);
        assert!(analysis.generic_match);
    }

    #[tokio::test]
    async fn non_substitutable_query_is_not_an_error() {
        let service = scenario();
        service.retrain().await.expect("model");

        let report = service.recommend(&["N".to_string()]).await.expect("report");

        assert_eq!(
            report.recommendation,
            Recommendation::NoEligibleCandidate(NoRecommendationReason::NonSubstitutable {
                drug_name: "N".into()
            })
        );
        assert_eq!(report.analysis, None);
    }

    #[tokio::test]
    async fn unknown_names_are_not_found_and_partial_matches_proceed() {
        let service = scenario();
        service.retrain().await.expect("model");

        let none_found = service.recommend(&["NOPE".to_string(), "nada".to_string()]).await;
        assert_eq!(
            none_found,
            Err(ApplicationError::Recommend(RecommendError::NotFound {
                names: vec!["NOPE".into(), "NADA".into()]
            }))
        );

        let partial = service
            .recommend(&["nope".to_string(), "A".to_string()])
            .await
            .expect("partial report");
        assert_eq!(partial.original_drugs.len(), 1);
        assert_eq!(partial.missing, vec!["NOPE".to_string()]);
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let service = scenario();

        let result = service.recommend(&[" ".to_string()]).await;

        assert_eq!(result, Err(ApplicationError::Recommend(RecommendError::NoInput)));
    }

    #[tokio::test]
    async fn retrain_without_pairs_fails() {
        let service = service(vec![
            Drug::new("A", "X", "C1", "AB", 1.0),
            Drug::new("B", "Y", "C2", "AB", 1.0),
        ]);

        let result = service.retrain().await;

        assert!(matches!(result, Err(ApplicationError::Training(_))));
        assert!(service.model().is_none());
    }

    #[tokio::test]
    async fn added_drug_is_visible_after_retrain() {
        let service = service(vec![Drug::new("A", "X", "C", "AB", 100.0)]);
        let record: RawDrugRecord = serde_json::from_value(json!({
            "ndc": "0001-0002",
            "drug_name": "a-generic",
            "generic_name": "x",
            "therapeutic_class": "C",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": "$60.00"
        }))
        .expect("record");

        let added = service.add_drug(record).await.expect("added");
        assert_eq!(added.drug_name, "A-GENERIC");
        assert_eq!(service.stats().await.total_drugs, 2);

        service.retrain().await.expect("model");
        let report = service.recommend(&["A".to_string()]).await.expect("report");
        let recommended: Vec<_> =
            report.recommendation.recommended_drugs().into_iter().map(|d| d.drug_name.clone()).collect();
        assert_eq!(recommended, vec!["A-GENERIC".to_string()]);
    }

    #[tokio::test]
    async fn add_drug_requires_ndc() {
        let service = scenario();
        let record: RawDrugRecord = serde_json::from_value(json!({
            "drug_name": "new",
            "generic_name": "x",
            "therapeutic_class": "C",
            "pmpm_cost": 1.0
        }))
        .expect("record");

        let result = service.add_drug(record).await;

        assert!(matches!(result, Err(ApplicationError::InvalidInput(ref message)) if message.contains("ndc")));
        assert_eq!(service.stats().await.total_drugs, 5);
    }

    #[tokio::test]
    async fn health_reports_degraded_classifier() {
        let service = scenario();
        service.retrain().await.expect("model");

        let health = service.health().await;

        assert!(health.model_loaded);
        assert!(health.data_loaded);
        assert!(!health.nlp_available);
        assert_eq!(health.drug_count, 5);
        assert!(health.model_version.is_some());
    }

    #[tokio::test]
    async fn classify_reports_missing_names() {
        let service = scenario();

        let result = service.classify("A", "GHOST").await;

        assert_eq!(
            result,
            Err(ApplicationError::Recommend(RecommendError::NotFound {
                names: vec!["GHOST".into()]
            }))
        );
    }
}
