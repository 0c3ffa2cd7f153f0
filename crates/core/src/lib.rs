pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod interaction;
pub mod ml;
pub mod recommend;
pub mod service;

pub use catalog::{CatalogError, CatalogStats, ClassCount, DrugCatalog, RawDrugRecord};
pub use config::AppConfig;
pub use domain::drug::{Drug, DrugName, InteractionField};
pub use errors::{ApplicationError, InterfaceError};
pub use interaction::{
    InteractionAssessment, InteractionClassifier, RiskLevel, SafetyRating, ZeroShotClassifier,
};
pub use ml::{
    FeatureVector, HeuristicScorer, ScoringModel, TrainedModel, TrainingError, TrainingExample,
    TrainingParams,
};
pub use recommend::{
    NoRecommendationReason, Recommendation, RecommendationAnalysis, RecommendationEngine,
    RecommendError, ScoredDrug,
};
pub use service::{HealthStatus, RecommendationReport, RecommenderService};
