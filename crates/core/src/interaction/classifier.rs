use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{
    find_interaction_text, InteractionAssessment, RiskLevel, ZeroShotClassifier, CANDIDATE_LABELS,
    HIGH_RISK_LABEL,
};
use crate::domain::drug::Drug;

type PairKey = (String, String);

fn pair_key(x: &Drug, y: &Drug) -> PairKey {
    if x.drug_name <= y.drug_name {
        (x.drug_name.clone(), y.drug_name.clone())
    } else {
        (y.drug_name.clone(), x.drug_name.clone())
    }
}

/// Classifies drug pairs, degrading instead of failing.
///
/// Definitive results are memoized by the unordered name pair. Timeouts and
/// backend errors are reported as `Low` risk and are not cached.
pub struct InteractionClassifier {
    backend: Option<Arc<dyn ZeroShotClassifier>>,
    timeout: Duration,
    cache: Mutex<HashMap<PairKey, InteractionAssessment>>,
}

impl InteractionClassifier {
    pub fn new(backend: Option<Arc<dyn ZeroShotClassifier>>, timeout: Duration) -> Self {
        if backend.is_none() {
            warn!(
                event_name = "rxalt.interaction.model_unavailable",
                "zero-shot classifier unavailable; interaction risk will be reported as 0"
            );
        }
        Self { backend, timeout, cache: Mutex::new(HashMap::new()) }
    }

    pub fn unavailable() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn cached_pairs(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn classify(&self, x: &Drug, y: &Drug) -> InteractionAssessment {
        let Some(backend) = self.backend.as_ref() else {
            return InteractionAssessment::model_unavailable();
        };

        let key = pair_key(x, y);
        if let Some(hit) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            debug!(drug_a = %key.0, drug_b = %key.1, "interaction cache hit");
            return hit.clone();
        }

        let description = match find_interaction_text(x, y) {
            Ok(Some(description)) => description,
            Ok(None) => return self.remember(key, InteractionAssessment::none()),
            Err(error) => {
                debug!(drug_a = %x.drug_name, drug_b = %y.drug_name, error = %error, "interaction field unreadable");
                return self.remember(key, InteractionAssessment::unparseable());
            }
        };

        match tokio::time::timeout(self.timeout, backend.rank_labels(&description, &CANDIDATE_LABELS))
            .await
        {
            Ok(Ok(labels)) => match labels.first() {
                Some(top) => {
                    let risk =
                        if top == HIGH_RISK_LABEL { RiskLevel::High } else { RiskLevel::Low };
                    self.remember(key, InteractionAssessment { risk, evidence: description })
                }
                None => {
                    warn!(
                        event_name = "rxalt.interaction.empty_ranking",
                        drug_a = %x.drug_name,
                        drug_b = %y.drug_name,
                        "classifier returned no labels"
                    );
                    InteractionAssessment::unparseable()
                }
            },
            Ok(Err(error)) => {
                warn!(
                    event_name = "rxalt.interaction.classifier_error",
                    drug_a = %x.drug_name,
                    drug_b = %y.drug_name,
                    error = %error,
                    "zero-shot classification failed"
                );
                InteractionAssessment::unparseable()
            }
            Err(_) => {
                warn!(
                    event_name = "rxalt.interaction.timeout",
                    drug_a = %x.drug_name,
                    drug_b = %y.drug_name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "zero-shot classification timed out"
                );
                InteractionAssessment::unparseable()
            }
        }
    }

    /// Classifies every pair on a worker pool of `max_concurrency` tasks.
    ///
    /// Output order matches input order. A task that dies is reported as an
    /// unparseable interaction; the remaining pairs still complete.
    pub async fn classify_all(
        self: &Arc<Self>,
        pairs: Vec<(Drug, Drug)>,
        max_concurrency: usize,
    ) -> Vec<InteractionAssessment> {
        let total = pairs.len();
        if !self.is_available() {
            return vec![InteractionAssessment::model_unavailable(); total];
        }

        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, (x, y)) in pairs.into_iter().enumerate() {
            let classifier = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, classifier.classify(&x, &y).await)
            });
        }

        let mut results: Vec<Option<InteractionAssessment>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, assessment)) => results[index] = Some(assessment),
                Err(error) => warn!(
                    event_name = "rxalt.interaction.task_failed",
                    error = %error,
                    "interaction classification task failed"
                ),
            }
        }

        results.into_iter().map(|result| result.unwrap_or_else(InteractionAssessment::unparseable)).collect()
    }

    fn remember(&self, key: PairKey, assessment: InteractionAssessment) -> InteractionAssessment {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).insert(key, assessment.clone());
        assessment
    }
}
