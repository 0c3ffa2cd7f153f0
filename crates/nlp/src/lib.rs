//! Zero-shot label ranking backends for interaction risk classification.

pub mod http;
pub mod keyword;

use std::sync::Arc;
use std::time::Duration;

use rxalt_core::config::{ClassifierConfig, ClassifierProvider};
use rxalt_core::interaction::ZeroShotClassifier;
use tracing::{info, warn};

pub use http::HttpZeroShotClassifier;
pub use keyword::KeywordZeroShotClassifier;

/// Builds the configured backend. `None` means interaction risk degrades to
/// "model unavailable" for every pair.
pub fn build_classifier(config: &ClassifierConfig) -> Option<Arc<dyn ZeroShotClassifier>> {
    match config.provider {
        ClassifierProvider::Disabled => None,
        ClassifierProvider::Keyword => {
            info!(event_name = "rxalt.nlp.backend", provider = "keyword", "using keyword classifier");
            Some(Arc::new(KeywordZeroShotClassifier::default()))
        }
        ClassifierProvider::Http => {
            let Some(endpoint) = config.endpoint.as_deref() else {
                warn!(event_name = "rxalt.nlp.backend_failed", "http classifier has no endpoint");
                return None;
            };
            match HttpZeroShotClassifier::new(
                endpoint,
                &config.model,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            ) {
                Ok(classifier) => {
                    info!(
                        event_name = "rxalt.nlp.backend",
                        provider = "http",
                        model = %config.model,
                        "using hosted zero-shot classifier"
                    );
                    Some(Arc::new(classifier))
                }
                Err(error) => {
                    warn!(
                        event_name = "rxalt.nlp.backend_failed",
                        error = %error,
                        "could not initialise http classifier"
                    );
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rxalt_core::config::{AppConfig, ClassifierProvider};

    use super::build_classifier;

    #[test]
    fn disabled_provider_builds_nothing() {
        let mut config = AppConfig::default().classifier;
        config.provider = ClassifierProvider::Disabled;

        assert!(build_classifier(&config).is_none());
    }

    #[test]
    fn keyword_provider_is_always_available() {
        let config = AppConfig::default().classifier;

        assert!(build_classifier(&config).is_some());
    }

    #[test]
    fn http_provider_without_endpoint_degrades() {
        let mut config = AppConfig::default().classifier;
        config.provider = ClassifierProvider::Http;
        config.endpoint = None;

        assert!(build_classifier(&config).is_none());
    }

    #[test]
    fn http_provider_with_endpoint_builds() {
        let mut config = AppConfig::default().classifier;
        config.provider = ClassifierProvider::Http;
        config.endpoint = Some("http://127.0.0.1:9/models/{model}".to_string());

        assert!(build_classifier(&config).is_some());
    }
}
