use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rxalt_core::config::AppConfig;
use toml::Value;

use crate::commands::{CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: 2,
                output: format!("config validation failed: {error}"),
            }
        }
    };

    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: flag > env > file > default):".to_string()
    ];
    for (key, value, env_key, flag) in effective_values(&config, options) {
        let source = if flag {
            "flag".to_string()
        } else {
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
        };
        lines.push(render_line(key, &value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

type ConfigLine = (&'static str, String, &'static str, bool);

fn effective_values(config: &AppConfig, options: &GlobalOptions) -> Vec<ConfigLine> {
    let training = &config.training;
    let classifier = &config.classifier;
    vec![
        (
            "dataset.path",
            config.dataset.path.display().to_string(),
            "RXALT_DATASET_PATH",
            options.dataset_path.is_some(),
        ),
        (
            "classifier.provider",
            format!("{:?}", classifier.provider),
            "RXALT_CLASSIFIER_PROVIDER",
            false,
        ),
        (
            "classifier.endpoint",
            classifier.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
            "RXALT_CLASSIFIER_ENDPOINT",
            false,
        ),
        (
            "classifier.api_key",
            redact_secret(classifier.api_key.is_some()).to_string(),
            "RXALT_CLASSIFIER_API_KEY",
            false,
        ),
        ("classifier.model", classifier.model.clone(), "RXALT_CLASSIFIER_MODEL", false),
        (
            "classifier.timeout_secs",
            classifier.timeout_secs.to_string(),
            "RXALT_CLASSIFIER_TIMEOUT_SECS",
            false,
        ),
        (
            "classifier.max_concurrency",
            classifier.max_concurrency.to_string(),
            "RXALT_CLASSIFIER_MAX_CONCURRENCY",
            false,
        ),
        (
            "training.n_estimators",
            training.n_estimators.to_string(),
            "RXALT_TRAINING_N_ESTIMATORS",
            false,
        ),
        (
            "training.learning_rate",
            training.learning_rate.to_string(),
            "RXALT_TRAINING_LEARNING_RATE",
            false,
        ),
        ("training.max_depth", training.max_depth.to_string(), "RXALT_TRAINING_MAX_DEPTH", false),
        (
            "training.min_samples_leaf",
            training.min_samples_leaf.to_string(),
            "RXALT_TRAINING_MIN_SAMPLES_LEAF",
            false,
        ),
        (
            "training.test_fraction",
            training.test_fraction.to_string(),
            "RXALT_TRAINING_TEST_FRACTION",
            false,
        ),
        ("training.seed", training.seed.to_string(), "RXALT_TRAINING_SEED", false),
        (
            "training.model_path",
            training
                .model_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            "RXALT_TRAINING_MODEL_PATH",
            options.model_path.is_some(),
        ),
        ("logging.level", config.logging.level.clone(), "RXALT_LOGGING_LEVEL", false),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            "RXALT_LOGGING_FORMAT",
            false,
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["rxalt.toml", "config/rxalt.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, render_line};

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc: toml::Value = "[training]\nseed = 7\n".parse().expect("toml");
        assert!(contains_path(&doc, "training.seed"));
        assert!(!contains_path(&doc, "training.max_depth"));
        assert!(!contains_path(&doc, "classifier.provider"));
    }

    #[test]
    fn lines_name_their_source() {
        assert_eq!(
            render_line("training.seed", "7", "default".to_string()),
            "- training.seed = 7 (source: default)"
        );
    }
}
