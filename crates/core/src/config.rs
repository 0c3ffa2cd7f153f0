use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub classifier: ClassifierConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub provider: ClassifierProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub test_fraction: f64,
    pub seed: u64,
    /// Where `train` writes the model and `recommend` reads it from.
    pub model_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierProvider {
    /// Hosted zero-shot inference endpoint.
    Http,
    /// Offline cue-word ranking.
    Keyword,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub dataset_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub classifier_provider: Option<ClassifierProvider>,
    pub classifier_endpoint: Option<String>,
    pub classifier_max_concurrency: Option<usize>,
    pub training_seed: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig { path: PathBuf::from("data/drugs.json") },
            classifier: ClassifierConfig {
                provider: ClassifierProvider::Keyword,
                endpoint: None,
                api_key: None,
                model: "facebook/bart-large-mnli".to_string(),
                timeout_secs: 10,
                max_concurrency: 8,
            },
            training: TrainingConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_leaf: 1,
            test_fraction: 0.2,
            seed: 42,
            model_path: None,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ClassifierProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "keyword" => Ok(Self::Keyword),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier provider `{other}` (expected http|keyword|disabled)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rxalt.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(dataset) = patch.dataset {
            if let Some(path) = dataset.path {
                self.dataset.path = path;
            }
        }

        if let Some(classifier) = patch.classifier {
            if let Some(provider) = classifier.provider {
                self.classifier.provider = provider;
            }
            if let Some(endpoint) = classifier.endpoint {
                self.classifier.endpoint = Some(endpoint);
            }
            if let Some(api_key_value) = classifier.api_key {
                self.classifier.api_key = Some(secret_value(api_key_value));
            }
            if let Some(model) = classifier.model {
                self.classifier.model = model;
            }
            if let Some(timeout_secs) = classifier.timeout_secs {
                self.classifier.timeout_secs = timeout_secs;
            }
            if let Some(max_concurrency) = classifier.max_concurrency {
                self.classifier.max_concurrency = max_concurrency;
            }
        }

        if let Some(training) = patch.training {
            if let Some(n_estimators) = training.n_estimators {
                self.training.n_estimators = n_estimators;
            }
            if let Some(learning_rate) = training.learning_rate {
                self.training.learning_rate = learning_rate;
            }
            if let Some(max_depth) = training.max_depth {
                self.training.max_depth = max_depth;
            }
            if let Some(min_samples_leaf) = training.min_samples_leaf {
                self.training.min_samples_leaf = min_samples_leaf;
            }
            if let Some(test_fraction) = training.test_fraction {
                self.training.test_fraction = test_fraction;
            }
            if let Some(seed) = training.seed {
                self.training.seed = seed;
            }
            if let Some(model_path) = training.model_path {
                self.training.model_path = Some(model_path);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RXALT_DATASET_PATH") {
            self.dataset.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("RXALT_CLASSIFIER_PROVIDER") {
            self.classifier.provider = value.parse()?;
        }
        if let Some(value) = read_env("RXALT_CLASSIFIER_ENDPOINT") {
            self.classifier.endpoint = Some(value);
        }
        if let Some(value) = read_env("RXALT_CLASSIFIER_API_KEY") {
            self.classifier.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("RXALT_CLASSIFIER_MODEL") {
            self.classifier.model = value;
        }
        if let Some(value) = read_env("RXALT_CLASSIFIER_TIMEOUT_SECS") {
            self.classifier.timeout_secs = parse_u64("RXALT_CLASSIFIER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RXALT_CLASSIFIER_MAX_CONCURRENCY") {
            self.classifier.max_concurrency =
                parse_usize("RXALT_CLASSIFIER_MAX_CONCURRENCY", &value)?;
        }

        if let Some(value) = read_env("RXALT_TRAINING_N_ESTIMATORS") {
            self.training.n_estimators = parse_usize("RXALT_TRAINING_N_ESTIMATORS", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_LEARNING_RATE") {
            self.training.learning_rate = parse_f64("RXALT_TRAINING_LEARNING_RATE", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_MAX_DEPTH") {
            self.training.max_depth = parse_usize("RXALT_TRAINING_MAX_DEPTH", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_MIN_SAMPLES_LEAF") {
            self.training.min_samples_leaf =
                parse_usize("RXALT_TRAINING_MIN_SAMPLES_LEAF", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_TEST_FRACTION") {
            self.training.test_fraction = parse_f64("RXALT_TRAINING_TEST_FRACTION", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_SEED") {
            self.training.seed = parse_u64("RXALT_TRAINING_SEED", &value)?;
        }
        if let Some(value) = read_env("RXALT_TRAINING_MODEL_PATH") {
            self.training.model_path = Some(PathBuf::from(value));
        }

        let log_level = read_env("RXALT_LOGGING_LEVEL").or_else(|| read_env("RXALT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RXALT_LOGGING_FORMAT").or_else(|| read_env("RXALT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dataset_path) = overrides.dataset_path {
            self.dataset.path = dataset_path;
        }
        if let Some(model_path) = overrides.model_path {
            self.training.model_path = Some(model_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(provider) = overrides.classifier_provider {
            self.classifier.provider = provider;
        }
        if let Some(endpoint) = overrides.classifier_endpoint {
            self.classifier.endpoint = Some(endpoint);
        }
        if let Some(max_concurrency) = overrides.classifier_max_concurrency {
            self.classifier.max_concurrency = max_concurrency;
        }
        if let Some(seed) = overrides.training_seed {
            self.training.seed = seed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_dataset(&self.dataset)?;
        validate_classifier(&self.classifier)?;
        validate_training(&self.training)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rxalt.toml"), PathBuf::from("config/rxalt.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_dataset(dataset: &DatasetConfig) -> Result<(), ConfigError> {
    if dataset.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("dataset.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_classifier(classifier: &ClassifierConfig) -> Result<(), ConfigError> {
    if classifier.timeout_secs == 0 || classifier.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "classifier.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if classifier.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "classifier.max_concurrency must be greater than zero".to_string(),
        ));
    }

    if classifier.provider == ClassifierProvider::Http {
        let endpoint = classifier.endpoint.as_deref().map(str::trim).unwrap_or_default();
        if endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "classifier.endpoint is required for the http provider".to_string(),
            ));
        }
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "classifier.endpoint must start with http:// or https://".to_string(),
            ));
        }
        let blank_key = classifier
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_key {
            return Err(ConfigError::Validation(
                "classifier.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_training(training: &TrainingConfig) -> Result<(), ConfigError> {
    if training.n_estimators == 0 {
        return Err(ConfigError::Validation(
            "training.n_estimators must be greater than zero".to_string(),
        ));
    }
    if !(training.learning_rate > 0.0 && training.learning_rate <= 1.0) {
        return Err(ConfigError::Validation(
            "training.learning_rate must be in range (0, 1]".to_string(),
        ));
    }
    if training.max_depth == 0 {
        return Err(ConfigError::Validation(
            "training.max_depth must be greater than zero".to_string(),
        ));
    }
    if training.min_samples_leaf == 0 {
        return Err(ConfigError::Validation(
            "training.min_samples_leaf must be greater than zero".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&training.test_fraction) {
        return Err(ConfigError::Validation(
            "training.test_fraction must be in range [0, 1)".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    dataset: Option<DatasetPatch>,
    classifier: Option<ClassifierPatch>,
    training: Option<TrainingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatasetPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    provider: Option<ClassifierProvider>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TrainingPatch {
    n_estimators: Option<usize>,
    learning_rate: Option<f64>,
    max_depth: Option<usize>,
    min_samples_leaf: Option<usize>,
    test_fraction: Option<f64>,
    seed: Option<u64>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
