pub mod add_drug;
pub mod classify;
pub mod config;
pub mod dataset;
pub mod health;
pub mod recommend;
pub mod train;

use std::fs;
use std::path::{Path, PathBuf};

use rxalt_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use rxalt_core::errors::ApplicationError;
use rxalt_core::ml::TrainedModel;
use rxalt_core::service::RecommenderService;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let exit_code = match &error {
            ApplicationError::Configuration(_) => 2,
            ApplicationError::Dataset(_) => 4,
            ApplicationError::Training(_) => 5,
            ApplicationError::Recommend(rxalt_core::RecommendError::NotFound { .. }) => 6,
            ApplicationError::Recommend(rxalt_core::RecommendError::ModelNotReady) => 7,
            ApplicationError::Recommend(rxalt_core::RecommendError::NoInput)
            | ApplicationError::InvalidInput(_) => 8,
        };
        Self::failure(command, error.class(), error.to_string(), exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn to_data(value: &impl Serialize) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Options shared by every command.
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub dataset_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn load_config(&self) -> Result<AppConfig, ApplicationError> {
        let options = LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: ConfigOverrides {
                dataset_path: self.dataset_path.clone(),
                model_path: self.model_path.clone(),
                ..ConfigOverrides::default()
            },
        };
        Ok(AppConfig::load(options)?)
    }
}

pub(crate) fn runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

pub(crate) fn build_service(config: &AppConfig) -> Result<RecommenderService, ApplicationError> {
    let backend = rxalt_nlp::build_classifier(&config.classifier);
    RecommenderService::from_config(config, backend)
}

/// Installs the persisted model when one exists, otherwise trains one.
pub(crate) async fn ensure_model(
    service: &RecommenderService,
    config: &AppConfig,
) -> Result<(), ApplicationError> {
    if let Some(path) = config.training.model_path.as_deref().filter(|path| path.exists()) {
        let model = read_model(path)?;
        info!(
            event_name = "rxalt.model.loaded",
            path = %path.display(),
            version = %model.version,
            "model loaded from disk"
        );
        service.install_model(model);
        return Ok(());
    }
    service.retrain().await?;
    Ok(())
}

pub(crate) fn read_model(path: &Path) -> Result<TrainedModel, ApplicationError> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ApplicationError::Training(format!("could not read model `{}`: {error}", path.display()))
    })?;
    Ok(TrainedModel::from_json(&raw)?)
}

pub(crate) fn write_model(path: &Path, model: &TrainedModel) -> Result<(), ApplicationError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| {
            ApplicationError::Training(format!("could not create `{}`: {error}", parent.display()))
        })?;
    }
    fs::write(path, model.to_json()?).map_err(|error| {
        ApplicationError::Training(format!("could not write model `{}`: {error}", path.display()))
    })
}
