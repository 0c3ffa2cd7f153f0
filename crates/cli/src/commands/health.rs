use rxalt_core::ApplicationError;

use crate::commands::{build_service, read_model, runtime, to_data, CommandResult, GlobalOptions};

/// Reports dataset, model and classifier readiness. A persisted model is
/// loaded when present; nothing is trained.
pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("health", error),
    };
    let runtime = match runtime("health") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        if let Some(path) = config.training.model_path.as_deref().filter(|path| path.exists()) {
            service.install_model(read_model(path)?);
        }
        Ok::<_, ApplicationError>(service.health().await)
    });

    match result {
        Ok(health) => {
            let status = if health.model_loaded && health.data_loaded { "healthy" } else { "degraded" };
            CommandResult::success_with(
                "health",
                format!(
                    "{status}: {} drugs, model {}, nlp {}",
                    health.drug_count,
                    if health.model_loaded { "loaded" } else { "not trained" },
                    if health.nlp_available { "available" } else { "unavailable" },
                ),
                to_data(&health),
            )
        }
        Err(error) => CommandResult::from_application_error("health", error),
    }
}
