use serde_json::json;

use crate::commands::{build_service, runtime, write_model, CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("train", error),
    };
    let runtime = match runtime("train") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        let model = service.retrain().await?;
        if let Some(path) = config.training.model_path.as_deref() {
            write_model(path, &model)?;
        }
        Ok::<_, rxalt_core::ApplicationError>(model)
    });

    match result {
        Ok(model) => {
            let saved_to = config.training.model_path.as_ref().map(|path| path.display().to_string());
            let message = match &saved_to {
                Some(path) => format!("trained model {} saved to {path}", model.version),
                None => format!("trained model {} (not persisted)", model.version),
            };
            let data = json!({
                "version": model.version,
                "trained_at": model.trained_at,
                "training_samples": model.training_samples,
                "validation_samples": model.validation_samples,
                "validation_rmse": model.validation_rmse,
                "trees": model.tree_count(),
                "model_path": saved_to,
            });
            CommandResult::success_with("train", message, Some(data))
        }
        Err(error) => CommandResult::from_application_error("train", error),
    }
}
