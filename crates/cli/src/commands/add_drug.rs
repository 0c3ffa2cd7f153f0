use std::fs;

use rxalt_core::catalog::RawDrugRecord;
use rxalt_core::ApplicationError;
use serde_json::json;

use crate::commands::{build_service, runtime, write_model, CommandResult, GlobalOptions};

/// Adds a drug from a JSON record, writes the dataset back and retrains.
pub fn run(options: &GlobalOptions, record_json: &str, retrain: bool) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("add-drug", error),
    };
    let record: RawDrugRecord = match serde_json::from_str(record_json) {
        Ok(record) => record,
        Err(error) => {
            return CommandResult::failure(
                "add-drug",
                "invalid_input",
                format!("drug record is not valid JSON: {error}"),
                8,
            )
        }
    };
    let runtime = match runtime("add-drug") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        let drug = service.add_drug(record).await?;

        // Retrain first so a failed fit leaves the dataset file untouched.
        let model = if retrain { Some(service.retrain().await?) } else { None };

        let snapshot = service.snapshot().await;
        let serialized = serde_json::to_string_pretty(snapshot.drugs())
            .map_err(|error| ApplicationError::Dataset(error.to_string()))?;
        fs::write(&config.dataset.path, serialized).map_err(|error| {
            ApplicationError::Dataset(format!(
                "could not write dataset `{}`: {error}",
                config.dataset.path.display()
            ))
        })?;

        if let (Some(model), Some(path)) = (model.as_ref(), config.training.model_path.as_deref()) {
            write_model(path, model)?;
        }
        let model_version = model.map(|model| model.version.clone());
        Ok::<_, ApplicationError>((drug, snapshot.len(), model_version))
    });

    match result {
        Ok((drug, total, model_version)) => CommandResult::success_with(
            "add-drug",
            format!("added {} ({} drugs in dataset)", drug.drug_name, total),
            Some(json!({ "drug": drug, "total_drugs": total, "model_version": model_version })),
        ),
        Err(error) => CommandResult::from_application_error("add-drug", error),
    }
}
