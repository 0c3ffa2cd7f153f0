use rxalt_core::recommend::Recommendation;

use crate::commands::{build_service, ensure_model, runtime, to_data, CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions, drug_names: &[String]) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("recommend", error),
    };
    let runtime = match runtime("recommend") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        ensure_model(&service, &config).await?;
        service.recommend(drug_names).await
    });

    match result {
        Ok(report) => {
            let message = match &report.recommendation {
                Recommendation::NoEligibleCandidate(reason) => {
                    format!("no recommendation: {reason}")
                }
                recommendation => {
                    let names: Vec<&str> = recommendation
                        .recommended_drugs()
                        .into_iter()
                        .map(|drug| drug.drug_name.as_str())
                        .collect();
                    format!("recommended {}", names.join(" + "))
                }
            };
            CommandResult::success_with("recommend", message, to_data(&report))
        }
        Err(error) => CommandResult::from_application_error("recommend", error),
    }
}
