use crate::commands::{build_service, runtime, to_data, CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions, first: &str, second: &str) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("classify", error),
    };
    let runtime = match runtime("classify") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        service.classify(first, second).await
    });

    match result {
        Ok(assessment) => CommandResult::success_with(
            "classify",
            format!(
                "interaction risk {} ({:?} safety)",
                assessment.risk.level(),
                assessment.risk.safety_rating()
            ),
            to_data(&assessment),
        ),
        Err(error) => CommandResult::from_application_error("classify", error),
    }
}
