//! Read-only dataset views: listing, summary statistics, therapeutic classes
//! and spend breakdowns.

use rxalt_core::ApplicationError;
use serde_json::json;

use crate::commands::{build_service, runtime, to_data, CommandResult, GlobalOptions};

pub fn stats(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("stats", error),
    };
    let runtime = match runtime("stats") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        Ok::<_, ApplicationError>(service.stats().await)
    });

    match result {
        Ok(stats) => CommandResult::success_with(
            "stats",
            format!(
                "{} drugs across {} therapeutic classes",
                stats.total_drugs, stats.therapeutic_classes
            ),
            to_data(&stats),
        ),
        Err(error) => CommandResult::from_application_error("stats", error),
    }
}

pub fn classes(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("classes", error),
    };
    let runtime = match runtime("classes") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        Ok::<_, ApplicationError>(service.classes().await)
    });

    match result {
        Ok(classes) => CommandResult::success_with(
            "classes",
            format!("{} therapeutic classes", classes.len()),
            Some(json!({ "therapeutic_classes": classes })),
        ),
        Err(error) => CommandResult::from_application_error("classes", error),
    }
}

pub fn drugs(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("drugs", error),
    };
    let runtime = match runtime("drugs") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        Ok::<_, ApplicationError>(service.drugs().await)
    });

    match result {
        Ok(drugs) => CommandResult::success_with(
            "drugs",
            format!("{} drugs", drugs.len()),
            Some(json!({ "total_count": drugs.len(), "drugs": drugs })),
        ),
        Err(error) => CommandResult::from_application_error("drugs", error),
    }
}

pub fn cost_analysis(options: &GlobalOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_application_error("cost-analysis", error),
    };
    let runtime = match runtime("cost-analysis") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let service = build_service(&config)?;
        Ok::<_, ApplicationError>(service.cost_analysis().await)
    });

    match result {
        Ok(analysis) => CommandResult::success_with(
            "cost-analysis",
            format!(
                "spend across {} therapeutic classes and {} states",
                analysis.cost_by_therapeutic_class.len(),
                analysis.pmpm_by_state.len()
            ),
            to_data(&analysis),
        ),
        Err(error) => CommandResult::from_application_error("cost-analysis", error),
    }
}
