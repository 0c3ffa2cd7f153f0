use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use rxalt_cli::commands::{
    add_drug, classify, config, dataset, health, recommend, train, GlobalOptions,
};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn recommend_returns_single_alternative_for_known_drug() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "keyword")], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.options(), &["lipitor".to_string()]);
        assert_eq!(result.exit_code, 0, "expected successful recommendation: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recommend");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["recommendation"]["kind"], "single");
        let class = &payload["data"]["recommendation"]["detail"]["drug"]["therapeutic_class"];
        assert_eq!(class, "Statins");
        assert_eq!(payload["data"]["analysis"]["type"], "single_drug");
    });
}

#[test]
fn recommend_reports_unknown_drugs_as_not_found() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "keyword")], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.options(), &["NOSUCHDRUG".to_string()]);
        assert_eq!(result.exit_code, 6, "expected not-found exit code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
        assert!(payload["message"].as_str().unwrap_or("").contains("NOSUCHDRUG"));
    });
}

#[test]
fn recommend_rejects_blank_input() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "keyword")], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.options(), &["  ".to_string()]);
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn recommend_combination_uses_classifier_for_interactions() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "keyword")], || {
        let workspace = Workspace::new();
        let names = vec!["LIPITOR".to_string(), "COUMADIN".to_string()];
        let result = recommend::run(&workspace.options(), &names);
        assert_eq!(result.exit_code, 0, "expected combination result: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["recommendation"]["kind"], "combination");
        assert_eq!(payload["data"]["original_drugs"].as_array().map(Vec::len), Some(2));
    });
}

#[test]
fn stats_and_classes_summarize_the_dataset() {
    with_env(&[], || {
        let workspace = Workspace::new();

        let stats = dataset::stats(&workspace.options());
        assert_eq!(stats.exit_code, 0);
        let payload = parse_payload(&stats.output);
        assert_eq!(payload["data"]["total_drugs"], 5);
        assert_eq!(payload["data"]["therapeutic_classes"], 2);

        let classes = dataset::classes(&workspace.options());
        assert_eq!(classes.exit_code, 0);
        let payload = parse_payload(&classes.output);
        let names: Vec<&str> = payload["data"]["therapeutic_classes"]
            .as_array()
            .map(|items| items.iter().filter_map(|item| item["name"].as_str()).collect())
            .unwrap_or_default();
        assert!(names.contains(&"Statins"));
        assert!(names.contains(&"Anticoagulants"));
    });
}

#[test]
fn drugs_lists_the_dataset_with_a_total() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = dataset::drugs(&workspace.options());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "drugs");
        assert_eq!(payload["data"]["total_count"], 5);
        assert_eq!(payload["data"]["drugs"][0]["drug_name"], "LIPITOR");
        assert_eq!(payload["data"]["drugs"][0]["avg_age"], 62.0);
        assert_eq!(payload["data"]["drugs"][2]["pmpm_cost"], 95.0);
    });
}

#[test]
fn cost_analysis_breaks_spend_down() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = dataset::cost_analysis(&workspace.options());
        assert_eq!(result.exit_code, 0, "expected cost-analysis success: {}", result.output);

        let data = &parse_payload(&result.output)["data"];
        assert_eq!(data["cost_by_therapeutic_class"]["Statins"], 2700.0);
        assert_eq!(data["cost_by_therapeutic_class"]["Anticoagulants"], 900.0);
        assert_eq!(data["pmpm_by_state"]["CA"], 66.25);
        assert_eq!(data["pmpm_by_state"]["TX"], 60.0);
        assert_eq!(data["age_distribution"]["50-65"], 2);
        assert_eq!(data["age_distribution"]["65+"], 1);
        assert_eq!(data["age_distribution"]["<30"], 0);
    });
}

#[test]
fn missing_dataset_is_a_dataset_failure() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let options = GlobalOptions {
            dataset_path: Some(workspace.dir.path().join("missing.json")),
            ..workspace.options()
        };
        let result = dataset::stats(&options);
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "dataset");
    });
}

#[test]
fn train_persists_model_for_later_commands() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        let result = train::run(&workspace.options());
        assert_eq!(result.exit_code, 0, "expected training success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "train");
        assert!(payload["data"]["training_samples"].as_u64().unwrap_or(0) > 0);
        assert!(workspace.model_path().exists(), "model file should be written");

        let health = health::run(&workspace.options());
        let payload = parse_payload(&health.output);
        assert_eq!(payload["data"]["model_loaded"], true);
        assert_eq!(payload["data"]["nlp_available"], false);
    });
}

#[test]
fn health_reports_untrained_model_as_degraded() {
    with_env(&[], || {
        let workspace = Workspace::new();
        let result = health::run(&workspace.options());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["model_loaded"], false);
        assert_eq!(payload["data"]["data_loaded"], true);
        assert!(payload["message"].as_str().unwrap_or("").starts_with("degraded"));
    });
}

#[test]
fn classify_returns_risk_and_evidence() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        let result = classify::run(&workspace.options(), "COUMADIN", "LIPITOR");
        assert_eq!(result.exit_code, 0, "expected classify success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["risk"], 0);
        assert_eq!(payload["data"]["evidence"], "NLP model not available.");
    });
}

#[test]
fn add_drug_writes_dataset_and_retrains() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        let record = json!({
            "drug_name": "PRAVACHOL",
            "generic_name": "pravastatin",
            "therapeutic_class": "Statins",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": "$42.00",
            "ndc": "00003-5154-05",
        });
        let result = add_drug::run(&workspace.options(), &record.to_string(), true);
        assert_eq!(result.exit_code, 0, "expected add-drug success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["total_drugs"], 6);
        assert!(payload["data"]["model_version"].is_string());

        let written: Vec<Value> = serde_json::from_str(
            &fs::read_to_string(workspace.dataset_path()).expect("dataset should be readable"),
        )
        .expect("dataset should stay valid JSON");
        assert_eq!(written.len(), 6);
        assert!(workspace.model_path().exists());
    });
}

#[test]
fn add_drug_leaves_dataset_untouched_when_retraining_fails() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        let single = json!([{
            "drug_name": "LIPITOR",
            "generic_name": "atorvastatin",
            "therapeutic_class": "Statins",
            "pmpm_cost": 120.0,
            "ndc": "00071-0155-23"
        }]);
        fs::write(workspace.dataset_path(), single.to_string()).expect("dataset should be written");
        let before = fs::read_to_string(workspace.dataset_path()).expect("dataset should be readable");

        let record = json!({
            "drug_name": "COUMADIN",
            "generic_name": "warfarin",
            "therapeutic_class": "Anticoagulants",
            "pmpm_cost": 60.0,
            "ndc": "00056-0172-70",
        });
        let result = add_drug::run(&workspace.options(), &record.to_string(), true);
        assert_eq!(result.exit_code, 5, "expected training failure: {}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "training");

        let after = fs::read_to_string(workspace.dataset_path()).expect("dataset should be readable");
        assert_eq!(before, after);
        assert!(!workspace.model_path().exists());
    });
}

#[test]
fn corrupt_model_file_is_a_training_failure() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        assert_eq!(train::run(&workspace.options()).exit_code, 0);

        let mut model: Value = serde_json::from_str(
            &fs::read_to_string(workspace.model_path()).expect("model should be readable"),
        )
        .expect("model should be valid JSON");
        model["regressor"]["trees"] = json!([{ "nodes": [] }]);
        fs::write(workspace.model_path(), model.to_string()).expect("model should be written");

        let result = recommend::run(&workspace.options(), &["LIPITOR".to_string()]);
        assert_eq!(result.exit_code, 5, "expected malformed model rejection: {}", result.output);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or("")
            .contains("malformed"));
    });
}

#[test]
fn add_drug_without_ndc_is_invalid_input() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "disabled")], || {
        let workspace = Workspace::new();
        let record = json!({
            "drug_name": "ZOCOR",
            "generic_name": "simvastatin",
            "therapeutic_class": "Statins",
            "pmpm_cost": 30.0,
        });
        let result = add_drug::run(&workspace.options(), &record.to_string(), false);
        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn http_provider_without_endpoint_is_a_config_failure() {
    with_env(&[("RXALT_CLASSIFIER_PROVIDER", "http")], || {
        let workspace = Workspace::new();
        let result = recommend::run(&workspace.options(), &["LIPITOR".to_string()]);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config");
    });
}

#[test]
fn config_attributes_sources() {
    with_env(&[("RXALT_TRAINING_SEED", "7")], || {
        let workspace = Workspace::new();
        let result = config::run(&workspace.options());
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- training.seed = 7 (source: env (RXALT_TRAINING_SEED))"));
        assert!(result.output.contains("dataset.path"));
        assert!(result.output.contains("(source: flag)"));
        assert!(result.output.contains("- classifier.api_key = <unset> (source: default)"));
    });
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        write_dataset(&dir.path().join("drugs.json"));
        Self { dir }
    }

    fn dataset_path(&self) -> PathBuf {
        self.dir.path().join("drugs.json")
    }

    fn model_path(&self) -> PathBuf {
        self.dir.path().join("model").join("rxalt-model.json")
    }

    fn options(&self) -> GlobalOptions {
        GlobalOptions {
            config_path: None,
            dataset_path: Some(self.dataset_path()),
            model_path: Some(self.model_path()),
        }
    }
}

fn write_dataset(path: &Path) {
    let drugs = json!([
        {
            "drug_name": "LIPITOR",
            "generic_name": "atorvastatin",
            "therapeutic_class": "Statins",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": 120.0,
            "drug_interactions": ["May increase bleeding risk with warfarin"],
            "ndc": "00071-0155-23",
            "state": "CA",
            "total_drug_cost": 2400.0,
            "avg_age": 62.0
        },
        {
            "drug_name": "ATORVASTATIN",
            "generic_name": "atorvastatin",
            "therapeutic_class": "Statins",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": 12.5,
            "drug_interactions": [],
            "ndc": "00378-3950-77",
            "state": "CA",
            "total_drug_cost": 300.0,
            "avg_age": 58.0
        },
        {
            "drug_name": "CRESTOR",
            "generic_name": "rosuvastatin",
            "therapeutic_class": "Statins",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": "$95.00",
            "drug_interactions": "[]",
            "ndc": "00310-0751-90"
        },
        {
            "drug_name": "COUMADIN",
            "generic_name": "warfarin",
            "therapeutic_class": "Anticoagulants",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": 60.0,
            "drug_interactions": ["Severe bleeding risk with aspirin"],
            "ndc": "00056-0172-70",
            "state": "TX",
            "total_drug_cost": 900.0,
            "avg_age": 71.0
        },
        {
            "drug_name": "JANTOVEN",
            "generic_name": "warfarin",
            "therapeutic_class": "Anticoagulants",
            "therapeutic_equivalence_code": "AB",
            "pmpm_cost": 8.0,
            "drug_interactions": [],
            "ndc": "00832-1211-00"
        }
    ]);
    fs::write(path, drugs.to_string()).expect("dataset should be written");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "RXALT_DATASET_PATH",
        "RXALT_CLASSIFIER_PROVIDER",
        "RXALT_CLASSIFIER_ENDPOINT",
        "RXALT_CLASSIFIER_API_KEY",
        "RXALT_CLASSIFIER_MODEL",
        "RXALT_CLASSIFIER_TIMEOUT_SECS",
        "RXALT_CLASSIFIER_MAX_CONCURRENCY",
        "RXALT_TRAINING_N_ESTIMATORS",
        "RXALT_TRAINING_LEARNING_RATE",
        "RXALT_TRAINING_MAX_DEPTH",
        "RXALT_TRAINING_MIN_SAMPLES_LEAF",
        "RXALT_TRAINING_TEST_FRACTION",
        "RXALT_TRAINING_SEED",
        "RXALT_TRAINING_MODEL_PATH",
        "RXALT_LOGGING_LEVEL",
        "RXALT_LOGGING_FORMAT",
        "RXALT_LOG_LEVEL",
        "RXALT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
