//! Immutable drug catalog snapshots.
//!
//! The catalog is the validated collection every training run and query
//! reads from. Snapshots are cheap to clone and never mutated in place;
//! adding a drug produces a new snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::drug::{Drug, DrugName, InteractionField, NO_EQUIVALENCE_CODE};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read dataset `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid drug record: {0}")]
    InvalidRecord(String),
}

/// A drug record as supplied by the data-loading collaborator, before
/// normalization.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawDrugRecord {
    pub drug_name: Option<String>,
    pub generic_name: Option<String>,
    pub therapeutic_class: Option<String>,
    pub therapeutic_equivalence_code: Option<String>,
    pub pmpm_cost: Option<Value>,
    #[serde(default)]
    pub drug_interactions: InteractionField,
    pub ndc: Option<String>,
    pub total_drug_cost: Option<f64>,
    pub member_count: Option<u64>,
    pub state: Option<String>,
    pub avg_age: Option<f64>,
}

impl RawDrugRecord {
    pub fn normalize(self) -> Result<Drug, CatalogError> {
        let drug_name = required_text(self.drug_name, "drug_name")?;
        let generic_name = required_text(self.generic_name, "generic_name")?;
        let therapeutic_class = required_text(self.therapeutic_class, "therapeutic_class")?;
        let pmpm_cost = parse_cost(self.pmpm_cost.as_ref()).ok_or_else(|| {
            CatalogError::InvalidRecord(format!(
                "pmpm_cost for `{drug_name}` must be a non-negative amount"
            ))
        })?;
        let te_code = self
            .therapeutic_equivalence_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| NO_EQUIVALENCE_CODE.to_string());

        let mut drug = Drug::new(drug_name, generic_name, therapeutic_class, te_code, pmpm_cost);
        drug.drug_interactions = self.drug_interactions;
        drug.ndc = self.ndc;
        drug.total_drug_cost = self.total_drug_cost;
        drug.member_count = self.member_count;
        drug.state = self.state;
        drug.avg_age = self.avg_age.filter(|age| age.is_finite());
        Ok(drug)
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, CatalogError> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty() && !text.eq_ignore_ascii_case("nan"))
        .ok_or_else(|| CatalogError::InvalidRecord(format!("missing required field: {field}")))
}

/// Accepts numbers and currency strings such as `"$1,234.50"`.
fn parse_cost(value: Option<&Value>) -> Option<f64> {
    let cost = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            text.trim().replace(['$', ','], "").parse::<f64>().ok()?
        }
        _ => return None,
    };
    (cost.is_finite() && cost >= 0.0).then_some(cost)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub name: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total_drugs: usize,
    pub total_cost: f64,
    pub total_members: u64,
    pub avg_pmpm: f64,
    pub therapeutic_classes: usize,
    pub states_covered: usize,
    pub te_codes_distribution: BTreeMap<String, usize>,
    /// Mean of `avg_age` over drugs that report it.
    pub avg_age: Option<f64>,
}

/// Upper bounds (inclusive) of the member age bands.
pub const AGE_BANDS: [(&str, f64); 4] = [("<30", 30.0), ("30-50", 50.0), ("50-65", 65.0), ("65+", 100.0)];

/// Spend breakdowns for the dashboard views.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostAnalysis {
    /// Summed `total_drug_cost`; drugs without a cost contribute 0.
    pub cost_by_therapeutic_class: BTreeMap<String, f64>,
    /// Mean `pmpm_cost` over drugs that report a state.
    pub pmpm_by_state: BTreeMap<String, f64>,
    /// Drug counts per age band. Ages outside (0, 100] are not counted.
    pub age_distribution: BTreeMap<String, usize>,
}

fn age_band(age: f64) -> Option<&'static str> {
    if age.is_nan() || age <= 0.0 {
        return None;
    }
    AGE_BANDS.iter().find(|(_, upper)| age <= *upper).map(|(label, _)| *label)
}

#[derive(Clone, Debug, Default)]
pub struct DrugCatalog {
    drugs: Arc<[Drug]>,
}

impl DrugCatalog {
    pub fn new(drugs: Vec<Drug>) -> Self {
        Self { drugs: drugs.into() }
    }

    /// Normalizes raw records, dropping the ones that cannot be validated.
    pub fn from_records(records: Vec<RawDrugRecord>) -> Self {
        let total = records.len();
        let drugs: Vec<Drug> = records
            .into_iter()
            .filter_map(|record| match record.normalize() {
                Ok(drug) => Some(drug),
                Err(error) => {
                    warn!(event_name = "rxalt.catalog.record_skipped", error = %error, "skipping drug record");
                    None
                }
            })
            .collect();

        if drugs.len() < total {
            warn!(
                event_name = "rxalt.catalog.records_dropped",
                dropped = total - drugs.len(),
                kept = drugs.len(),
                "dataset contained invalid records"
            );
        }
        Self::new(drugs)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let records: Vec<RawDrugRecord> = serde_json::from_str(raw)?;
        Ok(Self::from_records(records))
    }

    pub fn from_json_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json_str(&raw)
    }

    pub fn drugs(&self) -> &[Drug] {
        &self.drugs
    }

    pub fn len(&self) -> usize {
        self.drugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drugs.is_empty()
    }

    /// First drug whose canonical name matches.
    pub fn find(&self, name: &str) -> Option<&Drug> {
        let wanted = DrugName::canonical(name);
        self.drugs.iter().find(|drug| drug.drug_name == wanted.0)
    }

    pub fn in_class<'a>(&'a self, therapeutic_class: &'a str) -> impl Iterator<Item = &'a Drug> {
        self.drugs.iter().filter(move |drug| drug.therapeutic_class == therapeutic_class)
    }

    /// Drugs grouped by therapeutic class, classes in order of first appearance.
    pub fn partition_by_class(&self) -> Vec<(&str, Vec<&Drug>)> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&Drug>> = HashMap::new();
        for drug in self.drugs.iter() {
            let class = drug.therapeutic_class.as_str();
            groups
                .entry(class)
                .or_insert_with(|| {
                    order.push(class);
                    Vec::new()
                })
                .push(drug);
        }

        order
            .into_iter()
            .map(|class| (class, groups.remove(class).unwrap_or_default()))
            .collect()
    }

    /// Class sizes, largest first.
    pub fn classes(&self) -> Vec<ClassCount> {
        let mut classes: Vec<ClassCount> = self
            .partition_by_class()
            .into_iter()
            .map(|(name, drugs)| ClassCount { name: name.to_string(), count: drugs.len() })
            .collect();
        classes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        classes
    }

    pub fn stats(&self) -> CatalogStats {
        let total_drugs = self.drugs.len();
        let avg_pmpm = if total_drugs == 0 {
            0.0
        } else {
            self.drugs.iter().map(|drug| drug.pmpm_cost).sum::<f64>() / total_drugs as f64
        };

        let mut te_codes_distribution = BTreeMap::new();
        for drug in self.drugs.iter() {
            *te_codes_distribution.entry(drug.therapeutic_equivalence_code.clone()).or_insert(0) +=
                1;
        }

        CatalogStats {
            total_drugs,
            total_cost: self.drugs.iter().filter_map(|drug| drug.total_drug_cost).sum(),
            total_members: self.drugs.iter().filter_map(|drug| drug.member_count).sum(),
            avg_pmpm,
            therapeutic_classes: self
                .drugs
                .iter()
                .map(|drug| drug.therapeutic_class.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            states_covered: self
                .drugs
                .iter()
                .filter_map(|drug| drug.state.as_deref())
                .collect::<BTreeSet<_>>()
                .len(),
            te_codes_distribution,
            avg_age: mean(self.drugs.iter().filter_map(|drug| drug.avg_age)),
        }
    }

    pub fn cost_analysis(&self) -> CostAnalysis {
        let mut cost_by_therapeutic_class: BTreeMap<String, f64> = BTreeMap::new();
        let mut state_costs: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut age_distribution: BTreeMap<String, usize> =
            AGE_BANDS.iter().map(|(label, _)| (label.to_string(), 0)).collect();

        for drug in self.drugs.iter() {
            *cost_by_therapeutic_class.entry(drug.therapeutic_class.clone()).or_insert(0.0) +=
                drug.total_drug_cost.unwrap_or(0.0);
            if let Some(state) = drug.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                let entry = state_costs.entry(state.to_string()).or_insert((0.0, 0));
                entry.0 += drug.pmpm_cost;
                entry.1 += 1;
            }
            if let Some(label) = drug.avg_age.and_then(age_band) {
                *age_distribution.entry(label.to_string()).or_insert(0) += 1;
            }
        }

        CostAnalysis {
            cost_by_therapeutic_class,
            pmpm_by_state: state_costs
                .into_iter()
                .map(|(state, (total, count))| (state, total / count as f64))
                .collect(),
            age_distribution,
        }
    }

    /// New snapshot with `record` validated and appended.
    pub fn with_record(&self, record: RawDrugRecord) -> Result<Self, CatalogError> {
        let drug = record.normalize()?;
        let mut drugs = self.drugs.to_vec();
        drugs.push(drug);
        Ok(Self::new(drugs))
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    (count > 0).then(|| total / count as f64)
}
