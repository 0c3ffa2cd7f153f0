use anyhow::Result;
use async_trait::async_trait;
use rxalt_core::interaction::ZeroShotClassifier;

const HIGH_RISK_CUES: &[&str] = &[
    "bleeding",
    "hemorrhage",
    "fatal",
    "death",
    "life-threatening",
    "contraindicated",
    "serotonin syndrome",
    "qt prolongation",
    "arrhythmia",
    "respiratory depression",
    "toxicity",
    "severe",
    "avoid",
    "do not",
];

const LOW_RISK_CUES: &[&str] = &[
    "minor",
    "mild",
    "monitor",
    "may decrease",
    "may slightly",
    "absorption",
    "separate doses",
    "unlikely",
    "no dose adjustment",
];

/// Offline ranking by counting severity cue phrases.
///
/// A label scores the cues of the severity it names (`high` or `low`); any
/// other label scores zero. Ties keep the caller's label order.
#[derive(Clone, Debug)]
pub struct KeywordZeroShotClassifier {
    high_cues: Vec<String>,
    low_cues: Vec<String>,
}

impl Default for KeywordZeroShotClassifier {
    fn default() -> Self {
        Self::new(HIGH_RISK_CUES.iter().copied(), LOW_RISK_CUES.iter().copied())
    }
}

impl KeywordZeroShotClassifier {
    pub fn new<'a>(
        high_cues: impl IntoIterator<Item = &'a str>,
        low_cues: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            high_cues: high_cues.into_iter().map(str::to_lowercase).collect(),
            low_cues: low_cues.into_iter().map(str::to_lowercase).collect(),
        }
    }

    fn label_score(&self, text: &str, label: &str) -> usize {
        let label = label.to_lowercase();
        let cues = if label.contains("high") {
            &self.high_cues
        } else if label.contains("low") {
            &self.low_cues
        } else {
            return 0;
        };
        cues.iter().filter(|cue| text.contains(cue.as_str())).count()
    }
}

#[async_trait]
impl ZeroShotClassifier for KeywordZeroShotClassifier {
    async fn rank_labels(&self, text: &str, candidate_labels: &[&str]) -> Result<Vec<String>> {
        let text = text.to_lowercase();
        let mut scored: Vec<(usize, &str)> = candidate_labels
            .iter()
            .map(|label| (self.label_score(&text, label), *label))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, label)| label.to_string()).collect())
    }
}
