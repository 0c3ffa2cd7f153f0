use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rxalt_core::interaction::ZeroShotClassifier;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hosted zero-shot classification endpoint speaking the
/// `{inputs, parameters: {candidate_labels}}` -> `{labels, scores}` shape.
///
/// A `{model}` placeholder in the endpoint is replaced by the model name.
pub struct HttpZeroShotClassifier {
    client: Client,
    url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct ClassificationRequest<'a> {
    inputs: &'a str,
    parameters: ClassificationParameters<'a>,
}

#[derive(Serialize)]
struct ClassificationParameters<'a> {
    candidate_labels: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    labels: Vec<String>,
    #[serde(default)]
    scores: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseBody {
    Single(ClassificationResponse),
    Batch(Vec<ClassificationResponse>),
}

impl HttpZeroShotClassifier {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = endpoint.trim().replace("{model}", model);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("classifier endpoint must be an http(s) URL, got `{url}`");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, url, api_key })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Labels ordered by descending score.
fn ranked_labels(body: ResponseBody) -> Result<Vec<String>> {
    let response = match body {
        ResponseBody::Single(response) => response,
        ResponseBody::Batch(mut responses) => {
            if responses.is_empty() {
                bail!("classifier returned an empty batch");
            }
            responses.swap_remove(0)
        }
    };
    if response.labels.is_empty() {
        bail!("classifier returned no labels");
    }
    if response.scores.len() != response.labels.len() {
        return Ok(response.labels);
    }

    let mut pairs: Vec<(String, f64)> = response.labels.into_iter().zip(response.scores).collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(pairs.into_iter().map(|(label, _)| label).collect())
}

#[async_trait]
impl ZeroShotClassifier for HttpZeroShotClassifier {
    async fn rank_labels(&self, text: &str, candidate_labels: &[&str]) -> Result<Vec<String>> {
        let payload = ClassificationRequest {
            inputs: text,
            parameters: ClassificationParameters { candidate_labels },
        };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.context("classifier request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("classifier endpoint returned {status}"));
        }
        let body: ResponseBody =
            response.json().await.context("failed to decode classifier response")?;
        let ranked = ranked_labels(body)?;
        debug!(event_name = "rxalt.nlp.ranked", top = %ranked[0], "zero-shot ranking received");
        Ok(ranked)
    }
}
