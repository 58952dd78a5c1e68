use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, Failure, FailureKind, Result};
use crate::protocol::{AnalysisRequest, AnalysisResult, Outcome};

/// Remote service that turns a text sample into a verdict.
///
/// Implementations do not enforce a deadline; the coordinator bounds every
/// call and drops the future when the bound is exceeded.
#[async_trait]
pub trait Classifier: Send + Sync + 'static {
    async fn classify(&self, request: &AnalysisRequest) -> Outcome;
}

#[derive(Serialize)]
struct ClassifyBody<'a> {
    text: &'a str,
    url: &'a str,
}

/// Whatever the classifier sends back. Several deployments name the label
/// differently; the first one present wins.
#[derive(Deserialize)]
struct ClassifyReply {
    rating: Option<String>,
    label: Option<String>,
    final_assessment: Option<String>,
    level: Option<String>,
    score: Option<f64>,
    confidence: Option<f64>,
    source_url: Option<String>,
    #[serde(rename = "sourceUrl")]
    source_url_camel: Option<String>,
    error: Option<String>,
}

pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, request: &AnalysisRequest) -> Outcome {
        debug!(endpoint = %self.endpoint, chars = request.text.len(), "calling classifier");

        let body = ClassifyBody {
            text: &request.text,
            url: &request.source_url,
        };

        let res = self
            .client
            .post(self.endpoint.clone())
            .header("X-Client-Time", request.requested_at.to_rfc3339())
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(Failure::new(
                FailureKind::BadResponse,
                format!("classifier returned HTTP {}", status),
            ));
        }

        let json: serde_json::Value = res.json().await?;
        interpret_reply(json)
    }
}

/// Turns a classifier reply body into a verdict, or `BadResponse` when it
/// carries no label.
pub fn interpret_reply(json: serde_json::Value) -> Outcome {
    let reply: ClassifyReply = serde_json::from_value(json).map_err(|e| {
        Failure::new(
            FailureKind::BadResponse,
            format!("unexpected classifier reply: {}", e),
        )
    })?;

    let rating = [reply.rating, reply.label, reply.final_assessment, reply.level]
        .into_iter()
        .flatten()
        .map(|label| label.trim().to_string())
        .find(|label| !label.is_empty());

    match rating {
        Some(rating) => Ok(AnalysisResult {
            rating,
            score: reply.score.or(reply.confidence),
            source_url: reply
                .source_url
                .or(reply.source_url_camel)
                .filter(|url| !url.is_empty()),
        }),
        None => Err(Failure::new(
            FailureKind::BadResponse,
            reply
                .error
                .unwrap_or_else(|| "classifier reply has no rating".to_string()),
        )),
    }
}
