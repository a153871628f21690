//! # Evaluation Engine
//!
//! Contract state is computed by an external evaluation engine. This module
//! defines the collaborator contract the resolvers depend on and a remote
//! adapter that talks to an evaluation node over HTTP.
//!
//! ## Failure classification
//!
//! The engine contract returns typed failures ([`EngineError`]). Remote nodes
//! only report free-form messages, so their responses go through
//! [`classify_engine_failure`], the single place where message text is
//! inspected.

use crate::errors::EngineError;
use crate::types::{ContractEvaluation, EvaluationOptions};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Computes the current state of a contract under the given options.
#[async_trait]
pub trait EvaluationEngine: Send + Sync {
    async fn evaluate(
        &self,
        contract_tx_id: &str,
        options: &EvaluationOptions,
    ) -> Result<ContractEvaluation, EngineError>;
}

/// Markers emitted by the engine when an options combination is refused.
const REJECTION_MARKERS: [&str; 2] = [
    "Cannot proceed with contract evaluation",
    "Use contract.setEvaluationOptions",
];

/// Markers emitted when the contract transaction does not exist.
const NOT_FOUND_MARKERS: [&str; 2] = ["TX_NOT_FOUND", "404"];

/// Classifies a raw engine failure.
///
/// Heuristics, in order:
/// 1. a message containing one of the option rejection markers => `Rejected`
/// 2. HTTP 404 or a message containing `TX_NOT_FOUND` / `404` => `NotFound`
/// 3. anything else => `Other`, message kept verbatim
pub fn classify_engine_failure(status: Option<u16>, message: &str) -> EngineError {
    if REJECTION_MARKERS.iter().any(|marker| message.contains(marker)) {
        return EngineError::Rejected(message.to_string());
    }
    if status == Some(404) || NOT_FOUND_MARKERS.iter().any(|marker| message.contains(marker)) {
        return EngineError::NotFound(message.to_string());
    }
    EngineError::Other(message.to_string())
}

/// Evaluation engine reached over HTTP (`GET {base}/contract?id=...`).
///
/// Every top-level evaluation option is forwarded as a query parameter.
pub struct RemoteEvaluationEngine {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteEvaluationEngine {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Other(format!("invalid evaluator url {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EngineError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn contract_url(&self, contract_tx_id: &str, options: &EvaluationOptions) -> Result<Url, EngineError> {
        let mut url = self
            .base_url
            .join("contract")
            .map_err(|e| EngineError::Other(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id", contract_tx_id);
            query.append_pair("validity", "true");
            query.append_pair("errorMessages", "true");
            for (key, value) in options.iter() {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                query.append_pair(key, &rendered);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl EvaluationEngine for RemoteEvaluationEngine {
    async fn evaluate(
        &self,
        contract_tx_id: &str,
        options: &EvaluationOptions,
    ) -> Result<ContractEvaluation, EngineError> {
        let url = self.contract_url(contract_tx_id, options)?;
        debug!("Evaluating contract {} via {}", contract_tx_id, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Other(format!("evaluation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body);
            warn!(
                "Evaluation of {} failed with status {}: {}",
                contract_tx_id, status, message
            );
            return Err(classify_engine_failure(Some(status.as_u16()), &message));
        }

        response
            .json::<ContractEvaluation>()
            .await
            .map_err(|e| EngineError::Other(format!("malformed evaluation response: {}", e)))
    }
}

/// Pulls `message` (or `error`) out of a JSON error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
