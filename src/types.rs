//! Domain types shared by the cache tiers, the resolvers and the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Configuration controlling how a contract is evaluated.
///
/// Opaque to the cache layer: it only participates in key derivation and is
/// stamped back onto every returned state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationOptions(pub Map<String, Value>);

impl EvaluationOptions {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert, handy for tests and defaults.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Evaluation configuration declared on chain for a contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_options: Option<EvaluationOptions>,
}

/// Result of a single evaluation as produced by the engine. Cached as-is and
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvaluation {
    pub state: Value,
    #[serde(default)]
    pub validity: BTreeMap<String, bool>,
    #[serde(default)]
    pub error_messages: BTreeMap<String, String>,
}

/// Interaction transaction as recorded on chain.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub id: String,
    pub owner: Option<String>,
    pub height: Option<u64>,
    pub input: Option<Value>,
}

/// Outcome of one evaluated interaction, joined with its chain metadata when
/// the gateway knows the transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInteraction {
    pub id: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

/// Evaluated state handed to a caller: the shared cached core plus the options
/// that the caller asked for.
#[derive(Debug, Clone)]
pub struct EvaluatedContractState {
    pub contract_tx_id: String,
    pub evaluation: Arc<ContractEvaluation>,
    pub evaluation_options: EvaluationOptions,
}

impl EvaluatedContractState {
    pub fn new(
        contract_tx_id: impl Into<String>,
        evaluation: Arc<ContractEvaluation>,
        evaluation_options: EvaluationOptions,
    ) -> Self {
        Self {
            contract_tx_id: contract_tx_id.into(),
            evaluation,
            evaluation_options,
        }
    }

    pub fn state(&self) -> &Value {
        &self.evaluation.state
    }

    /// Top-level field of the state object, if any.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.evaluation.state.get(name)
    }

    pub fn owner(&self) -> Option<&str> {
        self.field("owner").and_then(Value::as_str)
    }

    pub fn controller(&self) -> Option<&str> {
        self.field("controller").and_then(Value::as_str)
    }

    /// Interactions the evaluation processed, ordered by block height (pending
    /// and unknown last). Only those sent by `owner` when it is given.
    pub fn interactions(
        &self,
        records: &[InteractionRecord],
        owner: Option<&str>,
    ) -> Vec<ContractInteraction> {
        let by_id: HashMap<&str, &InteractionRecord> =
            records.iter().map(|record| (record.id.as_str(), record)).collect();

        let mut interactions: Vec<ContractInteraction> = self
            .evaluation
            .validity
            .iter()
            .map(|(id, valid)| {
                let record = by_id.get(id.as_str());
                ContractInteraction {
                    id: id.clone(),
                    valid: *valid,
                    error_message: self.evaluation.error_messages.get(id).cloned(),
                    owner: record.and_then(|r| r.owner.clone()),
                    height: record.and_then(|r| r.height),
                    input: record.and_then(|r| r.input.clone()),
                }
            })
            .filter(|interaction| match owner {
                Some(owner) => interaction.owner.as_deref() == Some(owner),
                None => true,
            })
            .collect();

        interactions.sort_by_key(|interaction| interaction.height.unwrap_or(u64::MAX));
        interactions
    }
}
