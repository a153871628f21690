// Contract Validator Module
//
// The `ContractValidator` answers "is this contract of the expected kind and
// controlled by this wallet?" on top of the resolution service.
//
// ## Validation Criteria
//
// - **Type**: no type requested, or the state carries the structural markers
//   of the requested type (an ANT exposes a truthy `records["@"]`)
// - **Ownership**: no address requested, or the state's `owner` or
//   `controller` equals the address
//
// Validation is bounded by a deadline; see `validate_with_timeout`.

use crate::errors::ResolveError;
use crate::service::{ContractReadService, Deadline};
use crate::types::EvaluatedContractState;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Contract kinds a caller may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    /// Arweave Name Token
    Ant,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Ant => "ant",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid contract type: {0}")]
pub struct UnknownContractType(pub String);

impl FromStr for ContractType {
    type Err = UnknownContractType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ant" => Ok(ContractType::Ant),
            other => Err(UnknownContractType(other.to_string())),
        }
    }
}

/// Type predicate. Passes when no type is requested.
pub fn matches_type(state: &Value, contract_type: Option<ContractType>) -> bool {
    match contract_type {
        None => true,
        Some(ContractType::Ant) => state
            .get("records")
            .and_then(|records| records.get("@"))
            .map(is_truthy)
            .unwrap_or(false),
    }
}

/// Ownership predicate. Passes when no address is requested.
pub fn matches_owner(state: &EvaluatedContractState, address: Option<&str>) -> bool {
    match address {
        None => true,
        Some(address) => {
            state.owner() == Some(address) || state.controller() == Some(address)
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Applies type and ownership predicates to resolved contract state.
///
/// # Timeouts
///
/// `validate_with_timeout` hands a [`Deadline`] to the resolution call, which
/// observes it at each of its suspension points, and additionally races the
/// whole validation against `tokio::time::timeout` as a backstop. Neither
/// aborts the underlying evaluation: it keeps running on its own task, lands
/// in the state cache and clears its in-flight entry for later callers.
#[derive(Clone)]
pub struct ContractValidator {
    service: Arc<ContractReadService>,
    timeout: Duration,
}

impl ContractValidator {
    pub fn new(service: Arc<ContractReadService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves state and returns the AND of both predicates.
    pub async fn validate_state_and_ownership(
        &self,
        contract_tx_id: &str,
        contract_type: Option<ContractType>,
        address: Option<&str>,
    ) -> Result<bool, ResolveError> {
        let state = self.service.get_contract_state(contract_tx_id).await?;
        Ok(evaluate_predicates(&state, contract_type, address))
    }

    /// Like `validate_state_and_ownership`, but fails with
    /// `ResolveError::Timeout` once the configured timeout elapses.
    pub async fn validate_with_timeout(
        &self,
        contract_tx_id: &str,
        contract_type: Option<ContractType>,
        address: Option<&str>,
    ) -> Result<bool, ResolveError> {
        let deadline = Deadline::after(self.timeout);
        let validation = async {
            let state = self
                .service
                .get_contract_state_before(contract_tx_id, deadline)
                .await?;
            Ok(evaluate_predicates(&state, contract_type, address))
        };

        match tokio::time::timeout(self.timeout, validation).await {
            Ok(result) => result,
            Err(_) => {
                debug!(contract_tx_id, "Validation abandoned at backstop timeout");
                Err(ResolveError::Timeout(self.timeout))
            }
        }
    }
}

fn evaluate_predicates(
    state: &EvaluatedContractState,
    contract_type: Option<ContractType>,
    address: Option<&str>,
) -> bool {
    matches_type(state.state(), contract_type) && matches_owner(state, address)
}
