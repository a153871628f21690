use super::error::ApiError;
use super::AppState;
use crate::service::Deadline;
use crate::types::{ContractInteraction, EvaluatedContractState, EvaluationOptions};
use crate::validator::ContractType;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static CONTRACT_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{43}$").expect("Invalid contract id regex"));
static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]{1,51}$").expect("Invalid name regex"));
static FIELD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,30}$").expect("Invalid field regex"));

fn check(regex: &Regex, value: &str, what: &str) -> Result<(), ApiError> {
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid {}: {}", what, value)))
    }
}

fn check_contract_id(id: &str) -> Result<(), ApiError> {
    check(&CONTRACT_ID_REGEX, id, "contract id")
}

fn evaluation_deadline(app: &AppState) -> Deadline {
    Deadline::after(app.validator.timeout())
}

/// State reads are bounded by the evaluation timeout; an evaluation still
/// running at the deadline keeps going and lands in the cache.
async fn resolve_state(
    app: &AppState,
    contract_tx_id: &str,
) -> Result<EvaluatedContractState, ApiError> {
    Ok(app
        .service
        .get_contract_state_before(contract_tx_id, evaluation_deadline(app))
        .await?)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub message: &'static str,
}

pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse {
        timestamp: Utc::now(),
        status: 200,
        message: "Hello world.",
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
    pub contract_tx_id: String,
    pub state: Value,
    pub evaluation_options: EvaluationOptions,
}

pub async fn contract(
    State(app): State<AppState>,
    Path(contract_tx_id): Path<String>,
) -> Result<Json<ContractResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    Ok(Json(ContractResponse {
        state: resolved.state().clone(),
        contract_tx_id,
        evaluation_options: resolved.evaluation_options,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionsResponse {
    pub contract_tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub interactions: Vec<ContractInteraction>,
    pub evaluation_options: EvaluationOptions,
}

pub async fn interactions(
    State(app): State<AppState>,
    Path(contract_tx_id): Path<String>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    interactions_for(&app, contract_tx_id, None).await
}

/// Interactions of the contract sent by `address`.
pub async fn address_interactions(
    State(app): State<AppState>,
    Path((contract_tx_id, address)): Path<(String, String)>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    interactions_for(&app, contract_tx_id, Some(address)).await
}

/// Same view as [`address_interactions`], addressed from the wallet side.
pub async fn wallet_interactions(
    State(app): State<AppState>,
    Path((address, contract_tx_id)): Path<(String, String)>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    interactions_for(&app, contract_tx_id, Some(address)).await
}

async fn interactions_for(
    app: &AppState,
    contract_tx_id: String,
    address: Option<String>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    if let Some(ref address) = address {
        check(&CONTRACT_ID_REGEX, address, "address")?;
    }
    let (resolved, interactions) = app
        .service
        .get_contract_interactions(&contract_tx_id, address.as_deref(), evaluation_deadline(app))
        .await?;

    Ok(Json(InteractionsResponse {
        contract_tx_id,
        address,
        interactions,
        evaluation_options: resolved.evaluation_options,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    #[serde(rename = "contractTxId")]
    pub contract_tx_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    pub contract_tx_id: String,
    pub records: Map<String, Value>,
    pub evaluation_options: EvaluationOptions,
}

/// All records, or only those pointing at `?contractTxId=`.
pub async fn records(
    State(app): State<AppState>,
    Path(contract_tx_id): Path<String>,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    if let Some(ref filter) = query.contract_tx_id {
        check_contract_id(filter)?;
    }
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    let records = resolved
        .field("records")
        .and_then(Value::as_object)
        .map(|records| {
            records
                .iter()
                .filter(|(_, record)| match query.contract_tx_id {
                    Some(ref filter) => {
                        record.get("contractTxId").and_then(Value::as_str) == Some(filter.as_str())
                    }
                    None => true,
                })
                .map(|(name, record)| (name.clone(), record.clone()))
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(RecordsResponse {
        contract_tx_id,
        records,
        evaluation_options: resolved.evaluation_options,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub contract_tx_id: String,
    pub name: String,
    pub record: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub evaluation_options: EvaluationOptions,
}

/// A single record, plus the owner of the contract the record points at when
/// that contract resolves in time.
pub async fn record(
    State(app): State<AppState>,
    Path((contract_tx_id, name)): Path<(String, String)>,
) -> Result<Json<RecordResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    check(&NAME_REGEX, &name, "name")?;
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    let record = resolved
        .field("records")
        .and_then(|records| records.get(&name))
        .cloned()
        .ok_or_else(|| ApiError::not_found("Record does not exist"))?;

    let owner = match record.get("contractTxId").and_then(Value::as_str) {
        Some(ant_tx_id) => record_owner(&app, ant_tx_id).await,
        None => None,
    };

    Ok(Json(RecordResponse {
        contract_tx_id,
        name,
        record,
        owner,
        evaluation_options: resolved.evaluation_options,
    }))
}

async fn record_owner(app: &AppState, ant_tx_id: &str) -> Option<String> {
    match app
        .service
        .get_contract_state_before(ant_tx_id, evaluation_deadline(app))
        .await
    {
        Ok(ant) => ant.owner().map(str::to_string),
        Err(e) => {
            debug!("Failed to resolve owner of {}: {}", ant_tx_id, e);
            None
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub contract_tx_id: String,
    pub address: String,
    pub balance: Value,
    pub evaluation_options: EvaluationOptions,
}

pub async fn balance(
    State(app): State<AppState>,
    Path((contract_tx_id, address)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    check(&CONTRACT_ID_REGEX, &address, "address")?;
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    let balance = resolved
        .field("balances")
        .and_then(|balances| balances.get(&address))
        .cloned()
        .ok_or_else(|| ApiError::not_found("Balance does not exist"))?;

    Ok(Json(BalanceResponse {
        contract_tx_id,
        address,
        balance,
        evaluation_options: resolved.evaluation_options,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedResponse {
    pub contract_tx_id: String,
    pub name: String,
    pub reserved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub evaluation_options: EvaluationOptions,
}

pub async fn reserved(
    State(app): State<AppState>,
    Path((contract_tx_id, name)): Path<(String, String)>,
) -> Result<Json<ReservedResponse>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    check(&NAME_REGEX, &name, "name")?;
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    let details = resolved
        .field("reserved")
        .and_then(|reserved| reserved.get(&name))
        .cloned();

    Ok(Json(ReservedResponse {
        contract_tx_id,
        name,
        reserved: details.is_some(),
        details,
        evaluation_options: resolved.evaluation_options,
    }))
}

/// Any other top-level field of the state, returned under its own name.
pub async fn field(
    State(app): State<AppState>,
    Path((contract_tx_id, field_name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    check_contract_id(&contract_tx_id)?;
    check(&FIELD_REGEX, &field_name, "field")?;
    let resolved = resolve_state(&app, &contract_tx_id).await?;
    let value = resolved
        .field(&field_name)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Contract field {} does not exist", field_name)))?;

    Ok(Json(field_body(&resolved, field_name, value)))
}

fn field_body(resolved: &EvaluatedContractState, field: String, value: Value) -> Value {
    let mut body = Map::new();
    body.insert(
        "contractTxId".to_string(),
        Value::String(resolved.contract_tx_id.clone()),
    );
    body.insert(field, value);
    body.insert("evaluationOptions".to_string(), resolved.evaluation_options.as_value());
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    #[serde(rename = "type")]
    pub contract_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletContractsResponse {
    pub address: String,
    pub contract_tx_ids: Vec<String>,
}

/// Contracts deployed by `address` that pass type and ownership validation
/// within the evaluation timeout. Contracts failing or timing out are left out.
pub async fn wallet_contracts(
    State(app): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<WalletContractsResponse>, ApiError> {
    check(&CONTRACT_ID_REGEX, &address, "address")?;
    let contract_type = query
        .contract_type
        .as_deref()
        .map(str::parse::<ContractType>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let candidates = app.chain.find_contracts_by_owner(&address).await?;
    let checks = candidates.iter().map(|id| {
        app.validator
            .validate_with_timeout(id, contract_type, Some(&address))
    });
    let results = join_all(checks).await;

    let contract_tx_ids = candidates
        .into_iter()
        .zip(results)
        .filter_map(|(id, result)| match result {
            Ok(true) => Some(id),
            Ok(false) => None,
            Err(e) => {
                debug!("Skipping {} for wallet {}: {}", id, address, e);
                None
            }
        })
        .collect();

    Ok(Json(WalletContractsResponse {
        address,
        contract_tx_ids,
    }))
}
