//! Chain-data access: transaction tags, contract lookups by owner and
//! contract interactions.

use crate::errors::ChainError;
use crate::types::InteractionRecord;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Decoded `name -> value` tags of a transaction.
pub type TransactionTags = HashMap<String, String>;

/// Tag marking a transaction as a contract deployment.
pub const CONTRACT_APP_NAME: &str = "SmartWeaveContract";

/// Tag marking a transaction as a contract interaction.
pub const INTERACTION_APP_NAME: &str = "SmartWeaveAction";

/// Tag carrying the JSON encoded interaction input.
pub const INPUT_TAG: &str = "Input";

/// Maximum number of contracts returned for a wallet lookup.
const OWNER_QUERY_PAGE_SIZE: usize = 100;

const INTERACTION_QUERY_PAGE_SIZE: usize = 100;

#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Tags of transaction `tx_id`; `ChainError::NotFound` if it does not exist.
    async fn fetch_tags(&self, tx_id: &str) -> Result<TransactionTags, ChainError>;

    /// Ids of contracts deployed by `owner`.
    async fn find_contracts_by_owner(&self, owner: &str) -> Result<Vec<String>, ChainError>;

    /// Interaction transactions addressed to `contract_tx_id`, oldest first.
    async fn fetch_interactions(
        &self,
        contract_tx_id: &str,
    ) -> Result<Vec<InteractionRecord>, ChainError>;
}

#[derive(Debug, Deserialize)]
struct RawTag {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    #[serde(default)]
    tags: Vec<RawTag>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    transactions: GraphQlConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlConnection {
    #[serde(default)]
    page_info: Option<GraphQlPageInfo>,
    edges: Vec<GraphQlEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlPageInfo {
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct GraphQlEdge {
    #[serde(default)]
    cursor: Option<String>,
    node: GraphQlNode,
}

#[derive(Debug, Deserialize)]
struct GraphQlNode {
    id: String,
    #[serde(default)]
    owner: Option<GraphQlOwner>,
    // pending transactions have no block yet
    #[serde(default)]
    block: Option<GraphQlBlock>,
    #[serde(default)]
    tags: Vec<RawTag>,
}

#[derive(Debug, Deserialize)]
struct GraphQlOwner {
    address: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlBlock {
    height: u64,
}

impl GraphQlNode {
    fn into_interaction(self) -> InteractionRecord {
        let input = self
            .tags
            .iter()
            .find(|tag| tag.name == INPUT_TAG)
            .map(|tag| {
                serde_json::from_str(&tag.value).unwrap_or_else(|_| Value::String(tag.value.clone()))
            });
        InteractionRecord {
            id: self.id,
            owner: self.owner.map(|owner| owner.address),
            height: self.block.map(|block| block.height),
            input,
        }
    }
}

/// Decodes base64url tag names and values as served by gateway `/tx/{id}`.
pub fn decode_tags(raw: &[(String, String)]) -> Result<TransactionTags, ChainError> {
    let decode = |encoded: &str| -> Result<String, ChainError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| ChainError::Other(format!("invalid tag encoding: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| ChainError::Other(format!("invalid tag utf8: {}", e)))
    };

    raw.iter()
        .map(|(name, value)| Ok((decode(name)?, decode(value)?)))
        .collect()
}

/// Chain data served by an Arweave-compatible gateway.
pub struct ArweaveGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl ArweaveGateway {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ChainError::Other(format!("invalid gateway url {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Other(format!("failed to build http client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChainError> {
        self.base_url
            .join(path)
            .map_err(|e| ChainError::Other(e.to_string()))
    }

    async fn graphql(&self, query: &str) -> Result<GraphQlResponse, ChainError> {
        let url = self.endpoint("graphql")?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ChainError::Other(format!("graphql request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChainError::Other(format!(
                "graphql returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ChainError::Other(format!("malformed graphql response: {}", e)))
    }
}

#[async_trait]
impl ChainDataSource for ArweaveGateway {
    async fn fetch_tags(&self, tx_id: &str) -> Result<TransactionTags, ChainError> {
        let url = self.endpoint(&format!("tx/{}", tx_id))?;
        debug!("Fetching transaction tags for {}", tx_id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChainError::Other(format!("gateway request failed: {}", e)))?;

        match response.status().as_u16() {
            404 => return Err(ChainError::NotFound(tx_id.to_string())),
            200 => {}
            other => {
                warn!("Gateway returned status {} for transaction {}", other, tx_id);
                return Err(ChainError::Other(format!(
                    "gateway returned status {} for transaction {}",
                    other, tx_id
                )));
            }
        }

        let transaction: RawTransaction = response
            .json()
            .await
            .map_err(|e| ChainError::Other(format!("malformed transaction: {}", e)))?;
        let raw: Vec<(String, String)> = transaction
            .tags
            .into_iter()
            .map(|tag| (tag.name, tag.value))
            .collect();
        decode_tags(&raw)
    }

    async fn find_contracts_by_owner(&self, owner: &str) -> Result<Vec<String>, ChainError> {
        let query = format!(
            r#"query {{ transactions(owners: ["{owner}"], tags: [{{ name: "App-Name", values: ["{app}"] }}], first: {first}, sort: HEIGHT_DESC) {{ edges {{ node {{ id }} }} }} }}"#,
            owner = owner,
            app = CONTRACT_APP_NAME,
            first = OWNER_QUERY_PAGE_SIZE,
        );

        let body = self.graphql(&query).await?;
        Ok(body
            .data
            .map(|data| {
                data.transactions
                    .edges
                    .into_iter()
                    .map(|edge| edge.node.id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_interactions(
        &self,
        contract_tx_id: &str,
    ) -> Result<Vec<InteractionRecord>, ChainError> {
        let mut interactions = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let cursor = after
                .as_deref()
                .map(|cursor| format!(r#", after: "{}""#, cursor))
                .unwrap_or_default();
            let query = format!(
                r#"query {{ transactions(tags: [{{ name: "App-Name", values: ["{app}"] }}, {{ name: "Contract", values: ["{contract}"] }}], first: {first}{cursor}, sort: HEIGHT_ASC) {{ pageInfo {{ hasNextPage }} edges {{ cursor node {{ id owner {{ address }} block {{ height }} tags {{ name value }} }} }} }} }}"#,
                app = INTERACTION_APP_NAME,
                contract = contract_tx_id,
                first = INTERACTION_QUERY_PAGE_SIZE,
                cursor = cursor,
            );

            let data = match self.graphql(&query).await?.data {
                Some(data) => data,
                None => break,
            };
            let has_next_page = data
                .transactions
                .page_info
                .map_or(false, |page| page.has_next_page);
            after = data
                .transactions
                .edges
                .last()
                .and_then(|edge| edge.cursor.clone());
            interactions.extend(
                data.transactions
                    .edges
                    .into_iter()
                    .map(|edge| edge.node.into_interaction()),
            );

            if !has_next_page || after.is_none() {
                break;
            }
        }

        debug!(
            "Fetched {} interactions for contract {}",
            interactions.len(),
            contract_tx_id
        );
        Ok(interactions)
    }
}
