//! Manifest tier: contract id -> evaluation configuration declared on chain.
//!
//! Manifests are immutable once published, so the tier caches aggressively
//! (TTL of a year) and only ever evicts by capacity.

use crate::cache::{CacheConfig, ReadThroughCache};
use crate::chain::{ChainDataSource, TransactionTags};
use crate::errors::ResolveError;
use crate::types::ContractManifest;
use std::sync::Arc;
use tracing::debug;

/// Tag carrying the JSON encoded manifest.
pub const CONTRACT_MANIFEST_TAG: &str = "Contract-Manifest";

pub struct ManifestResolver {
    cache: ReadThroughCache<String, Arc<ContractManifest>>,
    chain: Arc<dyn ChainDataSource>,
}

impl ManifestResolver {
    pub fn new(chain: Arc<dyn ChainDataSource>, config: CacheConfig) -> Self {
        Self {
            cache: ReadThroughCache::new("contract_manifest", config),
            chain,
        }
    }

    pub async fn resolve(&self, contract_tx_id: &str) -> Result<Arc<ContractManifest>, ResolveError> {
        let chain = Arc::clone(&self.chain);

        self.cache
            .get(contract_tx_id.to_string(), move |id: String| async move {
                debug!(contract_tx_id = %id, "Reading through to contract manifest");
                let tags = chain.fetch_tags(&id).await?;
                parse_manifest(&tags).map(Arc::new)
            })
            .await
    }
}

/// Extracts the manifest from transaction tags. A missing tag is an empty manifest.
pub fn parse_manifest(tags: &TransactionTags) -> Result<ContractManifest, ResolveError> {
    let raw = tags
        .get(CONTRACT_MANIFEST_TAG)
        .map(String::as_str)
        .unwrap_or("{}");
    serde_json::from_str(raw)
        .map_err(|e| ResolveError::Unknown(format!("invalid contract manifest: {}", e)))
}
