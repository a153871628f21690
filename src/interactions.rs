//! Interaction tier: contract id -> interaction transactions seen on chain.
//!
//! New interactions arrive with every block, so entries share the state
//! tier's lifetime and capacity.

use crate::cache::{CacheConfig, ReadThroughCache};
use crate::chain::ChainDataSource;
use crate::errors::ResolveError;
use crate::types::InteractionRecord;
use std::sync::Arc;
use tracing::debug;

pub struct InteractionResolver {
    cache: ReadThroughCache<String, Arc<Vec<InteractionRecord>>>,
    chain: Arc<dyn ChainDataSource>,
}

impl InteractionResolver {
    pub fn new(chain: Arc<dyn ChainDataSource>, config: CacheConfig) -> Self {
        Self {
            cache: ReadThroughCache::new("contract_interactions", config),
            chain,
        }
    }

    pub async fn resolve(
        &self,
        contract_tx_id: &str,
    ) -> Result<Arc<Vec<InteractionRecord>>, ResolveError> {
        let chain = Arc::clone(&self.chain);

        self.cache
            .get(contract_tx_id.to_string(), move |id: String| async move {
                debug!(contract_tx_id = %id, "Reading through to contract interactions");
                let records = chain.fetch_interactions(&id).await?;
                Ok::<_, ResolveError>(Arc::new(records))
            })
            .await
    }
}
