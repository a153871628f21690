//! State tier: (contract id, evaluation options) -> evaluated state.
//!
//! Entries live for a fraction of a block interval so state is never served
//! more than roughly one block behind, while bursts of identical reads inside
//! that window are absorbed. Concurrent misses for one key share a single
//! engine evaluation.

use crate::cache::{CacheConfig, CacheStatsSnapshot, ReadThroughCache};
use crate::cache_key::CacheKey;
use crate::engine::EvaluationEngine;
use crate::errors::ResolveError;
use crate::types::{ContractEvaluation, EvaluatedContractState, EvaluationOptions};
use std::sync::Arc;
use tracing::debug;

pub struct StateResolver {
    cache: ReadThroughCache<CacheKey, Arc<ContractEvaluation>>,
    engine: Arc<dyn EvaluationEngine>,
}

impl StateResolver {
    pub fn new(engine: Arc<dyn EvaluationEngine>, config: CacheConfig) -> Self {
        Self {
            cache: ReadThroughCache::new("contract_state", config),
            engine,
        }
    }

    /// Evaluated state of `contract_tx_id` under `options`, stamped with `options`.
    pub async fn resolve(
        &self,
        contract_tx_id: &str,
        options: &EvaluationOptions,
    ) -> Result<EvaluatedContractState, ResolveError> {
        let key = CacheKey::derive(contract_tx_id, options);
        let engine = Arc::clone(&self.engine);
        let loader_options = options.clone();

        let evaluation = self
            .cache
            .get(key, move |key: CacheKey| async move {
                debug!(
                    contract_tx_id = key.subject_id(),
                    cache_key = %key,
                    "Evaluating contract state"
                );
                let evaluation = engine.evaluate(key.subject_id(), &loader_options).await?;
                debug!(cache_key = %key, "Successfully evaluated contract state");
                Ok::<_, ResolveError>(Arc::new(evaluation))
            })
            .await?;

        Ok(EvaluatedContractState::new(
            contract_tx_id,
            evaluation,
            options.clone(),
        ))
    }

    pub fn in_flight_count(&self) -> usize {
        self.cache.in_flight_count()
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}
