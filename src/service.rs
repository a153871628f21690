//! Top-level resolution sequence for contract reads.
//!
//! 1. resolve the manifest (cached effectively forever) for the contract
//! 2. take its evaluation options, or the process-wide defaults when it has none
//! 3. resolve state for (contract, options) through the deduplicated state tier
//!
//! Collaborator failures arrive already classified into [`ResolveError`].

use crate::chain::ChainDataSource;
use crate::engine::EvaluationEngine;
use crate::errors::ResolveError;
use crate::interactions::InteractionResolver;
use crate::manifest::ManifestResolver;
use crate::settings::Settings;
use crate::state::StateResolver;
use crate::types::{ContractInteraction, EvaluatedContractState, EvaluationOptions};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Point in time after which a caller no longer waits for a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Awaits `fut` until the deadline. The future is only dropped; work it
    /// handed to detached tasks keeps running.
    pub async fn observe<T, F>(&self, fut: F) -> Result<T, ResolveError>
    where
        F: Future<Output = Result<T, ResolveError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(self.limit)),
        }
    }
}

pub struct ContractReadService {
    manifests: ManifestResolver,
    states: StateResolver,
    interactions: InteractionResolver,
    default_options: EvaluationOptions,
}

impl ContractReadService {
    pub fn new(
        manifests: ManifestResolver,
        states: StateResolver,
        interactions: InteractionResolver,
        default_options: EvaluationOptions,
    ) -> Self {
        Self {
            manifests,
            states,
            interactions,
            default_options,
        }
    }

    /// Wires the cache tiers from the `[cache]` and `[evaluation]` settings.
    pub fn from_settings(
        settings: &Settings,
        engine: Arc<dyn EvaluationEngine>,
        chain: Arc<dyn ChainDataSource>,
    ) -> Self {
        let manifests =
            ManifestResolver::new(Arc::clone(&chain), settings.manifest_cache_config());
        let states = StateResolver::new(engine, settings.state_cache_config());
        let interactions = InteractionResolver::new(chain, settings.state_cache_config());
        Self::new(
            manifests,
            states,
            interactions,
            settings.evaluation.default_options.clone(),
        )
    }

    pub async fn get_contract_state(
        &self,
        contract_tx_id: &str,
    ) -> Result<EvaluatedContractState, ResolveError> {
        self.resolve(contract_tx_id, None).await
    }

    /// Same as [`get_contract_state`](Self::get_contract_state) but gives up
    /// with `ResolveError::Timeout` once `deadline` passes.
    pub async fn get_contract_state_before(
        &self,
        contract_tx_id: &str,
        deadline: Deadline,
    ) -> Result<EvaluatedContractState, ResolveError> {
        self.resolve(contract_tx_id, Some(deadline)).await
    }

    /// Evaluated state of `contract_tx_id` together with the interactions it
    /// processed, restricted to those sent by `owner` when given. Both reads
    /// run concurrently and observe `deadline`.
    pub async fn get_contract_interactions(
        &self,
        contract_tx_id: &str,
        owner: Option<&str>,
        deadline: Deadline,
    ) -> Result<(EvaluatedContractState, Vec<ContractInteraction>), ResolveError> {
        let (resolved, records) = futures::try_join!(
            self.resolve(contract_tx_id, Some(deadline)),
            deadline.observe(self.interactions.resolve(contract_tx_id)),
        )?;
        let interactions = resolved.interactions(&records, owner);
        Ok((resolved, interactions))
    }

    pub fn manifests(&self) -> &ManifestResolver {
        &self.manifests
    }

    pub fn states(&self) -> &StateResolver {
        &self.states
    }

    async fn resolve(
        &self,
        contract_tx_id: &str,
        deadline: Option<Deadline>,
    ) -> Result<EvaluatedContractState, ResolveError> {
        let result = async {
            let manifest = within(deadline, self.manifests.resolve(contract_tx_id)).await?;
            let options = manifest
                .evaluation_options
                .clone()
                .unwrap_or_else(|| self.default_options.clone());
            within(deadline, self.states.resolve(contract_tx_id, &options)).await
        }
        .await;

        if let Err(ref e) = result {
            match e {
                ResolveError::NotFound(_) => {
                    debug!(contract_tx_id, error = %e, "Contract not found")
                }
                _ => warn!(
                    contract_tx_id,
                    kind = e.kind(),
                    error = %e,
                    "Failed to resolve contract state"
                ),
            }
        }
        result
    }
}

async fn within<T, F>(deadline: Option<Deadline>, fut: F) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, ResolveError>>,
{
    match deadline {
        Some(deadline) => deadline.observe(fut).await,
        None => fut.await,
    }
}
