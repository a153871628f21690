//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use contract_state_gateway::chain::{ChainDataSource, TransactionTags};
use contract_state_gateway::errors::{ChainError, EngineError};
use contract_state_gateway::engine::EvaluationEngine;
use contract_state_gateway::manifest::CONTRACT_MANIFEST_TAG;
use contract_state_gateway::types::{ContractEvaluation, EvaluationOptions, InteractionRecord};
use contract_state_gateway::{ContractReadService, Settings};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 43-character transaction id made of `c`.
pub fn tx_id(c: char) -> String {
    c.to_string().repeat(43)
}

/// Evaluation engine answering from a fixed table after an optional delay.
#[derive(Default)]
pub struct MockEngine {
    calls: AtomicUsize,
    delay: Mutex<Duration>,
    responses: Mutex<HashMap<String, Result<ContractEvaluation, EngineError>>>,
    seen_options: Mutex<Vec<(String, EvaluationOptions)>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let engine = Self::default();
        *engine.delay.lock().unwrap() = delay;
        Arc::new(engine)
    }

    pub fn set_state(&self, contract_tx_id: &str, state: Value) {
        self.responses.lock().unwrap().insert(
            contract_tx_id.to_string(),
            Ok(ContractEvaluation {
                state,
                ..Default::default()
            }),
        );
    }

    pub fn set_evaluation(&self, contract_tx_id: &str, evaluation: ContractEvaluation) {
        self.responses
            .lock()
            .unwrap()
            .insert(contract_tx_id.to_string(), Ok(evaluation));
    }

    pub fn set_failure(&self, contract_tx_id: &str, error: EngineError) {
        self.responses
            .lock()
            .unwrap()
            .insert(contract_tx_id.to_string(), Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_options(&self) -> Vec<(String, EvaluationOptions)> {
        self.seen_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl EvaluationEngine for MockEngine {
    async fn evaluate(
        &self,
        contract_tx_id: &str,
        options: &EvaluationOptions,
    ) -> Result<ContractEvaluation, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options
            .lock()
            .unwrap()
            .push((contract_tx_id.to_string(), options.clone()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .unwrap()
            .get(contract_tx_id)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::NotFound(contract_tx_id.to_string())))
    }
}

/// Chain data source with per-transaction tags, per-owner contract lists and
/// per-contract interactions.
/// Transactions without tags resolve to an empty tag set.
#[derive(Default)]
pub struct MockChain {
    tag_calls: AtomicUsize,
    tags: Mutex<HashMap<String, TransactionTags>>,
    missing: Mutex<Vec<String>>,
    owned: Mutex<HashMap<String, Vec<String>>>,
    interactions: Mutex<HashMap<String, Vec<InteractionRecord>>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_manifest(&self, contract_tx_id: &str, manifest_json: &str) {
        let mut tags = TransactionTags::new();
        tags.insert(CONTRACT_MANIFEST_TAG.to_string(), manifest_json.to_string());
        self.tags
            .lock()
            .unwrap()
            .insert(contract_tx_id.to_string(), tags);
    }

    pub fn set_missing(&self, contract_tx_id: &str) {
        self.missing.lock().unwrap().push(contract_tx_id.to_string());
    }

    pub fn set_owned(&self, owner: &str, contract_tx_ids: Vec<String>) {
        self.owned
            .lock()
            .unwrap()
            .insert(owner.to_string(), contract_tx_ids);
    }

    pub fn set_interactions(&self, contract_tx_id: &str, records: Vec<InteractionRecord>) {
        self.interactions
            .lock()
            .unwrap()
            .insert(contract_tx_id.to_string(), records);
    }

    pub fn tag_calls(&self) -> usize {
        self.tag_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainDataSource for MockChain {
    async fn fetch_tags(&self, tx_id: &str) -> Result<TransactionTags, ChainError> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.missing.lock().unwrap().iter().any(|id| id == tx_id) {
            return Err(ChainError::NotFound(tx_id.to_string()));
        }
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(tx_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_contracts_by_owner(&self, owner: &str) -> Result<Vec<String>, ChainError> {
        Ok(self
            .owned
            .lock()
            .unwrap()
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_interactions(
        &self,
        contract_tx_id: &str,
    ) -> Result<Vec<InteractionRecord>, ChainError> {
        Ok(self
            .interactions
            .lock()
            .unwrap()
            .get(contract_tx_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub fn service(
    settings: &Settings,
    engine: Arc<MockEngine>,
    chain: Arc<MockChain>,
) -> Arc<ContractReadService> {
    Arc::new(ContractReadService::from_settings(settings, engine, chain))
}
