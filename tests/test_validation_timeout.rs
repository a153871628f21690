//! Integration tests for deadline-bounded validation
//!
//! Tests cover:
//! - Timeout raised at the deadline, not before
//! - Success just under the deadline
//! - Abandoned evaluations still landing in the cache
//! - Type and ownership predicates on resolved state

mod common;

use common::{service, tx_id, MockChain, MockEngine};
use contract_state_gateway::errors::ResolveError;
use contract_state_gateway::service::Deadline;
use contract_state_gateway::{ContractType, ContractValidator, Settings};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

const DEADLINE: Duration = Duration::from_millis(10_000);

fn ant_state(owner: &str) -> serde_json::Value {
    json!({
        "owner": owner,
        "ticker": "ANT-TEST",
        "records": {"@": {"transactionId": "page-tx", "ttlSeconds": 3600}}
    })
}

#[tokio::test(start_paused = true)]
async fn test_slow_evaluation_times_out_at_deadline() {
    let engine = MockEngine::with_delay(Duration::from_millis(10_500));
    let id = tx_id('a');
    engine.set_state(&id, ant_state("X"));
    let validator = ContractValidator::new(
        service(&Settings::default(), engine.clone(), MockChain::new()),
        DEADLINE,
    );

    let start = Instant::now();
    let result = validator
        .validate_with_timeout(&id, Some(ContractType::Ant), Some("X"))
        .await;
    let elapsed = start.elapsed();

    assert_eq!(result, Err(ResolveError::Timeout(DEADLINE)));
    assert!(elapsed >= DEADLINE, "timed out early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(10_100), "timed out late: {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_evaluation_under_deadline_succeeds() {
    let engine = MockEngine::with_delay(Duration::from_millis(9_000));
    let id = tx_id('b');
    engine.set_state(&id, ant_state("X"));
    let validator = ContractValidator::new(
        service(&Settings::default(), engine.clone(), MockChain::new()),
        DEADLINE,
    );

    let start = Instant::now();
    let result = validator
        .validate_with_timeout(&id, Some(ContractType::Ant), Some("X"))
        .await;
    let elapsed = start.elapsed();

    assert_eq!(result, Ok(true));
    assert!(elapsed >= Duration::from_millis(9_000));
    assert!(elapsed < DEADLINE);
}

/// The caller gives up at the deadline, but the evaluation keeps running and
/// its result is served from cache afterwards.
#[tokio::test(start_paused = true)]
async fn test_timed_out_evaluation_still_populates_cache() {
    let engine = MockEngine::with_delay(Duration::from_millis(10_500));
    let id = tx_id('c');
    engine.set_state(&id, ant_state("X"));
    let service = service(&Settings::default(), engine.clone(), MockChain::new());
    let validator = ContractValidator::new(service.clone(), DEADLINE);

    let result = validator.validate_with_timeout(&id, None, None).await;
    assert!(matches!(result, Err(ResolveError::Timeout(_))));
    assert_eq!(service.states().in_flight_count(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(service.states().in_flight_count(), 0);

    let start = Instant::now();
    let resolved = service.get_contract_state(&id).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(resolved.owner(), Some("X"));
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_observed_by_resolution_call() {
    let engine = MockEngine::with_delay(Duration::from_secs(60));
    let id = tx_id('d');
    engine.set_state(&id, ant_state("X"));
    let service = service(&Settings::default(), engine, MockChain::new());

    let deadline = Deadline::after(Duration::from_secs(2));
    let err = service
        .get_contract_state_before(&id, deadline)
        .await
        .unwrap_err();
    assert_eq!(err, ResolveError::Timeout(Duration::from_secs(2)));
    assert!(deadline.is_elapsed());
    assert_eq!(
        err.to_string(),
        "State evaluation exceeded limit of 2000ms."
    );
}

#[tokio::test]
async fn test_type_and_ownership_predicates() {
    let engine = MockEngine::new();
    let ant = tx_id('e');
    let plain = tx_id('f');
    engine.set_state(&ant, ant_state("X"));
    engine.set_state(&plain, json!({"owner": "X", "controller": "Z"}));
    let validator = ContractValidator::new(
        service(&Settings::default(), engine, MockChain::new()),
        DEADLINE,
    );

    let check = |id: String, ty: Option<ContractType>, address: Option<&'static str>| {
        let validator = validator.clone();
        async move {
            validator
                .validate_state_and_ownership(&id, ty, address)
                .await
                .unwrap()
        }
    };

    assert!(check(ant.clone(), Some(ContractType::Ant), Some("X")).await);
    assert!(!check(ant.clone(), Some(ContractType::Ant), Some("Y")).await);
    assert!(check(ant.clone(), None, None).await);
    assert!(!check(plain.clone(), Some(ContractType::Ant), Some("X")).await);
    assert!(check(plain.clone(), None, Some("Z")).await);
}

#[tokio::test]
async fn test_validation_propagates_not_found() {
    let validator = ContractValidator::new(
        service(&Settings::default(), MockEngine::new(), MockChain::new()),
        DEADLINE,
    );
    let err = validator
        .validate_with_timeout(&tx_id('z'), None, None)
        .await
        .unwrap_err();
    assert_eq!(err, ResolveError::NotFound("Contract not found".into()));
}
