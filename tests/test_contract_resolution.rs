//! Integration tests for the manifest and state tiers
//!
//! Tests cover:
//! - Coalescing of concurrent evaluations for one key
//! - Failure isolation (failures are shared, never cached)
//! - Permanent manifest caching vs. short-lived state caching
//! - Default evaluation options and per-caller option stamping
//! - Failure classification

mod common;

use common::{service, tx_id, MockChain, MockEngine};
use contract_state_gateway::cache::CacheConfig;
use contract_state_gateway::errors::{EngineError, ResolveError};
use contract_state_gateway::state::StateResolver;
use contract_state_gateway::types::EvaluationOptions;
use contract_state_gateway::Settings;
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;

/// Ten concurrent readers of a cold contract trigger exactly one evaluation
/// and one manifest fetch.
#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_evaluation() {
    let engine = MockEngine::with_delay(Duration::from_millis(100));
    let chain = MockChain::new();
    let id = tx_id('a');
    engine.set_state(&id, json!({"owner": "X", "ticker": "ANT-A"}));
    let service = service(&Settings::default(), engine.clone(), chain.clone());

    let reads = (0..10).map(|_| service.get_contract_state(&id));
    let results = join_all(reads).await;

    assert_eq!(engine.calls(), 1);
    assert_eq!(chain.tag_calls(), 1);
    for result in results {
        let resolved = result.unwrap();
        assert_eq!(resolved.field("ticker"), Some(&json!("ANT-A")));
    }
    assert_eq!(service.states().in_flight_count(), 0);
}

/// Readers arriving in the same instant the evaluation settles, staggered by
/// scheduler yields, all reuse it rather than evaluating again.
#[tokio::test(start_paused = true)]
async fn test_reads_at_settle_time_do_not_reevaluate() {
    let engine = MockEngine::with_delay(Duration::from_millis(100));
    let id = tx_id('s');
    engine.set_state(&id, json!({"owner": "X"}));
    let service = service(&Settings::default(), engine.clone(), MockChain::new());
    service.manifests().resolve(&id).await.unwrap();

    let leader = {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move { service.get_contract_state(&id).await })
    };
    let readers: Vec<_> = (0..20)
        .map(|i| {
            let service = service.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                for _ in 0..i {
                    tokio::task::yield_now().await;
                }
                service.get_contract_state(&id).await
            })
        })
        .collect();

    assert!(leader.await.unwrap().is_ok());
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap().owner(), Some("X"));
    }
    assert_eq!(engine.calls(), 1);
    assert_eq!(service.states().in_flight_count(), 0);
}

/// The service takes its tier bounds from the `[cache]` settings.
#[tokio::test(start_paused = true)]
async fn test_service_uses_configured_state_ttl() {
    let engine = MockEngine::new();
    let id = tx_id('t');
    engine.set_state(&id, json!({"owner": "X"}));
    let settings = Settings::from_toml("[cache]\nstate_ttl_seconds = 5\n").unwrap();
    let service = service(&settings, engine.clone(), MockChain::new());

    service.get_contract_state(&id).await.unwrap();
    tokio::time::advance(Duration::from_secs(4)).await;
    service.get_contract_state(&id).await.unwrap();
    assert_eq!(engine.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    service.get_contract_state(&id).await.unwrap();
    assert_eq!(engine.calls(), 2);
    assert_eq!(service.states().cache_stats().expirations, 1);
}

/// Every caller sharing a failed evaluation gets the error, and the next read
/// evaluates again.
#[tokio::test(start_paused = true)]
async fn test_failure_is_shared_but_not_cached() {
    let engine = MockEngine::with_delay(Duration::from_millis(100));
    let id = tx_id('b');
    engine.set_failure(&id, EngineError::Other("engine crashed".into()));
    let service = service(&Settings::default(), engine.clone(), MockChain::new());

    let results = join_all((0..4).map(|_| service.get_contract_state(&id))).await;
    assert_eq!(engine.calls(), 1);
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            ResolveError::Unknown("engine crashed".into())
        );
    }
    assert_eq!(service.states().in_flight_count(), 0);

    engine.set_state(&id, json!({"owner": "X"}));
    let resolved = service.get_contract_state(&id).await.unwrap();
    assert_eq!(resolved.owner(), Some("X"));
    assert_eq!(engine.calls(), 2);
}

/// State expires after 30s; the manifest does not.
#[tokio::test(start_paused = true)]
async fn test_state_expires_while_manifest_stays_cached() {
    let engine = MockEngine::new();
    let chain = MockChain::new();
    let id = tx_id('c');
    engine.set_state(&id, json!({"owner": "X"}));
    let service = service(&Settings::default(), engine.clone(), chain.clone());

    service.get_contract_state(&id).await.unwrap();
    tokio::time::advance(Duration::from_secs(29)).await;
    service.get_contract_state(&id).await.unwrap();
    assert_eq!(engine.calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    service.get_contract_state(&id).await.unwrap();
    assert_eq!(engine.calls(), 2);

    tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
    service.get_contract_state(&id).await.unwrap();
    assert_eq!(engine.calls(), 3);
    assert_eq!(chain.tag_calls(), 1);
}

#[tokio::test]
async fn test_default_options_used_without_manifest() {
    let engine = MockEngine::new();
    let id = tx_id('d');
    engine.set_state(&id, json!({"owner": "X"}));

    let mut settings = Settings::default();
    settings.evaluation.default_options = EvaluationOptions::new().with("sourceType", "arweave");
    let service = service(&settings, engine.clone(), MockChain::new());

    let resolved = service.get_contract_state(&id).await.unwrap();
    assert_eq!(
        resolved.evaluation_options.get("sourceType"),
        Some(&json!("arweave"))
    );
    assert_eq!(engine.seen_options()[0].1, settings.evaluation.default_options);
}

#[tokio::test]
async fn test_manifest_options_take_precedence() {
    let engine = MockEngine::new();
    let chain = MockChain::new();
    let id = tx_id('e');
    engine.set_state(&id, json!({"owner": "X"}));
    chain.set_manifest(
        &id,
        r#"{"evaluationOptions":{"unsafeClient":"skip","internalWrites":true}}"#,
    );

    let mut settings = Settings::default();
    settings.evaluation.default_options = EvaluationOptions::new().with("sourceType", "arweave");
    let service = service(&settings, engine.clone(), chain);

    let resolved = service.get_contract_state(&id).await.unwrap();
    let expected = EvaluationOptions::new()
        .with("unsafeClient", "skip")
        .with("internalWrites", true);
    assert_eq!(resolved.evaluation_options, expected);
    assert_eq!(engine.seen_options()[0].1, expected);
}

/// Option sets that differ only in key order share a cache entry; each caller
/// still gets its own options back.
#[tokio::test]
async fn test_state_keyed_by_canonical_options() {
    let engine = MockEngine::new();
    let id = tx_id('f');
    engine.set_state(&id, json!({"owner": "X"}));
    let resolver = StateResolver::new(
        engine.clone(),
        CacheConfig::new(100, Duration::from_secs(30)),
    );

    let first = EvaluationOptions::new().with("a", 1).with("b", 2);
    let reordered = EvaluationOptions::new().with("b", 2).with("a", 1);
    let other = EvaluationOptions::new().with("a", 1);

    let resolved = resolver.resolve(&id, &first).await.unwrap();
    assert_eq!(resolved.evaluation_options, first);
    resolver.resolve(&id, &reordered).await.unwrap();
    assert_eq!(engine.calls(), 1);

    let resolved = resolver.resolve(&id, &other).await.unwrap();
    assert_eq!(resolved.evaluation_options, other);
    assert_eq!(engine.calls(), 2);
    assert_eq!(resolver.cache_stats().size, 2);
}

#[tokio::test]
async fn test_failures_are_classified() {
    let engine = MockEngine::new();
    let chain = MockChain::new();
    let missing_on_chain = tx_id('g');
    let missing_in_engine = tx_id('h');
    let rejected = tx_id('i');
    chain.set_missing(&missing_on_chain);
    engine.set_failure(
        &rejected,
        EngineError::Rejected("Use contract.setEvaluationOptions({unsafeClient: 'skip'})".into()),
    );
    let service = service(&Settings::default(), engine.clone(), chain);

    assert_eq!(
        service.get_contract_state(&missing_on_chain).await.unwrap_err(),
        ResolveError::NotFound("Contract not found".into())
    );
    assert_eq!(engine.calls(), 0);

    assert_eq!(
        service.get_contract_state(&missing_in_engine).await.unwrap_err(),
        ResolveError::NotFound("Contract not found".into())
    );
    assert!(matches!(
        service.get_contract_state(&rejected).await.unwrap_err(),
        ResolveError::EvaluationRejected(_)
    ));
}

#[tokio::test]
async fn test_malformed_manifest_is_unknown_and_retried() {
    let engine = MockEngine::new();
    let chain = MockChain::new();
    let id = tx_id('j');
    engine.set_state(&id, json!({}));
    chain.set_manifest(&id, "{not json");
    let service = service(&Settings::default(), engine.clone(), chain.clone());

    for _ in 0..2 {
        let err = service.get_contract_state(&id).await.unwrap_err();
        assert_eq!(err.kind(), "unknown");
    }
    assert_eq!(chain.tag_calls(), 2);
    assert_eq!(engine.calls(), 0);
}
