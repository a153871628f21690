//! # Contract State Gateway
//!
//! Read-only HTTP views over the evaluated state of on-chain SmartWeave
//! contracts. Evaluating a contract replays its whole interaction log, so the
//! crate is built around a caching and concurrency-control layer that sits
//! between many concurrent readers and that expensive, externally owned
//! evaluation step.
//!
//! ## Architecture
//!
//! ### Cache Layer
//! A capacity- and TTL-bounded read-through cache, and a deterministic key
//! derived from (contract id, evaluation options).
//!
//! ### Deduplication Layer
//! An in-flight registry, owned by each cache, that lets concurrent misses for
//! one key share a single load.
//!
//! ### Resolution Layer
//! Manifest tier (effectively permanent), state tier (seconds) and the
//! interaction tier that joins chain metadata onto evaluated interactions,
//! composed by
//! [`ContractReadService`]; [`ContractValidator`] applies type and ownership
//! predicates under a hard deadline.
//!
//! ### Collaborators
//! The evaluation engine and the chain gateway sit behind async traits, with
//! HTTP adapters for production and in-memory fakes in tests.

// Core Types
/// Evaluation options, manifests and evaluated state
pub mod types;
/// Failure taxonomy
pub mod errors;

// Cache Layer
/// Read-through cache with TTL and LRU bounds
pub mod cache;
/// Cache key derivation
pub mod cache_key;
/// In-flight request deduplication
pub mod dedup;

// Resolution Layer
/// Contract manifest tier
pub mod manifest;
/// Contract state tier
pub mod state;
/// Contract interaction tier
pub mod interactions;
/// Manifest-then-state resolution sequence
pub mod service;
/// Type and ownership validation with timeout
pub mod validator;

// Collaborators
/// Evaluation engine trait and remote adapter
pub mod engine;
/// Chain data trait and gateway adapter
pub mod chain;

// HTTP Surface
/// Routes, handlers and error mapping
pub mod api;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use cache_key::CacheKey;
pub use chain::{ArweaveGateway, ChainDataSource};
pub use engine::{EvaluationEngine, RemoteEvaluationEngine};
pub use errors::ResolveError;
pub use service::{ContractReadService, Deadline};
pub use settings::Settings;
pub use validator::{ContractType, ContractValidator};
