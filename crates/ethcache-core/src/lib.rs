//! # ethcache core
//!
//! Core library for ethcache, a caching reverse proxy for Ethereum JSON-RPC.
//!
//! The proxy sits between client applications and an upstream RPC provider,
//! forwarding requests verbatim while memoising responses whose semantics are
//! provably stable: historical, block-pinned, or immutable-by-hash queries.
//! Cached entries live in a relational store, so they survive restarts and are
//! shared between proxy instances pointing at the same database.
//!
//! - **[`cache`]**: the cacheability decision and canonical cache-key
//!   derivation.
//!
//! - **[`store`]**: the persistence layer owning the `rpc_cache` table, with
//!   read-with-touch, upsert, aggregate size, and size-targeted prune.
//!
//! - **[`proxy`]**: the request pipeline coordinating cache lookup, outbound
//!   rate limiting, upstream dispatch, and conditional write-back.
//!
//! - **[`cleanup`]**: the size-bounded eviction worker, driven by write
//!   notifications through a coalescing signal.
//!
//! - **[`ratelimit`]**: token-bucket gate on upstream dispatch.
//!
//! - **[`metrics`]**: Prometheus metrics collection and the periodic cache
//!   size sampler.
//!
//! - **[`config`]**: layered application configuration (YAML file plus
//!   environment overrides).
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │ Cacheable?  │ ─── No ───────────────┐
//! └──────┬──────┘                       │
//!        │ Yes                          │
//!        ▼                              │
//! ┌─────────────┐                       │
//! │ Store read  │ ─── Hit ──► Cached Response
//! └──────┬──────┘                       │
//!        │ Miss                         │
//!        ▼                              ▼
//! ┌─────────────┐              ┌────────────────┐
//! │ Rate limit  │ ───────────► │ Upstream POST  │
//! └─────────────┘              └────────┬───────┘
//!                                       │
//!                              ┌────────▼───────┐
//!                              │ Write-back +   │
//!                              │ cleanup notify │
//!                              └────────┬───────┘
//!                                       ▼
//!                             Upstream body verbatim
//! ```

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod metrics;
pub mod proxy;
pub mod ratelimit;
pub mod store;
pub mod types;
