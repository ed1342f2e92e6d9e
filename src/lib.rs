//! Tollgate - Store-Backed Fixed-Window Rate Limiting
//!
//! This crate implements admission control for web backends: a fixed-window
//! rate limiter keyed by (subject, resource), with counters held in a shared
//! external store so the quota holds across multiple server processes. The
//! store is injected behind a trait; an in-process implementation and a
//! Redis-backed one are provided.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use config::TollgateConfig;
pub use error::{RateLimitError, Result};
pub use ratelimit::{Gate, Policy, RateLimitKey, RateLimiter, Subject};
pub use store::{CounterStore, MemoryStore, RedisStore, StoreError};
