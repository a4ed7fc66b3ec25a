//! # fairq
//!
//! Fair multi-tenant task queue on Redis.
//!
//! Independent clients submit ordered tasks; a pool of workers drains them
//! per client with at-most-one-worker-per-client exclusivity, at-least-once
//! delivery, and crash-recovered redelivery. Workers coordinate only through
//! the backing store's lock and set primitives — no shared in-process state.

pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod producer;
pub mod shutdown;
pub mod store;
pub mod worker;
