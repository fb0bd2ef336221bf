//! Local persistence and resilience layer for a résumé editor.
//!
//! `integrity` validates, recovers and migrates documents; `storage` is the
//! only path to and from the key/value store; `resilience` wraps unreliable
//! async work in retry, timeout, fallback and cancellation. The HTTP facade in
//! `routes` exposes the gateway to a local UI.

pub mod config;
pub mod errors;
pub mod integrity;
pub mod models;
pub mod resilience;
pub mod routes;
pub mod state;
pub mod storage;
